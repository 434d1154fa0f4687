//! Code-based post-quantum cryptography suite: McEliece-family encryption
//! (classical, quasi-dyadic, QC-MDPC), Niederreiter, FMTseq hash-based
//! signatures, and the keyring plumbing that holds it together.

pub mod algorithm;
pub mod cipher;
pub mod codes;
pub mod digest;
pub mod envelope;
pub mod error;
pub mod hashfile;
pub mod keyring;
pub mod math;
pub mod message;
pub mod rng;
pub mod schemes;
pub mod seclock;
pub mod sencode;
pub mod symkey;

pub use error::{Error, Result};
