//! The cryptosystem variants: classical McEliece and Niederreiter,
//! quasi-dyadic and QC-MDPC McEliece, and FMTseq hash-based signatures.

pub mod fmtseq;
pub mod mce;
pub mod mce_qd;
pub mod nd;
pub mod qcmdpc;
