//! Randomness plumbing: everything in the core draws from a `Prng`, which
//! is a ChaCha20 stream keyed from the OS entropy pool (or the file named
//! by `CCR_RANDOM_SEED`).

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use rand::RngCore;

use crate::cipher::{ChaCha20, StreamCipher};
use crate::error::{Error, Result};

pub trait Prng {
    /// Uniformly random value in 0..n.
    fn random(&mut self, n: u32) -> u32;

    fn random_bytes(&mut self, out: &mut [u8]);

    fn random_byte(&mut self) -> u8 {
        let mut b = [0u8; 1];
        self.random_bytes(&mut b);
        b[0]
    }
}

pub struct ChaChaRng {
    cipher: ChaCha20,
}

impl ChaChaRng {
    /// Deterministic generator from explicit key material.
    pub fn from_key(key: &[u8]) -> ChaChaRng {
        let mut cipher = ChaCha20::new();
        cipher.load_key(key);
        ChaChaRng { cipher }
    }

    /// Generator seeded with `bits` bits of external entropy.
    pub fn seeded(bits: usize) -> Result<ChaChaRng> {
        let bytes = ((bits + 7) / 8).min(256);
        let mut seed = vec![0u8; bytes];

        match std::env::var("CCR_RANDOM_SEED") {
            Ok(path) => {
                let mut f = std::fs::File::open(&path)
                    .map_err(|e| Error::Randomness(format!("opening {path} failed: {e}")))?;
                f.read_exact(&mut seed)
                    .map_err(|e| Error::Randomness(format!("reading {path} failed: {e}")))?;
            }
            Err(_) => rand::rngs::OsRng.fill_bytes(&mut seed),
        }

        Ok(ChaChaRng::from_key(&seed))
    }
}

impl Prng for ChaChaRng {
    fn random(&mut self, n: u32) -> u32 {
        let mut b = [0u8; 8];
        self.cipher.generate(&mut b);
        (LittleEndian::read_u64(&b) % u64::from(n)) as u32
    }

    fn random_bytes(&mut self, out: &mut [u8]) {
        self.cipher.generate(out);
    }
}

/// Deterministic generator for tests.
#[cfg(test)]
pub struct TestRng(ChaChaRng);

#[cfg(test)]
impl TestRng {
    pub fn new(seed: u64) -> TestRng {
        let mut key = [0u8; 8];
        LittleEndian::write_u64(&mut key, seed);
        TestRng(ChaChaRng::from_key(&key))
    }
}

#[cfg(test)]
impl Prng for TestRng {
    fn random(&mut self, n: u32) -> u32 {
        self.0.random(n)
    }

    fn random_bytes(&mut self, out: &mut [u8]) {
        self.0.random_bytes(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_sampling() {
        let mut rng = TestRng::new(1);
        for bound in [1u32, 2, 10, 1000] {
            for _ in 0..100 {
                assert!(rng.random(bound) < bound);
            }
        }
    }

    #[test]
    fn deterministic_for_same_key() {
        let mut a = ChaChaRng::from_key(b"seed");
        let mut b = ChaChaRng::from_key(b"seed");
        for _ in 0..10 {
            assert_eq!(a.random(1 << 20), b.random(1 << 20));
        }
    }
}
