//! Hash capabilities and the named suite (CubeHash at every size the
//! algorithm table mentions).

mod cubehash;

pub use cubehash::{CubeHash, CubeHashProc};

/// One-shot hash of a byte string.
pub trait HashFunction {
    /// Digest size in bytes.
    fn size(&self) -> usize;
    fn hash(&self, data: &[u8]) -> Vec<u8>;
}

/// Incremental hashing for streamed data.
pub trait HashProc {
    fn size(&self) -> usize;
    fn init(&mut self);
    fn eat(&mut self, data: &[u8]);
    fn finish(&mut self) -> Vec<u8>;
}

pub const HASH_NAMES: &[&str] = &["CUBE128", "CUBE192", "CUBE256", "CUBE384", "CUBE512"];

fn bits_of(name: &str) -> Option<usize> {
    match name {
        "CUBE128" => Some(128),
        "CUBE192" => Some(192),
        "CUBE256" => Some(256),
        "CUBE384" => Some(384),
        "CUBE512" => Some(512),
        _ => None,
    }
}

pub fn by_name(name: &str) -> Option<Box<dyn HashFunction>> {
    bits_of(name).map(|b| Box::new(CubeHash::new(b / 8)) as Box<dyn HashFunction>)
}

pub fn proc_by_name(name: &str) -> Option<Box<dyn HashProc>> {
    bits_of(name).map(|b| Box::new(CubeHashProc::new(b / 8)) as Box<dyn HashProc>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_lookup() {
        for name in HASH_NAMES {
            let hf = by_name(name).unwrap();
            let hp = proc_by_name(name).unwrap();
            assert_eq!(hf.size(), hp.size());
        }
        assert!(by_name("MD5").is_none());
    }
}
