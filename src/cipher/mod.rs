//! Stream cipher capability and the named suite.

mod arcfour;
mod chacha;

pub use arcfour::Arcfour;
pub use chacha::ChaCha20;

pub trait StreamCipher {
    /// Reset to the unkeyed state.
    fn init(&mut self);

    /// Mix key material in; may be called more than once to layer keys.
    fn load_key(&mut self, key: &[u8]);

    /// Fill `out` with the next keystream bytes.
    fn generate(&mut self, out: &mut [u8]);

    fn discard(&mut self, n: usize) {
        let mut scratch = [0u8; 64];
        let mut left = n;
        while left > 0 {
            let take = left.min(scratch.len());
            self.generate(&mut scratch[..take]);
            left -= take;
        }
    }

    /// Preferred key length in bytes.
    fn key_size(&self) -> usize;

    fn block_size(&self) -> usize;
}

pub const CIPHER_NAMES: &[&str] = &["ARCFOUR", "CHACHA20"];

pub fn by_name(name: &str) -> Option<Box<dyn StreamCipher>> {
    match name {
        "ARCFOUR" => Some(Box::new(Arcfour::new())),
        "CHACHA20" => Some(Box::new(ChaCha20::new())),
        _ => None,
    }
}

/// Keystream XOR in place, a convenience for the one-time-pad layers.
pub fn xor_stream(sc: &mut dyn StreamCipher, data: &mut [u8]) {
    let mut ks = vec![0u8; data.len()];
    sc.generate(&mut ks);
    for (d, k) in data.iter_mut().zip(ks.iter()) {
        *d ^= k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_lookup() {
        assert!(by_name("CHACHA20").is_some());
        assert!(by_name("ARCFOUR").is_some());
        assert!(by_name("XTEA").is_none());
        for name in CIPHER_NAMES {
            assert!(by_name(name).is_some());
        }
    }

    #[test]
    fn xor_stream_roundtrips() {
        let mut data = b"some plaintext bytes".to_vec();
        let orig = data.clone();

        let mut c = by_name("CHACHA20").unwrap();
        c.load_key(b"pad key");
        xor_stream(c.as_mut(), &mut data);
        assert_ne!(data, orig);

        let mut c = by_name("CHACHA20").unwrap();
        c.load_key(b"pad key");
        xor_stream(c.as_mut(), &mut data);
        assert_eq!(data, orig);
    }
}
