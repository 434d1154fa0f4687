//! ChaCha20 keystream generator.
//!
//! There is no separate nonce input: the nonce words are treated as extra
//! key material, giving a 40-byte key. Loading a key XOR-folds the bytes
//! into the key area cyclically, so the key can be fed in several chunks
//! (the symmetric container and the signature-leaf generators rely on
//! that).

use byteorder::{ByteOrder, LittleEndian};

use crate::cipher::StreamCipher;

const SIGMA: &[u8; 16] = b"expand 32-byte k";
const KEY_BYTES: usize = 40;

pub struct ChaCha20 {
    key: [u8; KEY_BYTES],
    counter: [u32; 2],
    block: [u8; 64],
    blockpos: usize,
}

impl Default for ChaCha20 {
    fn default() -> Self {
        ChaCha20::new()
    }
}

impl ChaCha20 {
    pub fn new() -> ChaCha20 {
        ChaCha20 {
            key: [0; KEY_BYTES],
            counter: [0; 2],
            block: [0; 64],
            blockpos: 64,
        }
    }

    fn next_block(&mut self, out: &mut [u8; 64]) {
        let mut j = [0u32; 16];
        for i in 0..4 {
            j[i] = LittleEndian::read_u32(&SIGMA[4 * i..]);
        }
        for i in 0..8 {
            j[4 + i] = LittleEndian::read_u32(&self.key[4 * i..]);
        }
        j[12] = self.counter[0];
        j[13] = self.counter[1];
        j[14] = LittleEndian::read_u32(&self.key[32..]);
        j[15] = LittleEndian::read_u32(&self.key[36..]);

        let mut x = j;

        macro_rules! qtr {
            ($a:expr, $b:expr, $c:expr, $d:expr) => {
                x[$a] = x[$a].wrapping_add(x[$b]);
                x[$d] = (x[$d] ^ x[$a]).rotate_left(16);
                x[$c] = x[$c].wrapping_add(x[$d]);
                x[$b] = (x[$b] ^ x[$c]).rotate_left(12);
                x[$a] = x[$a].wrapping_add(x[$b]);
                x[$d] = (x[$d] ^ x[$a]).rotate_left(8);
                x[$c] = x[$c].wrapping_add(x[$d]);
                x[$b] = (x[$b] ^ x[$c]).rotate_left(7);
            };
        }

        for _ in 0..10 {
            qtr!(0, 4, 8, 12);
            qtr!(1, 5, 9, 13);
            qtr!(2, 6, 10, 14);
            qtr!(3, 7, 11, 15);
            qtr!(0, 5, 10, 15);
            qtr!(1, 6, 11, 12);
            qtr!(2, 7, 8, 13);
            qtr!(3, 4, 9, 14);
        }

        for i in 0..16 {
            LittleEndian::write_u32(&mut out[4 * i..4 * i + 4], x[i].wrapping_add(j[i]));
        }

        self.counter[0] = self.counter[0].wrapping_add(1);
        if self.counter[0] == 0 {
            self.counter[1] = self.counter[1].wrapping_add(1);
        }
    }
}

impl StreamCipher for ChaCha20 {
    fn init(&mut self) {
        self.key = [0; KEY_BYTES];
        self.counter = [0; 2];
        self.blockpos = 64;
    }

    fn load_key(&mut self, key: &[u8]) {
        if key.is_empty() {
            return;
        }
        // xor the whole input in, cycling over the 40-byte key area, then
        // keep cycling the input until the area is covered at least once
        let mut kp = 0;
        for &b in key {
            self.key[kp] ^= b;
            kp = (kp + 1) % KEY_BYTES;
        }
        let mut src = key.iter().cycle();
        while kp != 0 && kp < KEY_BYTES {
            self.key[kp] ^= src.next().copied().unwrap_or(0);
            kp += 1;
        }
    }

    fn generate(&mut self, out: &mut [u8]) {
        let mut n = 0;
        while n < out.len() {
            if self.blockpos >= 64 {
                let mut b = [0u8; 64];
                self.next_block(&mut b);
                self.block = b;
                self.blockpos = 0;
            }
            let take = (out.len() - n).min(64 - self.blockpos);
            out[n..n + take]
                .copy_from_slice(&self.block[self.blockpos..self.blockpos + take]);
            self.blockpos += take;
            n += take;
        }
    }

    fn key_size(&self) -> usize {
        KEY_BYTES
    }

    fn block_size(&self) -> usize {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_stream() {
        let mut a = ChaCha20::new();
        a.load_key(b"test key");
        let mut b = ChaCha20::new();
        b.load_key(b"test key");

        let mut s1 = [0u8; 100];
        let mut s2 = [0u8; 100];
        a.generate(&mut s1);
        b.generate(&mut s2);
        assert_eq!(s1, s2);
    }

    #[test]
    fn chunked_generation_matches() {
        let mut a = ChaCha20::new();
        a.load_key(b"k");
        let mut b = ChaCha20::new();
        b.load_key(b"k");

        let mut whole = [0u8; 200];
        a.generate(&mut whole);

        let mut pieces = Vec::new();
        for chunk in [3usize, 61, 64, 72] {
            let mut buf = vec![0u8; chunk];
            b.generate(&mut buf);
            pieces.extend_from_slice(&buf);
        }
        assert_eq!(&whole[..], &pieces[..]);
    }

    #[test]
    fn different_keys_differ() {
        let mut a = ChaCha20::new();
        a.load_key(b"aaaa");
        let mut b = ChaCha20::new();
        b.load_key(b"aaab");
        let mut s1 = [0u8; 32];
        let mut s2 = [0u8; 32];
        a.generate(&mut s1);
        b.generate(&mut s2);
        assert_ne!(s1, s2);
    }

    #[test]
    fn multi_part_key_loading() {
        let mut a = ChaCha20::new();
        a.load_key(&[1u8; 40]);
        a.load_key(&[2u8; 40]);
        let mut b = ChaCha20::new();
        b.load_key(&[3u8; 40]);
        let mut s1 = [0u8; 16];
        let mut s2 = [0u8; 16];
        a.generate(&mut s1);
        b.generate(&mut s2);
        assert_eq!(s1, s2);
    }
}
