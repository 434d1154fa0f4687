//! CubeHash 16+16/32+32 with selectable output size.

use byteorder::{ByteOrder, LittleEndian};

use crate::digest::{HashFunction, HashProc};

const INIT_ROUNDS: usize = 16;
const ROUNDS: usize = 16;
const BLOCK: usize = 32;
const FINAL_ROUNDS: usize = 32;

#[derive(Clone)]
struct State {
    x: [u32; 32],
}

impl State {
    fn new(hbytes: usize) -> State {
        let mut s = State { x: [0; 32] };
        s.x[0] = hbytes as u32;
        s.x[1] = BLOCK as u32;
        s.x[2] = ROUNDS as u32;
        s.rounds(INIT_ROUNDS);
        s
    }

    fn rounds(&mut self, n: usize) {
        let x = &mut self.x;
        for _ in 0..n {
            let mut t = [0u32; 16];
            for i in 0..16 {
                x[i + 16] = x[i + 16].wrapping_add(x[i]);
            }
            for i in 0..16 {
                t[i ^ 8] = x[i];
            }
            for i in 0..16 {
                x[i] = t[i].rotate_left(7);
            }
            for i in 0..16 {
                x[i] ^= x[i + 16];
            }
            for i in 0..16 {
                t[i ^ 2] = x[i + 16];
            }
            for i in 0..16 {
                x[i + 16] = t[i];
            }
            for i in 0..16 {
                x[i + 16] = x[i + 16].wrapping_add(x[i]);
            }
            for i in 0..16 {
                t[i ^ 4] = x[i];
            }
            for i in 0..16 {
                x[i] = t[i].rotate_left(11);
            }
            for i in 0..16 {
                x[i] ^= x[i + 16];
            }
            for i in 0..16 {
                t[i ^ 1] = x[i + 16];
            }
            for i in 0..16 {
                x[i + 16] = t[i];
            }
        }
    }

    fn process_block(&mut self, data: &[u8]) {
        debug_assert_eq!(data.len(), BLOCK);
        for i in 0..BLOCK / 4 {
            self.x[i] ^= LittleEndian::read_u32(&data[4 * i..]);
        }
        self.rounds(ROUNDS);
    }

    fn finish(&mut self, tail: &[u8], hbytes: usize) -> Vec<u8> {
        debug_assert!(tail.len() < BLOCK);
        let mut last = [0u8; BLOCK];
        last[..tail.len()].copy_from_slice(tail);
        last[tail.len()] = 0x80;
        for i in 0..BLOCK / 4 {
            self.x[i] ^= LittleEndian::read_u32(&last[4 * i..]);
        }
        self.rounds(ROUNDS);

        self.x[31] ^= 1;
        self.rounds(FINAL_ROUNDS);

        let mut out = vec![0u8; hbytes];
        for (i, o) in out.iter_mut().enumerate() {
            *o = ((self.x[i / 4] >> ((i % 4) * 8)) & 0xff) as u8;
        }
        out
    }
}

/// One-shot CubeHash with an `hbytes`-byte digest.
#[derive(Clone)]
pub struct CubeHash {
    hbytes: usize,
    iv: [u32; 32],
}

impl CubeHash {
    pub fn new(hbytes: usize) -> CubeHash {
        debug_assert!(hbytes <= 64);
        CubeHash {
            hbytes,
            iv: State::new(hbytes).x,
        }
    }
}

impl HashFunction for CubeHash {
    fn size(&self) -> usize {
        self.hbytes
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        let mut st = State { x: self.iv };
        let mut chunks = data.chunks_exact(BLOCK);
        for block in &mut chunks {
            st.process_block(block);
        }
        st.finish(chunks.remainder(), self.hbytes)
    }
}

/// Incremental variant for the symmetric container's block digests.
pub struct CubeHashProc {
    hbytes: usize,
    iv: [u32; 32],
    state: State,
    buf: [u8; BLOCK],
    bpos: usize,
}

impl CubeHashProc {
    pub fn new(hbytes: usize) -> CubeHashProc {
        let st = State::new(hbytes);
        CubeHashProc {
            hbytes,
            iv: st.x,
            state: st,
            buf: [0; BLOCK],
            bpos: 0,
        }
    }
}

impl HashProc for CubeHashProc {
    fn size(&self) -> usize {
        self.hbytes
    }

    fn init(&mut self) {
        self.state = State { x: self.iv };
        self.bpos = 0;
    }

    fn eat(&mut self, mut data: &[u8]) {
        if self.bpos > 0 {
            let take = data.len().min(BLOCK - self.bpos);
            self.buf[self.bpos..self.bpos + take].copy_from_slice(&data[..take]);
            self.bpos += take;
            data = &data[take..];
            if self.bpos == BLOCK {
                let buf = self.buf;
                self.state.process_block(&buf);
                self.bpos = 0;
            }
        }
        let mut chunks = data.chunks_exact(BLOCK);
        for block in &mut chunks {
            self.state.process_block(block);
        }
        let rem = chunks.remainder();
        self.buf[..rem.len()].copy_from_slice(rem);
        self.bpos = rem.len();
    }

    fn finish(&mut self) -> Vec<u8> {
        let buf = self.buf;
        let out = self.state.finish(&buf[..self.bpos], self.hbytes);
        self.init();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_sizes() {
        for h in [16usize, 24, 32, 48, 64] {
            let hf = CubeHash::new(h);
            assert_eq!(hf.hash(b"abc").len(), h);
        }
    }

    #[test]
    fn deterministic_and_sensitive() {
        let hf = CubeHash::new(32);
        assert_eq!(hf.hash(b"hello"), hf.hash(b"hello"));
        assert_ne!(hf.hash(b"hello"), hf.hash(b"hellp"));
        assert_ne!(hf.hash(b""), hf.hash(b"\x00"));
    }

    #[test]
    fn block_boundaries() {
        let hf = CubeHash::new(32);
        // inputs around the 32-byte block size must all be distinct
        let a = hf.hash(&[7u8; 31]);
        let b = hf.hash(&[7u8; 32]);
        let c = hf.hash(&[7u8; 33]);
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn incremental_matches_oneshot() {
        let hf = CubeHash::new(32);
        let data: Vec<u8> = (0..100u8).collect();

        let mut hp = CubeHashProc::new(32);
        hp.init();
        hp.eat(&data[..10]);
        hp.eat(&data[10..50]);
        hp.eat(&data[50..]);
        assert_eq!(hp.finish(), hf.hash(&data));

        // and the proc is reusable after finish
        hp.eat(&data);
        assert_eq!(hp.finish(), hf.hash(&data));
    }
}
