//! Quasi-cyclic MDPC McEliece (Misoczki-Tillich-Sendrier-Barreto) with
//! probabilistic bit-flipping decoding.
//!
//! Circulant blocks live as single rows: the private H keeps first
//! columns, the public G first rows of the non-identity part. Block
//! inversion happens in GF(2)[x] modulo x^bs - 1, where circulant algebra
//! turns into polynomial algebra.

use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::matrix::Matrix;
use crate::rng::Prng;
use crate::sencode::Sencode;

const PUB_IDENT: &[u8] = b"CCR-PUBLIC-KEY-QCMDPC-MCE";
const PRIV_IDENT: &[u8] = b"CCR-PRIVATE-KEY-QCMDPC-MCE";

pub struct PrivKey {
    /// First columns of the cyclic H blocks.
    pub h: Matrix,
    pub t: u32,
    pub rounds: u32,
    pub delta: u32,
}

pub struct PubKey {
    /// First rows of the right-side G blocks.
    pub g: Matrix,
    pub t: u32,
}

/// Cyclic product a*b mod x^bs - 1, both inputs bs-sized.
fn cyclic_mult(a: &BitVec, b: &BitVec) -> BitVec {
    let bs = a.size();
    let mut r = BitVec::with_size(bs);
    for i in 0..bs {
        if a.get(i) {
            r.rot_add(b, i);
        }
    }
    r
}

/// Random weight-wi polynomial of bs bits.
fn random_sparse(bs: usize, wi: usize, rng: &mut dyn Prng) -> BitVec {
    let mut v = BitVec::with_size(bs);
    let mut left = wi;
    while left > 0 {
        let pos = rng.random(bs as u32) as usize;
        if !v.get(pos) {
            v.set(pos, true);
            left -= 1;
        }
    }
    v
}

pub fn generate(
    block_size: usize,
    block_count: usize,
    wi: usize,
    t: u32,
    rounds: u32,
    delta: u32,
    rng: &mut dyn Prng,
) -> Result<(PubKey, PrivKey)> {
    if wi > block_size / 2 {
        return Err(Error::BadInput("block weight too large"));
    }
    if block_count < 2 {
        return Err(Error::BadInput("at least two blocks needed"));
    }

    // x^bs - 1; a circulant block is invertible iff its row polynomial is
    // coprime to it
    let mut modulus = BitVec::with_size(block_size + 1);
    modulus.set(0, true);
    modulus.set(block_size, true);

    let mut h = Matrix::with_size(block_count, block_size);

    // rightmost block must be invertible, retry until it is
    let last_inv = loop {
        let g = random_sparse(block_size, wi, rng);

        let (gcd, s, _) = g.ext_gcd(&modulus);
        if !gcd.is_one() {
            continue;
        }

        // store the block column-wise (reversed row)
        let col = h.col_mut(block_count - 1);
        for i in 0..block_size {
            if g.get(i) {
                col.set((block_size - i) % block_size, true);
            }
        }

        let mut inv = s;
        inv.resize(block_size, false);
        break inv;
    };

    // remaining blocks are free; G right-side blocks follow directly
    let mut g_pub = Matrix::with_size(block_count - 1, block_size);
    for b in 0..block_count - 1 {
        let hi = random_sparse(block_size, wi, rng);

        let col = h.col_mut(b);
        for i in 0..block_size {
            if hi.get(i) {
                col.set((block_size - i) % block_size, true);
            }
        }

        // G block = H_last^-1 * H_b
        let gi = cyclic_mult(&hi, &last_inv);
        *g_pub.col_mut(b) = gi;
    }

    Ok((
        PubKey { g: g_pub, t },
        PrivKey {
            h,
            t,
            rounds,
            delta,
        },
    ))
}

impl PubKey {
    pub fn plain_size(&self) -> usize {
        self.g.height() * self.g.width()
    }

    pub fn cipher_size(&self) -> usize {
        self.g.height() * (self.g.width() + 1)
    }

    pub fn error_count(&self) -> usize {
        self.t as usize
    }

    pub fn encrypt(&self, plain: &BitVec, rng: &mut dyn Prng) -> Result<BitVec> {
        let errors =
            super::mce::random_error_vector(self.cipher_size(), self.error_count(), rng);
        self.encrypt_with_errors(plain, &errors)
    }

    pub fn encrypt_with_errors(&self, plain: &BitVec, errors: &BitVec) -> Result<BitVec> {
        let ps = self.plain_size();
        if plain.size() != ps || errors.size() != self.cipher_size() {
            return Err(Error::BadInput("wrong vector size"));
        }
        let bs = self.g.height();

        // row i of a circulant block is its first row rotated right by i
        let mut bcheck = BitVec::with_size(bs);
        for i in 0..ps {
            if plain.get(i) {
                bcheck.rot_add(self.g.col(i / bs), i % bs);
            }
        }

        let mut out = plain.clone();
        out.append(&bcheck);
        out.add(errors);
        Ok(out)
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PUB_IDENT),
            Sencode::Int(self.t),
            self.g.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PubKey> {
        let items = s.as_list_of(3)?;
        if items[0].as_bytes()? != PUB_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        Ok(PubKey {
            t: items[1].as_int()?,
            g: Matrix::unserialize(&items[2])?,
        })
    }
}

impl PrivKey {
    pub fn plain_size(&self) -> usize {
        self.h.height() * (self.h.width() - 1)
    }

    pub fn cipher_size(&self) -> usize {
        self.h.height() * self.h.width()
    }

    pub fn error_count(&self) -> usize {
        self.t as usize
    }

    pub fn decrypt(&self, cipher: &BitVec) -> Result<BitVec> {
        Ok(self.decrypt_with_errors(cipher)?.0)
    }

    /// Bit-flipping: per round, count unsatisfied parity checks per bit
    /// and flip everything within delta of the worst offender. Converged
    /// means zero syndrome; running out of rounds is a decoding failure.
    pub fn decrypt_with_errors(&self, cipher: &BitVec) -> Result<(BitVec, BitVec)> {
        let cs = self.cipher_size();
        if cipher.size() != cs {
            return Err(Error::BadInput("wrong vector size"));
        }
        let bs = self.h.height();

        let mut word = cipher.clone();

        let mut syndrome = BitVec::with_size(bs);
        for i in 0..cs {
            if word.get(i) {
                syndrome.rot_add(self.h.col(i / bs), (cs - i) % bs);
            }
        }

        let mut converged = syndrome.is_zero();
        let mut unsat = vec![0usize; cs];
        let mut tmp = BitVec::with_size(bs);

        for _ in 0..self.rounds {
            if converged {
                break;
            }

            let mut max_unsat = 0usize;
            for (bit, u) in unsat.iter_mut().enumerate() {
                tmp.zero_out();
                tmp.rot_add(self.h.col(bit / bs), (cs - bit) % bs);
                *u = tmp.and_hamming_weight(&syndrome);
                if *u > max_unsat {
                    max_unsat = *u;
                }
            }

            if max_unsat == 0 {
                break;
            }

            let threshold = max_unsat.saturating_sub(self.delta as usize);
            for bit in 0..cs {
                if unsat[bit] > threshold {
                    word.flip(bit);
                    syndrome.rot_add(self.h.col(bit / bs), (cs - bit) % bs);
                }
            }

            converged = syndrome.is_zero();
        }

        if !converged {
            return Err(Error::Crypto("decoding failed"));
        }

        let mut errors = cipher.clone();
        errors.add(&word);
        let mut out = word;
        out.resize(self.plain_size(), false);
        Ok((out, errors))
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PRIV_IDENT),
            Sencode::Int(self.t),
            Sencode::Int(self.rounds),
            Sencode::Int(self.delta),
            self.h.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PrivKey> {
        let items = s.as_list_of(5)?;
        if items[0].as_bytes()? != PRIV_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        Ok(PrivKey {
            t: items[1].as_int()?,
            rounds: items[2].as_int()?,
            delta: items[3].as_int()?,
            h: Matrix::unserialize(&items[4])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    #[test]
    fn keygen_encrypt_decrypt_roundtrip() {
        let mut rng = TestRng::new(70);
        let (pub_key, priv_key) = generate(301, 2, 9, 4, 40, 2, &mut rng).unwrap();

        assert_eq!(pub_key.plain_size(), 301);
        assert_eq!(pub_key.cipher_size(), 602);

        for _ in 0..10 {
            let mut plain = BitVec::with_size(pub_key.plain_size());
            for i in 0..plain.size() {
                plain.set(i, rng.random(2) == 1);
            }
            let cipher = pub_key.encrypt(&plain, &mut rng).unwrap();
            let (dec, errors) = priv_key.decrypt_with_errors(&cipher).unwrap();
            assert_eq!(dec, plain);
            assert_eq!(errors.hamming_weight(), 4);
        }
    }

    #[test]
    fn codeword_without_errors_decodes_instantly() {
        let mut rng = TestRng::new(71);
        let (pub_key, priv_key) = generate(301, 2, 9, 4, 40, 2, &mut rng).unwrap();

        let mut plain = BitVec::with_size(pub_key.plain_size());
        plain.set(100, true);
        let zero_errors = BitVec::with_size(pub_key.cipher_size());
        let cipher = pub_key.encrypt_with_errors(&plain, &zero_errors).unwrap();
        assert_eq!(priv_key.decrypt(&cipher).unwrap(), plain);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = TestRng::new(72);
        let (pub_key, priv_key) = generate(301, 2, 9, 4, 40, 2, &mut rng).unwrap();

        let pk = PubKey::unserialize(&pub_key.serialize()).unwrap();
        let sk = PrivKey::unserialize(&priv_key.serialize()).unwrap();
        assert_eq!(pk.t, 4);
        assert_eq!(sk.rounds, 40);

        let mut plain = BitVec::with_size(pk.plain_size());
        plain.set(3, true);
        plain.set(250, true);
        let cipher = pk.encrypt(&plain, &mut rng).unwrap();
        assert_eq!(sk.decrypt(&cipher).unwrap(), plain);
    }
}
