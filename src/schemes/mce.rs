//! Classical McEliece over binary Goppa codes.
//!
//! The private half keeps the scrambler inverse, the permutation inverse,
//! the Goppa polynomial and the column permutation that made the generator
//! systematic; the check matrix and the square-root companion matrix are
//! derived on `prepare()` and never serialized.

use crate::codes::goppa;
use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::gf2m::Gf2m;
use crate::math::matrix::Matrix;
use crate::math::perm::Permutation;
use crate::math::poly::Poly;
use crate::rng::Prng;
use crate::sencode::Sencode;

const PUB_IDENT: &[u8] = b"CCR-PUBLIC-KEY-MCE";
const PRIV_IDENT: &[u8] = b"CCR-PRIVATE-KEY-MCE";

pub struct PrivKey {
    pub s_inv: Matrix,
    pub p_inv: Permutation,
    pub g: Poly,
    pub h_perm: Permutation,
    pub fld: Gf2m,

    // derived, filled by prepare()
    h: Matrix,
    sq_inv: Vec<Poly>,
    h_perm_inv: Permutation,
}

pub struct PubKey {
    pub g_mat: Matrix,
    pub t: u32,
}

pub fn generate(m: u32, t: u32, rng: &mut dyn Prng) -> Result<(PubKey, PrivKey)> {
    let fld = Gf2m::create(m)?;
    let g = Poly::generate_random_irreducible(t as usize, &fld, rng);
    let h = g.compute_goppa_check_matrix(&fld);

    // systematic generator; singular right squares are expected, retry
    // with fresh permutations within the usual budget
    let mut attempt = 0u32;
    let (generator, h_perm) = loop {
        match h.goppa_generator_random(rng) {
            Ok(r) => break r,
            Err(_) => {
                attempt += 1;
                if attempt >= 1 << m {
                    return Err(Error::Crypto("generator construction failed"));
                }
            }
        }
    };

    let k = generator.height();
    let (s, s_inv) = Matrix::random_with_inversion(k, rng);

    let p = Permutation::random(generator.width(), rng);
    let p_inv = p.inversion();

    let sg = s.mult(&generator);
    let g_mat = p.permute_cols(&sg);

    let mut priv_key = PrivKey {
        s_inv,
        p_inv,
        g,
        h_perm,
        fld,
        h: Matrix::new(),
        sq_inv: Vec::new(),
        h_perm_inv: Permutation::identity(0),
    };
    priv_key.prepare()?;

    Ok((PubKey { g_mat, t }, priv_key))
}

impl PubKey {
    pub fn cipher_size(&self) -> usize {
        self.g_mat.width()
    }

    pub fn plain_size(&self) -> usize {
        self.g_mat.height()
    }

    pub fn error_count(&self) -> usize {
        self.t as usize
    }

    pub fn encrypt(&self, plain: &BitVec, rng: &mut dyn Prng) -> Result<BitVec> {
        let errors = random_error_vector(self.cipher_size(), self.error_count(), rng);
        self.encrypt_with_errors(plain, &errors)
    }

    pub fn encrypt_with_errors(&self, plain: &BitVec, errors: &BitVec) -> Result<BitVec> {
        if plain.size() != self.plain_size() || errors.size() != self.cipher_size() {
            return Err(Error::BadInput("wrong vector size"));
        }
        let mut out = self.g_mat.mult_vec_left(plain)?;
        out.add(errors);
        Ok(out)
    }

    /// Signature check: the decoded word re-encodes to within t+delta
    /// errors of the hash.
    pub fn verify(&self, sig: &BitVec, hash: &BitVec, delta: usize) -> Result<()> {
        let mut tmp = self.g_mat.mult_vec_left(sig)?;
        if hash.size() != tmp.size() {
            return Err(Error::Crypto("verification failed"));
        }
        tmp.add(hash);
        if tmp.hamming_weight() > self.t as usize + delta {
            return Err(Error::Crypto("verification failed"));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PUB_IDENT),
            Sencode::Int(self.t),
            self.g_mat.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PubKey> {
        let items = s.as_list_of(3)?;
        if items[0].as_bytes()? != PUB_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        Ok(PubKey {
            t: items[1].as_int()?,
            g_mat: Matrix::unserialize(&items[2])?,
        })
    }
}

impl PrivKey {
    pub fn prepare(&mut self) -> Result<()> {
        self.h = self.g.compute_goppa_check_matrix(&self.fld);
        self.sq_inv = self.g.compute_square_root_matrix(&self.fld)?;
        self.h_perm_inv = self.h_perm.inversion();
        Ok(())
    }

    pub fn cipher_size(&self) -> usize {
        self.p_inv.len()
    }

    pub fn plain_size(&self) -> usize {
        self.s_inv.width()
    }

    pub fn error_count(&self) -> usize {
        self.g.degree().max(0) as usize
    }

    pub fn decrypt(&self, cipher: &BitVec) -> Result<BitVec> {
        Ok(self.decrypt_with_errors(cipher)?.0)
    }

    /// Returns the plaintext together with the error vector that was
    /// removed (the FO wrapper checks it against the derived one).
    pub fn decrypt_with_errors(&self, cipher: &BitVec) -> Result<(BitVec, BitVec)> {
        if cipher.size() != self.cipher_size() {
            return Err(Error::BadInput("wrong vector size"));
        }

        // peel the public permutation, then the systematic-form column
        // permutation, leaving a codeword of the raw goppa code
        let not_permuted = self.p_inv.permute_bits(cipher);
        let mut canonical = self.h_perm_inv.permute_bits(&not_permuted);

        let syndrome = self.h.mult_vec_right(&canonical)?;
        let synd = syndrome.to_poly(&self.fld)?;
        let loc = goppa::goppa_error_locator(&synd, &self.fld, &self.g, &self.sq_inv);
        let ev = goppa::evaluate_error_locator_trace(&loc, &self.fld)?;

        canonical.add(&ev);

        // back to systematic order, strip redundancy, unscramble
        let mut systematic = self.h_perm.permute_bits(&canonical);
        let errors = self.h_perm.permute_bits(&ev);
        systematic.resize(self.plain_size(), false);
        let out = self.s_inv.mult_vec_left(&systematic)?;
        Ok((out, errors))
    }

    /// Decode a delta-perturbed hash as if it were a corrupted codeword;
    /// each attempt flips a fresh random error pattern into the syndrome.
    pub fn sign(
        &self,
        hash: &BitVec,
        delta: usize,
        attempts: usize,
        rng: &mut dyn Prng,
    ) -> Result<BitVec> {
        let s = self.cipher_size();
        if hash.size() != s {
            return Err(Error::BadInput("wrong hash size"));
        }

        let not_permuted = self.p_inv.permute_bits(hash);
        let p = self.h_perm_inv.permute_bits(&not_permuted);

        let synd_orig = self.h.mult_vec_right(&p)?;

        let mut e = BitVec::with_size(s);
        let mut epos = vec![0usize; delta];

        for _ in 0..attempts {
            let mut synd = synd_orig.clone();

            for ep in epos.iter_mut() {
                *ep = rng.random(s as u32) as usize;
                // error bit collisions are harmless, leave them be
                if !e.get(*ep) {
                    synd.add(self.h.col(*ep));
                }
                e.set(*ep, true);
            }

            let synd_poly = synd.to_poly(&self.fld)?;
            let loc = goppa::goppa_error_locator(&synd_poly, &self.fld, &self.g, &self.sq_inv);

            if let Ok(ev) = goppa::evaluate_error_locator_trace(&loc, &self.fld) {
                let mut word = p.clone();
                word.add(&e);
                word.add(&ev);

                // accept only actual codewords; the locator can split
                // without decoding anything useful
                if self.h.mult_vec_right(&word)?.is_zero() {
                    let mut systematic = self.h_perm.permute_bits(&word);
                    systematic.resize(self.plain_size(), false);
                    return self.s_inv.mult_vec_left(&systematic);
                }
            }

            for &ep in &epos {
                e.set(ep, false);
            }
        }
        Err(Error::Crypto("signing failed"))
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PRIV_IDENT),
            self.fld.serialize(),
            self.g.serialize(),
            self.s_inv.serialize(),
            self.p_inv.serialize(),
            self.h_perm.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PrivKey> {
        let items = s.as_list_of(6)?;
        if items[0].as_bytes()? != PRIV_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        let mut k = PrivKey {
            fld: Gf2m::unserialize(&items[1])?,
            g: Poly::unserialize(&items[2])?,
            s_inv: Matrix::unserialize(&items[3])?,
            p_inv: Permutation::unserialize(&items[4])?,
            h_perm: Permutation::unserialize(&items[5])?,
            h: Matrix::new(),
            sq_inv: Vec::new(),
            h_perm_inv: Permutation::identity(0),
        };
        k.prepare()?;
        Ok(k)
    }
}

/// Fresh random vector of exactly `t` set bits.
pub fn random_error_vector(size: usize, t: usize, rng: &mut dyn Prng) -> BitVec {
    let mut e = BitVec::with_size(size);
    let mut left = t;
    while left > 0 {
        let p = rng.random(size as u32) as usize;
        if !e.get(p) {
            e.set(p, true);
            left -= 1;
        }
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    #[test]
    fn keygen_encrypt_decrypt_roundtrip() {
        let mut rng = TestRng::new(100);
        let (pub_key, priv_key) = generate(5, 2, &mut rng).unwrap();

        assert_eq!(pub_key.cipher_size(), 32);
        assert_eq!(pub_key.plain_size(), 32 - 5 * 2);
        assert_eq!(priv_key.cipher_size(), pub_key.cipher_size());
        assert_eq!(priv_key.plain_size(), pub_key.plain_size());

        for round in 0..20 {
            let mut plain = BitVec::with_size(pub_key.plain_size());
            for i in 0..plain.size() {
                plain.set(i, rng.random(2) == 1);
            }
            let cipher = pub_key.encrypt(&plain, &mut rng).unwrap();
            let (dec, errors) = priv_key.decrypt_with_errors(&cipher).unwrap();
            assert_eq!(dec, plain, "round {round}");
            assert_eq!(errors.hamming_weight(), 2);
        }
    }

    #[test]
    fn decrypt_after_serialization_roundtrip() {
        let mut rng = TestRng::new(7);
        let (pub_key, priv_key) = generate(5, 2, &mut rng).unwrap();

        let pk2 = PubKey::unserialize(&pub_key.serialize()).unwrap();
        let sk2 = PrivKey::unserialize(&priv_key.serialize()).unwrap();

        let mut plain = BitVec::with_size(pub_key.plain_size());
        plain.set(1, true);
        plain.set(7, true);
        let cipher = pk2.encrypt(&plain, &mut rng).unwrap();
        assert_eq!(sk2.decrypt(&cipher).unwrap(), plain);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let mut rng = TestRng::new(19);
        let (pub_key, priv_key) = generate(5, 2, &mut rng).unwrap();

        let mut hash = BitVec::with_size(pub_key.cipher_size());
        for i in 0..hash.size() {
            hash.set(i, rng.random(2) == 1);
        }

        // plenty of attempts; decoding a random word succeeds rarely per
        // try but reliably over the budget
        let delta = 3;
        let sig = priv_key.sign(&hash, delta, 10000, &mut rng).unwrap();
        pub_key.verify(&sig, &hash, delta).unwrap();

        // a different hash must not verify
        let mut other = hash.clone();
        other.flip(0);
        other.flip(1);
        other.flip(2);
        other.flip(3);
        other.flip(4);
        other.flip(5);
        other.flip(6);
        assert!(pub_key.verify(&sig, &other, 0).is_err());
    }

    #[test]
    fn wrong_sizes_are_rejected() {
        let mut rng = TestRng::new(3);
        let (pub_key, priv_key) = generate(5, 2, &mut rng).unwrap();
        let small = BitVec::with_size(3);
        assert!(pub_key.encrypt(&small, &mut rng).is_err());
        assert!(priv_key.decrypt(&small).is_err());
    }
}
