//! Classical Niederreiter: the dual view of McEliece. Plaintexts are
//! constant-weight vectors (colex-encoded by the callers), ciphertexts are
//! syndromes of the scrambled check matrix.

use crate::codes::goppa;
use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::gf2m::Gf2m;
use crate::math::matrix::Matrix;
use crate::math::perm::Permutation;
use crate::math::poly::Poly;
use crate::rng::Prng;
use crate::sencode::Sencode;

const PUB_IDENT: &[u8] = b"CCR-PUBLIC-KEY-ND";
const PRIV_IDENT: &[u8] = b"CCR-PRIVATE-KEY-ND";

pub struct PrivKey {
    pub s_inv: Matrix,
    pub p_inv: Permutation,
    pub g: Poly,
    pub fld: Gf2m,

    sq_inv: Vec<Poly>,
}

pub struct PubKey {
    pub h_mat: Matrix,
    pub t: u32,
}

pub fn generate(m: u32, t: u32, rng: &mut dyn Prng) -> Result<(PubKey, PrivKey)> {
    let fld = Gf2m::create(m)?;
    let g = Poly::generate_random_irreducible(t as usize, &fld, rng);
    let h = g.compute_goppa_check_matrix(&fld);

    let (s, s_inv) = Matrix::random_with_inversion(h.height(), rng);

    // the permutation inverts itself when carrying S*H over to the pubkey
    let p_inv = Permutation::random(h.width(), rng);

    let sh = s.mult(&h);
    let h_mat = p_inv.permute_cols(&sh);

    let mut priv_key = PrivKey {
        s_inv,
        p_inv,
        g,
        fld,
        sq_inv: Vec::new(),
    };
    priv_key.prepare()?;

    Ok((PubKey { h_mat, t }, priv_key))
}

impl PubKey {
    pub fn cipher_size(&self) -> usize {
        self.h_mat.height()
    }

    pub fn plain_size(&self) -> usize {
        self.h_mat.width()
    }

    pub fn plain_weight(&self) -> usize {
        self.t as usize
    }

    pub fn encrypt(&self, plain: &BitVec) -> Result<BitVec> {
        if plain.size() != self.plain_size() {
            return Err(Error::BadInput("wrong vector size"));
        }
        self.h_mat.mult_vec_right(plain)
    }

    /// The signature decodes back to something whose syndrome differs from
    /// the hash in at most delta positions.
    pub fn verify(&self, sig: &BitVec, hash: &BitVec, delta: usize) -> Result<()> {
        let mut tmp = self.h_mat.mult_vec_right(sig)?;
        if hash.size() != tmp.size() {
            return Err(Error::Crypto("verification failed"));
        }
        tmp.add(hash);
        if tmp.hamming_weight() > delta {
            return Err(Error::Crypto("verification failed"));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PUB_IDENT),
            Sencode::Int(self.t),
            self.h_mat.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PubKey> {
        let items = s.as_list_of(3)?;
        if items[0].as_bytes()? != PUB_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        Ok(PubKey {
            t: items[1].as_int()?,
            h_mat: Matrix::unserialize(&items[2])?,
        })
    }
}

impl PrivKey {
    pub fn prepare(&mut self) -> Result<()> {
        self.sq_inv = self.g.compute_square_root_matrix(&self.fld)?;
        Ok(())
    }

    pub fn cipher_size(&self) -> usize {
        self.s_inv.width()
    }

    pub fn plain_size(&self) -> usize {
        self.p_inv.len()
    }

    pub fn plain_weight(&self) -> usize {
        self.g.degree().max(0) as usize
    }

    pub fn decrypt(&self, cipher: &BitVec) -> Result<BitVec> {
        if cipher.size() != self.cipher_size() {
            return Err(Error::BadInput("wrong vector size"));
        }

        let unscrambled = self.s_inv.mult_vec_right(cipher)?;
        let synd = unscrambled.to_poly(&self.fld)?;
        let loc = goppa::goppa_error_locator(&synd, &self.fld, &self.g, &self.sq_inv);
        let ev = goppa::evaluate_error_locator_trace(&loc, &self.fld)?;

        if ev.hamming_weight() != self.plain_weight() {
            return Err(Error::Crypto("decoding failed"));
        }

        Ok(self.p_inv.permute_bits(&ev))
    }

    /// Syndrome-decode a perturbed hash; flips delta random syndrome bits
    /// per attempt until the locator splits.
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

        for _ in 0..attempts {
            let mut synd = hash.clone();
            for _ in 0..delta {
                synd.flip(rng.random(s as u32) as usize);
            }

            let unscrambled = self.s_inv.mult_vec_right(&synd)?;
            let synd_poly = unscrambled.to_poly(&self.fld)?;
            let loc = goppa::goppa_error_locator(&synd_poly, &self.fld, &self.g, &self.sq_inv);

            if let Ok(ev) = goppa::evaluate_error_locator_trace(&loc, &self.fld) {
                if ev.hamming_weight() == self.plain_weight() {
                    return Ok(self.p_inv.permute_bits(&ev));
                }
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
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PrivKey> {
        let items = s.as_list_of(5)?;
        if items[0].as_bytes()? != PRIV_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        let mut k = PrivKey {
            fld: Gf2m::unserialize(&items[1])?,
            g: Poly::unserialize(&items[2])?,
            s_inv: Matrix::unserialize(&items[3])?,
            p_inv: Permutation::unserialize(&items[4])?,
            sq_inv: Vec::new(),
        };
        k.prepare()?;
        Ok(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;
    use crate::schemes::mce::random_error_vector;

    #[test]
    fn constant_weight_roundtrip() {
        let mut rng = TestRng::new(50);
        let (pub_key, priv_key) = generate(6, 3, &mut rng).unwrap();

        assert_eq!(pub_key.plain_size(), 64);
        assert_eq!(pub_key.cipher_size(), 18);

        for _ in 0..20 {
            let plain = random_error_vector(pub_key.plain_size(), pub_key.plain_weight(), &mut rng);
            let cipher = pub_key.encrypt(&plain).unwrap();
            let dec = priv_key.decrypt(&cipher).unwrap();
            assert_eq!(dec, plain);
        }
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = TestRng::new(51);
        let (pub_key, priv_key) = generate(6, 3, &mut rng).unwrap();

        let pk2 = PubKey::unserialize(&pub_key.serialize()).unwrap();
        let sk2 = PrivKey::unserialize(&priv_key.serialize()).unwrap();

        let plain = random_error_vector(pk2.plain_size(), pk2.plain_weight(), &mut rng);
        let cipher = pk2.encrypt(&plain).unwrap();
        assert_eq!(sk2.decrypt(&cipher).unwrap(), plain);

        // a tag from the wrong scheme is rejected
        assert!(PubKey::unserialize(&priv_key.serialize()).is_err());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let mut rng = TestRng::new(52);
        let (pub_key, priv_key) = generate(6, 3, &mut rng).unwrap();

        let mut hash = BitVec::with_size(pub_key.cipher_size());
        for i in 0..hash.size() {
            hash.set(i, rng.random(2) == 1);
        }

        let delta = 4;
        let sig = priv_key.sign(&hash, delta, 50000, &mut rng).unwrap();
        pub_key.verify(&sig, &hash, delta).unwrap();
        assert_eq!(sig.hamming_weight(), pub_key.plain_weight());
    }
}
