//! Compact quasi-dyadic McEliece (Misoczki-Barreto style).
//!
//! The private key is an "essence" of m field elements from which the
//! whole dyadic check-matrix signature is regrown, plus the block
//! permutations that hide the structure. Keys are tiny; security of the
//! variant is broken, so every use prints a loud warning once.

use std::collections::HashSet;
use std::sync::Once;

use crate::codes::dyadic::{self, qd_to_right_echelon_form};
use crate::codes::goppa;
use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::gf2m::Gf2m;
use crate::math::matrix::Matrix;
use crate::math::perm::Permutation;
use crate::math::poly::Poly;
use crate::rng::Prng;
use crate::sencode::{self, Sencode};

const PUB_IDENT: &[u8] = b"CCR-PUBLIC-KEY-QD-MCE";
const PRIV_IDENT: &[u8] = b"CCR-PRIVATE-KEY-QD-MCE";

static ATTACK_WARNING: Once = Once::new();

fn print_attack_warning() {
    ATTACK_WARNING.call_once(|| {
        eprintln!(
            "\n***MCEQD SECURITY WARNING***\n\n\
             Security of the QD-McEliece variant was greatly reduced to less than 2^30\n\
             by an algebraic attack! The functions are kept only for compatibility\n\
             and will be removed soon. Use `-g help' for other encryption variants."
        );
    });
}

pub struct PrivKey {
    pub fld: Gf2m,
    pub t_exp: u32, // block size is 2^t_exp
    pub essence: Vec<u32>,
    pub block_perm: Permutation,
    pub block_perms: Vec<u32>,
    pub h_perm: Permutation,

    // derived by prepare()
    g: Poly,
    permuted_support: Vec<u32>,
    support_pos: Vec<usize>,
}

pub struct PubKey {
    pub t_exp: u32,
    pub qd_sigs: Matrix,
}

/// Regrow the dyadic H signature from the essence; shared between keygen
/// and prepare.
fn regrow_hsig(fld: &Gf2m, essence: &[u32], n: usize) -> Vec<u32> {
    let m = fld.m as usize;
    let mut hsig = vec![0u32; n];
    hsig[0] = fld.inv(essence[m - 1]);
    let mut s = 0;
    while (1usize << s) < n {
        let i = 1usize << s;
        hsig[i] = fld.inv(fld.add(essence[s], essence[m - 1]));
        for j in 1..i {
            if i + j >= n {
                break;
            }
            hsig[i + j] = fld.inv(fld.add(
                fld.inv(hsig[i]),
                fld.add(fld.inv(hsig[j]), essence[m - 1]),
            ));
        }
        s += 1;
    }
    hsig
}

pub fn generate(
    m: u32,
    t_exp: u32,
    block_count: usize,
    block_discard: usize,
    rng: &mut dyn Prng,
) -> Result<(PubKey, PrivKey)> {
    print_attack_warning();

    let fld = Gf2m::create(m)?;
    let t = 1usize << t_exp;
    let block_size = t;
    let h_block_count = block_count + block_discard;
    let n = h_block_count * t;

    if block_count <= m as usize {
        return Err(Error::BadInput("too few blocks for this field"));
    }
    if n > fld.n as usize / 2 {
        return Err(Error::BadInput("code too long for this field"));
    }

    let m = m as usize;

    // retry the whole generation until a consistent goppa code appears
    'retry: loop {
        let mut used: HashSet<u32> = HashSet::new();
        let mut hsig = vec![0u32; n];
        let mut essence = vec![0u32; m];

        // dyadic signature: fix the values at powers of two, everything
        // else follows from 1/h[i^j] = 1/h[i] + 1/h[j] + 1/h[0]
        hsig[0] = match dyadic::choose_random(fld.n, rng, &mut used) {
            Some(v) => v,
            None => continue 'retry,
        };
        essence[m - 1] = fld.inv(hsig[0]);

        let mut s = 0;
        while (1usize << s) < n {
            let i = 1usize << s;
            hsig[i] = match dyadic::choose_random(fld.n, rng, &mut used) {
                Some(v) => v,
                None => continue 'retry,
            };
            essence[s] = fld.add(essence[m - 1], fld.inv(hsig[i]));
            used.insert(fld.inv(essence[s]));

            for j in 1..i {
                if i + j >= n {
                    break;
                }
                hsig[i + j] = fld.inv(fld.add(
                    fld.inv(hsig[i]),
                    fld.add(fld.inv(hsig[j]), essence[m - 1]),
                ));
                used.insert(hsig[i + j]);
                used.insert(fld.inv(fld.add(fld.inv(hsig[i + j]), essence[m - 1])));
            }
            s += 1;
        }

        // goppa polynomial from the first block's roots
        used.clear();
        let mut g = Poly::constant(1);
        let mut tmp = Poly::from_coeffs(vec![1, 1]);
        for h in hsig.iter().take(t) {
            let root = fld.inv(*h);
            if !used.insert(root) {
                continue 'retry;
            }
            tmp.set_coeff(0, root);
            g.mult(&tmp, &fld);
        }

        // support; all entries must stay distinct from everything so far
        let mut support = vec![0u32; n];
        for i in 0..n {
            support[i] = fld.add(fld.inv(hsig[i]), essence[m - 1]);
            if !used.insert(support[i]) {
                continue 'retry;
            }
        }

        // cut the signature into blocks, shuffle, discard, dyadic-shuffle
        let mut bl: Vec<Vec<u32>> = (0..h_block_count)
            .map(|i| hsig[i * block_size..(i + 1) * block_size].to_vec())
            .collect();

        let block_perm = Permutation::random(h_block_count, rng);
        let mut blp = block_perm.permute(&bl);
        blp.truncate(block_count);

        let mut block_perms = vec![0u32; block_count];
        bl.truncate(block_count);
        for i in 0..block_count {
            block_perms[i] = rng.random(block_size as u32);
            bl[i] = Permutation::permute_dyadic(block_perms[i] as usize, &blp[i])
                .ok_or(Error::BadInput("block size not a power of two"))?;
        }

        // a few tries to pick a block order that makes the echelon work
        for _ in 0..block_count {
            let h_perm = Permutation::random(block_count, rng);
            let h_perm_inv = h_perm.inversion();

            let mut hblocks: Vec<Vec<BitVec>> = Vec::with_capacity(block_count);
            for i in 0..block_count {
                let col = BitVec::from_poly_cotrace(
                    &Poly::from_coeffs(bl[h_perm_inv.image(i)].clone()),
                    &fld,
                );
                let mut stack = Vec::with_capacity(m);
                for j in 0..m {
                    stack.push(col.get_block(j * block_size, block_size));
                }
                hblocks.push(stack);
            }

            if qd_to_right_echelon_form(&mut hblocks).is_err() {
                continue;
            }

            let mut qd_sigs = Matrix::with_size(block_count - m, block_size * m);
            for (i, hcol) in hblocks.iter().take(block_count - m).enumerate() {
                for (j, blk) in hcol.iter().enumerate() {
                    qd_sigs.col_mut(i).set_block(blk, block_size * j);
                }
            }

            let mut priv_key = PrivKey {
                fld,
                t_exp,
                essence,
                block_perm,
                block_perms,
                h_perm,
                g: Poly::new(),
                permuted_support: Vec::new(),
                support_pos: Vec::new(),
            };
            priv_key.prepare()?;

            return Ok((PubKey { t_exp, qd_sigs }, priv_key));
        }
        // echelonization failed for every order, regenerate everything
    }
}

impl PubKey {
    pub fn plain_size(&self) -> usize {
        (1 << self.t_exp) * self.qd_sigs.width()
    }

    pub fn cipher_size(&self) -> usize {
        self.plain_size() + self.qd_sigs.height()
    }

    pub fn error_count(&self) -> usize {
        1 << self.t_exp
    }

    pub fn encrypt(&self, plain: &BitVec, rng: &mut dyn Prng) -> Result<BitVec> {
        let errors =
            super::mce::random_error_vector(self.cipher_size(), self.error_count(), rng);
        self.encrypt_with_errors(plain, &errors)
    }

    pub fn encrypt_with_errors(&self, plain: &BitVec, errors: &BitVec) -> Result<BitVec> {
        print_attack_warning();

        let t = 1usize << self.t_exp;
        if self.qd_sigs.width() == 0 || self.qd_sigs.height() % t != 0 {
            return Err(Error::Malformed("mangled public key"));
        }
        if plain.size() != self.plain_size() || errors.size() != self.cipher_size() {
            return Err(Error::BadInput("wrong vector size"));
        }

        // checksum accumulates blockwise dyadic products
        let blocks = self.qd_sigs.height() / t;
        let mut cksum = BitVec::with_size(self.qd_sigs.height());
        let mut r = BitVec::with_size(t);

        for i in 0..self.qd_sigs.width() {
            let p = plain.get_block(i * t, t);
            for j in 0..blocks {
                let g = self.qd_sigs.col(i).get_block(j * t, t);
                dyadic::dyadic_multiply(&p, &g, &mut r);
                cksum.add_offset(&r, t * j);
            }
        }

        let mut out = plain.clone();
        out.append(&cksum);
        out.add(errors);
        Ok(out)
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PUB_IDENT),
            Sencode::Int(self.t_exp),
            self.qd_sigs.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PubKey> {
        let items = s.as_list_of(3)?;
        if items[0].as_bytes()? != PUB_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        Ok(PubKey {
            t_exp: items[1].as_int()?,
            qd_sigs: Matrix::unserialize(&items[2])?,
        })
    }
}

impl PrivKey {
    pub fn cipher_size(&self) -> usize {
        (1 << self.t_exp) * self.h_perm.len()
    }

    pub fn plain_size(&self) -> usize {
        (1 << self.t_exp) * (self.h_perm.len() - self.fld.m as usize)
    }

    pub fn error_count(&self) -> usize {
        1 << self.t_exp
    }

    /// Regrow the goppa polynomial and the permuted support lookup from
    /// the essence. Fails on keys whose essence is inconsistent.
    pub fn prepare(&mut self) -> Result<()> {
        print_attack_warning();

        let fld = &self.fld;
        let m = fld.m as usize;
        let block_size = 1usize << self.t_exp;
        let block_count = self.h_perm.len();
        let h_block_count = self.block_perm.len();
        let n = h_block_count * block_size;

        let hsig = regrow_hsig(fld, &self.essence, n);

        // goppa polynomial, onto which omega is later added
        let mut used: HashSet<u32> = HashSet::new();
        let mut g = Poly::constant(1);
        let mut tmp = Poly::from_coeffs(vec![1, 1]);
        for h in hsig.iter().take(block_size) {
            let root = fld.inv(*h);
            if !used.insert(root) {
                return Err(Error::Malformed("inconsistent key essence"));
            }
            tmp.set_coeff(0, root);
            g.mult(&tmp, fld);
        }

        // support with omega=0; discarded blocks are skipped
        let mut support = vec![0u32; n];
        for i in 0..n {
            if self.block_perm.image(i / block_size) >= block_count {
                continue;
            }
            support[i] = fld.add(fld.inv(hsig[i]), self.essence[m - 1]);
            if !used.insert(support[i]) {
                return Err(Error::Malformed("inconsistent key essence"));
            }
        }

        // omega is the least field element no root or support point hits
        let omega = (0..fld.n)
            .find(|i| !used.contains(i))
            .ok_or(Error::Malformed("no free omega in field"))?;

        for s in support.iter_mut() {
            *s = fld.add(*s, omega);
        }

        let mut g = Poly::constant(1);
        for h in hsig.iter().take(block_size) {
            tmp.set_coeff(0, fld.add(fld.inv(*h), omega));
            g.mult(&tmp, fld);
        }
        self.g = g;

        // permute the support blocks exactly like keygen permuted H
        self.permuted_support = vec![0u32; block_size * block_count];
        for i in 0..h_block_count {
            let pos = self.block_perm.image(i);
            if pos >= block_count {
                continue; // discarded
            }
            let blk_perm = self.block_perms[pos] as usize;
            let target = self.h_perm.image(pos);

            let sbl: Vec<u32> = support[i * block_size..(i + 1) * block_size].to_vec();
            let permuted = Permutation::permute_dyadic(blk_perm, &sbl)
                .ok_or(Error::Malformed("bad dyadic block size"))?;

            self.permuted_support
                [target * block_size..(target + 1) * block_size]
                .copy_from_slice(&permuted);
        }

        // position lookup; fld.n marks "not in the support"
        self.support_pos = vec![fld.n as usize; fld.n as usize];
        for (i, &s) in self.permuted_support.iter().enumerate() {
            self.support_pos[s as usize] = i;
        }

        Ok(())
    }

    pub fn decrypt(&self, cipher: &BitVec) -> Result<BitVec> {
        Ok(self.decrypt_with_errors(cipher)?.0)
    }

    pub fn decrypt_with_errors(&self, cipher: &BitVec) -> Result<(BitVec, BitVec)> {
        print_attack_warning();

        if cipher.size() != self.cipher_size() {
            return Err(Error::BadInput("wrong vector size"));
        }
        let fld = &self.fld;
        let t = 1usize << self.t_exp;

        // alternant syndrome H_alt = Vdm(L) * Diag(g(L_i)^-2)
        let h_size = 2 * t;
        let mut synd = vec![0u32; h_size];
        for i in 0..self.cipher_size() {
            if cipher.get(i) {
                let l = self.permuted_support[i];
                let tmp = fld.inv_square(self.g.eval(l, fld));
                fld.add_mults(tmp, l, &mut synd);
            }
        }

        let synd_poly = Poly::from_coeffs(synd);
        let loc = goppa::alternant_error_locator(&synd_poly, fld, t);
        let ev = goppa::evaluate_error_locator_trace(&loc, fld)?;

        let mut out = cipher.clone();
        out.resize(self.plain_size(), false);
        let mut errors = BitVec::with_size(self.cipher_size());
        let mut failed = false;

        // roots of the locator are inverses of support points
        for i in 0..ev.size() {
            if !ev.get(i) {
                continue;
            }
            let epos = self.support_pos[fld.inv(i as u32) as usize];
            if epos >= self.cipher_size() {
                failed = true; // root outside the permuted support
                continue;
            }
            errors.set(epos, true);
            if epos < self.plain_size() {
                out.flip(epos);
            }
        }

        if failed {
            return Err(Error::Crypto("decoding failed"));
        }
        Ok((out, errors))
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PRIV_IDENT),
            self.fld.serialize(),
            Sencode::Int(self.t_exp),
            sencode::serialize_uints(&self.essence),
            self.block_perm.serialize(),
            sencode::serialize_uints(&self.block_perms),
            self.h_perm.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PrivKey> {
        let items = s.as_list_of(7)?;
        if items[0].as_bytes()? != PRIV_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        let mut k = PrivKey {
            fld: Gf2m::unserialize(&items[1])?,
            t_exp: items[2].as_int()?,
            essence: sencode::unserialize_uints(&items[3])?,
            block_perm: Permutation::unserialize(&items[4])?,
            block_perms: sencode::unserialize_uints(&items[5])?,
            h_perm: Permutation::unserialize(&items[6])?,
            g: Poly::new(),
            permuted_support: Vec::new(),
            support_pos: Vec::new(),
        };
        k.prepare()?;
        Ok(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    fn test_keypair(rng: &mut TestRng) -> (PubKey, PrivKey) {
        generate(16, 4, 20, 2, rng).unwrap()
    }

    #[test]
    fn keygen_encrypt_decrypt_roundtrip() {
        let mut rng = TestRng::new(60);
        let (pub_key, priv_key) = test_keypair(&mut rng);

        assert_eq!(pub_key.error_count(), 16);
        assert_eq!(pub_key.plain_size(), priv_key.plain_size());
        assert_eq!(pub_key.cipher_size(), priv_key.cipher_size());

        for _ in 0..5 {
            let mut plain = BitVec::with_size(pub_key.plain_size());
            for i in 0..plain.size() {
                plain.set(i, rng.random(2) == 1);
            }
            let cipher = pub_key.encrypt(&plain, &mut rng).unwrap();
            let (dec, errors) = priv_key.decrypt_with_errors(&cipher).unwrap();
            assert_eq!(dec, plain);
            assert_eq!(errors.hamming_weight(), pub_key.error_count());
        }
    }

    #[test]
    fn serialized_key_still_decrypts() {
        let mut rng = TestRng::new(61);
        let (pub_key, priv_key) = test_keypair(&mut rng);

        let pk = PubKey::unserialize(&pub_key.serialize()).unwrap();
        let sk = PrivKey::unserialize(&priv_key.serialize()).unwrap();

        let mut plain = BitVec::with_size(pk.plain_size());
        plain.set(0, true);
        plain.set(17, true);
        let cipher = pk.encrypt(&plain, &mut rng).unwrap();
        assert_eq!(sk.decrypt(&cipher).unwrap(), plain);
    }

    #[test]
    fn parameter_sanity() {
        let mut rng = TestRng::new(62);
        // block_count must exceed m
        assert!(generate(16, 4, 10, 2, &mut rng).is_err());
    }
}
