//! Dense vectors over GF(2), packed into 64-bit words.
//!
//! Doubles as a polynomial over GF(2) where needed (degree, shifts, the
//! extended Euclid used for circulant block inversion). The standing
//! invariant is that bits past `size` inside the last word are zero; every
//! mutation restores it, which in turn makes the serialized form bijective.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::{Error, Result};
use crate::math::gf2m::Gf2m;
use crate::math::poly::Poly;
use crate::sencode::Sencode;

const ALL_ONES: u64 = u64::MAX;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitVec {
    data: Vec<u64>,
    size: usize,
}

#[inline]
fn blockof(i: usize) -> usize {
    i >> 6
}

#[inline]
fn blockpos(i: usize) -> usize {
    i & 0x3f
}

#[inline]
fn datasize(s: usize) -> usize {
    (s + 63) >> 6
}

impl BitVec {
    pub fn new() -> BitVec {
        BitVec::default()
    }

    pub fn with_size(n: usize) -> BitVec {
        BitVec {
            data: vec![0; datasize(n)],
            size: n,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn clear(&mut self) {
        self.size = 0;
        self.data.clear();
    }

    fn fix_padding(&mut self) {
        if blockpos(self.size) != 0 {
            self.data[blockof(self.size)] &= !(ALL_ONES << blockpos(self.size));
        }
    }

    pub fn resize(&mut self, newsize: usize, def: bool) {
        if newsize <= self.size {
            self.size = newsize;
            self.data.truncate(datasize(newsize));
            self.fix_padding();
        } else {
            let old = self.size;
            self.data.resize(datasize(newsize), 0);
            self.size = newsize;
            if def {
                self.fill_ones(old, newsize);
            } else {
                self.fill_zeros(old, newsize);
            }
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        (self.data[blockof(i)] >> blockpos(i)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, i: usize, val: bool) {
        if val {
            self.data[blockof(i)] |= 1u64 << blockpos(i);
        } else {
            self.data[blockof(i)] &= !(1u64 << blockpos(i));
        }
    }

    #[inline]
    pub fn flip(&mut self, i: usize) {
        self.data[blockof(i)] ^= 1u64 << blockpos(i);
    }

    pub fn fill_ones(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        for i in blockof(from) + 1..blockof(to) {
            self.data[i] = ALL_ONES;
        }
        if blockof(from) < blockof(to) {
            self.data[blockof(from)] |= ALL_ONES << blockpos(from);
            if blockpos(to) != 0 {
                self.data[blockof(to)] |= ALL_ONES >> (64 - blockpos(to));
            }
        } else {
            self.data[blockof(from)] |=
                (ALL_ONES << blockpos(from)) & (ALL_ONES >> (64 - blockpos(to)));
        }
    }

    pub fn fill_zeros(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        for i in blockof(from) + 1..blockof(to) {
            self.data[i] = 0;
        }
        if blockof(from) < blockof(to) {
            self.data[blockof(from)] &= !(ALL_ONES << blockpos(from));
            if blockpos(to) != 0 {
                self.data[blockof(to)] &= !(ALL_ONES >> (64 - blockpos(to)));
            }
        } else {
            self.data[blockof(from)] &=
                !((ALL_ONES << blockpos(from)) & (ALL_ONES >> (64 - blockpos(to))));
        }
    }

    pub fn zero_out(&mut self) {
        for w in &mut self.data {
            *w = 0;
        }
    }

    pub fn hamming_weight(&self) -> usize {
        self.data.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Weight of the AND of two vectors; sizes are expected to match.
    pub fn and_hamming_weight(&self, a: &BitVec) -> usize {
        self.data
            .iter()
            .zip(a.data.iter())
            .map(|(x, y)| (x & y).count_ones() as usize)
            .sum()
    }

    /// Dot product over GF(2).
    pub fn dot(&self, a: &BitVec) -> bool {
        self.and_hamming_weight(a) & 1 != 0
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&w| w == 0)
    }

    /// True iff the vector is the polynomial 1.
    pub fn is_one(&self) -> bool {
        for (i, &w) in self.data.iter().enumerate() {
            if i == 0 {
                if w != 1 {
                    return false;
                }
            } else if w != 0 {
                return false;
            }
        }
        !self.data.is_empty()
    }

    /// XOR `cnt` bits of `a` starting at `offset_from` into this vector at
    /// `offset_to`. The four word-alignment combinations are handled
    /// separately; the fully misaligned case realigns by single bits.
    pub fn add_offset_range(
        &mut self,
        a: &BitVec,
        mut offset_from: usize,
        mut offset_to: usize,
        mut cnt: usize,
    ) {
        while cnt > 0 {
            let mut mask = ALL_ONES;
            if cnt < 64 {
                mask >>= 64 - cnt;
            }

            if blockpos(offset_from) == 0 {
                if blockpos(offset_to) == 0 {
                    self.data[blockof(offset_to)] ^= mask & a.data[blockof(offset_from)];
                    if cnt < 64 {
                        return;
                    }
                    offset_from += 64;
                    offset_to += 64;
                    cnt -= 64;
                } else {
                    self.data[blockof(offset_to)] ^=
                        (mask & a.data[blockof(offset_from)]) << blockpos(offset_to);
                    let moved = 64 - blockpos(offset_to);
                    if cnt < moved {
                        return;
                    }
                    cnt -= moved;
                    offset_from += moved;
                    offset_to += moved;
                }
            } else if blockpos(offset_to) == 0 {
                self.data[blockof(offset_to)] ^=
                    mask & (a.data[blockof(offset_from)] >> blockpos(offset_from));
                let moved = 64 - blockpos(offset_from);
                if cnt < moved {
                    return;
                }
                cnt -= moved;
                offset_from += moved;
                offset_to += moved;
            } else {
                let bit = a.get(offset_from);
                if bit {
                    self.flip(offset_to);
                }
                cnt -= 1;
                offset_from += 1;
                offset_to += 1;
            }
        }
    }

    /// XOR the whole of `a` into this vector at bit `offset_to`, growing as
    /// needed.
    pub fn add_offset(&mut self, a: &BitVec, offset_to: usize) {
        if offset_to + a.size > self.size {
            self.resize(offset_to + a.size, false);
        }
        self.add_offset_range(a, 0, offset_to, a.size);
        self.fix_padding();
    }

    pub fn add(&mut self, a: &BitVec) {
        if a.size > self.size {
            self.resize(a.size, false);
        }
        self.add_offset_range(a, 0, 0, a.size);
        self.fix_padding();
    }

    pub fn add_range(&mut self, a: &BitVec, b: usize, e: usize) {
        if e > self.size {
            self.resize(e, false);
        }
        self.add_offset_range(a, b, b, e - b);
        self.fix_padding();
    }

    /// XOR a rotated-right-by-`rot` copy of `a` into this vector.
    pub fn rot_add(&mut self, a: &BitVec, rot: usize) {
        let n = a.size;
        if self.size < n {
            self.resize(n, false);
        }
        let rot = rot % n;
        if rot == 0 {
            self.add(a);
        } else {
            self.add_offset_range(a, 0, rot, n - rot);
            self.add_offset_range(a, n - rot, 0, rot);
            self.fix_padding();
        }
    }

    pub fn append(&mut self, a: &BitVec) {
        self.add_offset(a, self.size);
    }

    pub fn set_block(&mut self, a: &BitVec, offset: usize) {
        if offset + a.size > self.size {
            self.resize(offset + a.size, false);
        }
        self.fill_zeros(offset, offset + a.size);
        self.add_offset_range(a, 0, offset, a.size);
        self.fix_padding();
    }

    pub fn get_block(&self, offset: usize, bs: usize) -> BitVec {
        let mut out = BitVec::with_size(bs);
        if offset + bs <= self.size {
            out.add_offset_range(self, offset, 0, bs);
            out.fix_padding();
        }
        out
    }

    /*
     * GF(2)[x] polynomial view.
     */

    /// Highest set bit position, or -1 for the zero polynomial.
    pub fn degree(&self) -> isize {
        for (i, &w) in self.data.iter().enumerate().rev() {
            if w != 0 {
                return (64 * i + 63 - w.leading_zeros() as usize) as isize;
            }
        }
        -1
    }

    pub fn poly_strip(&mut self) {
        let d = self.degree();
        self.resize((d + 1) as usize, false);
    }

    /// Extended Euclid over GF(2)[x]: returns (gcd, s, t) with
    /// `gcd(self, b) = s*self + t*b`.
    pub fn ext_gcd(&self, b: &BitVec) -> (BitVec, BitVec, BitVec) {
        let mut s0 = BitVec::with_size(1);
        s0.set(0, true);
        let mut t0 = BitVec::new();
        let mut s1 = BitVec::new();
        let mut t1 = BitVec::with_size(1);
        t1.set(0, true);

        let mut r0 = self.clone();
        let mut r1 = b.clone();

        loop {
            let d0 = r0.degree();
            let d1 = r1.degree();
            if d0 < 0 {
                return (r1, s1, t1);
            }
            if d1 < 0 {
                return (r0, s0, t0);
            }
            if d0 > d1 {
                std::mem::swap(&mut r0, &mut r1);
                std::mem::swap(&mut s0, &mut s1);
                std::mem::swap(&mut t0, &mut t1);
                continue;
            }

            // quotient considered only as x^(d1-d0)
            let logq = (d1 - d0) as usize;
            r1.add_offset(&r0, logq);
            s1.add_offset(&s0, logq);
            t1.add_offset(&t0, logq);
            r1.poly_strip();
            s1.poly_strip();
            t1.poly_strip();

            std::mem::swap(&mut r0, &mut r1);
            std::mem::swap(&mut s0, &mut s1);
            std::mem::swap(&mut t0, &mut t1);
        }
    }

    /*
     * conversions
     */

    /// Bit `i` of the result is bit `i/s` of coefficient `i mod s`, i.e. the
    /// column-per-coefficient layout the quasi-dyadic check matrix needs.
    pub fn from_poly_cotrace(r: &Poly, fld: &Gf2m) -> BitVec {
        let s = r.len();
        let mut out = BitVec::with_size(s * fld.m as usize);
        for i in 0..out.size {
            if (r.coeff(i % s) >> (i / s)) & 1 != 0 {
                out.set(i, true);
            }
        }
        out
    }

    /// Inverse of `from_poly_cotrace`: collect coefficient bits back out
    /// of the transposed layout.
    pub fn to_poly_cotrace(&self, fld: &Gf2m) -> Result<Poly> {
        let m = fld.m as usize;
        if self.size % m != 0 {
            return Err(Error::BadInput("vector length not divisible by m"));
        }
        let s = self.size / m;
        let mut coeffs = vec![0u32; s];
        for i in 0..self.size {
            if self.get(i) {
                coeffs[i % s] |= 1 << (i / s);
            }
        }
        Ok(Poly::from_coeffs(coeffs))
    }

    /// Consecutive groups of `m` bits become field elements.
    pub fn to_poly(&self, fld: &Gf2m) -> Result<Poly> {
        let m = fld.m as usize;
        if self.size % m != 0 {
            return Err(Error::BadInput("vector length not divisible by m"));
        }
        let mut coeffs = vec![0u32; self.size / m];
        for i in 0..self.size {
            if self.get(i) {
                coeffs[i / m] |= 1 << (i % m);
            }
        }
        Ok(Poly::from_coeffs(coeffs))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; (self.size + 7) >> 3];
        for (i, o) in out.iter_mut().enumerate() {
            *o = ((self.data[i >> 3] >> ((i & 7) << 3)) & 0xff) as u8;
        }
        out
    }

    pub fn from_bytes(bytes: &[u8], bits: usize) -> BitVec {
        let bits = if bits == 0 { bytes.len() * 8 } else { bits };
        let mut out = BitVec::with_size(bits);
        for (i, &b) in bytes.iter().enumerate() {
            if i * 8 >= bits {
                break;
            }
            out.data[i >> 3] |= u64::from(b) << ((i & 7) << 3);
        }
        out.fix_padding();
        out
    }

    /*
     * colex ranking of constant-weight vectors, Ruskey's "walking"
     * algorithm 4.10. The rank is carried as a big integer; combination
     * numbers are updated in place while n and k move along the path, so
     * the whole thing is O(n+k) bigint operations.
     */

    fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.to_bytes())
    }

    fn from_biguint(x: &BigUint) -> BitVec {
        let bits = x.bits().max(1) as usize;
        BitVec::from_bytes(&x.to_bytes_le(), bits)
    }

    pub fn colex_rank(&self) -> BitVec {
        let mut res = BigUint::zero();
        let mut comb = BigUint::one();

        let mut n = 0usize;
        let mut k = 1usize;

        while n < self.size && self.get(n) {
            n += 1;
            k += 1;
        }
        n += 1;

        while n < self.size {
            if self.get(n) {
                res += &comb;
            }

            comb = comb * (n as u32 + 1) / ((n - k + 1) as u32);

            if self.get(n) {
                comb = comb * ((n + 1 - k) as u32) / ((k + 1) as u32);
                k += 1;
            }
            n += 1;
        }

        BitVec::from_biguint(&res)
    }

    pub fn colex_unrank(&self, n: usize, k: usize) -> Result<BitVec> {
        let mut r = self.to_biguint();
        let mut comb = combination_number(n, k);

        if r >= comb {
            return Err(Error::BadInput("rank out of range"));
        }

        let mut res = BitVec::with_size(n);
        let mut n = n;
        let mut k = k;

        while k > 0 {
            if r.is_zero() {
                break;
            }

            while n > k && comb > r {
                comb = comb * ((n - k) as u32) / (n as u32);
                n -= 1;
            }

            res.set(n, true);
            r -= &comb;

            comb = comb * (k as u32) / ((n - k + 1) as u32);
            k -= 1;
        }

        // leftover positions of a zero rank
        for i in 0..k {
            res.set(i, true);
        }

        Ok(res)
    }

    /*
     * serialization
     */

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::Int(self.size as u32),
            Sencode::Bytes(self.to_bytes()),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<BitVec> {
        let items = s.as_list_of(2)?;
        let size = items[0].as_int()? as usize;
        let bytes = items[1].as_bytes()?;
        if bytes.len() != (size + 7) / 8 {
            return Err(Error::Malformed("bit vector size mismatch"));
        }
        // reject nonzero padding, else the encoding would not be bijective
        for i in size..8 * bytes.len() {
            if (bytes[i / 8] >> (i % 8)) & 1 != 0 {
                return Err(Error::Malformed("bit vector padding not zero"));
            }
        }
        Ok(BitVec::from_bytes(bytes, size))
    }
}

/// Bits a rank may have so that colex unranking for (n, k) cannot fail:
/// floor(log2 C(n, k)).
pub fn colex_rank_bits(n: usize, k: usize) -> usize {
    let c = combination_number(n, k);
    c.bits().max(1) as usize - 1
}

fn combination_number(n: usize, k: usize) -> BigUint {
    if k > n {
        return BigUint::zero();
    }
    num_integer::binomial(BigUint::from(n), BigUint::from(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::poly::Poly;

    fn bv(bits: &[u8]) -> BitVec {
        let mut v = BitVec::with_size(bits.len());
        for (i, &b) in bits.iter().enumerate() {
            v.set(i, b != 0);
        }
        v
    }

    #[test]
    fn xor_self_is_zero() {
        let mut a = bv(&[1, 0, 1, 1, 0, 1]);
        let b = a.clone();
        a.add(&b);
        assert!(a.is_zero());
    }

    #[test]
    fn bytes_roundtrip() {
        for n in [1usize, 7, 8, 9, 63, 64, 65, 130] {
            let mut v = BitVec::with_size(n);
            for i in (0..n).step_by(3) {
                v.set(i, true);
            }
            let r = BitVec::from_bytes(&v.to_bytes(), n);
            assert_eq!(v, r);
        }
    }

    #[test]
    fn add_offset_alignments() {
        // push a pattern through every alignment combination and check with
        // a dumb per-bit model
        let mut src = BitVec::with_size(130);
        for i in 0..130 {
            src.set(i, i % 3 == 0 || i % 7 == 1);
        }
        for from in [0usize, 1, 63, 64, 65] {
            for to in [0usize, 1, 63, 64, 65] {
                let cnt = 60;
                let mut fast = BitVec::with_size(200);
                fast.add_offset_range(&src, from, to, cnt);
                let mut slow = BitVec::with_size(200);
                for i in 0..cnt {
                    if src.get(from + i) {
                        slow.flip(to + i);
                    }
                }
                assert_eq!(fast, slow, "from={from} to={to}");
            }
        }
    }

    #[test]
    fn rotation() {
        let a = bv(&[1, 1, 0, 0, 0]);
        let mut r = BitVec::with_size(5);
        r.rot_add(&a, 2);
        assert_eq!(r, bv(&[0, 0, 1, 1, 0]));
        let mut r = BitVec::with_size(5);
        r.rot_add(&a, 4);
        assert_eq!(r, bv(&[1, 0, 0, 0, 1]));
    }

    #[test]
    fn colex_examples() {
        let zero = BitVec::with_size(1);
        let r = zero.colex_unrank(5, 2).unwrap();
        assert_eq!(r, bv(&[1, 1, 0, 0, 0]));

        let nine = BitVec::from_bytes(&[9], 4);
        let r = nine.colex_unrank(5, 2).unwrap();
        assert_eq!(r, bv(&[0, 0, 0, 1, 1]));
        assert_eq!(r.colex_rank().to_biguint(), 9u32.into());
    }

    #[test]
    fn colex_roundtrip_all() {
        for (n, k) in [(5usize, 2usize), (8, 3), (10, 1), (6, 6)] {
            let total = combination_number(n, k);
            let mut r = BigUint::zero();
            while r < total {
                let rv = BitVec::from_biguint(&r);
                let v = rv.colex_unrank(n, k).unwrap();
                assert_eq!(v.hamming_weight(), k);
                assert_eq!(v.colex_rank().to_biguint(), r);
                r += 1u32;
            }
            // one past the end must fail
            let rv = BitVec::from_biguint(&total);
            assert!(rv.colex_unrank(n, k).is_err());
        }
    }

    #[test]
    fn cotrace_roundtrip() {
        let fld = Gf2m::create(5).unwrap();
        let p = Poly::from_coeffs(vec![3, 17, 0, 30, 9, 1]);
        let v = BitVec::from_poly_cotrace(&p, &fld);
        assert_eq!(v.size(), 6 * 5);
        // transposed layout: coefficient j sits at bits j, j+s, j+2s, ...
        for j in 0..6 {
            let mut c = 0u32;
            for b in 0..5 {
                if v.get(j + 6 * b) {
                    c |= 1 << b;
                }
            }
            assert_eq!(c, p.coeff(j));
        }
        assert_eq!(v.to_poly_cotrace(&fld).unwrap(), p);
    }

    #[test]
    fn to_poly_layout() {
        let fld = Gf2m::create(4).unwrap();
        let mut v = BitVec::with_size(8);
        v.set(1, true); // coeff 0 = 0b0010
        v.set(4, true); // coeff 1 = 0b0001
        let p = v.to_poly(&fld).unwrap();
        assert_eq!(p.coeff(0), 2);
        assert_eq!(p.coeff(1), 1);
        assert!(v.to_poly(&Gf2m::create(3).unwrap()).is_err());
    }

    #[test]
    fn ext_gcd_inverts_modulo() {
        // invert x^3+x+1 modulo x^7-1
        let mut g = BitVec::with_size(4);
        g.set(0, true);
        g.set(1, true);
        g.set(3, true);
        let mut modulus = BitVec::with_size(8);
        modulus.set(0, true);
        modulus.set(7, true);

        let (gcd, s, _) = g.ext_gcd(&modulus);
        assert!(gcd.is_one());

        // check s*g mod x^7-1 == 1 by cyclic convolution
        let mut prod = BitVec::with_size(7);
        for i in 0..s.size() {
            if s.get(i) {
                let mut gg = g.clone();
                gg.resize(7, false);
                prod.rot_add(&gg, i % 7);
            }
        }
        assert!(prod.is_one());
    }

    #[test]
    fn serialization_rejects_bad_padding() {
        let v = bv(&[1, 0, 1]);
        let s = v.serialize();
        assert_eq!(BitVec::unserialize(&s).unwrap(), v);

        let bad = Sencode::list(vec![Sencode::Int(3), Sencode::bytes(vec![0xffu8])]);
        assert!(BitVec::unserialize(&bad).is_err());
    }
}
