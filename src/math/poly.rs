//! Polynomials over GF(2^m), the workhorse of the Goppa code machinery.
//!
//! Coefficients are stored by ascending power; the zero polynomial has
//! degree -1. All arithmetic takes the field explicitly, mirroring how the
//! log/antilog tables travel with the keys.

use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::gf2m::Gf2m;
use crate::math::matrix::Matrix;
use crate::rng::Prng;
use crate::sencode::{self, Sencode};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Poly {
    coeffs: Vec<u32>,
}

impl Poly {
    pub fn new() -> Poly {
        Poly::default()
    }

    pub fn from_coeffs(coeffs: Vec<u32>) -> Poly {
        Poly { coeffs }
    }

    pub fn constant(c: u32) -> Poly {
        Poly { coeffs: vec![c] }
    }

    /// x^n
    pub fn x_to(n: usize) -> Poly {
        let mut coeffs = vec![0; n + 1];
        coeffs[n] = 1;
        Poly { coeffs }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    #[inline]
    pub fn coeff(&self, i: usize) -> u32 {
        self.coeffs.get(i).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set_coeff(&mut self, i: usize, v: u32) {
        if i >= self.coeffs.len() {
            self.coeffs.resize(i + 1, 0);
        }
        self.coeffs[i] = v;
    }

    pub fn clear(&mut self) {
        self.coeffs.clear();
    }

    pub fn degree(&self) -> isize {
        for (i, &c) in self.coeffs.iter().enumerate().rev() {
            if c != 0 {
                return i as isize;
            }
        }
        -1
    }

    pub fn strip(&mut self) {
        let d = self.degree();
        self.coeffs.truncate((d + 1) as usize);
    }

    pub fn is_zero(&self) -> bool {
        self.degree() < 0
    }

    pub fn is_one(&self) -> bool {
        self.degree() == 0 && self.coeffs[0] == 1
    }

    pub fn head(&self) -> u32 {
        match self.degree() {
            d if d >= 0 => self.coeffs[d as usize],
            _ => 0,
        }
    }

    /// Horner evaluation.
    pub fn eval(&self, x: u32, fld: &Gf2m) -> u32 {
        let mut r = 0;
        for i in (0..self.coeffs.len()).rev() {
            r = fld.add(self.coeffs[i], fld.mult(r, x));
        }
        r
    }

    /// Multiply by x^n.
    pub fn shift(&mut self, n: usize) {
        if self.degree() < 0 {
            return;
        }
        self.coeffs.splice(0..0, std::iter::repeat(0).take(n));
    }

    pub fn add(&mut self, f: &Poly, fld: &Gf2m) {
        let df = f.degree();
        if df < 0 {
            return;
        }
        if (df + 1) as usize > self.coeffs.len() {
            self.coeffs.resize((df + 1) as usize, 0);
        }
        for i in 0..=df as usize {
            self.coeffs[i] = fld.add(self.coeffs[i], f.coeff(i));
        }
    }

    /// self += mult * f
    pub fn add_mult(&mut self, f: &Poly, mult: u32, fld: &Gf2m) {
        let df = f.degree();
        if df < 0 {
            return;
        }
        if (df + 1) as usize > self.coeffs.len() {
            self.coeffs.resize((df + 1) as usize, 0);
        }
        for i in 0..=df as usize {
            self.coeffs[i] = fld.add(self.coeffs[i], fld.mult(mult, f.coeff(i)));
        }
    }

    pub fn mult(&mut self, b: &Poly, fld: &Gf2m) {
        let a = std::mem::take(self);
        let da = a.degree();
        let db = b.degree();
        if da < 0 || db < 0 {
            return;
        }
        self.coeffs.resize((da + db + 1) as usize, 0);
        for i in 0..=da as usize {
            if a.coeffs[i] == 0 {
                continue;
            }
            for j in 0..=db as usize {
                self.coeffs[i + j] =
                    fld.add(self.coeffs[i + j], fld.mult(a.coeffs[i], b.coeff(j)));
            }
        }
    }

    pub fn square(&mut self, fld: &Gf2m) {
        let a = self.clone();
        self.mult(&a, fld);
    }

    pub fn modulo(&mut self, f: &Poly, fld: &Gf2m) {
        let df = f.degree();
        if df < 0 {
            self.clear();
            return;
        }
        let hi = fld.inv(f.coeff(df as usize));
        let mut d = self.degree();
        while d >= df {
            if self.coeffs[d as usize] != 0 {
                let t = fld.mult(self.coeffs[d as usize], hi);
                for i in 0..=df as usize {
                    let idx = i + (d - df) as usize;
                    self.coeffs[idx] = fld.add(self.coeffs[idx], fld.mult(t, f.coeff(i)));
                }
            }
            d -= 1;
        }
        self.strip();
    }

    pub fn divmod(&self, d: &Poly, fld: &Gf2m) -> (Poly, Poly) {
        let degd = d.degree();
        if degd < 0 {
            return (Poly::new(), Poly::new());
        }
        let head_inv = fld.inv(d.coeff(degd as usize));
        let mut rem = self.clone();
        let mut res = Poly::new();
        loop {
            let t = rem.degree();
            if t < degd {
                break;
            }
            let rp = (t - degd) as usize;
            let q = fld.mult(head_inv, rem.coeffs[t as usize]);
            res.set_coeff(rp, q);
            for i in 0..=degd as usize {
                rem.coeffs[i + rp] = fld.add(rem.coeffs[i + rp], fld.mult(q, d.coeff(i)));
            }
        }
        rem.strip();
        (res, rem)
    }

    /// self = self / p mod m, through the Euclidean quotient chain.
    pub fn div(&mut self, p: &Poly, m: &Poly, fld: &Gf2m) {
        let mut r0 = m.clone();
        let mut r1 = p.clone();
        r1.modulo(m, fld);

        let mut s0 = Poly::new();
        let mut s1 = std::mem::take(self);
        s1.modulo(m, fld);

        while r1.degree() >= 0 {
            let (q0, q1) = r0.divmod(&r1, fld);
            r0 = std::mem::replace(&mut r1, q1);

            let mut s2 = s0.clone();
            let mut q = q0;
            q.mult(&s1, fld);
            q.modulo(m, fld);
            s2.add(&q, fld);

            s0 = std::mem::replace(&mut s1, s2);
        }

        *self = s0;

        // scalar divide by the gcd head
        if r0.degree() < 0 {
            return;
        }
        let c = fld.inv(r0.head());
        for v in &mut self.coeffs {
            *v = fld.mult(*v, c);
        }
    }

    /// Modular inverse.
    pub fn inv(&mut self, m: &Poly, fld: &Gf2m) {
        let a = std::mem::replace(self, Poly::constant(1));
        self.div(&a, m, fld);
    }

    pub fn make_monic(&mut self, fld: &Gf2m) {
        let d = self.degree();
        if d < 0 {
            return;
        }
        let hi = fld.inv(self.coeffs[d as usize]);
        for v in &mut self.coeffs {
            *v = fld.mult(*v, hi);
        }
    }

    pub fn gcd(&self, b: &Poly, fld: &Gf2m) -> Poly {
        let mut a = self.clone();
        let mut b = b.clone();
        if a.degree() < 0 {
            return b;
        }
        loop {
            if b.is_zero() {
                return a;
            }
            a.modulo(&b, fld);
            if a.is_zero() {
                return b;
            }
            b.modulo(&a, fld);
        }
    }

    /// Square root modulo g, through the precomputed companion matrix of
    /// the Frobenius inverse: out[i] = sqrt(sum_j sqInv[j][i] * self[j]).
    pub fn sqrt(&mut self, sq_inv: &[Poly], fld: &Gf2m) {
        let a = std::mem::take(self);
        let s = sq_inv.len();
        self.coeffs.resize(s, 0);

        for i in 0..s {
            for (j, inv_col) in sq_inv.iter().enumerate() {
                if j >= a.coeffs.len() {
                    break;
                }
                if i >= inv_col.coeffs.len() {
                    continue;
                }
                self.coeffs[i] = fld.add(
                    self.coeffs[i],
                    fld.mult(inv_col.coeffs[i], a.coeffs[j]),
                );
            }
        }
        self.strip();
        for v in &mut self.coeffs {
            *v = fld.sq_root(*v);
        }
    }

    /// Extended Euclid stopped early: returns (a, b) with
    /// `a = b * self mod m` and `deg a <= deg`.
    pub fn ext_euclid(&self, m: &Poly, fld: &Gf2m, deg: isize) -> (Poly, Poly) {
        let mut big_a = self.clone();
        let mut a = m.clone();
        let mut big_b = Poly::constant(1);
        let mut b = Poly::new();

        while a.degree() > deg {
            if big_a.degree() < 0 {
                break;
            }
            std::mem::swap(&mut big_a, &mut a);
            std::mem::swap(&mut big_b, &mut b);
            loop {
                let j = big_a.degree() - a.degree();
                if j < 0 {
                    break;
                }
                let h = fld.div(big_a.head(), a.head());
                let mut tmp = a.clone();
                tmp.shift(j as usize);
                big_a.add_mult(&tmp, h, fld);
                let mut tmp = b.clone();
                tmp.shift(j as usize);
                big_b.add_mult(&tmp, h, fld);
            }
        }

        (a, b)
    }

    /// Write self = a/b mod m with deg a <= deg(m)/2. Used to split the
    /// Goppa decoding equation into the two locator halves.
    pub fn mod_to_fraction(&self, m: &Poly, fld: &Gf2m) -> (Poly, Poly) {
        self.ext_euclid(m, fld, m.degree() / 2)
    }

    /// Ben-Or irreducibility test over GF(2^m).
    pub fn is_irreducible(&self, fld: &Gf2m) -> bool {
        let d = self.degree();
        if d < 1 {
            return false;
        }

        let mut x_mod_f = Poly::x_to(1);
        x_mod_f.modulo(self, fld);

        // xi = x^(2^m)^i mod f; one field-squaring run per power of q
        let mut xi = x_mod_f.clone();
        for _ in 1..=(d / 2) as usize {
            // raise to the q-th power: m binary squarings
            for _ in 0..fld.m {
                xi.square(fld);
                xi.modulo(self, fld);
            }
            let mut t = xi.clone();
            t.add(&x_mod_f, fld);
            let g = t.gcd(self, fld);
            if g.degree() != 0 {
                return false;
            }
        }
        true
    }

    /// Sample degree-s polynomials with fixed end coefficients, flipping
    /// random middle terms until one is irreducible. The search is
    /// unbounded; it terminates quickly in practice because irreducible
    /// polynomials are dense.
    pub fn generate_random_irreducible(s: usize, fld: &Gf2m, rng: &mut dyn Prng) -> Poly {
        let mut p = Poly::new();
        p.coeffs.resize(s + 1, 0);
        p.coeffs[s] = 1;
        p.coeffs[0] = 1 + rng.random(fld.n - 1);
        for i in 1..s {
            p.coeffs[i] = rng.random(fld.n);
        }
        while !p.is_irreducible(fld) {
            let pos = 1 + rng.random(s as u32 - 1) as usize;
            p.coeffs[pos] = rng.random(fld.n);
        }
        p
    }

    /// Parity-check matrix of the Goppa code with support 0..n-1. Column z
    /// holds the m-bit expansions of the coefficients of 1/(x-z) mod g,
    /// so a syndrome read back with to_poly() feeds the decoder directly.
    /// The column polynomial is (g(x)-g(z))/(x-z) * g(z)^-1, built with
    /// the backwards Horner recurrence q[j-1] = z*q[j] + g[j].
    pub fn compute_goppa_check_matrix(&self, fld: &Gf2m) -> Matrix {
        let t = self.degree() as usize;
        let n = fld.n as usize;
        let m = fld.m as usize;

        let mut cols = Vec::with_capacity(n);
        let mut q = vec![0u32; t];
        for z in 0..n as u32 {
            let gz_inv = fld.inv(self.eval(z, fld));

            q[t - 1] = self.coeff(t);
            for j in (1..t).rev() {
                q[j - 1] = fld.add(fld.mult(z, q[j]), self.coeff(j));
            }

            let mut col = BitVec::with_size(m * t);
            for (j, &qj) in q.iter().enumerate() {
                let c = fld.mult(qj, gz_inv);
                for k in 0..m {
                    if (c >> k) & 1 != 0 {
                        col.set(j * m + k, true);
                    }
                }
            }
            cols.push(col);
        }
        Matrix::from_cols(cols)
    }

    /// Companion matrix of the inverse Frobenius modulo self: invert the
    /// matrix of (x^i)^2 mod g columns over GF(2^m).
    pub fn compute_square_root_matrix(&self, fld: &Gf2m) -> Result<Vec<Poly>> {
        let d = self.degree();
        if d < 1 {
            return Err(Error::BadInput("goppa polynomial too small"));
        }
        let d = d as usize;

        // columns of the squaring map
        let mut sq = vec![vec![0u32; d]; d];
        for (i, col) in sq.iter_mut().enumerate() {
            let mut p = Poly::x_to(i);
            p.square(fld);
            p.modulo(self, fld);
            for (j, c) in col.iter_mut().enumerate() {
                *c = p.coeff(j);
            }
        }

        // Gauss-Jordan over the field, augmenting with identity
        let mut inv = vec![vec![0u32; d]; d];
        for (i, col) in inv.iter_mut().enumerate() {
            col[i] = 1;
        }

        for i in 0..d {
            // pivot
            let mut piv = i;
            while piv < d && sq[piv][i] == 0 {
                piv += 1;
            }
            if piv == d {
                return Err(Error::Crypto("singular squaring matrix"));
            }
            sq.swap(i, piv);
            inv.swap(i, piv);

            let f = fld.inv(sq[i][i]);
            for j in 0..d {
                sq[i][j] = fld.mult(sq[i][j], f);
                inv[i][j] = fld.mult(inv[i][j], f);
            }

            for j in 0..d {
                if j == i || sq[j][i] == 0 {
                    continue;
                }
                let f = sq[j][i];
                for k in 0..d {
                    sq[j][k] = fld.add(sq[j][k], fld.mult(f, sq[i][k]));
                    inv[j][k] = fld.add(inv[j][k], fld.mult(f, inv[i][k]));
                }
            }
        }

        // the elimination ran on the transposed layout, so inv[j][i] holds
        // entry (i, j) of the inverse map, which is the indexing sqrt() uses
        let mut out = Vec::with_capacity(d);
        for j in 0..d {
            let mut col = Poly::new();
            for i in 0..d {
                col.set_coeff(i, inv[j][i]);
            }
            col.strip();
            out.push(col);
        }
        Ok(out)
    }

    pub fn serialize(&self) -> Sencode {
        sencode::serialize_uints(&self.coeffs)
    }

    pub fn unserialize(s: &Sencode) -> Result<Poly> {
        Ok(Poly::from_coeffs(sencode::unserialize_uints(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    #[test]
    fn mult_mod_compatibility() {
        let fld = Gf2m::create(4).unwrap();
        let f = Poly::from_coeffs(vec![3, 0, 1, 9, 1]);
        let a = Poly::from_coeffs(vec![7, 2, 0, 5, 11, 1]);
        let b = Poly::from_coeffs(vec![1, 13, 4]);

        let mut ab = a.clone();
        ab.mult(&b, &fld);
        ab.modulo(&f, &fld);

        let mut am = a.clone();
        am.modulo(&f, &fld);
        let mut bm = b.clone();
        bm.modulo(&f, &fld);
        am.mult(&bm, &fld);
        am.modulo(&f, &fld);

        assert_eq!(ab, am);
    }

    #[test]
    fn divmod_reconstructs() {
        let fld = Gf2m::create(5).unwrap();
        let a = Poly::from_coeffs(vec![4, 9, 0, 22, 7, 1, 30]);
        let d = Poly::from_coeffs(vec![2, 0, 5, 1]);
        let (q, r) = a.divmod(&d, &fld);
        let mut back = q.clone();
        back.mult(&d, &fld);
        back.add(&r, &fld);
        let mut a2 = a.clone();
        a2.strip();
        back.strip();
        assert_eq!(back, a2);
        assert!(r.degree() < d.degree());
    }

    #[test]
    fn random_irreducible_is_irreducible() {
        let fld = Gf2m::create(6).unwrap();
        let mut rng = TestRng::new(7);
        for s in [2usize, 3, 5] {
            let p = Poly::generate_random_irreducible(s, &fld, &mut rng);
            assert_eq!(p.degree(), s as isize);
            assert!(p.is_irreducible(&fld));
        }
    }

    #[test]
    fn modular_inverse() {
        let fld = Gf2m::create(5).unwrap();
        let mut rng = TestRng::new(11);
        let m = Poly::generate_random_irreducible(4, &fld, &mut rng);
        let p = Poly::from_coeffs(vec![5, 1, 7]);

        let mut pi = p.clone();
        pi.inv(&m, &fld);
        pi.mult(&p, &fld);
        pi.modulo(&m, &fld);
        assert!(pi.is_one());
    }

    #[test]
    fn sqrt_via_companion_matrix() {
        let fld = Gf2m::create(6).unwrap();
        let mut rng = TestRng::new(3);
        let g = Poly::generate_random_irreducible(5, &fld, &mut rng);
        let sq_inv = g.compute_square_root_matrix(&fld).unwrap();

        let p = Poly::from_coeffs(vec![9, 33, 0, 61, 17]);
        let mut squared = p.clone();
        squared.square(&fld);
        squared.modulo(&g, &fld);

        let mut root = squared;
        root.sqrt(&sq_inv, &fld);

        let mut check = root;
        check.square(&fld);
        check.modulo(&g, &fld);
        let mut pm = p.clone();
        pm.modulo(&g, &fld);
        check.strip();
        pm.strip();
        assert_eq!(check, pm);
    }

    #[test]
    fn check_matrix_columns_are_inverted_supports() {
        let fld = Gf2m::create(5).unwrap();
        let mut rng = TestRng::new(15);
        let g = Poly::generate_random_irreducible(3, &fld, &mut rng);
        let h = g.compute_goppa_check_matrix(&fld);

        assert_eq!(h.width(), fld.n as usize);
        assert_eq!(h.height(), (fld.m * 3) as usize);

        for z in [0u32, 1, 9, 31] {
            let mut f = Poly::from_coeffs(vec![z, 1]);
            f.inv(&g, &fld);
            for j in 0..3usize {
                let mut c = 0u32;
                for k in 0..fld.m as usize {
                    if h.get(z as usize, j * fld.m as usize + k) {
                        c |= 1 << k;
                    }
                }
                assert_eq!(c, f.coeff(j), "column {z} coefficient {j}");
            }
        }
    }

    #[test]
    fn ext_euclid_degree_bound() {
        let fld = Gf2m::create(6).unwrap();
        let mut rng = TestRng::new(23);
        let m = Poly::generate_random_irreducible(6, &fld, &mut rng);
        let v = Poly::from_coeffs(vec![17, 4, 39, 1, 0, 8]);

        let (a, b) = v.ext_euclid(&m, &fld, 3);
        assert!(a.degree() <= 3);

        // a must equal b*v modulo m
        let mut bv = b.clone();
        bv.mult(&v, &fld);
        bv.modulo(&m, &fld);
        let mut am = a.clone();
        am.modulo(&m, &fld);
        bv.strip();
        am.strip();
        assert_eq!(bv, am);
    }
}
