//! Matrices over GF(2), stored as a vector of bit-vector columns.

use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::perm::Permutation;
use crate::rng::Prng;
use crate::sencode::Sencode;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Matrix {
    cols: Vec<BitVec>,
}

impl Matrix {
    pub fn new() -> Matrix {
        Matrix::default()
    }

    pub fn from_cols(cols: Vec<BitVec>) -> Matrix {
        Matrix { cols }
    }

    pub fn with_size(w: usize, h: usize) -> Matrix {
        Matrix {
            cols: vec![BitVec::with_size(h); w],
        }
    }

    pub fn identity(n: usize) -> Matrix {
        let mut m = Matrix::with_size(n, n);
        for i in 0..n {
            m.cols[i].set(i, true);
        }
        m
    }

    pub fn width(&self) -> usize {
        self.cols.len()
    }

    pub fn height(&self) -> usize {
        self.cols.first().map_or(0, |c| c.size())
    }

    #[inline]
    pub fn col(&self, i: usize) -> &BitVec {
        &self.cols[i]
    }

    #[inline]
    pub fn col_mut(&mut self, i: usize) -> &mut BitVec {
        &mut self.cols[i]
    }

    pub fn cols(&self) -> &[BitVec] {
        &self.cols
    }

    pub fn push_col(&mut self, c: BitVec) {
        self.cols.push(c);
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.cols[x].get(y)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: bool) {
        self.cols[x].set(y, v);
    }

    pub fn transpose(&self) -> Matrix {
        let h = self.height();
        let w = self.width();
        let mut r = Matrix::with_size(h, w);
        for i in 0..h {
            for j in 0..w {
                if self.cols[j].get(i) {
                    r.cols[i].set(j, true);
                }
            }
        }
        r
    }

    /// self * right, the schoolbook way over transposed rows.
    pub fn mult(&self, right: &Matrix) -> Matrix {
        let left_t = self.transpose();
        let w = right.width();
        let h = left_t.width();
        let mut r = Matrix::with_size(w, h);
        for i in 0..w {
            for j in 0..h {
                if left_t.cols[j].dot(&right.cols[i]) {
                    r.cols[i].set(j, true);
                }
            }
        }
        r
    }

    /// a^T * M; the result has one bit per column.
    pub fn mult_vec_left(&self, a: &BitVec) -> Result<BitVec> {
        if a.size() != self.height() {
            return Err(Error::BadInput("vector size does not match matrix height"));
        }
        let mut r = BitVec::with_size(self.width());
        for (i, col) in self.cols.iter().enumerate() {
            if col.dot(a) {
                r.set(i, true);
            }
        }
        Ok(r)
    }

    /// M * a; a is indexed by columns.
    pub fn mult_vec_right(&self, a: &BitVec) -> Result<BitVec> {
        if a.size() != self.width() {
            return Err(Error::BadInput("vector size does not match matrix width"));
        }
        let mut r = BitVec::with_size(self.height());
        for (i, col) in self.cols.iter().enumerate() {
            if a.get(i) {
                r.add(col);
            }
        }
        Ok(r)
    }

    /// Gauss-Jordan inversion; the triangular flags skip elimination passes
    /// that are known to be zero. Fails on singular input.
    pub fn invert(&self, upper_tri: bool, lower_tri: bool) -> Result<Matrix> {
        let s = self.width();
        if s != self.height() {
            return Err(Error::BadInput("inverting a non-square matrix"));
        }

        // work on transposed copies for simpler row ops
        let mut m = self.transpose().cols;
        let mut r = Matrix::identity(s).cols;

        // gauss step, clear everything below the diagonal
        if !upper_tri {
            for i in 0..s {
                if !m[i].get(i) {
                    let mut j = i + 1;
                    while j < s && !m[j].get(i) {
                        j += 1;
                    }
                    if j == s {
                        return Err(Error::Crypto("singular matrix"));
                    }
                    m.swap(i, j);
                    r.swap(i, j);
                }
                for j in i + 1..s {
                    if m[j].get(i) {
                        if lower_tri {
                            let (mi, mj) = src_dst(&mut m, i, j);
                            mj.add_range(mi, 0, j + 1);
                            let (ri, rj) = src_dst(&mut r, i, j);
                            rj.add_range(ri, 0, j + 1);
                        } else {
                            let (mi, mj) = src_dst(&mut m, i, j);
                            mj.add(mi);
                            let (ri, rj) = src_dst(&mut r, i, j);
                            rj.add(ri);
                        }
                    }
                }
            }
        }

        // jordan step
        if !lower_tri {
            for i in (1..=s).rev() {
                for j in (1..i).rev() {
                    if m[j - 1].get(i - 1) {
                        if upper_tri {
                            let (ri, rj) = src_dst(&mut r, i - 1, j - 1);
                            rj.add_range(ri, i - 1, s);
                        } else {
                            let (ri, rj) = src_dst(&mut r, i - 1, j - 1);
                            rj.add(ri);
                        }
                    }
                }
            }
        }

        Ok(Matrix::from_cols(r).transpose())
    }

    pub fn set_block(&mut self, x: usize, y: usize, b: &Matrix) -> Result<()> {
        if self.width() < x + b.width() || self.height() < y + b.height() {
            return Err(Error::BadInput("block does not fit into matrix"));
        }
        for i in 0..b.width() {
            for j in 0..b.height() {
                self.cols[x + i].set(y + j, b.cols[i].get(j));
            }
        }
        Ok(())
    }

    /// Rightmost height-by-height block.
    pub fn right_square(&self) -> Result<Matrix> {
        let h = self.height();
        let w = self.width();
        if w < h {
            return Err(Error::BadInput("matrix too narrow"));
        }
        Ok(Matrix::from_cols(self.cols[w - h..].to_vec()))
    }

    /// Everything but the rightmost square block.
    pub fn strip_right_square(&self) -> Result<Matrix> {
        let h = self.height();
        let w = self.width();
        if w < h {
            return Err(Error::BadInput("matrix too narrow"));
        }
        Ok(Matrix::from_cols(self.cols[..w - h].to_vec()))
    }

    /// Prepend a height-sized identity on the left.
    pub fn extend_left_compact(&self) -> Matrix {
        let h = self.height();
        let mut r = Matrix::identity(h);
        r.cols.extend(self.cols.iter().cloned());
        r
    }

    /// Systematic Goppa generator from a check matrix, per the standard
    /// permute / invert-right-square / multiply / strip construction.
    /// Singular right squares surface as errors so the caller can retry
    /// with a fresh permutation.
    pub fn goppa_generator(&self, p: &Permutation) -> Result<Matrix> {
        let t = p.permute_cols(self);
        let sinv = t.right_square()?;
        let s = sinv.invert(false, false)?;
        let st = s.mult(&t);
        let stripped = st.strip_right_square()?;
        Ok(stripped.transpose().extend_left_compact())
    }

    pub fn goppa_generator_random(
        &self,
        rng: &mut dyn Prng,
    ) -> Result<(Matrix, Permutation)> {
        let p = Permutation::random(self.width(), rng);
        let g = self.goppa_generator(&p)?;
        Ok((g, p))
    }

    /// Random invertible matrix together with its inverse, built from
    /// unit-triangular factors so the inverse comes from the cheap
    /// triangular paths: (L*U) and U^-1 * L^-1, columns shuffled afterwards.
    pub fn random_with_inversion(size: usize, rng: &mut dyn Prng) -> (Matrix, Matrix) {
        let mut l = Matrix::identity(size);
        let mut u = Matrix::identity(size);
        for c in 0..size {
            for r in 0..size {
                if r > c && rng.random(2) == 1 {
                    l.cols[c].set(r, true);
                }
                if r < c && rng.random(2) == 1 {
                    u.cols[c].set(r, true);
                }
            }
        }

        let m = l.mult(&u);
        let li = l.invert(false, true).expect("unit triangular is invertible");
        let ui = u.invert(true, false).expect("unit triangular is invertible");
        let mi = ui.mult(&li);

        // shuffle columns of m; compensate on the rows of the inverse
        let p = Permutation::random(size, rng);
        let shuffled = p.permute_cols(&m);
        let mut inv_cols = Vec::with_capacity(size);
        for c in mi.cols {
            inv_cols.push(p.permute_bits(&c));
        }
        (shuffled, Matrix::from_cols(inv_cols))
    }

    /// Bits packed column-major, LSB-first in every byte.
    pub fn serialize(&self) -> Sencode {
        let w = self.width();
        let h = self.height();
        let bits = w * h;
        let mut bytes = vec![0u8; (bits + 7) / 8];
        for i in 0..bits {
            if self.cols[i / h].get(i % h) {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        Sencode::list(vec![
            Sencode::Int(w as u32),
            Sencode::Int(h as u32),
            Sencode::Bytes(bytes),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<Matrix> {
        let items = s.as_list_of(3)?;
        let w = items[0].as_int()? as usize;
        let h = items[1].as_int()? as usize;
        let bytes = items[2].as_bytes()?;
        if bytes.len() != (w * h + 7) / 8 {
            return Err(Error::Malformed("matrix size mismatch"));
        }
        if h == 0 && w != 0 {
            return Err(Error::Malformed("matrix with empty columns"));
        }
        let mut m = Matrix::with_size(w, h);
        for i in 0..w * h {
            if (bytes[i / 8] >> (i % 8)) & 1 != 0 {
                m.cols[i / h].set(i % h, true);
            }
        }
        Ok(m)
    }
}

/// Shared source row and mutable destination row, in either index order.
fn src_dst<'a>(v: &'a mut [BitVec], src: usize, dst: usize) -> (&'a BitVec, &'a mut BitVec) {
    debug_assert!(src != dst);
    if src < dst {
        let (a, b) = v.split_at_mut(dst);
        (&a[src], &mut b[0])
    } else {
        let (a, b) = v.split_at_mut(src);
        (&b[0], &mut a[dst])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::gf2m::Gf2m;
    use crate::math::poly::Poly;
    use crate::rng::TestRng;

    fn random_matrix(w: usize, h: usize, rng: &mut TestRng) -> Matrix {
        let mut m = Matrix::with_size(w, h);
        for i in 0..w {
            for j in 0..h {
                if rng.random(2) == 1 {
                    m.set(i, j, true);
                }
            }
        }
        m
    }

    #[test]
    fn transpose_involution() {
        let mut rng = TestRng::new(5);
        let m = random_matrix(9, 5, &mut rng);
        assert_eq!(m.transpose().transpose(), m);
    }

    #[test]
    fn inversion_gives_identity() {
        let mut rng = TestRng::new(1);
        for size in [1usize, 2, 5, 17, 33] {
            let (m, mi) = Matrix::random_with_inversion(size, &mut rng);
            assert_eq!(m.mult(&mi), Matrix::identity(size));
            assert_eq!(mi.mult(&m), Matrix::identity(size));

            let direct = m.invert(false, false).unwrap();
            assert_eq!(m.mult(&direct), Matrix::identity(size));
        }
    }

    #[test]
    fn singular_matrix_fails() {
        let m = Matrix::with_size(4, 4);
        assert!(m.invert(false, false).is_err());
    }

    #[test]
    fn generator_annihilates_check_matrix() {
        // small real goppa code: the generator must be orthogonal to the
        // permuted check matrix
        let fld = Gf2m::create(5).unwrap();
        let mut rng = TestRng::new(42);
        let g = Poly::generate_random_irreducible(3, &fld, &mut rng);
        let h = g.compute_goppa_check_matrix(&fld);

        let (gen, p) = loop {
            match h.goppa_generator_random(&mut rng) {
                Ok(r) => break r,
                Err(_) => continue,
            }
        };

        let hp = p.permute_cols(&h);
        // G * Hp^T = 0, checked row against row
        let gt = gen.transpose();
        let hpt = hp.transpose();
        for grow in gt.cols() {
            for hrow in hpt.cols() {
                assert!(!grow.dot(hrow));
            }
        }
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = TestRng::new(77);
        let m = random_matrix(10, 7, &mut rng);
        let s = m.serialize();
        assert_eq!(Matrix::unserialize(&s).unwrap(), m);
    }
}
