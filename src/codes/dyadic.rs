//! Quasi-dyadic block arithmetic.
//!
//! A 2^T-sized dyadic matrix is fully described by its first row, so block
//! products reduce to Walsh-Hadamard transforms over the integers: lift
//! both signatures to Z, transform, multiply pointwise, transform back and
//! keep bit 2^T of every entry. A dyadic block over GF(2) is invertible
//! iff its signature has odd weight, and is then its own inverse.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::rng::Prng;

/// In-place Walsh-Hadamard transform; `x.len()` must be a power of two.
fn fwht(x: &mut [i32]) {
    let s = x.len();
    let mut bs = s >> 1;
    while bs > 0 {
        for i in 0..s {
            if (i / bs) & 1 == 1 {
                let a = x[i - bs];
                let b = x[i];
                x[i - bs] = a + b;
                x[i] = a - b;
            }
        }
        bs >>= 1;
    }
}

/// out = signature of (dyadic(a) * dyadic(b)); all three must have equal
/// power-of-two sizes.
pub fn dyadic_multiply(a: &BitVec, b: &BitVec, out: &mut BitVec) {
    let size = a.size();
    debug_assert!(size.is_power_of_two());
    debug_assert_eq!(size, b.size());

    let mut ta: Vec<i32> = (0..size).map(|i| a.get(i) as i32).collect();
    let mut tb: Vec<i32> = (0..size).map(|i| b.get(i) as i32).collect();
    fwht(&mut ta);
    fwht(&mut tb);
    for (x, y) in ta.iter_mut().zip(tb.iter()) {
        *x *= y;
    }
    fwht(&mut ta);

    let bitpos = size as i32;
    out.resize(size, false);
    for (i, &v) in ta.iter().enumerate() {
        out.set(i, v & bitpos != 0);
    }
}

/// Blockwise Gauss-Jordan on a matrix of dyadic signatures
/// (`mat[column][row]`), ending in right echelon form: identity on the
/// right square, the public-key part on the left. Fails when some pivot
/// column has no odd-weight block.
pub fn qd_to_right_echelon_form(mat: &mut [Vec<BitVec>]) -> Result<()> {
    let w = mat.len();
    if w == 0 {
        return Err(Error::BadInput("empty block matrix"));
    }
    let h = mat[0].len();
    if h == 0 {
        return Err(Error::BadInput("empty block matrix"));
    }
    let bs = mat[0][0].size();
    let mut tmp = BitVec::with_size(bs);

    for i in 0..h {
        // find an invertible block in the pivot column
        let mut piv = None;
        for j in i..h {
            if mat[w - h + i][j].hamming_weight() % 2 == 1 {
                piv = Some(j);
                break;
            }
        }
        let piv = piv.ok_or(Error::Crypto("no invertible pivot block"))?;

        if piv > i {
            for k in 0..w {
                mat[k].swap(i, piv);
            }
        }

        for j in i..h {
            let weight = mat[w - h + i][j].hamming_weight();
            if weight == 0 {
                continue;
            }
            if weight % 2 == 0 {
                // singular block, regularize it with the pivot row
                for k in 0..w {
                    let src = mat[k][i].clone();
                    mat[k][j].add(&src);
                }
            }

            // multiply the row by the (self-inverse) block
            for k in 0..w {
                if k == w - h + i {
                    continue;
                }
                dyadic_multiply(&mat[w - h + i][j], &mat[k][j], &mut tmp);
                mat[k][j] = tmp.clone();
            }
            dyadic_multiply(&mat[w - h + i][j], &mat[w - h + i][j], &mut tmp);
            mat[w - h + i][j] = tmp.clone();

            // clear the column below the diagonal
            if j > i {
                for k in 0..w {
                    let src = mat[k][i].clone();
                    mat[k][j].add(&src);
                }
            }
        }
    }

    for i in 0..h {
        // normalize the diagonal from the bottom right up
        for k in 0..w - i {
            dyadic_multiply(&mat[w - i - 1][h - i - 1], &mat[k][h - i - 1], &mut tmp);
            mat[k][h - i - 1] = tmp.clone();
        }

        // zero everything above
        for j in i + 1..h {
            let weight = mat[w - i - 1][h - j - 1].hamming_weight();
            if weight == 0 {
                continue;
            }
            if weight % 2 == 0 {
                for k in 0..w {
                    let src = mat[k][h - i - 1].clone();
                    mat[k][h - j - 1].add(&src);
                }
            }
            for k in 0..w - i {
                dyadic_multiply(&mat[w - i - 1][h - j - 1], &mat[k][h - j - 1], &mut tmp);
                mat[k][h - j - 1] = tmp.clone();
            }
            for k in 0..w {
                let src = mat[k][h - i - 1].clone();
                mat[k][h - j - 1].add(&src);
            }
        }
    }

    Ok(())
}

/// Pick a fresh nonzero value below `limit`, remembering it in `used`.
pub fn choose_random(limit: u32, rng: &mut dyn Prng, used: &mut HashSet<u32>) -> Option<u32> {
    if used.len() as u32 >= limit - 1 {
        return None;
    }
    loop {
        let a = 1 + rng.random(limit - 1);
        if used.insert(a) {
            return Some(a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    fn sig(bits: &[u8]) -> BitVec {
        let mut v = BitVec::with_size(bits.len());
        for (i, &b) in bits.iter().enumerate() {
            v.set(i, b != 0);
        }
        v
    }

    /// Dumb reference: expand both signatures into full dyadic matrices,
    /// multiply over GF(2), read the first row back.
    fn slow_dyadic_multiply(a: &BitVec, b: &BitVec) -> BitVec {
        let n = a.size();
        let mut out = BitVec::with_size(n);
        for c in 0..n {
            let mut acc = false;
            for k in 0..n {
                acc ^= a.get(k) & b.get(k ^ c);
            }
            out.set(c, acc);
        }
        out
    }

    #[test]
    fn fwht_multiply_matches_naive() {
        let mut rng = TestRng::new(4);
        for _ in 0..20 {
            let mut a = BitVec::with_size(16);
            let mut b = BitVec::with_size(16);
            for i in 0..16 {
                a.set(i, rng.random(2) == 1);
                b.set(i, rng.random(2) == 1);
            }
            let mut fast = BitVec::new();
            dyadic_multiply(&a, &b, &mut fast);
            assert_eq!(fast, slow_dyadic_multiply(&a, &b));
        }
    }

    #[test]
    fn odd_weight_blocks_self_invert() {
        let a = sig(&[1, 1, 1, 0]);
        let mut sq = BitVec::new();
        dyadic_multiply(&a, &a, &mut sq);
        // odd weight: a*a = I
        assert!(sq.get(0));
        assert_eq!(sq.hamming_weight(), 1);

        let b = sig(&[1, 1, 0, 0]);
        let mut sq = BitVec::new();
        dyadic_multiply(&b, &b, &mut sq);
        // even weight: a*a = 0
        assert!(sq.is_zero());
    }

    #[test]
    fn echelon_form_produces_identity_right_square() {
        let mut rng = TestRng::new(10);
        let bs = 8usize;
        let w = 5usize;
        let h = 2usize;

        loop {
            let mut mat: Vec<Vec<BitVec>> = (0..w)
                .map(|_| {
                    (0..h)
                        .map(|_| {
                            let mut v = BitVec::with_size(bs);
                            for i in 0..bs {
                                v.set(i, rng.random(2) == 1);
                            }
                            v
                        })
                        .collect()
                })
                .collect();

            if qd_to_right_echelon_form(&mut mat).is_err() {
                continue;
            }

            // right square must be the blockwise identity
            for i in 0..h {
                for j in 0..h {
                    let blk = &mat[w - h + i][j];
                    if i == j {
                        assert!(blk.get(0));
                        assert_eq!(blk.hamming_weight(), 1);
                    } else {
                        assert!(blk.is_zero());
                    }
                }
            }
            break;
        }
    }

    #[test]
    fn choose_random_is_disjoint() {
        let mut rng = TestRng::new(5);
        let mut used = HashSet::new();
        let mut seen = Vec::new();
        for _ in 0..7 {
            let v = choose_random(8, &mut rng, &mut used).unwrap();
            assert!(v >= 1 && v < 8);
            assert!(!seen.contains(&v));
            seen.push(v);
        }
        assert!(choose_random(8, &mut rng, &mut used).is_none());
    }
}
