//! Permutations as transposition tables: `p[i]` is the image of `i`.

use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::matrix::Matrix;
use crate::rng::Prng;
use crate::sencode::{self, Sencode};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permutation {
    map: Vec<usize>,
}

impl Permutation {
    pub fn identity(n: usize) -> Permutation {
        Permutation {
            map: (0..n).collect(),
        }
    }

    pub fn random(n: usize, rng: &mut dyn Prng) -> Permutation {
        let mut p = Permutation::identity(n);
        // knuth shuffle
        for i in (1..n).rev() {
            let j = rng.random(i as u32 + 1) as usize;
            p.map.swap(i, j);
        }
        p
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn image(&self, i: usize) -> usize {
        self.map[i]
    }

    pub fn inversion(&self) -> Permutation {
        let mut r = vec![0; self.map.len()];
        for (i, &pi) in self.map.iter().enumerate() {
            r[pi] = i;
        }
        Permutation { map: r }
    }

    /// r[p[i]] = a[i]
    pub fn permute<T: Clone>(&self, a: &[T]) -> Vec<T> {
        let mut r = a.to_vec();
        for (i, &pi) in self.map.iter().enumerate() {
            r[pi] = a[i].clone();
        }
        r
    }

    /// r[i] = a[p[i]]
    pub fn permute_inv<T: Clone>(&self, a: &[T]) -> Vec<T> {
        let mut r = a.to_vec();
        for (i, &pi) in self.map.iter().enumerate() {
            r[i] = a[pi].clone();
        }
        r
    }

    pub fn permute_bits(&self, a: &BitVec) -> BitVec {
        let mut r = BitVec::with_size(a.size());
        for (i, &pi) in self.map.iter().enumerate() {
            if a.get(i) {
                r.set(pi, true);
            }
        }
        r
    }

    pub fn permute_bits_inv(&self, a: &BitVec) -> BitVec {
        let mut r = BitVec::with_size(a.size());
        for (i, &pi) in self.map.iter().enumerate() {
            if a.get(pi) {
                r.set(i, true);
            }
        }
        r
    }

    pub fn permute_cols(&self, a: &Matrix) -> Matrix {
        Matrix::from_cols(self.permute(a.cols()))
    }

    /// Dyadic permutation of a power-of-two sized sequence: walking the
    /// elements in order while XOR-flipping the lowest unset-carry bit of
    /// the signature visits every position exactly once.
    pub fn permute_dyadic<T: Clone + Default>(sig: usize, a: &[T]) -> Option<Vec<T>> {
        if !a.len().is_power_of_two() || sig >= a.len() {
            return None;
        }

        let mut r = vec![T::default(); a.len()];
        let mut sig = sig;
        for (i, item) in a.iter().enumerate() {
            r[sig] = item.clone();

            let mut t = i + 1;
            let mut x = 1;
            while t & 1 == 0 {
                t >>= 1;
                x <<= 1;
            }
            sig ^= x;
        }
        Some(r)
    }

    pub fn serialize(&self) -> Sencode {
        sencode::serialize_uints(&self.map.iter().map(|&i| i as u32).collect::<Vec<_>>())
    }

    pub fn unserialize(s: &Sencode) -> Result<Permutation> {
        let v = sencode::unserialize_uints(s)?;
        let map: Vec<usize> = v.into_iter().map(|i| i as usize).collect();
        for &i in &map {
            if i >= map.len() {
                return Err(Error::Malformed("permutation index out of range"));
            }
        }
        Ok(Permutation { map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    #[test]
    fn inversion_composes_to_identity() {
        let mut rng = TestRng::new(2);
        let p = Permutation::random(20, &mut rng);
        let pi = p.inversion();
        let data: Vec<usize> = (100..120).collect();
        assert_eq!(pi.permute(&p.permute(&data)), data);
        assert_eq!(p.permute_inv(&p.permute(&data)), data);
    }

    #[test]
    fn bit_permutation_matches_slice_permutation() {
        let mut rng = TestRng::new(9);
        let p = Permutation::random(13, &mut rng);
        let mut v = BitVec::with_size(13);
        for i in [0usize, 3, 4, 7, 12] {
            v.set(i, true);
        }
        let pv = p.permute_bits(&v);
        for i in 0..13 {
            assert_eq!(pv.get(p.image(i)), v.get(i));
        }
        assert_eq!(p.permute_bits_inv(&pv), v);
    }

    #[test]
    fn dyadic_permutation() {
        let a: Vec<u32> = (0..8).collect();
        // the walk visits sig ^ gray(i) at step i
        assert_eq!(
            Permutation::permute_dyadic(0, &a).unwrap(),
            vec![0, 1, 3, 2, 7, 6, 4, 5]
        );
        assert_eq!(
            Permutation::permute_dyadic(5, &a).unwrap(),
            vec![6, 7, 5, 4, 1, 0, 2, 3]
        );
        // every signature yields a bijection
        for sig in 0..8usize {
            let p = Permutation::permute_dyadic(sig, &a).unwrap();
            let mut seen = [false; 8];
            for &v in &p {
                assert!(!std::mem::replace(&mut seen[v as usize], true));
            }
        }
        // non-power-of-two or out-of-range signatures fail
        assert!(Permutation::permute_dyadic::<u32>(0, &[1, 2, 3]).is_none());
        assert!(Permutation::permute_dyadic(8, &a).is_none());
    }

    #[test]
    fn unserialize_checks_bounds() {
        let s = sencode::serialize_uints(&[0, 3, 1]);
        assert!(Permutation::unserialize(&s).is_err());
    }
}
