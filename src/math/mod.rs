//! Algebra underneath the code-based schemes: GF(2^m), GF(2) vectors and
//! matrices, polynomials over the field, permutations.

pub mod bitvec;
pub mod gf2m;
pub mod matrix;
pub mod perm;
pub mod poly;
