//! Syndrome decoding: error-locator construction for Goppa and alternant
//! codes, and root finding through Berlekamp trace splitting.

use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::math::gf2m::Gf2m;
use crate::math::poly::Poly;

/// Error locator for the classical binary Goppa case:
/// sigma = a^2 + x*b^2 where a/b = sqrt(1/s + x) mod g.
pub fn goppa_error_locator(syndrome: &Poly, fld: &Gf2m, goppa: &Poly, sq_inv: &[Poly]) -> Poly {
    if syndrome.is_zero() {
        return Poly::constant(1); // no roots, no errors
    }

    let mut v = syndrome.clone();
    v.inv(goppa, fld);

    // v += x
    v.set_coeff(1, fld.add(1, v.coeff(1)));
    v.sqrt(sq_inv, fld);

    let (mut a, mut b) = v.mod_to_fraction(goppa, fld);

    a.square(fld);
    b.square(fld);
    b.shift(1);
    a.add(&b, fld);

    a.make_monic(fld);
    a
}

/// Alternant locator: Euclid on (syndrome, x^2t) stopped at degree t-1,
/// normalized to sigma(0) = 1.
pub fn alternant_error_locator(syndrome: &Poly, fld: &Gf2m, t: usize) -> Poly {
    if syndrome.is_zero() {
        return Poly::constant(1);
    }

    let x2t = Poly::x_to(2 * t);
    let (_, mut b) = syndrome.ext_euclid(&x2t, fld, t as isize - 1);

    let b0inv = fld.inv(b.coeff(0));
    for i in 0..b.len() {
        b.set_coeff(i, fld.mult(b.coeff(i), b0inv));
    }
    b
}

/// Find all roots of the locator by recursive trace splitting. The result
/// marks root positions in a field-sized bit vector; a `Crypto` error
/// means some branch could not be factored, which is distinct from the
/// locator simply having no roots.
pub fn evaluate_error_locator_trace(sigma: &Poly, fld: &Gf2m) -> Result<BitVec> {
    let m = fld.m as usize;
    let mut ev = BitVec::with_size(fld.n as usize);

    // trace_aux[j] = x^(2^j) mod sigma; trace[0] = Tr(x) mod sigma
    let mut trace_aux: Vec<Poly> = Vec::with_capacity(m);
    trace_aux.push(Poly::x_to(1));
    let mut trace: Vec<Poly> = vec![Poly::new(); m];
    trace[0] = trace_aux[0].clone();

    for j in 1..m {
        let mut t = trace_aux[j - 1].clone();
        t.square(fld);
        t.modulo(sigma, fld);
        trace[0].add(&t, fld);
        trace_aux.push(t);
    }

    let mut stack = vec![(0usize, sigma.clone())];
    let mut failed = false;

    while let Some((i, cur)) = stack.pop() {
        let deg = cur.degree();

        if deg <= 0 {
            continue;
        }
        if deg == 1 {
            let root = fld.mult(cur.coeff(0), fld.inv(cur.coeff(1)));
            ev.set(root as usize, true);
            continue;
        }

        if i >= m {
            failed = true;
            continue;
        }

        if trace[i].is_zero() {
            // lazily build trace_i(x) = sum_j trace_aux[j] * alpha^(i*2^j)
            let mut a = fld.exp_x(i as i32);
            let mut ti = Poly::new();
            for aux in trace_aux.iter() {
                ti.add_mult(aux, a, fld);
                a = fld.mult(a, a);
            }
            trace[i] = ti;
        }

        let t = cur.gcd(&trace[i], fld);
        let (q, _) = cur.divmod(&t, fld);

        stack.push((i + 1, t));
        stack.push((i + 1, q));
    }

    if failed {
        return Err(Error::Crypto("decoding failed"));
    }
    Ok(ev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{Prng, TestRng};

    #[test]
    fn trace_evaluation_finds_exact_roots() {
        let fld = Gf2m::create(6).unwrap();
        // build a polynomial with known distinct roots
        let roots = [3u32, 17, 40, 61];
        let mut sigma = Poly::constant(1);
        for &r in &roots {
            let factor = Poly::from_coeffs(vec![r, 1]);
            sigma.mult(&factor, &fld);
        }

        let ev = evaluate_error_locator_trace(&sigma, &fld).unwrap();
        assert_eq!(ev.hamming_weight(), roots.len());
        for &r in &roots {
            assert!(ev.get(r as usize));
        }
    }

    #[test]
    fn goppa_locator_roundtrip() {
        // decode a syndrome formed directly from the parity definition:
        // s(x) = sum over error positions of 1/(x - e_i) mod g
        let fld = Gf2m::create(6).unwrap();
        let mut rng = TestRng::new(31);
        let t = 3usize;
        let g = Poly::generate_random_irreducible(t, &fld, &mut rng);
        let sq_inv = g.compute_square_root_matrix(&fld).unwrap();

        let errors = [5u32, 22, 49];
        let mut synd = Poly::new();
        for &e in &errors {
            // 1/(x+e) mod g
            let mut f = Poly::from_coeffs(vec![e, 1]);
            f.inv(&g, &fld);
            synd.add(&f, &fld);
        }

        let loc = goppa_error_locator(&synd, &fld, &g, &sq_inv);
        let ev = evaluate_error_locator_trace(&loc, &fld).unwrap();

        assert_eq!(ev.hamming_weight(), errors.len());
        for &e in &errors {
            assert!(ev.get(e as usize));
        }
    }

    #[test]
    fn alternant_locator_roundtrip() {
        // syndrome of an alternant code with random support and the
        // all-ones multiplier; roots of sigma are inverses of the error
        // support elements
        let fld = Gf2m::create(6).unwrap();
        let mut rng = TestRng::new(8);
        let t = 4usize;

        let mut support = Vec::new();
        while support.len() < t {
            let c = 1 + rng.random(fld.n - 1);
            if !support.contains(&c) {
                support.push(c);
            }
        }

        let mut synd = Poly::new();
        for &l in &support {
            let mut acc = 1u32;
            for j in 0..2 * t {
                synd.set_coeff(j, fld.add(synd.coeff(j), acc));
                acc = fld.mult(acc, l);
            }
        }

        let loc = alternant_error_locator(&synd, &fld, t);
        let ev = evaluate_error_locator_trace(&loc, &fld).unwrap();
        assert_eq!(ev.hamming_weight(), t);
        for &l in &support {
            assert!(ev.get(fld.inv(l) as usize));
        }
    }

    #[test]
    fn zero_syndrome_has_no_roots() {
        let fld = Gf2m::create(5).unwrap();
        let loc = alternant_error_locator(&Poly::new(), &fld, 2);
        assert!(loc.is_one());
        let ev = evaluate_error_locator_trace(&loc, &fld).unwrap();
        assert!(ev.is_zero());
    }
}
