//!
//! Polynomial helpers for transfer functions and deconvolution.
//!
//! Unless stated otherwise, coefficient vectors are ordered from the highest
//! power down, which for an LTI system is the same as z^0, z^-1, z^-2, ...
//!
use std::ops::{AddAssign, Mul};

use num_traits::Zero;

use crate::error::{DspError, Result};
use crate::utils::C64;

const ROOT_MAX_ITERATIONS: usize = 2000;
const ROOT_TOLERANCE: f64 = 1e-14;

/// Multiply 2 polynomials (represented as vectors) together
///
/// BORING MATH:
/// To multiply polynomials, multiply coefficient pairs between v1 and v2.
/// v_out[k] = v1[0]*v2[k] + v1[1]*v2[k-1] + ... + v1[k]*v2[0]
pub fn multiply<T>(v1: &[T], v2: &[T]) -> Vec<T>
where T: AddAssign + Mul<Output=T> + Zero + Copy {
    if v1.is_empty() || v2.is_empty() {
        return vec![];
    }
    let mut vout = vec![T::zero(); v1.len() + v2.len() - 1];
    for (i1, &x1) in v1.iter().enumerate() {
        for (i2, &x2) in v2.iter().enumerate() {
            vout[i1+i2] += x1 * x2;
        }
    }
    vout
}

/// Add 2 polynomials aligned at their first (z^0) coefficient.
///
/// The longer one is used as the accumulator.
pub fn add(v1: &[f64], v2: &[f64]) -> Vec<f64> {
    let (longer, shorter) = if v1.len() >= v2.len() { (v1, v2) } else { (v2, v1) };
    let mut acc = longer.to_vec();
    for (a, b) in acc.iter_mut().zip(shorter) {
        *a += b;
    }
    acc
}

/// Polynomial long division: returns (quotient, remainder).
///
/// The remainder has `divisor.len() - 1` coefficients (the low-order ones).
pub fn divide(dividend: &[f64], divisor: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let lead = match divisor.first() {
        Some(&d) if d.abs() > 1e-12 => d,
        _ => return Err(DspError::degenerate("divisor has a zero leading coefficient")),
    };
    if divisor.len() > dividend.len() {
        return Ok((vec![0.0], dividend.to_vec()));
    }
    let qlen = dividend.len() - divisor.len() + 1;
    let mut rem = dividend.to_vec();
    let mut quotient = vec![0.0; qlen];
    for i in 0..qlen {
        let coef = rem[i] / lead;
        quotient[i] = coef;
        for (j, &d) in divisor.iter().enumerate() {
            rem[i + j] -= coef * d;
        }
    }
    Ok((quotient, rem.split_off(qlen)))
}

/// Evaluate a polynomial (highest power first) at `z` (Horner's scheme)
pub fn evaluate(coeffs: &[f64], z: C64) -> C64 {
    coeffs.iter().fold(C64::zero(), |acc, &c| acc * z + c)
}

/// Evaluate sum{i}( coeffs[i] z^i ) (lowest power first)
pub fn evaluate_ascending(coeffs: &[f64], z: C64) -> C64 {
    coeffs.iter().rev().fold(C64::zero(), |acc, &c| acc * z + c)
}

fn evaluate_complex(coeffs: &[C64], z: C64) -> C64 {
    coeffs.iter().fold(C64::zero(), |acc, &c| acc * z + c)
}

/// Expand prod{i}(z - roots[i]) into coefficients (highest power first)
pub fn from_roots(roots: &[C64]) -> Vec<C64> {
    let mut poly = vec![C64::new(1.0, 0.0)];
    for &r in roots {
        poly = multiply(&poly, &[C64::new(1.0, 0.0), -r]);
    }
    poly
}

/// Real parts of `from_roots` (exact when complex roots come in conjugate pairs)
pub fn from_roots_real(roots: &[C64]) -> Vec<f64> {
    from_roots(roots).into_iter().map(|c| c.re).collect()
}

/// Roots of a real polynomial (highest power first).
///
/// Leading zero coefficients are dropped (roots at infinity), trailing zeros
/// give exact roots at the origin, and the rest are found with simultaneous
/// Durand-Kerner iteration followed by a couple of Newton polishing steps.
pub fn roots(coeffs: &[f64]) -> Vec<C64> {
    let start = match coeffs.iter().position(|c| *c != 0.0) {
        Some(s) => s,
        None => return vec![],
    };
    let mut poly = &coeffs[start..];
    let mut found = Vec::with_capacity(poly.len());
    while poly.len() > 1 && poly[poly.len() - 1] == 0.0 {
        poly = &poly[..poly.len() - 1];
        found.push(C64::zero());
    }
    let degree = poly.len() - 1;
    if degree == 0 {
        return found;
    }

    let monic: Vec<C64> = poly.iter().map(|&c| C64::new(c / poly[0], 0.0)).collect();
    if degree == 1 {
        found.push(-monic[1]);
        return found;
    }

    // initial guesses spread on a circle of the Cauchy-bound-ish radius
    let radius = monic[1..].iter().map(|c| c.norm()).fold(0.0, f64::max).powf(1.0 / degree as f64).max(0.5);
    let mut z: Vec<C64> = (0..degree)
        .map(|k| C64::from_polar(radius, std::f64::consts::TAU * k as f64 / degree as f64 + 0.4))
        .collect();

    for _ in 0..ROOT_MAX_ITERATIONS {
        let mut max_step: f64 = 0.0;
        for i in 0..degree {
            let num = evaluate_complex(&monic, z[i]);
            let mut den = C64::new(1.0, 0.0);
            for j in 0..degree {
                if j != i {
                    den *= z[i] - z[j];
                }
            }
            if den.norm() < f64::MIN_POSITIVE {
                // coincident guesses: nudge apart
                z[i] += C64::new(1e-8, 1e-8);
                max_step = f64::INFINITY;
                continue;
            }
            let step = num / den;
            z[i] -= step;
            max_step = max_step.max(step.norm() / z[i].norm().max(1.0));
        }
        if max_step < ROOT_TOLERANCE {
            break;
        }
    }

    // Newton polishing against the original polynomial
    let derivative: Vec<C64> = monic[..degree]
        .iter()
        .enumerate()
        .map(|(i, &c)| c * (degree - i) as f64)
        .collect();
    for root in z.iter_mut() {
        for _ in 0..3 {
            let d = evaluate_complex(&derivative, *root);
            if d.norm() < 1e-12 {
                break;
            }
            let step = evaluate_complex(&monic, *root) / d;
            if !step.re.is_finite() || !step.im.is_finite() {
                break;
            }
            *root -= step;
        }
        if root.im.abs() < 1e-10 * (1.0 + root.re.abs()) {
            root.im = 0.0;
        }
    }

    found.extend(z);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sorted(mut r: Vec<C64>) -> Vec<C64> {
        r.sort_by(|a, b| a.re.total_cmp(&b.re).then(a.im.total_cmp(&b.im)));
        r
    }

    #[test]
    fn test_multiply() {
        // (1 + 2x)(3 - x + x^2)
        let p = multiply(&[1.0, 2.0], &[3.0, -1.0, 1.0]);
        assert_eq!(p, vec![3.0, 5.0, -1.0, 2.0]);
        assert!(multiply::<f64>(&[], &[1.0]).is_empty());
    }

    #[test]
    fn test_add() {
        assert_eq!(add(&[1.0, 2.0], &[0.5, 0.5, 3.0]), vec![1.5, 2.5, 3.0]);
        assert_eq!(add(&[1.0], &[]), vec![1.0]);
    }

    #[test]
    fn test_divide_exact() {
        let p = multiply(&[1.0, -3.0, 2.0], &[2.0, 1.0]);
        let (q, r) = divide(&p, &[2.0, 1.0]).unwrap();
        assert_abs_diff_eq!(q[..], [1.0, -3.0, 2.0][..], epsilon = 1e-12);
        assert_abs_diff_eq!(r[..], [0.0][..], epsilon = 1e-12);
    }

    #[test]
    fn test_divide_with_remainder() {
        // x^2 + 1 = (x - 1)(x + 1) + 2
        let (q, r) = divide(&[1.0, 0.0, 1.0], &[1.0, -1.0]).unwrap();
        assert_abs_diff_eq!(q[..], [1.0, 1.0][..], epsilon = 1e-12);
        assert_abs_diff_eq!(r[..], [2.0][..], epsilon = 1e-12);
        assert!(divide(&[1.0, 2.0], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_roots_real_and_complex() {
        // (z - 2)(z + 0.5)(z^2 + 1)
        let p = multiply(&multiply(&[1.0, -2.0], &[1.0, 0.5]), &[1.0, 0.0, 1.0]);
        let r = sorted(roots(&p));
        let expected = [
            C64::new(-0.5, 0.0), C64::new(0.0, -1.0), C64::new(0.0, 1.0), C64::new(2.0, 0.0),
        ];
        for (a, b) in r.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-9);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_roots_at_origin_and_infinity() {
        // leading zero is dropped, trailing zero is a root at 0
        let r = sorted(roots(&[0.0, 1.0, -1.0, 0.0]));
        assert_eq!(r.len(), 2);
        assert_abs_diff_eq!(r[0].norm(), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(r[1].re, 1.0, epsilon = 1e-12);
        assert!(roots(&[0.0, 0.0]).is_empty());
        assert!(roots(&[3.0]).is_empty());
    }

    #[test]
    fn test_from_roots_inverts_roots() {
        let p = [2.0, -1.0, 0.5, 0.25, -0.125];
        let r = roots(&p);
        let back = from_roots_real(&r);
        for (a, b) in back.iter().zip(p.iter()) {
            assert_abs_diff_eq!(*a * p[0], *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_evaluate() {
        let z = C64::new(0.0, 1.0);
        // z^2 + 1 at j is 0
        assert_abs_diff_eq!(evaluate(&[1.0, 0.0, 1.0], z).norm(), 0.0, epsilon = 1e-15);
        // 1 + 2z at z=3 is 7
        assert_abs_diff_eq!(evaluate_ascending(&[1.0, 2.0], C64::new(3.0, 0.0)).re, 7.0);
    }
}
