//!
//! Random helper functions are defined here,
//! mostly related to math.
//!
use std::f64::consts::{PI, TAU};
use std::ops::{Add, MulAssign};

use itertools::{EitherOrBoth, Itertools};
use num_traits::{AsPrimitive, Num};
use rustfft::num_complex::Complex;

use crate::error::{DspError, Result};

pub type Float = f32; // sample type used for all signal processing
pub type CFloat = Complex<Float>;
pub type C64 = Complex<f64>; // coefficient-domain complex type (zeros, poles, responses)

/// Root-mean-square average of a vector
pub fn rms<T,R>(vals: &[T]) -> R
where T:Num+Copy+AsPrimitive<R>, R:'static+num_traits::Float {
    if vals.is_empty() {
        return R::zero();
    }
    let e: R = energy(vals).as_();
    let n: R = R::from(vals.len()).unwrap_or(R::one());
    (e / n).sqrt()
}

/// Signal energy
pub fn energy<T:Num+Copy>(vals: &[T]) -> T {
    vals.iter()
        .fold(T::zero(), |acc, &x| acc + x*x)
}

/// Multiply a vector by a scalar (in place)
pub fn vec_scale_inplace<T>(v: &mut [T], k: T)
where T: Copy+MulAssign<T> {
    for x in v.iter_mut() {
        *x *= k;
    }
}

/// Add 2 vectors together
/// Output vec length is the max length of either input
pub fn vec_add<T>(v1: &[T], v2: &[T]) -> Vec<T>
where T: Add<Output=T> + Copy {
    v1.iter().zip_longest(v2.iter())
        .map(|it| match it {
            EitherOrBoth::Both(a,b) => *a + *b,
            EitherOrBoth::Left(a) => *a,
            EitherOrBoth::Right(b) => *b
        })
        .collect::<Vec<T>>()
}

/// normalized sinc function sin(pi x) / (pi x)
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-20 {
        1.0
    } else {
        let pi_x = x * PI;
        pi_x.sin() / pi_x
    }
}

/// Wrap a phase value into (-pi, pi]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase - TAU * (phase / TAU).round();
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Unwrap a phase sequence:
/// whenever two neighbours jump by more than `tolerance`,
/// shift every following value by a multiple of 2pi.
pub fn unwrap_phase(phase: &[f64], tolerance: f64) -> Vec<f64> {
    let mut unwrapped = phase.to_vec();
    let mut offset = 0.0;
    for i in 1..phase.len() {
        let delta = phase[i] - phase[i - 1];
        if delta > tolerance {
            offset -= TAU * ((delta - tolerance) / TAU).ceil().max(1.0);
        } else if delta < -tolerance {
            offset += TAU * ((-delta - tolerance) / TAU).ceil().max(1.0);
        }
        unwrapped[i] = phase[i] + offset;
    }
    unwrapped
}

/// Median of a scratch slice (slice gets reordered)
pub fn median(vals: &mut [Float]) -> Float {
    if vals.is_empty() {
        return 0.0;
    }
    let mid = vals.len() / 2;
    let (_, m, _) = vals.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Convert decibels to a gain multiplier
pub fn db2gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Convert a gain multiplier to decibels
pub fn gain2db(gain: f64) -> f64 {
    20.0 * gain.abs().max(1e-300).log10()
}

/// Modified Bessel function of the first kind, order 0 (power series)
pub fn bessel_i0(x: f64) -> f64 {
    let y = x * x / 4.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > sum * 1e-16 {
        term *= y / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}

/// Fail unless `n` is a nonzero power of two
pub fn check_power_of_two(what: &str, n: usize) -> Result<()> {
    if n == 0 || !n.is_power_of_two() {
        return Err(DspError::config(format!("{what} must be a power of two, got {n}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_energy() {
        let v = vec![-1.4, 0.0, 2.6, 4.5];
        assert_eq!(energy(&Vec::<Float>::new()), 0.0);
        assert_relative_eq!(energy(&v), 28.97, epsilon = 1e-12);
    }

    #[test]
    fn test_rms() {
        let v = vec![-1.4, 0.0, 2.6, 4.5];
        assert_eq!(rms::<Float,Float>(&[]), 0.0);
        assert_relative_eq!(rms::<_,f64>(&v), (28.97_f64 / 4.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_vec_add() {
        let v1 = vec![-8.24, -6.36, 9.53, 4.39];
        let v2 = vec![5.45, -6.68, 8.46, -11.54];
        let v3 = vec![-8.39, 3.56, 16.68];
        let v4 = vec![-7.17, -10.99, -2.48, -12.46, 0.17];

        // same length
        assert_relative_eq!(
            vec_add(&v1, &v2)[..],
            vec![-2.79, -13.04, 17.99, -7.15][..], epsilon = 1e-12);
        // RHS is shorter
        assert_relative_eq!(
            vec_add(&v2, &v3)[..],
            vec![-2.94, -3.12, 25.14, -11.54][..], epsilon = 1e-12);
        // RHS is longer
        assert_relative_eq!(
            vec_add(&v2, &v4)[..],
            vec![-1.72, -17.67, 5.98, -24.0, 0.17][..], epsilon = 1e-12);
    }

    #[test]
    fn test_sinc() {
        assert_eq!(sinc(0.0), 1.0);
        assert_abs_diff_eq!(sinc(1.0), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(sinc(0.5), 2.0 / PI, epsilon = 1e-15);
    }

    #[test]
    fn test_wrap_phase() {
        assert_abs_diff_eq!(wrap_phase(3.0 * PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(0.25 + TAU * 4.0), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_unwrap_phase() {
        // a linear phase ramp, wrapped
        let ramp: Vec<f64> = (0..50).map(|i| i as f64 * 0.7).collect();
        let wrapped: Vec<f64> = ramp.iter().map(|&p| wrap_phase(p)).collect();
        let unwrapped = unwrap_phase(&wrapped, PI);
        for (u, r) in unwrapped.iter().zip(ramp.iter()) {
            assert_abs_diff_eq!(*u, *r, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [5.0, -1.0, 4.0, 0.0, 9.0]), 4.0);
    }

    #[test]
    fn test_db2gain() {
        assert_relative_eq!(db2gain(20.0), 10.0, epsilon = 1e-12);
        assert_relative_eq!(gain2db(db2gain(-6.0)), -6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bessel_i0() {
        assert_eq!(bessel_i0(0.0), 1.0);
        assert_relative_eq!(bessel_i0(1.0), 1.2660658777520082, epsilon = 1e-12);
    }

    #[test]
    fn test_check_power_of_two() {
        assert!(check_power_of_two("fft size", 512).is_ok());
        assert!(check_power_of_two("fft size", 0).is_err());
        assert!(check_power_of_two("fft size", 300).is_err());
    }
}
