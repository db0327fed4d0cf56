// std lib imports
use std::cell::OnceCell;
use std::f64::consts::PI;
use std::ops::{Add, Mul};
// external crates
use nalgebra::{DMatrix, DVector};
// local crates
use crate::error::{DspError, Result};
use crate::fft::Fft;
use crate::polynomial;
use crate::signal::ComplexDiscreteSignal;
use crate::utils::{check_power_of_two, C64};

pub const DEFAULT_RESPONSE_LENGTH: usize = 512;
const DEGENERATE_LEAD: f64 = 1e-10;

/* Represent LTI systems as a ratio of polynomials in z^{-1}
 *
 * BORING MATH:
 *        [b0 + b1 z^{-1} + ... + bk z^{-k}]     Y(z)
 * H(z) = __________________________________  =  ____
 *        [a0 + a1 z^{-1} + ... + am z^{-m}]     X(z)
 *
 * `numerator` holds b0..bk, `denominator` holds a0..am.
 *
 * Zeros and poles are cached on first use. Every method that changes a
 * coefficient drops the cache, and there is no other way to mutate the
 * polynomials, so the cache can't go stale.
 */
#[derive(Debug, Clone)]
pub struct TransferFunction {
    numerator: Vec<f64>,
    denominator: Vec<f64>,
    roots: OnceCell<ZerosPoles>,
}

#[derive(Debug, Clone)]
struct ZerosPoles {
    zeros: Vec<C64>,
    poles: Vec<C64>,
}

/* Single-input single-output state-space form
 *
 *   x[n+1] = A x[n] + B u[n]
 *   y[n]   = C x[n] + D u[n]
 */
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpace {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub c: DVector<f64>,
    pub d: f64,
}

impl TransferFunction {
    pub fn new(numerator: Vec<f64>, denominator: Vec<f64>) -> Result<Self> {
        if numerator.is_empty() || denominator.is_empty() {
            return Err(DspError::config("transfer function needs non-empty numerator and denominator"));
        }
        Ok(Self { numerator, denominator, roots: OnceCell::new() })
    }

    // FIR system: H(z) = kernel(z) / 1
    pub fn fir(kernel: Vec<f64>) -> Result<Self> {
        Self::new(kernel, vec![1.0])
    }

    /// Build from zeros, poles and gain:
    /// H(z) = k prod(1 - z_i z^-1) / prod(1 - p_i z^-1)
    ///
    /// Complex zeros/poles must come in conjugate pairs for the
    /// coefficients to be real; imaginary residue is discarded.
    pub fn from_zpk(zeros: &[C64], poles: &[C64], gain: f64) -> Result<Self> {
        let numerator = polynomial::from_roots_real(zeros)
            .into_iter()
            .map(|c| c * gain)
            .collect();
        let denominator = polynomial::from_roots_real(poles);
        Self::new(numerator, denominator)
    }

    /// Build from a state-space quadruple.
    ///
    /// BORING MATH:
    ///   den(z) = det(zI - A)
    ///   num(z) = det(zI - (A - BC)) + (D - 1) den(z)
    /// Characteristic polynomials come from the Faddeev-LeVerrier recursion.
    pub fn from_state_space(ss: &StateSpace) -> Result<Self> {
        let n = ss.a.nrows();
        if ss.a.ncols() != n || ss.b.len() != n || ss.c.len() != n {
            return Err(DspError::config(format!(
                "state-space dimensions don't agree: A is {}x{}, B has {}, C has {}",
                ss.a.nrows(), ss.a.ncols(), ss.b.len(), ss.c.len()
            )));
        }
        let denominator = characteristic_polynomial(&ss.a);
        let closed = &ss.a - &ss.b * ss.c.transpose();
        let numerator = characteristic_polynomial(&closed)
            .into_iter()
            .zip(denominator.iter())
            .map(|(p, q)| p + (ss.d - 1.0) * q)
            .collect();
        Self::new(numerator, denominator)
    }

    pub fn numerator(&self) -> &[f64] {
        &self.numerator
    }

    pub fn denominator(&self) -> &[f64] {
        &self.denominator
    }

    pub fn set_numerator(&mut self, numerator: Vec<f64>) -> Result<()> {
        if numerator.is_empty() {
            return Err(DspError::config("numerator can't be empty"));
        }
        self.numerator = numerator;
        self.invalidate();
        Ok(())
    }

    pub fn set_denominator(&mut self, denominator: Vec<f64>) -> Result<()> {
        if denominator.is_empty() {
            return Err(DspError::config("denominator can't be empty"));
        }
        self.denominator = denominator;
        self.invalidate();
        Ok(())
    }

    // drop cached zeros/poles
    pub fn invalidate(&mut self) {
        self.roots = OnceCell::new();
    }

    pub fn is_fir(&self) -> bool {
        self.denominator.len() == 1
    }

    pub fn gain(&self) -> f64 {
        self.numerator[0]
    }

    pub fn zeros(&self) -> &[C64] {
        &self.cached_roots().zeros
    }

    pub fn poles(&self) -> &[C64] {
        &self.cached_roots().poles
    }

    fn cached_roots(&self) -> &ZerosPoles {
        self.roots.get_or_init(|| ZerosPoles {
            zeros: polynomial::roots(&self.numerator),
            poles: polynomial::roots(&self.denominator),
        })
    }

    // all poles strictly inside the unit circle
    pub fn is_stable(&self) -> bool {
        self.poles().iter().all(|p| p.norm() < 1.0)
    }

    /// Divide every coefficient by a0.
    ///
    /// Fails (instead of producing inf/NaN) when a0 is within 1e-10 of zero.
    pub fn normalize(&mut self) -> Result<()> {
        let a0 = self.leading_denominator()?;
        if a0 == 1.0 {
            return Ok(());
        }
        for b in self.numerator.iter_mut() {
            *b /= a0;
        }
        for a in self.denominator.iter_mut() {
            *a /= a0;
        }
        self.invalidate();
        Ok(())
    }

    fn leading_denominator(&self) -> Result<f64> {
        let a0 = self.denominator[0];
        if a0.abs() < DEGENERATE_LEAD {
            return Err(DspError::degenerate(format!(
                "leading denominator coefficient {a0} is too close to zero"
            )));
        }
        Ok(a0)
    }

    /// Impulse response.
    ///
    /// FIR systems return the numerator itself (whatever `length` is);
    /// IIR systems run the difference equation for `length` samples.
    pub fn impulse_response(&self, length: usize) -> Result<Vec<f64>> {
        if self.is_fir() {
            let a0 = self.leading_denominator()?;
            return Ok(self.numerator.iter().map(|b| b / a0).collect());
        }
        let a0 = self.leading_denominator()?;
        let mut response = vec![0.0; length];
        for n in 0..length {
            let mut acc = self.numerator.get(n).copied().unwrap_or(0.0);
            for (k, a) in self.denominator.iter().enumerate().skip(1).take(n) {
                acc -= a * response[n - k];
            }
            response[n] = acc / a0;
        }
        Ok(response)
    }

    /// One-sided frequency response (`length/2 + 1` bins) from the FFT of the
    /// impulse response, zero-padded or truncated to `length` (a power of two).
    pub fn frequency_response(&self, length: usize) -> Result<ComplexDiscreteSignal> {
        check_power_of_two("frequency response length", length)?;
        let mut re = self.impulse_response(length)?;
        re.resize(length, 0.0);
        let mut im = vec![0.0; length];
        let mut fft = Fft::<f64>::new(length)?;
        fft.direct(&mut re, &mut im);
        re.truncate(length / 2 + 1);
        im.truncate(length / 2 + 1);
        ComplexDiscreteSignal::new(1, re, im)
    }

    // exact H(e^{jw}) at normalized angular frequency `omega`
    pub fn response_at(&self, omega: f64) -> C64 {
        let z = C64::from_polar(1.0, -omega);
        polynomial::evaluate_ascending(&self.numerator, z)
            / polynomial::evaluate_ascending(&self.denominator, z)
    }

    /// Group delay (in samples) at `length` frequencies w_k = pi k / length.
    ///
    /// BORING MATH:
    ///   c = b * reverse(a),  cr[i] = i c[i]
    ///   gd(w) = Re[ cr(e^{-jw}) / c(e^{-jw}) ] - (len(a) - 1)
    /// Singular frequencies (c ~ 0) report 0.
    pub fn group_delay(&self, length: usize) -> Vec<f64> {
        let reversed: Vec<f64> = self.denominator.iter().rev().copied().collect();
        let c = polynomial::multiply(&self.numerator, &reversed);
        let cr: Vec<f64> = c.iter().enumerate().map(|(i, v)| i as f64 * v).collect();
        let offset = (self.denominator.len() - 1) as f64;

        (0..length)
            .map(|k| {
                let z = C64::from_polar(1.0, -PI * k as f64 / length as f64);
                let den = polynomial::evaluate_ascending(&c, z);
                if den.norm() < 1e-10 {
                    0.0
                } else {
                    (polynomial::evaluate_ascending(&cr, z) / den).re - offset
                }
            })
            .collect()
    }

    // running average of the group delay
    pub fn phase_delay(&self, length: usize) -> Vec<f64> {
        let mut acc = 0.0;
        self.group_delay(length)
            .into_iter()
            .enumerate()
            .map(|(i, gd)| {
                acc += gd;
                acc / (i + 1) as f64
            })
            .collect()
    }

    /// Controllable canonical state-space form.
    ///
    /// Numerator and denominator are zero-padded at the end to a common
    /// length first, which keeps the z^{-1} reading of the coefficients.
    pub fn state_space(&self) -> Result<StateSpace> {
        let a0 = self.leading_denominator()?;
        let len = self.numerator.len().max(self.denominator.len());
        let mut num: Vec<f64> = self.numerator.iter().map(|b| b / a0).collect();
        let mut den: Vec<f64> = self.denominator.iter().map(|a| a / a0).collect();
        num.resize(len, 0.0);
        den.resize(len, 0.0);

        let n = len - 1;
        let d = num[0];
        let mut a = DMatrix::zeros(n, n);
        for j in 0..n {
            a[(0, j)] = -den[j + 1];
        }
        for i in 1..n {
            a[(i, i - 1)] = 1.0;
        }
        let mut b = DVector::zeros(n);
        if n > 0 {
            b[0] = 1.0;
        }
        let c = DVector::from_iterator(n, (0..n).map(|j| num[j + 1] - d * den[j + 1]));
        Ok(StateSpace { a, b, c, d })
    }
}

/* Faddeev-LeVerrier:
 *   M_1 = I,  c_{n-1} = -tr(A)
 *   M_k = A M_{k-1} + c_{n-k+1} I,  c_{n-k} = -tr(A M_k) / k
 * returns [1, c_{n-1}, ..., c_0]
 */
fn characteristic_polynomial(a: &DMatrix<f64>) -> Vec<f64> {
    let n = a.nrows();
    let mut coeffs = Vec::with_capacity(n + 1);
    coeffs.push(1.0);
    let mut m = DMatrix::<f64>::zeros(n, n);
    for k in 1..=n {
        m = a * &m + DMatrix::<f64>::identity(n, n) * coeffs[k - 1];
        let c = -(a * &m).trace() / k as f64;
        coeffs.push(c);
    }
    coeffs
}

/* Merge two systems together in series
 *
 * Multiply numerators together and denominators together.
 */
impl Mul for &TransferFunction {
    type Output = TransferFunction;

    fn mul(self, rhs: Self) -> TransferFunction {
        TransferFunction {
            numerator: polynomial::multiply(&self.numerator, &rhs.numerator),
            denominator: polynomial::multiply(&self.denominator, &rhs.denominator),
            roots: OnceCell::new(),
        }
    }
}

impl Mul for TransferFunction {
    type Output = TransferFunction;

    fn mul(self, rhs: Self) -> TransferFunction {
        &self * &rhs
    }
}

/* Merge two systems together in parallel
 *
 * BORING MATH:
 *   b1/a1 + b2/a2 = (b1 a2 + b2 a1) / (a1 a2)
 */
impl Add for &TransferFunction {
    type Output = TransferFunction;

    fn add(self, rhs: Self) -> TransferFunction {
        let b1a2 = polynomial::multiply(&self.numerator, &rhs.denominator);
        let b2a1 = polynomial::multiply(&rhs.numerator, &self.denominator);
        TransferFunction {
            numerator: polynomial::add(&b1a2, &b2a1),
            denominator: polynomial::multiply(&self.denominator, &rhs.denominator),
            roots: OnceCell::new(),
        }
    }
}

impl Add for TransferFunction {
    type Output = TransferFunction;

    fn add(self, rhs: Self) -> TransferFunction {
        &self + &rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn one_pole(p: f64) -> TransferFunction {
        TransferFunction::new(vec![1.0 - p], vec![1.0, -p]).unwrap()
    }

    #[test]
    fn test_empty_coefficients_rejected() {
        assert!(TransferFunction::new(vec![], vec![1.0]).is_err());
        assert!(TransferFunction::new(vec![1.0], vec![]).is_err());
    }

    #[test]
    fn test_normalize() {
        let mut tf = TransferFunction::new(vec![2.0, 4.0], vec![2.0, 1.0]).unwrap();
        tf.normalize().unwrap();
        assert_eq!(tf.numerator(), &[1.0, 2.0]);
        assert_eq!(tf.denominator(), &[1.0, 0.5]);

        let mut bad = TransferFunction::new(vec![1.0], vec![1e-12, 1.0]).unwrap();
        assert!(matches!(bad.normalize(), Err(DspError::NumericalDegeneracy(_))));
        assert!(bad.impulse_response(8).is_err());
    }

    #[test]
    fn test_fir_impulse_response_is_numerator() {
        let tf = TransferFunction::fir(vec![0.5, 0.25, 0.125]).unwrap();
        assert_eq!(tf.impulse_response(100).unwrap(), vec![0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_iir_impulse_response() {
        let tf = one_pole(0.5);
        let ir = tf.impulse_response(5).unwrap();
        assert_abs_diff_eq!(ir[..], [0.5, 0.25, 0.125, 0.0625, 0.03125][..], epsilon = 1e-12);
    }

    #[test]
    fn test_frequency_response() {
        let tf = one_pole(0.5);
        let fr = tf.frequency_response(256).unwrap();
        assert_eq!(fr.len(), 129);
        // DC gain of (1-p)/(1-p z^-1) is 1
        assert_abs_diff_eq!(fr.magnitude()[0], 1.0, epsilon = 1e-9);
        // Nyquist gain is (1-p)/(1+p)
        assert_abs_diff_eq!(fr.magnitude()[128], 0.5 / 1.5, epsilon = 1e-9);
        assert!(tf.frequency_response(100).is_err());
    }

    #[test]
    fn test_group_delay_of_pure_delay() {
        let tf = TransferFunction::fir(vec![0.0, 0.0, 0.0, 1.0]).unwrap();
        for gd in tf.group_delay(64) {
            assert_abs_diff_eq!(gd, 3.0, epsilon = 1e-9);
        }
        for pd in tf.phase_delay(64) {
            assert_abs_diff_eq!(pd, 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_group_delay_of_symmetric_fir() {
        // linear phase: delay = (N - 1) / 2
        let tf = TransferFunction::fir(vec![1.0, 2.0, 3.0, 2.0, 1.0]).unwrap();
        for gd in tf.group_delay(32).into_iter().take(20) {
            assert_abs_diff_eq!(gd, 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_group_delay_one_pole_at_dc() {
        // gd(0) = p / (1 - p) for 1 / (1 - p z^-1)
        let tf = one_pole(0.5);
        assert_abs_diff_eq!(tf.group_delay(16)[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zeros_poles_cache_invalidation() {
        let mut tf = TransferFunction::new(vec![1.0, -0.5], vec![1.0, -0.25]).unwrap();
        assert_abs_diff_eq!(tf.zeros()[0].re, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(tf.poles()[0].re, 0.25, epsilon = 1e-12);
        tf.set_numerator(vec![1.0, 0.8]).unwrap();
        assert_abs_diff_eq!(tf.zeros()[0].re, -0.8, epsilon = 1e-12);
        assert!(tf.is_stable());
    }

    #[test]
    fn test_zpk_roundtrip() {
        let zeros = [C64::new(-1.0, 0.0), C64::new(0.3, 0.4), C64::new(0.3, -0.4)];
        let poles = [C64::new(0.5, 0.0), C64::new(-0.2, 0.7), C64::new(-0.2, -0.7)];
        let tf = TransferFunction::from_zpk(&zeros, &poles, 2.0).unwrap();
        assert_abs_diff_eq!(tf.gain(), 2.0, epsilon = 1e-12);

        let back = TransferFunction::from_zpk(tf.zeros(), tf.poles(), tf.gain()).unwrap();
        assert_abs_diff_eq!(back.numerator()[..], tf.numerator()[..], epsilon = 1e-9);
        assert_abs_diff_eq!(back.denominator()[..], tf.denominator()[..], epsilon = 1e-9);
    }

    #[test]
    fn test_state_space_roundtrip() {
        let tf = TransferFunction::new(vec![0.2, 0.3, 0.1], vec![1.0, -0.5, 0.25]).unwrap();
        let ss = tf.state_space().unwrap();
        assert_eq!(ss.a.nrows(), 2);
        assert_abs_diff_eq!(ss.d, 0.2, epsilon = 1e-12);
        let back = TransferFunction::from_state_space(&ss).unwrap();
        assert_abs_diff_eq!(back.numerator()[..], tf.numerator()[..], epsilon = 1e-9);
        assert_abs_diff_eq!(back.denominator()[..], tf.denominator()[..], epsilon = 1e-9);
    }

    #[test]
    fn test_state_space_pads_short_numerator() {
        let tf = one_pole(0.5);
        let back = TransferFunction::from_state_space(&tf.state_space().unwrap()).unwrap();
        assert_abs_diff_eq!(back.numerator()[..], [0.5, 0.0][..], epsilon = 1e-12);
        assert_abs_diff_eq!(back.denominator()[..], tf.denominator()[..], epsilon = 1e-12);
    }

    #[test]
    fn test_series_and_parallel() {
        let h1 = one_pole(0.5);
        let h2 = one_pole(-0.25);
        let w = 0.3;

        let series = &h1 * &h2;
        let expected = h1.response_at(w) * h2.response_at(w);
        assert_abs_diff_eq!(series.response_at(w).re, expected.re, epsilon = 1e-12);
        assert_abs_diff_eq!(series.response_at(w).im, expected.im, epsilon = 1e-12);

        let parallel = &h1 + &h2;
        let expected = h1.response_at(w) + h2.response_at(w);
        assert_abs_diff_eq!(parallel.response_at(w).re, expected.re, epsilon = 1e-12);
        assert_abs_diff_eq!(parallel.response_at(w).im, expected.im, epsilon = 1e-12);
        assert_eq!(parallel.denominator().len(), 3);
    }
}
