//!
//! Filter design.
//!
//! All frequencies are normalized to the sampling rate (cycles per sample),
//! so they must lie strictly between 0 and 0.5.
//!
// std lib imports
use std::f64::consts::PI;
// local crates
use crate::error::{DspError, Result};
use crate::transfer_function::TransferFunction;
use crate::utils::{sinc, Float, C64};
use crate::windows::WindowType;

fn check_freq(freq: f64) -> Result<()> {
    if !(freq > 0.0 && freq < 0.5) {
        return Err(DspError::config(format!(
            "normalized frequency must be in (0, 0.5), got {freq}"
        )));
    }
    Ok(())
}

fn check_odd(order: usize) -> Result<()> {
    if order % 2 == 0 {
        return Err(DspError::config(format!("filter order must be odd here, got {order}")));
    }
    Ok(())
}

/// Windowed-sinc low-pass kernel of `order` taps, unit gain at DC
pub fn fir_lowpass(order: usize, freq: f64, window: WindowType) -> Result<Vec<Float>> {
    if order == 0 {
        return Err(DspError::config("fir order must be positive"));
    }
    check_freq(freq)?;
    let center = (order - 1) as f64 / 2.0;
    let win = window.symmetric(order);
    let mut kernel: Vec<f64> = win
        .iter()
        .enumerate()
        .map(|(i, &w)| 2.0 * freq * sinc(2.0 * freq * (i as f64 - center)) * w as f64)
        .collect();
    let sum: f64 = kernel.iter().sum();
    if sum.abs() < 1e-12 {
        return Err(DspError::degenerate("windowed sinc sums to zero"));
    }
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    Ok(kernel.into_iter().map(|k| k as Float).collect())
}

/// Windowed-sinc high-pass (spectral inversion of the low-pass), odd `order`
pub fn fir_highpass(order: usize, freq: f64, window: WindowType) -> Result<Vec<Float>> {
    check_odd(order)?;
    let mut kernel = fir_lowpass(order, freq, window)?;
    for k in kernel.iter_mut() {
        *k = -*k;
    }
    kernel[order / 2] += 1.0;
    Ok(kernel)
}

/// Band-pass between `f1` and `f2`: difference of two low-passes
pub fn fir_bandpass(order: usize, f1: f64, f2: f64, window: WindowType) -> Result<Vec<Float>> {
    if f1 >= f2 {
        return Err(DspError::config(format!("band edges out of order: {f1} >= {f2}")));
    }
    let high = fir_lowpass(order, f2, window)?;
    let low = fir_lowpass(order, f1, window)?;
    Ok(high.iter().zip(low.iter()).map(|(h, l)| h - l).collect())
}

/// Band-stop between `f1` and `f2`, odd `order`
pub fn fir_bandstop(order: usize, f1: f64, f2: f64, window: WindowType) -> Result<Vec<Float>> {
    check_odd(order)?;
    let mut kernel = fir_bandpass(order, f1, f2, window)?;
    for k in kernel.iter_mut() {
        *k = -*k;
    }
    kernel[order / 2] += 1.0;
    Ok(kernel)
}

/// Moving average of `n` samples
pub fn moving_average(n: usize) -> Result<Vec<Float>> {
    if n == 0 {
        return Err(DspError::config("moving average needs at least one sample"));
    }
    Ok(vec![1.0 / n as Float; n])
}

/* Butterworth poles in the s-plane, normalized cutoff 1 rad/s
 *
 * BORING MATH:
 *   p_k = exp(j pi (2k + n + 1) / 2n),  k = 0..n-1
 * all in the left half plane, conjugate pairs (plus -1 for odd n)
 */
fn butterworth_prototype(order: usize) -> Vec<C64> {
    let n = order as f64;
    (0..order)
        .map(|k| C64::from_polar(1.0, PI * (2.0 * k as f64 + n + 1.0) / (2.0 * n)))
        .collect()
}

// bilinear transform z = (1 + s) / (1 - s)
fn bilinear(s: C64) -> C64 {
    (C64::new(1.0, 0.0) + s) / (C64::new(1.0, 0.0) - s)
}

fn check_order(order: usize) -> Result<()> {
    if order == 0 {
        return Err(DspError::config("butterworth order must be positive"));
    }
    Ok(())
}

/// Butterworth low-pass of any order.
///
/// The analog prototype is scaled to the prewarped cutoff tan(pi f),
/// mapped with the bilinear transform, and normalized to unit gain at DC.
pub fn butterworth_lowpass(freq: f64, order: usize) -> Result<TransferFunction> {
    check_freq(freq)?;
    check_order(order)?;
    let warped = (PI * freq).tan();
    let poles: Vec<C64> = butterworth_prototype(order)
        .into_iter()
        .map(|p| bilinear(p * warped))
        .collect();
    let zeros = vec![C64::new(-1.0, 0.0); order];
    // H(1) = k 2^n / prod(1 - p)
    let gain = poles.iter().fold(C64::new(1.0, 0.0), |acc, &p| acc * (1.0 - p)).re
        / 2f64.powi(order as i32);
    TransferFunction::from_zpk(&zeros, &poles, gain)
}

/// Butterworth high-pass of any order, unit gain at Nyquist
pub fn butterworth_highpass(freq: f64, order: usize) -> Result<TransferFunction> {
    check_freq(freq)?;
    check_order(order)?;
    let warped = (PI * freq).tan();
    // low-pass to high-pass: s -> warped / s
    let poles: Vec<C64> = butterworth_prototype(order)
        .into_iter()
        .map(|p| bilinear(warped / p))
        .collect();
    let zeros = vec![C64::new(1.0, 0.0); order];
    // H(-1) = k 2^n / prod(1 + p)
    let gain = poles.iter().fold(C64::new(1.0, 0.0), |acc, &p| acc * (1.0 + p)).re
        / 2f64.powi(order as i32);
    TransferFunction::from_zpk(&zeros, &poles, gain)
}

/// Second-order sections from the RBJ audio EQ cookbook
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BiquadType {
    LowPass,
    HighPass,
    BandPass,
    Notch,
    AllPass,
    Peaking { gain_db: f64 },
    LowShelf { gain_db: f64 },
    HighShelf { gain_db: f64 },
}

/// RBJ biquad at normalized frequency `freq` with quality factor `q`
pub fn biquad(kind: BiquadType, freq: f64, q: f64) -> Result<TransferFunction> {
    check_freq(freq)?;
    if !(q > 0.0) {
        return Err(DspError::config(format!("biquad q must be positive, got {q}")));
    }
    let w0 = 2.0 * PI * freq;
    let c = w0.cos();
    let alpha = w0.sin() / (2.0 * q);

    let (b, a) = match kind {
        BiquadType::LowPass => (
            vec![(1.0 - c) / 2.0, 1.0 - c, (1.0 - c) / 2.0],
            vec![1.0 + alpha, -2.0 * c, 1.0 - alpha],
        ),
        BiquadType::HighPass => (
            vec![(1.0 + c) / 2.0, -(1.0 + c), (1.0 + c) / 2.0],
            vec![1.0 + alpha, -2.0 * c, 1.0 - alpha],
        ),
        BiquadType::BandPass => (
            vec![alpha, 0.0, -alpha],
            vec![1.0 + alpha, -2.0 * c, 1.0 - alpha],
        ),
        BiquadType::Notch => (
            vec![1.0, -2.0 * c, 1.0],
            vec![1.0 + alpha, -2.0 * c, 1.0 - alpha],
        ),
        BiquadType::AllPass => (
            vec![1.0 - alpha, -2.0 * c, 1.0 + alpha],
            vec![1.0 + alpha, -2.0 * c, 1.0 - alpha],
        ),
        BiquadType::Peaking { gain_db } => {
            let amp = 10f64.powf(gain_db / 40.0);
            (
                vec![1.0 + alpha * amp, -2.0 * c, 1.0 - alpha * amp],
                vec![1.0 + alpha / amp, -2.0 * c, 1.0 - alpha / amp],
            )
        }
        BiquadType::LowShelf { gain_db } => {
            let amp = 10f64.powf(gain_db / 40.0);
            let k = 2.0 * amp.sqrt() * alpha;
            (
                vec![
                    amp * ((amp + 1.0) - (amp - 1.0) * c + k),
                    2.0 * amp * ((amp - 1.0) - (amp + 1.0) * c),
                    amp * ((amp + 1.0) - (amp - 1.0) * c - k),
                ],
                vec![
                    (amp + 1.0) + (amp - 1.0) * c + k,
                    -2.0 * ((amp - 1.0) + (amp + 1.0) * c),
                    (amp + 1.0) + (amp - 1.0) * c - k,
                ],
            )
        }
        BiquadType::HighShelf { gain_db } => {
            let amp = 10f64.powf(gain_db / 40.0);
            let k = 2.0 * amp.sqrt() * alpha;
            (
                vec![
                    amp * ((amp + 1.0) + (amp - 1.0) * c + k),
                    -2.0 * amp * ((amp - 1.0) + (amp + 1.0) * c),
                    amp * ((amp + 1.0) + (amp - 1.0) * c - k),
                ],
                vec![
                    (amp + 1.0) - (amp - 1.0) * c + k,
                    2.0 * ((amp - 1.0) - (amp + 1.0) * c),
                    (amp + 1.0) - (amp - 1.0) * c - k,
                ],
            )
        }
    };
    let mut tf = TransferFunction::new(b, a)?;
    tf.normalize()?;
    Ok(tf)
}

/* All pass filter (aka phase shifter)
 *
 * BORING MATH:
 * all-pass has a pole and zero pair reflected across the unit circle
 * e.g. pole = r exp(jw), zero = 1/r exp(jw)
 *
 * to have real coefficients, combine a pole at p with another at p*:
 *
 *               a + b z^-1 + z^-2
 * H_real(z) = ___________________
 *              1 + b z^-1 + a z^-2
 * where a = |pole|^2, b = -2 Re[pole]
 *
 * note: angle of pole = frequency of maximum phase-shift
 *       magnitude of pole ~ sharpness of phase-shift
 */
pub fn allpass(phase: f64, r: f64) -> Result<TransferFunction> {
    if !(r >= 0.0 && r < 1.0) {
        return Err(DspError::config(format!("all-pass pole radius must be in [0, 1), got {r}")));
    }
    let phase = phase.rem_euclid(2.0 * PI);
    if phase == 0.0 || phase == PI {
        // real pole: (-p + z^-1) / (1 - p z^-1)
        let pole = if phase == 0.0 { r } else { -r };
        return TransferFunction::new(vec![-pole, 1.0], vec![1.0, -pole]);
    }
    let pole = C64::from_polar(r, phase);
    let a = pole.norm_sqr();
    let b = -2.0 * pole.re;
    TransferFunction::new(vec![a, b, 1.0], vec![1.0, b, a])
}

/// Pre-emphasis: y[n] = x[n] - coeff x[n-1]
pub fn pre_emphasis(coeff: f64) -> Result<TransferFunction> {
    TransferFunction::new(vec![1.0, -coeff], vec![1.0])
}

/// De-emphasis (inverse of pre-emphasis): y[n] = x[n] + coeff y[n-1]
pub fn de_emphasis(coeff: f64) -> Result<TransferFunction> {
    if coeff.abs() >= 1.0 {
        return Err(DspError::config(format!("de-emphasis coefficient must be below 1, got {coeff}")));
    }
    TransferFunction::new(vec![1.0], vec![1.0, -coeff])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::utils::gain2db;

    fn gain_at(tf: &TransferFunction, freq: f64) -> f64 {
        tf.response_at(2.0 * PI * freq).norm()
    }

    fn kernel_gain(kernel: &[Float], freq: f64) -> f64 {
        let tf = TransferFunction::fir(kernel.iter().map(|&k| k as f64).collect()).unwrap();
        gain_at(&tf, freq)
    }

    #[test]
    fn test_fir_lowpass() {
        let kernel = fir_lowpass(101, 0.1, WindowType::Blackman).unwrap();
        assert_abs_diff_eq!(kernel.iter().sum::<Float>(), 1.0, epsilon = 1e-5);
        // linear phase
        for i in 0..50 {
            assert_abs_diff_eq!(kernel[i], kernel[100 - i], epsilon = 1e-7);
        }
        assert!(kernel_gain(&kernel, 0.05) > 0.99);
        assert!(gain2db(kernel_gain(&kernel, 0.2)) < -60.0);
        assert!(fir_lowpass(101, 0.6, WindowType::Hann).is_err());
    }

    #[test]
    fn test_fir_highpass_and_bands() {
        let hp = fir_highpass(101, 0.2, WindowType::Blackman).unwrap();
        assert!(kernel_gain(&hp, 0.0) < 1e-3);
        assert!(kernel_gain(&hp, 0.4) > 0.99);
        assert!(fir_highpass(100, 0.2, WindowType::Blackman).is_err());

        let bp = fir_bandpass(151, 0.1, 0.3, WindowType::Blackman).unwrap();
        assert!(kernel_gain(&bp, 0.2) > 0.99);
        assert!(kernel_gain(&bp, 0.01) < 1e-2);

        let bs = fir_bandstop(151, 0.1, 0.3, WindowType::Blackman).unwrap();
        assert!(kernel_gain(&bs, 0.2) < 1e-2);
        assert!(kernel_gain(&bs, 0.45) > 0.99);
    }

    #[test]
    fn test_butterworth_lowpass() {
        let tf = butterworth_lowpass(0.1, 4).unwrap();
        assert_abs_diff_eq!(gain_at(&tf, 0.0), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gain_at(&tf, 0.1), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert!(gain_at(&tf, 0.3) < 0.01);
        assert!(tf.is_stable());
        assert_eq!(tf.denominator().len(), 5);
    }

    #[test]
    fn test_butterworth_highpass() {
        let tf = butterworth_highpass(0.2, 3).unwrap();
        assert_abs_diff_eq!(gain_at(&tf, 0.5), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gain_at(&tf, 0.2), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert!(gain_at(&tf, 0.02) < 0.01);
    }

    #[test]
    fn test_biquads() {
        let lp = biquad(BiquadType::LowPass, 0.1, std::f64::consts::FRAC_1_SQRT_2).unwrap();
        assert_abs_diff_eq!(lp.denominator()[0], 1.0);
        assert_abs_diff_eq!(gain_at(&lp, 0.0), 1.0, epsilon = 1e-9);

        let notch = biquad(BiquadType::Notch, 0.25, 2.0).unwrap();
        assert_abs_diff_eq!(gain_at(&notch, 0.25), 0.0, epsilon = 1e-9);

        let ap = biquad(BiquadType::AllPass, 0.15, 1.0).unwrap();
        for f in [0.01, 0.1, 0.3, 0.45] {
            assert_abs_diff_eq!(gain_at(&ap, f), 1.0, epsilon = 1e-9);
        }

        let peak = biquad(BiquadType::Peaking { gain_db: 6.0 }, 0.2, 1.0).unwrap();
        assert_abs_diff_eq!(gain2db(gain_at(&peak, 0.2)), 6.0, epsilon = 1e-6);

        let shelf = biquad(BiquadType::LowShelf { gain_db: -12.0 }, 0.1, 0.7).unwrap();
        assert_abs_diff_eq!(gain2db(gain_at(&shelf, 0.0)), -12.0, epsilon = 1e-6);
        let shelf = biquad(BiquadType::HighShelf { gain_db: 3.0 }, 0.1, 0.7).unwrap();
        assert_abs_diff_eq!(gain2db(gain_at(&shelf, 0.5)), 3.0, epsilon = 1e-6);

        assert!(biquad(BiquadType::BandPass, 0.1, 0.0).is_err());
    }

    #[test]
    fn test_allpass_pair() {
        for tf in [allpass(1.0, 0.9).unwrap(), allpass(0.0, 0.5).unwrap(), allpass(PI, 0.5).unwrap()] {
            for f in [0.0, 0.12, 0.3, 0.49] {
                assert_abs_diff_eq!(gain_at(&tf, f), 1.0, epsilon = 1e-9);
            }
        }
        assert!(allpass(1.0, 1.0).is_err());
    }

    #[test]
    fn test_emphasis_pair_cancels() {
        let series = &pre_emphasis(0.97).unwrap() * &de_emphasis(0.97).unwrap();
        for f in [0.0, 0.1, 0.4] {
            assert_abs_diff_eq!(gain_at(&series, f), 1.0, epsilon = 1e-9);
        }
        assert_eq!(moving_average(4).unwrap(), vec![0.25; 4]);
    }
}
