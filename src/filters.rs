// std lib imports
use std::ops::Add;
// local crates
use crate::block_convolution::{OlaBlockConvolver, OlsBlockConvolver};
use crate::convolution;
use crate::error::{DspError, Result};
use crate::signal::DiscreteSignal;
use crate::transfer_function::TransferFunction;
use crate::utils::Float;

/// Kernels at least this long (and not longer than the signal) go through
/// block FFT convolution when the method is `Auto`.
pub const FFT_KERNEL_THRESHOLD: usize = 64;

/// An IIR impulse response is truncated once its slowest pole has decayed
/// below this, when applied with a block-convolution method.
pub const IIR_RESPONSE_TOLERANCE: f64 = 1e-8;

/// How a filter is applied offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilteringMethod {
    /// pick one from kernel and signal lengths
    #[default]
    Auto,
    /// direct recurrence, O(N * order)
    DifferenceEquation,
    /// block FFT convolution, overlap-add
    OverlapAdd,
    /// block FFT convolution, overlap-save
    OverlapSave,
}

/// Resolve `Auto` for a kernel of `kernel_len` taps applied to
/// `signal_len` samples. Never returns `Auto`.
pub fn choose_method(kernel_len: usize, signal_len: usize) -> FilteringMethod {
    if kernel_len >= FFT_KERNEL_THRESHOLD && signal_len >= kernel_len {
        FilteringMethod::OverlapSave
    } else {
        FilteringMethod::DifferenceEquation
    }
}

/* Filter a signal, one sample at a time or all at once.
 *
 * process() is the only thing that changes internal state,
 * and never allocates.
 * reset() zeroes the internal state.
 * apply_to() always starts from a fresh state and doesn't touch this one;
 * output has the same length as the input.
 */
pub trait Filter {
    fn process(&mut self, sample: Float) -> Float;
    fn reset(&mut self);
    fn apply_to(&self, signal: &DiscreteSignal, method: FilteringMethod) -> Result<DiscreteSignal>;

    // online processing of a whole block (output may be shorter than input)
    fn process_buffer(&mut self, input: &[Float], output: &mut [Float]) {
        for (out, &x) in output.iter_mut().zip(input.iter()) {
            *out = self.process(x);
        }
    }
}

/// Filters that are described by a rational transfer function
pub trait LtiFilter: Filter {
    fn transfer_function(&self) -> TransferFunction;
}

/// Offline causal filtering of `signal` by an FIR `kernel`,
/// y[n] = sum{k}( kernel[k] x[n-k] ), output truncated to the input length.
pub fn filter_with_kernel(
    kernel: &[Float],
    signal: &DiscreteSignal,
    method: FilteringMethod,
) -> Result<DiscreteSignal> {
    if kernel.is_empty() {
        return Err(DspError::config("filter kernel can't be empty"));
    }
    let n = signal.len();
    let samples = match method {
        FilteringMethod::Auto => {
            let chosen = choose_method(kernel.len(), n);
            log::debug!("auto filtering: {} taps over {} samples -> {:?}", kernel.len(), n, chosen);
            return filter_with_kernel(kernel, signal, chosen);
        }
        FilteringMethod::DifferenceEquation => {
            let mut out = convolution::convolve_direct(signal.samples(), kernel);
            out.truncate(n);
            out
        }
        FilteringMethod::OverlapAdd => OlaBlockConvolver::new(kernel.to_vec(), None)?.filter_offline(signal.samples()),
        FilteringMethod::OverlapSave => OlsBlockConvolver::new(kernel.to_vec(), None)?.filter_offline(signal.samples()),
    };
    DiscreteSignal::new(signal.sampling_rate(), samples)
}

// sum{k}( coeffs[k] line[offset - k] ) over a circular delay line of the same length
fn dot_circular(coeffs: &[Float], line: &[Float], offset: usize) -> Float {
    let (older, newer) = line.split_at(offset + 1);
    let (near, far) = coeffs.split_at(offset + 1);
    let mut acc = 0.0;
    for (c, x) in near.iter().zip(older.iter().rev()) {
        acc += c * x;
    }
    for (c, x) in far.iter().zip(newer.iter().rev()) {
        acc += c * x;
    }
    acc
}

/* FirFilter: y[n] = b0 x[n] + ... + bk x[n-k]
 *
 * Past inputs live in a circular delay line as long as the kernel.
 */
#[derive(Debug, Clone)]
pub struct FirFilter {
    kernel: Vec<Float>,
    delay_line: Vec<Float>,
    offset: usize,
    tf: TransferFunction,
}

impl FirFilter {
    pub fn new(kernel: Vec<Float>) -> Result<Self> {
        if kernel.is_empty() {
            return Err(DspError::config("fir kernel can't be empty"));
        }
        let tf = TransferFunction::fir(kernel.iter().map(|&b| b as f64).collect())?;
        let delay_line = vec![0.0; kernel.len()];
        Ok(Self { kernel, delay_line, offset: 0, tf })
    }

    pub fn from_transfer_function(tf: &TransferFunction) -> Result<Self> {
        if !tf.is_fir() {
            return Err(DspError::config("transfer function has poles, use IirFilter"));
        }
        let kernel = tf.impulse_response(0)?.into_iter().map(|b| b as Float).collect();
        Self::new(kernel)
    }

    pub fn kernel(&self) -> &[Float] {
        &self.kernel
    }

    /// Swap the kernel without touching the delay line.
    /// A kernel of a different length is ignored.
    pub fn change_kernel(&mut self, kernel: &[Float]) -> Result<()> {
        if kernel.len() != self.kernel.len() {
            log::warn!(
                "ignoring new fir kernel of {} taps (filter has {})",
                kernel.len(), self.kernel.len()
            );
            return Ok(());
        }
        self.tf.set_numerator(kernel.iter().map(|&b| b as f64).collect())?;
        self.kernel.copy_from_slice(kernel);
        Ok(())
    }

    /// Same as `change_kernel`, with the coefficient type `IirFilter` takes
    pub fn change_numerator_coeffs(&mut self, numerator: &[f64]) -> Result<()> {
        let kernel: Vec<Float> = numerator.iter().map(|&b| b as Float).collect();
        self.change_kernel(&kernel)
    }
}

impl Filter for FirFilter {
    fn process(&mut self, sample: Float) -> Float {
        self.delay_line[self.offset] = sample;
        let y = dot_circular(&self.kernel, &self.delay_line, self.offset);
        self.offset = (self.offset + 1) % self.delay_line.len();
        y
    }

    fn reset(&mut self) {
        self.delay_line.fill(0.0);
        self.offset = 0;
    }

    fn apply_to(&self, signal: &DiscreteSignal, method: FilteringMethod) -> Result<DiscreteSignal> {
        filter_with_kernel(&self.kernel, signal, method)
    }
}

impl LtiFilter for FirFilter {
    fn transfer_function(&self) -> TransferFunction {
        self.tf.clone()
    }
}

/* IirFilter: difference equation of a rational transfer function
 *
 * BORING MATH:
 * y[n] = [(b0 x[n] + ... + bk x[n-k]) - (a1 y[n-1] + ... + am y[n-m])] / a0
 *
 * Coefficients are stored normalized (a0 = 1). Inputs and outputs each get
 * a circular delay line sized to their coefficient count.
 */
#[derive(Debug, Clone)]
pub struct IirFilter {
    tf: TransferFunction,
    b: Vec<Float>,
    a: Vec<Float>,
    xs: Vec<Float>,
    ys: Vec<Float>,
    xoff: usize,
    yoff: usize,
    response_length: Option<usize>,
}

impl IirFilter {
    pub fn new(tf: TransferFunction) -> Result<Self> {
        let (b, a) = normalized_coeffs(&tf)?;
        Ok(Self {
            xs: vec![0.0; b.len()],
            ys: vec![0.0; a.len()],
            b,
            a,
            tf,
            xoff: 0,
            yoff: 0,
            response_length: None,
        })
    }

    pub fn from_coeffs(numerator: &[f64], denominator: &[f64]) -> Result<Self> {
        Self::new(TransferFunction::new(numerator.to_vec(), denominator.to_vec())?)
    }

    // fixed impulse response length for OverlapAdd/OverlapSave
    pub fn with_response_length(mut self, length: usize) -> Self {
        self.response_length = Some(length.max(1));
        self
    }

    pub fn response_length(&self) -> Option<usize> {
        self.response_length
    }

    /* Samples until the impulse response has died out.
     *
     * BORING MATH:
     * every term of h[n] decays like n^m r^n, r = max |pole|,
     * so r^n < tol once n > ln(tol) / ln(r). The margin covers
     * the numerator taps and repeated poles.
     *
     * None if a pole sits on or outside the unit circle.
     */
    pub fn decay_length(&self) -> Option<usize> {
        let radius = self.tf.poles().iter().map(|p| p.norm()).fold(0.0, f64::max);
        if !(radius < 1.0) {
            return None;
        }
        let margin = self.b.len() + 8 * self.a.len();
        if radius <= f64::EPSILON {
            return Some(margin);
        }
        let decay = (IIR_RESPONSE_TOLERANCE.ln() / radius.ln()).ceil() as usize;
        Some(decay + margin)
    }

    /// Swap numerator coefficients, keeping the delay lines.
    /// A different number of coefficients is a no-op.
    pub fn change_numerator_coeffs(&mut self, numerator: &[f64]) -> Result<()> {
        if numerator.len() != self.b.len() {
            log::warn!(
                "ignoring {} numerator coefficients (filter has {})",
                numerator.len(), self.b.len()
            );
            return Ok(());
        }
        self.tf.set_numerator(numerator.to_vec())?;
        self.refresh_coeffs()
    }

    /// Swap denominator coefficients, keeping the delay lines.
    /// A different number of coefficients is a no-op.
    pub fn change_denominator_coeffs(&mut self, denominator: &[f64]) -> Result<()> {
        if denominator.len() != self.a.len() {
            log::warn!(
                "ignoring {} denominator coefficients (filter has {})",
                denominator.len(), self.a.len()
            );
            return Ok(());
        }
        let previous = self.tf.denominator().to_vec();
        self.tf.set_denominator(denominator.to_vec())?;
        if let Err(e) = self.refresh_coeffs() {
            // keep the filter usable
            self.tf.set_denominator(previous)?;
            return Err(e);
        }
        Ok(())
    }

    fn refresh_coeffs(&mut self) -> Result<()> {
        let (b, a) = normalized_coeffs(&self.tf)?;
        self.b = b;
        self.a = a;
        Ok(())
    }

    // truncated impulse response, as an FIR kernel. Nothing past the
    // signal length can reach the output.
    fn response_kernel(&self, signal_len: usize) -> Result<Vec<Float>> {
        let length = self
            .response_length
            .or_else(|| self.decay_length())
            .unwrap_or(signal_len)
            .min(signal_len)
            .max(1);
        log::debug!("iir filter applied by block convolution, impulse response truncated to {length} samples");
        let ir = self.tf.impulse_response(length)?;
        Ok(ir.into_iter().map(|v| v as Float).collect())
    }
}

fn normalized_coeffs(tf: &TransferFunction) -> Result<(Vec<Float>, Vec<Float>)> {
    let mut normalized = tf.clone();
    normalized.normalize()?;
    let b = normalized.numerator().iter().map(|&v| v as Float).collect();
    let a = normalized.denominator().iter().map(|&v| v as Float).collect();
    Ok((b, a))
}

impl Filter for IirFilter {
    fn process(&mut self, sample: Float) -> Float {
        self.xs[self.xoff] = sample;
        self.ys[self.yoff] = 0.0;
        let y = dot_circular(&self.b, &self.xs, self.xoff) - dot_circular(&self.a, &self.ys, self.yoff);
        self.ys[self.yoff] = y;
        self.xoff = (self.xoff + 1) % self.xs.len();
        self.yoff = (self.yoff + 1) % self.ys.len();
        y
    }

    fn reset(&mut self) {
        self.xs.fill(0.0);
        self.ys.fill(0.0);
        self.xoff = 0;
        self.yoff = 0;
    }

    fn apply_to(&self, signal: &DiscreteSignal, method: FilteringMethod) -> Result<DiscreteSignal> {
        match method {
            FilteringMethod::Auto | FilteringMethod::DifferenceEquation => {
                let mut fresh = self.clone();
                fresh.reset();
                let mut out = vec![0.0; signal.len()];
                fresh.process_buffer(signal.samples(), &mut out);
                DiscreteSignal::new(signal.sampling_rate(), out)
            }
            FilteringMethod::OverlapAdd | FilteringMethod::OverlapSave => {
                filter_with_kernel(&self.response_kernel(signal.len())?, signal, method)
            }
        }
    }
}

impl LtiFilter for IirFilter {
    fn transfer_function(&self) -> TransferFunction {
        self.tf.clone()
    }
}

/* Chain multiple filters together in series
 */
pub struct FilterChain {
    chain: Vec<Box<dyn Filter>>,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self { chain: vec![] }
    }

    pub fn from(filter: impl Filter + 'static) -> Self {
        Self { chain: vec![Box::new(filter)] }
    }

    // 'static bound requires [filter] to be an owned type
    pub fn push(mut self, filter: impl Filter + 'static) -> Self {
        self.chain.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    // get a reference to the nth chain element
    pub fn get(&self, n: usize) -> Option<&dyn Filter> {
        self.chain.get(n).map(|f| f.as_ref())
    }

    // get a mutable reference to the nth chain element
    pub fn get_mut(&mut self, n: usize) -> Option<&mut (dyn Filter + 'static)> {
        self.chain.get_mut(n).map(|f| f.as_mut())
    }

    pub fn remove(&mut self, n: usize) -> Option<Box<dyn Filter>> {
        if n >= self.chain.len() {
            None
        } else {
            Some(self.chain.remove(n))
        }
    }
}

/* Macro to chain together multiple filters
 *
 * filter_chain!(f1, f2, ...) -> FilterChain::from(f1).push(f2).push(...)
 */
#[macro_export]
macro_rules! filter_chain {
    ( $f0:expr $(, $f:expr )* $(,)? ) => {
        $crate::filters::FilterChain::from($f0)
        $(
            .push($f)
        )*
    };
}

// Merge 2 FilterChains together into a single FilterChain
impl Add for FilterChain {
    type Output = FilterChain;

    fn add(self, rhs: Self) -> Self::Output {
        let mut chain = self.chain;
        let mut chain2 = rhs.chain;
        chain.append(&mut chain2);
        Self { chain }
    }
}

impl Filter for FilterChain {
    fn process(&mut self, sample: Float) -> Float {
        self.chain.iter_mut().fold(sample, |x, f| f.process(x))
    }

    fn reset(&mut self) {
        for f in self.chain.iter_mut() {
            f.reset();
        }
    }

    fn apply_to(&self, signal: &DiscreteSignal, method: FilteringMethod) -> Result<DiscreteSignal> {
        let mut out = signal.clone();
        for f in self.chain.iter() {
            out = f.apply_to(&out, method)?;
        }
        Ok(out)
    }
}
