// GCC-PHAT delay estimation
//
// Generalized cross-correlation in the frequency domain:
// 1. X = FFT(input), R* = conj(FFT(reference)) (or a cached R*)
// 2. G = X · R*
// 3. Optional phase transform: G[k] /= |G[k]| for every non-zero bin
// 4. Correlation histogram = IFFT(G) zero-padded by the interpolation factor
// 5. Circular shift so lag zero sits in the middle
// 6. Delay = (peak index - centre) / interpolation factor
//
// A positive delay means the input arrives after the reference.

use rustfft::num_complex::Complex;

use crate::dsp::spectral::SpectralTransform;
use crate::error::LocalizationError;

/// Unit of the returned delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayUnit {
    #[default]
    Seconds,
    Samples,
}

/// Conjugated reference spectrum, computed once and reused for every
/// channel compared against the same reference window
#[derive(Debug, Clone)]
pub struct ReferenceSpectrum {
    conj_bins: Vec<Complex<f64>>,
}

impl ReferenceSpectrum {
    pub fn new(transform: &SpectralTransform, reference: &[f64]) -> Result<Self, LocalizationError> {
        let conj_bins = transform
            .transform(reference)?
            .into_iter()
            .map(|c| c.conj())
            .collect();
        Ok(Self { conj_bins })
    }

    pub fn bins(&self) -> &[Complex<f64>] {
        &self.conj_bins
    }
}

/// Reference side of a delay estimate
#[derive(Debug, Clone, Copy)]
pub enum ReferenceInput<'a> {
    /// Raw reference samples, transformed on the fly
    Signal(&'a [f64]),
    /// Previously computed conjugated spectrum
    Spectrum(&'a ReferenceSpectrum),
}

/// Result of a delay estimate
#[derive(Debug, Clone)]
pub struct DelayEstimate {
    /// Lag of the input relative to the reference (seconds or samples)
    pub delay: f64,
    /// Lag-centred correlation histogram, kept for diagnostics
    pub histogram: Vec<f64>,
}

impl DelayEstimate {
    /// Peak-to-mean ratio of the absolute histogram
    ///
    /// A flat histogram (silence) yields 0.0; callers use this to gate
    /// low-confidence delays.
    pub fn peak_ratio(&self) -> f64 {
        if self.histogram.is_empty() {
            return 0.0;
        }
        let mean =
            self.histogram.iter().map(|v| v.abs()).sum::<f64>() / self.histogram.len() as f64;
        let peak = self.histogram.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if mean > 0.0 {
            peak / mean
        } else {
            0.0
        }
    }
}

/// GCC-PHAT delay estimator
#[derive(Debug, Clone, Copy)]
pub struct DelayEstimator {
    use_phase_transform: bool,
    interpolation_factor: usize,
    unit: DelayUnit,
}

impl Default for DelayEstimator {
    fn default() -> Self {
        Self {
            use_phase_transform: true,
            interpolation_factor: 1,
            unit: DelayUnit::Seconds,
        }
    }
}

impl DelayEstimator {
    /// Create an estimator
    ///
    /// # Arguments
    /// * `use_phase_transform` - Whiten the cross spectrum magnitude to 1
    /// * `interpolation_factor` - Zero-padding factor for sub-sample lags (>= 1)
    /// * `unit` - Unit of the returned delay
    pub fn new(
        use_phase_transform: bool,
        interpolation_factor: usize,
        unit: DelayUnit,
    ) -> Result<Self, LocalizationError> {
        if interpolation_factor == 0 {
            return Err(LocalizationError::invalid_input(
                "interpolation factor must be at least 1",
            ));
        }
        Ok(Self {
            use_phase_transform,
            interpolation_factor,
            unit,
        })
    }

    pub fn interpolation_factor(&self) -> usize {
        self.interpolation_factor
    }

    pub fn uses_phase_transform(&self) -> bool {
        self.use_phase_transform
    }

    pub fn unit(&self) -> DelayUnit {
        self.unit
    }

    /// Estimate the lag of `input` relative to `reference`
    pub fn estimate(
        &self,
        transform: &SpectralTransform,
        input: &[f64],
        reference: ReferenceInput<'_>,
    ) -> Result<DelayEstimate, LocalizationError> {
        let input_bins = transform.transform(input)?;

        let owned;
        let ref_bins = match reference {
            ReferenceInput::Signal(signal) => {
                owned = ReferenceSpectrum::new(transform, signal)?;
                owned.bins()
            }
            ReferenceInput::Spectrum(spectrum) => spectrum.bins(),
        };
        if ref_bins.len() != input_bins.len() {
            return Err(LocalizationError::InvalidSignalLength {
                expected: input_bins.len(),
                actual: ref_bins.len(),
            });
        }

        let cross: Vec<Complex<f64>> = input_bins
            .iter()
            .zip(ref_bins.iter())
            .map(|(x, r)| {
                let g = x * r;
                if self.use_phase_transform {
                    let magnitude = g.norm();
                    if magnitude != 0.0 {
                        return g / magnitude;
                    }
                }
                g
            })
            .collect();

        let mut histogram = transform.inverse_transform(&cross, self.interpolation_factor)?;
        let n = histogram.len();
        let centre = n / 2;

        // Peak is searched before the shift so that a flat histogram
        // resolves to lag zero
        let peak = histogram
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            })
            .0;
        histogram.rotate_right(centre);
        let shifted_peak = (peak + centre) % n;

        let lag_samples =
            (shifted_peak as f64 - centre as f64) / self.interpolation_factor as f64;
        let delay = match self.unit {
            DelayUnit::Samples => lag_samples,
            DelayUnit::Seconds => lag_samples / transform.sampling_rate() as f64,
        };

        Ok(DelayEstimate { delay, histogram })
    }
}
