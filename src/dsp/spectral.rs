// Spectral transform - windowed one-sided FFT and its inverse
//
// The transform keeps a fixed analysis length and a pre-computed Hann
// window. Forward transforms return the `size / 2 + 1` non-negative
// frequency bins of a real signal; inverse transforms rebuild the
// Hermitian spectrum, optionally zero-padded, and return the real part.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LocalizationError;

/// Windowed forward/inverse FFT with a fixed analysis length
pub struct SpectralTransform {
    fft_planner: Mutex<FftPlanner<f64>>,
    forward: Arc<dyn Fft<f64>>,
    size: usize,
    sampling_rate: u32,
    /// Hann window (pre-computed)
    window: Vec<f64>,
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("size", &self.size)
            .field("sampling_rate", &self.sampling_rate)
            .finish()
    }
}

fn hann_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - ((2.0 * std::f64::consts::PI * i as f64) / (size as f64 - 1.0)).cos())
        })
        .collect()
}

impl SpectralTransform {
    /// Create a new transform
    ///
    /// # Arguments
    /// * `size` - Transform length in samples (at least 2)
    /// * `sampling_rate` - Sampling rate in Hz
    pub fn new(size: usize, sampling_rate: u32) -> Result<Self, LocalizationError> {
        if size < 2 {
            return Err(LocalizationError::invalid_input(format!(
                "transform size must be at least 2 (got {})",
                size
            )));
        }
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);

        Ok(Self {
            fft_planner: Mutex::new(planner),
            forward,
            size,
            sampling_rate,
            window: hann_window(size),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of one-sided bins produced by [`transform`](Self::transform)
    pub fn bin_count(&self) -> usize {
        self.size / 2 + 1
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Change the transform length, recomputing the window and forward plan
    pub fn set_size(&mut self, size: usize) -> Result<(), LocalizationError> {
        if size < 2 {
            return Err(LocalizationError::invalid_input(format!(
                "transform size must be at least 2 (got {})",
                size
            )));
        }
        self.forward = self
            .fft_planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_forward(size);
        self.size = size;
        self.window = hann_window(size);
        Ok(())
    }

    pub fn set_sampling_rate(&mut self, sampling_rate: u32) {
        self.sampling_rate = sampling_rate;
    }

    /// Forward transform of a real signal
    ///
    /// Signals shorter than `size` are zero-padded on the left, then the
    /// Hann window is applied.
    ///
    /// # Returns
    /// `size / 2 + 1` complex bins
    pub fn transform(&self, signal: &[f64]) -> Result<Vec<Complex<f64>>, LocalizationError> {
        if signal.len() > self.size {
            return Err(LocalizationError::InvalidSignalLength {
                expected: self.size,
                actual: signal.len(),
            });
        }

        let pad = self.size - signal.len();
        let mut buffer: Vec<Complex<f64>> = std::iter::repeat(0.0)
            .take(pad)
            .chain(signal.iter().copied())
            .zip(self.window.iter())
            .map(|(sample, w)| Complex::new(sample * w, 0.0))
            .collect();

        self.forward.process(&mut buffer);
        buffer.truncate(self.bin_count());
        Ok(buffer)
    }

    /// Single-sided amplitude spectrum of previously transformed bins
    ///
    /// Amplitude is `4 * |bin| / size`, compensating the Hann window gain.
    ///
    /// # Returns
    /// `(frequency_axis_hz, amplitude)`
    pub fn spectrum(
        &self,
        bins: &[Complex<f64>],
    ) -> Result<(Vec<f64>, Vec<f64>), LocalizationError> {
        self.check_bins(bins)?;
        let bin_width = self.sampling_rate as f64 / self.size as f64;
        let frequencies = (0..bins.len()).map(|k| k as f64 * bin_width).collect();
        let amplitude = bins
            .iter()
            .map(|c| c.norm() * 4.0 / self.size as f64)
            .collect();
        Ok((frequencies, amplitude))
    }

    /// Forward transform followed by [`spectrum`](Self::spectrum)
    pub fn amplitude_spectrum(
        &self,
        signal: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), LocalizationError> {
        let bins = self.transform(signal)?;
        self.spectrum(&bins)
    }

    /// Inverse transform with frequency-domain zero padding
    ///
    /// # Arguments
    /// * `bins` - `size / 2 + 1` one-sided bins
    /// * `padding_factor` - Output length multiplier (1 = no interpolation)
    ///
    /// # Returns
    /// Real time-domain signal of length `padding_factor * size`
    pub fn inverse_transform(
        &self,
        bins: &[Complex<f64>],
        padding_factor: usize,
    ) -> Result<Vec<f64>, LocalizationError> {
        self.check_bins(bins)?;
        if padding_factor == 0 {
            return Err(LocalizationError::invalid_input(
                "padding factor must be at least 1",
            ));
        }

        let n = padding_factor * self.size;
        let half = n / 2;
        let mut buffer = vec![Complex::new(0.0, 0.0); n];
        for (k, bin) in bins.iter().enumerate().take(half + 1) {
            buffer[k] = *bin;
        }
        // Hermitian symmetry; DC and an even-length Nyquist bin are real
        buffer[0].im = 0.0;
        if n % 2 == 0 {
            buffer[half].im = 0.0;
        }
        for k in 1..(n + 1) / 2 {
            buffer[n - k] = buffer[k].conj();
        }

        let inverse = self
            .fft_planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_inverse(n);
        inverse.process(&mut buffer);

        let scale = 1.0 / n as f64;
        Ok(buffer.iter().map(|c| c.re * scale).collect())
    }

    fn check_bins(&self, bins: &[Complex<f64>]) -> Result<(), LocalizationError> {
        if bins.len() != self.bin_count() {
            return Err(LocalizationError::InvalidSignalLength {
                expected: self.bin_count(),
                actual: bins.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn generate_sine_wave(sample_rate: u32, frequency: f64, amplitude: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_transform_returns_one_sided_bins() {
        let transform = SpectralTransform::new(1024, 44_100).unwrap();
        let bins = transform.transform(&vec![0.5; 1024]).unwrap();
        assert_eq!(bins.len(), 513);
    }

    #[test]
    fn test_short_signal_is_left_padded() {
        let transform = SpectralTransform::new(8, 8_000).unwrap();
        let short = [1.0, 1.0, 1.0];
        let padded = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let a = transform.transform(&short).unwrap();
        let b = transform.transform(&padded).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-12);
            assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_long_signal_is_rejected() {
        let transform = SpectralTransform::new(8, 8_000).unwrap();
        assert!(matches!(
            transform.transform(&[0.0; 9]),
            Err(LocalizationError::InvalidSignalLength {
                expected: 8,
                actual: 9
            })
        ));
    }

    #[test]
    fn test_spectrum_rejects_wrong_bin_count() {
        let transform = SpectralTransform::new(1024, 44_100).unwrap();
        let bins = vec![Complex::new(0.0, 0.0); 100];
        assert!(matches!(
            transform.spectrum(&bins),
            Err(LocalizationError::InvalidSignalLength {
                expected: 513,
                actual: 100
            })
        ));
        assert!(transform.inverse_transform(&bins, 1).is_err());
    }

    #[test]
    fn test_amplitude_spectrum_peaks_at_tone() {
        let fs = 44_100;
        let n = 1024;
        let transform = SpectralTransform::new(n, fs).unwrap();
        // Put the tone exactly on bin 40 so the peak is unambiguous
        let freq = 40.0 * fs as f64 / n as f64;
        let signal = generate_sine_wave(fs, freq, 3.0, n);

        let (frequencies, amplitude) = transform.amplitude_spectrum(&signal).unwrap();
        let peak = amplitude
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();

        assert_eq!(peak, 40);
        assert_abs_diff_eq!(frequencies[peak], freq, epsilon = 1e-9);
        // Window-compensated amplitude of a 3.0 sine lands near 3.0
        assert!((amplitude[peak] - 3.0).abs() < 0.1, "amp {}", amplitude[peak]);
    }

    #[test]
    fn test_inverse_transform_reconstructs_windowed_signal() {
        let n = 256;
        let transform = SpectralTransform::new(n, 8_000).unwrap();
        let signal: Vec<f64> = (0..n)
            .map(|i| (i as f64 * 0.37).sin() + 0.25 * (i as f64 * 1.9).cos())
            .collect();

        let bins = transform.transform(&signal).unwrap();
        let restored = transform.inverse_transform(&bins, 1).unwrap();
        assert_eq!(restored.len(), n);

        let window = transform.window();
        for i in 0..n {
            assert_abs_diff_eq!(restored[i], signal[i] * window[i], epsilon = 1e-10);
            // Undo the window where it does not vanish
            if window[i] > 1e-3 {
                assert_abs_diff_eq!(restored[i] / window[i], signal[i], epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_inverse_transform_padding_length() {
        let transform = SpectralTransform::new(64, 8_000).unwrap();
        let bins = transform.transform(&[1.0; 64]).unwrap();
        let padded = transform.inverse_transform(&bins, 4).unwrap();
        assert_eq!(padded.len(), 256);
        assert!(transform.inverse_transform(&bins, 0).is_err());
    }

    #[test]
    fn test_set_size_recomputes_window() {
        let mut transform = SpectralTransform::new(64, 8_000).unwrap();
        transform.set_size(128).unwrap();
        assert_eq!(transform.window().len(), 128);
        assert_eq!(transform.bin_count(), 65);
        assert_eq!(transform.transform(&[1.0; 128]).unwrap().len(), 65);
        assert!(transform.set_size(1).is_err());
    }
}
