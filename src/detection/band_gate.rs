// BandEnergyGate - spectral plausibility check for detected events
//
// A detected window is accepted when the share of amplitude that falls
// into a configured frequency band lies inside [min_part, max_part] and
// the in-band amplitude exceeds a noise floor. This rejects events whose
// energy sits outside the band of the expected acoustic source.

use crate::config::BandGateConfig;
use crate::dsp::SpectralTransform;
use crate::error::LocalizationError;

/// Band energy measurement for one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandEnergy {
    /// Summed amplitude inside `[low_hz, high_hz)`
    pub band: f64,
    /// Summed amplitude over the whole spectrum
    pub total: f64,
}

impl BandEnergy {
    /// In-band share of the total amplitude (0.0 for silence)
    pub fn ratio(&self) -> f64 {
        if self.total > 0.0 {
            self.band / self.total
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct BandEnergyGate {
    config: BandGateConfig,
}

impl BandEnergyGate {
    pub fn new(config: BandGateConfig) -> Result<Self, LocalizationError> {
        if config.low_hz >= config.high_hz {
            return Err(LocalizationError::invalid_input(
                "band gate low_hz must be below high_hz",
            ));
        }
        if config.min_part > config.max_part {
            return Err(LocalizationError::invalid_input(
                "band gate min_part must not exceed max_part",
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &BandGateConfig {
        &self.config
    }

    /// Measure band and total amplitude of `signal`
    pub fn measure(
        &self,
        transform: &SpectralTransform,
        signal: &[f64],
    ) -> Result<BandEnergy, LocalizationError> {
        let (frequencies, amplitude) = transform.amplitude_spectrum(signal)?;

        // Frequency axis is sorted, so the band is a contiguous slice
        let low = frequencies.partition_point(|&f| f < self.config.low_hz);
        let high = frequencies.partition_point(|&f| f < self.config.high_hz);

        Ok(BandEnergy {
            band: amplitude[low..high].iter().sum(),
            total: amplitude.iter().sum(),
        })
    }

    /// Decide whether a measured window looks like a source event
    pub fn accepts(&self, energy: &BandEnergy) -> bool {
        let ratio = energy.ratio();
        ratio >= self.config.min_part
            && ratio <= self.config.max_part
            && energy.band > self.config.noise_floor
    }

    pub fn check(
        &self,
        transform: &SpectralTransform,
        signal: &[f64],
    ) -> Result<bool, LocalizationError> {
        let energy = self.measure(transform, signal)?;
        Ok(self.accepts(&energy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(sample_rate: u32, frequency: f64, amplitude: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    fn gate() -> BandEnergyGate {
        BandEnergyGate::new(BandGateConfig {
            low_hz: 10_000.0,
            high_hz: 15_000.0,
            min_part: 0.5,
            max_part: 1.0,
            noise_floor: 1.0,
        })
        .unwrap()
    }

    #[test]
    fn test_in_band_tone_is_accepted() {
        let transform = SpectralTransform::new(1024, 44_100).unwrap();
        let signal = tone(44_100, 12_000.0, 2.0, 1024);
        let energy = gate().measure(&transform, &signal).unwrap();
        assert!(energy.ratio() > 0.5, "ratio {}", energy.ratio());
        assert!(gate().accepts(&energy));
    }

    #[test]
    fn test_low_frequency_tone_is_rejected() {
        let transform = SpectralTransform::new(1024, 44_100).unwrap();
        let signal = tone(44_100, 500.0, 2.0, 1024);
        assert!(!gate().check(&transform, &signal).unwrap());
    }

    #[test]
    fn test_silence_is_rejected() {
        let transform = SpectralTransform::new(256, 44_100).unwrap();
        let energy = gate().measure(&transform, &[0.0; 256]).unwrap();
        assert_eq!(energy.ratio(), 0.0);
        assert!(!gate().accepts(&energy));
    }

    #[test]
    fn test_invalid_band_is_rejected() {
        let config = BandGateConfig {
            low_hz: 5_000.0,
            high_hz: 1_000.0,
            ..BandGateConfig::default()
        };
        assert!(BandEnergyGate::new(config).is_err());
    }
}
