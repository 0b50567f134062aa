//! Simulation of sound propagation from a known source
//!
//! A [`SimulationContext`] carries the source position and propagation
//! speed for one simulation run. It writes ideal delays straight into a
//! [`ReceiverArray`] or synthesizes per-receiver sample buffers that the
//! delay estimator can work on.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::LocalizationError;
use crate::geometry::{Position, ReceiverArray, RECEIVER_COUNT};

/// Decimal places kept in simulated arrival times (microsecond resolution)
pub const DEFAULT_TIME_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationContext {
    pub source: Position,
    pub speed_of_sound: f64,
    /// Rounding of arrival times; `None` keeps full precision
    pub decimals: Option<u32>,
}

/// Shape and placement of a synthesized pulse train
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseShape {
    pub sample_rate: u32,
    /// Samples per synthesized channel
    pub length: usize,
    /// Sample index at which the first pulse leaves the source
    pub emission_sample: f64,
    /// Standard deviation of the Gaussian envelope in seconds
    pub width: f64,
    /// Carrier frequency in Hz, 0.0 for a baseband pulse
    pub carrier_hz: f64,
    pub amplitude: f64,
    pub count: usize,
    /// Seconds between consecutive emissions
    pub interval: f64,
    /// Peak amplitude of uniform white noise added to every channel
    pub noise_level: f64,
    pub seed: u64,
}

impl Default for PulseShape {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            length: 4096,
            emission_sample: 1024.0,
            width: 1.5 / 48_000.0,
            carrier_hz: 0.0,
            amplitude: 1.0,
            count: 1,
            interval: 0.25,
            noise_level: 0.0,
            seed: 0,
        }
    }
}

impl SimulationContext {
    pub fn new(source: Position, speed_of_sound: f64) -> Self {
        Self {
            source,
            speed_of_sound,
            decimals: Some(DEFAULT_TIME_DECIMALS),
        }
    }

    pub fn with_decimals(mut self, decimals: Option<u32>) -> Self {
        self.decimals = decimals;
        self
    }

    /// Exact travel time from the source to `position`
    pub fn propagation_time(&self, position: &Position) -> f64 {
        (position - self.source).norm() / self.speed_of_sound
    }

    /// Travel time rounded to the configured number of decimals
    pub fn arrival_time(&self, position: &Position) -> f64 {
        let time = self.propagation_time(position);
        match self.decimals {
            Some(decimals) => {
                let scale = 10f64.powi(decimals as i32);
                (time * scale).round() / scale
            }
            None => time,
        }
    }

    /// Delays of the non-reference receivers, ascending receiver order
    pub fn tdoas(&self, array: &ReceiverArray) -> [f64; RECEIVER_COUNT - 1] {
        let reference = self.arrival_time(array.reference().position());
        let mut out = [0.0; RECEIVER_COUNT - 1];
        for (slot, index) in out.iter_mut().zip(array.non_reference_indices()) {
            *slot = self.arrival_time(array.receivers()[index].position()) - reference;
        }
        out
    }

    /// Write the simulated delays into `array`
    pub fn apply(&self, array: &mut ReceiverArray) -> [f64; RECEIVER_COUNT - 1] {
        let tdoas = self.tdoas(array);
        array.set_tdoas(&tdoas);
        tdoas
    }

    /// Render what every receiver would record for `pulse`
    ///
    /// Pulses are evaluated analytically at the exact (unrounded) arrival
    /// time, so delays are fractional rather than snapped to samples.
    pub fn synthesize(
        &self,
        array: &ReceiverArray,
        pulse: &PulseShape,
    ) -> Result<[Vec<f64>; RECEIVER_COUNT], LocalizationError> {
        if pulse.sample_rate == 0 || pulse.length == 0 {
            return Err(LocalizationError::invalid_input(
                "pulse sample rate and length must be greater than 0",
            ));
        }
        if !(pulse.width > 0.0) {
            return Err(LocalizationError::invalid_input(
                "pulse width must be positive",
            ));
        }

        let fs = pulse.sample_rate as f64;
        let mut rng = StdRng::seed_from_u64(pulse.seed);
        let mut channels: [Vec<f64>; RECEIVER_COUNT] = Default::default();

        for (channel, receiver) in channels.iter_mut().zip(array.receivers().iter()) {
            let delay = self.propagation_time(receiver.position());
            let centres: Vec<f64> = (0..pulse.count)
                .map(|k| pulse.emission_sample / fs + k as f64 * pulse.interval + delay)
                .collect();

            *channel = (0..pulse.length)
                .map(|i| {
                    let t = i as f64 / fs;
                    let signal: f64 = centres
                        .iter()
                        .map(|&centre| pulse_value(pulse, t - centre))
                        .sum();
                    let noise = if pulse.noise_level > 0.0 {
                        rng.gen_range(-1.0..1.0) * pulse.noise_level
                    } else {
                        0.0
                    };
                    signal + noise
                })
                .collect();
        }

        Ok(channels)
    }
}

fn pulse_value(pulse: &PulseShape, offset: f64) -> f64 {
    let x = offset / pulse.width;
    // Far tails contribute nothing measurable
    if x.abs() > 12.0 {
        return 0.0;
    }
    let envelope = pulse.amplitude * (-0.5 * x * x).exp();
    if pulse.carrier_hz > 0.0 {
        envelope * (2.0 * std::f64::consts::PI * pulse.carrier_hz * offset).cos()
    } else {
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cube_array() -> ReceiverArray {
        ReceiverArray::new(
            [
                Position::new(-1.5, -1.5, -1.5),
                Position::new(-1.5, 1.5, 1.5),
                Position::new(1.5, 1.5, -1.5),
                Position::new(1.5, -1.5, -1.5),
            ],
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_arrival_time_rounding() {
        let ctx = SimulationContext::new(Position::new(0.0, 0.0, 0.0), 340.0);
        let position = Position::new(1.0, 0.0, 0.0);
        assert_eq!(ctx.arrival_time(&position), 0.002941);

        let exact = ctx.with_decimals(None);
        assert_abs_diff_eq!(exact.arrival_time(&position), 1.0 / 340.0, epsilon = 1e-15);
    }

    #[test]
    fn test_apply_writes_relative_delays() {
        let mut array = cube_array();
        let ctx = SimulationContext::new(Position::new(0.4, -0.3, 0.2), 340.0).with_decimals(None);
        let tdoas = ctx.apply(&mut array);

        assert_eq!(array.tdoas(), tdoas);
        let reference = ctx.propagation_time(&Position::new(-1.5, -1.5, -1.5));
        let first = ctx.propagation_time(&Position::new(-1.5, 1.5, 1.5));
        assert_abs_diff_eq!(tdoas[0], first - reference, epsilon = 1e-15);
    }

    #[test]
    fn test_centered_source_has_zero_delays() {
        let mut array = cube_array();
        let ctx = SimulationContext::new(Position::zeros(), 340.0);
        assert_eq!(ctx.apply(&mut array), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_synthesized_pulse_peaks_at_arrival() {
        let array = cube_array();
        let ctx = SimulationContext::new(Position::new(1.0, 1.0, -1.0), 340.0);
        let pulse = PulseShape::default();
        let channels = ctx.synthesize(&array, &pulse).unwrap();

        for (channel, receiver) in channels.iter().zip(array.receivers().iter()) {
            assert_eq!(channel.len(), pulse.length);
            let expected = pulse.emission_sample
                + ctx.propagation_time(receiver.position()) * pulse.sample_rate as f64;
            let peak = channel
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0;
            assert!((peak as f64 - expected).abs() <= 0.5, "peak {} vs {}", peak, expected);
        }
    }

    #[test]
    fn test_pulse_train_and_noise() {
        let array = cube_array();
        let ctx = SimulationContext::new(Position::zeros(), 340.0);
        let pulse = PulseShape {
            length: 48_000,
            count: 3,
            interval: 0.25,
            noise_level: 0.01,
            seed: 42,
            ..PulseShape::default()
        };
        let channels = ctx.synthesize(&array, &pulse).unwrap();
        let loud = channels[0].iter().filter(|v| v.abs() > 0.5).count();
        // Three pulses, a few samples above half height each
        assert!(loud >= 3 && loud <= 3 * 6, "loud samples {}", loud);

        let again = ctx.synthesize(&array, &pulse).unwrap();
        assert_eq!(channels, again);
    }

    #[test]
    fn test_synthesize_rejects_bad_pulse() {
        let array = cube_array();
        let ctx = SimulationContext::new(Position::zeros(), 340.0);
        let pulse = PulseShape {
            width: 0.0,
            ..PulseShape::default()
        };
        assert!(ctx.synthesize(&array, &pulse).is_err());
    }
}
