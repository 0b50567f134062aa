//! Configuration management for the localizer
//!
//! Runtime configuration is loaded from JSON files so that array geometry,
//! solver behaviour and detector thresholds can be tuned without
//! recompilation. Every section has defaults matching the reference
//! hardware (four microphones around a 1.15 m x 1.11 m desk, 41.666 kHz ADC).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::LocalizationError;
use crate::geometry::{Position, RECEIVER_COUNT};
use crate::solver::{DiscriminantPolicy, RootPolicy, SolverMode};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub array: ArrayConfig,
    pub solver: SolverConfig,
    pub delay: DelayConfig,
    pub detector: DetectorConfig,
    pub band_gate: Option<BandGateConfig>,
    pub stream: StreamConfig,
}

/// Receiver geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Receiver positions in metres
    pub positions: [[f64; 3]; RECEIVER_COUNT],
    /// Index of the receiver all delays are measured against
    pub reference_index: usize,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            positions: [
                [0.0, 0.0, 0.72],
                [0.0, 1.11, 1.0],
                [1.15, 1.11, 0.72],
                [1.14, 0.0, 0.72],
            ],
            reference_index: 0,
        }
    }
}

impl ArrayConfig {
    pub fn receiver_positions(&self) -> [Position; RECEIVER_COUNT] {
        self.positions.map(|[x, y, z]| Position::new(x, y, z))
    }
}

/// Multilateration solver parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Propagation speed in metres per second
    pub speed_of_sound: f64,
    pub mode: SolverMode,
    pub root_policy: RootPolicy,
    pub discriminant_policy: DiscriminantPolicy,
    pub iterative: IterativeConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            speed_of_sound: 340.0,
            mode: SolverMode::ClosedForm,
            root_policy: RootPolicy::ResidualBest,
            discriminant_policy: DiscriminantPolicy::Absolute,
            iterative: IterativeConfig::default(),
        }
    }
}

/// Newton iteration settings for [`SolverMode::Iterative`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterativeConfig {
    /// Starting reference distances, one per root
    pub initial_guesses: [f64; 2],
    pub max_iterations: usize,
    /// Convergence threshold on the Newton step, relative to 1 + |d|
    pub tolerance: f64,
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            initial_guesses: [-40.0, 40.0],
            max_iterations: 100,
            tolerance: 1e-10,
        }
    }
}

/// GCC-PHAT delay estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Transform length in samples
    pub fft_size: usize,
    /// ADC sampling rate in Hz
    pub sample_rate: u32,
    /// Frequency-domain zero padding factor for sub-sample resolution
    pub interpolation_factor: usize,
    /// Whiten the cross spectrum before the inverse transform
    pub phase_transform: bool,
    /// Estimate the three channel delays on scoped worker threads
    pub parallel_channels: bool,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            sample_rate: 41_666,
            interpolation_factor: 4,
            phase_transform: true,
            parallel_channels: false,
        }
    }
}

/// Envelope follower event detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Per-sample envelope decay multiplier (0..1)
    pub release_factor: f64,
    /// Envelope level that opens an event
    pub upper_threshold: f64,
    /// Envelope level at or below which an open event closes
    pub lower_threshold: f64,
    /// Samples kept before the event start when cutting the analysis window
    pub pre_trigger_samples: usize,
    /// Per-receiver rolling buffer capacity in samples
    pub buffer_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            release_factor: 0.999,
            upper_threshold: 0.3,
            lower_threshold: 0.05,
            pre_trigger_samples: 256,
            buffer_capacity: 16_384,
        }
    }
}

/// Spectral band-energy gate applied to detected events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandGateConfig {
    pub low_hz: f64,
    pub high_hz: f64,
    /// Minimum share of amplitude inside the band
    pub min_part: f64,
    /// Maximum share of amplitude inside the band
    pub max_part: f64,
    /// Minimum summed in-band amplitude
    pub noise_floor: f64,
}

impl Default for BandGateConfig {
    fn default() -> Self {
        Self {
            low_hz: 10_000.0,
            high_hz: 15_000.0,
            min_part: 0.05,
            max_part: 0.99,
            noise_floor: 5.0,
        }
    }
}

/// Streaming front-end parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Frames per chunk handed from the ingest thread
    pub chunk_frames: usize,
    /// Number of pre-allocated chunk buffers in flight
    pub pool_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            pool_size: 16,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file is missing or
    /// the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), LocalizationError> {
        if self.array.reference_index >= RECEIVER_COUNT {
            return Err(LocalizationError::invalid_input(format!(
                "reference index {} out of range [0, {}]",
                self.array.reference_index,
                RECEIVER_COUNT - 1
            )));
        }
        if !(self.solver.speed_of_sound > 0.0) {
            return Err(LocalizationError::invalid_input(
                "speed of sound must be positive",
            ));
        }
        if self.delay.fft_size < 2 {
            return Err(LocalizationError::invalid_input(
                "fft_size must be at least 2",
            ));
        }
        if self.delay.sample_rate == 0 {
            return Err(LocalizationError::invalid_input(
                "sample_rate must be greater than 0",
            ));
        }
        if self.delay.interpolation_factor == 0 {
            return Err(LocalizationError::invalid_input(
                "interpolation_factor must be at least 1",
            ));
        }
        if self.detector.lower_threshold >= self.detector.upper_threshold {
            return Err(LocalizationError::invalid_input(
                "detector lower_threshold must be below upper_threshold",
            ));
        }
        if !(0.0..1.0).contains(&self.detector.release_factor) {
            return Err(LocalizationError::invalid_input(
                "release_factor must be in [0, 1)",
            ));
        }
        if self.detector.buffer_capacity < self.delay.fft_size {
            return Err(LocalizationError::invalid_input(
                "detector buffer_capacity must hold at least one fft_size window",
            ));
        }
        if self.stream.chunk_frames == 0 || self.stream.pool_size == 0 {
            return Err(LocalizationError::invalid_input(
                "stream chunk_frames and pool_size must be greater than 0",
            ));
        }
        Ok(())
    }
}
