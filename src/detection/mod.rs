// Detection module - candidate event detection in streaming audio
//
// Module organization:
// - ring: per-receiver rolling sample buffer with absolute indexing
// - segmenter: envelope follower producing event start/end indices
// - band_gate: spectral band-energy plausibility check

pub mod band_gate;
pub mod ring;
pub mod segmenter;

pub use band_gate::{BandEnergy, BandEnergyGate};
pub use ring::SampleRing;
pub use segmenter::{EventSegment, EventSegmenter};
