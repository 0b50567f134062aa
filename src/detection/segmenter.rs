// EventSegmenter - envelope follower with hysteresis
//
// The envelope decays by `release_factor` every sample and jumps to the
// rectified sample whenever that is larger. An event opens when the
// envelope rises above the upper threshold and closes once it falls to
// or below the lower threshold. Indices are absolute sample counts, so an
// event may open in one chunk and close in a later one.

use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;

/// Boundaries of a detected acoustic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSegment {
    /// Absolute index of the sample that opened the event
    pub start: u64,
    /// Absolute index of the sample that closed the event
    pub end: u64,
    /// Channel whose signal triggered the event
    pub channel: usize,
}

impl EventSegment {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

#[derive(Debug)]
pub struct EventSegmenter {
    envelope: f64,
    release_factor: f64,
    upper_threshold: f64,
    lower_threshold: f64,
    open_event: Option<(u64, usize)>,
    samples_seen: u64,
}

impl EventSegmenter {
    pub fn new(release_factor: f64, upper_threshold: f64, lower_threshold: f64) -> Self {
        Self {
            envelope: 0.0,
            release_factor,
            upper_threshold,
            lower_threshold,
            open_event: None,
            samples_seen: 0,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            config.release_factor,
            config.upper_threshold,
            config.lower_threshold,
        )
    }

    /// Reset internal state (e.g. when restarting a stream)
    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.open_event = None;
        self.samples_seen = 0;
    }

    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    pub fn is_above_threshold(&self) -> bool {
        self.open_event.is_some()
    }

    /// Absolute index of the next sample to be processed
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Feed the next block of samples from `channel`
    ///
    /// # Returns
    /// Events that closed inside this block, in order
    pub fn process(&mut self, signal: &[f64], channel: usize) -> Vec<EventSegment> {
        let mut events = Vec::new();

        for &sample in signal {
            let idx = self.samples_seen;
            self.samples_seen += 1;

            self.envelope = (self.envelope * self.release_factor).max(sample.abs());

            match self.open_event {
                None if self.envelope > self.upper_threshold => {
                    self.open_event = Some((idx, channel));
                }
                Some((start, trigger_channel)) if self.envelope <= self.lower_threshold => {
                    self.open_event = None;
                    events.push(EventSegment {
                        start,
                        end: idx,
                        channel: trigger_channel,
                    });
                }
                _ => {}
            }
        }

        events
    }
}
