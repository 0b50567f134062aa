// Streaming localization
//
// An ingest thread reads chunks from a ChunkSource and hands them to the
// localization loop over a ChunkPool. The loop appends every chunk to the
// receivers' rings and runs the event segmenter on the reference channel.
// Each closed event becomes one analysis window of fft_size samples that
// starts pre_trigger_samples before the event; once all four rings hold
// that window it is optionally band-gated and then localized.
//
// Module organization:
// - chunk_pool: pre-allocated chunks recycled over rtrb queues
// - source: ChunkSource trait, WAV and synthetic sources

pub mod chunk_pool;
pub mod source;

pub use chunk_pool::{Chunk, ChunkPool, ChunkPoolChannels, IngestChannels, ProcessingChannels};
pub use source::{write_wav, ChunkSource, SyntheticChunkSource, WavChunkSource};

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use rtrb::PopError;

use crate::config::{AppConfig, StreamConfig};
use crate::detection::{BandEnergy, BandEnergyGate, EventSegment, EventSegmenter};
use crate::error::{log_stream_error, LocalizationError, StreamError};
use crate::pipeline::{Localization, Localizer};

/// Back-off while a queue is empty
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// One detected event and what became of it
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub segment: EventSegment,
    /// Absolute index of the first sample of the analysis window
    pub window_start: u64,
    /// Band measurement of the reference window, when the gate is enabled
    pub band_energy: Option<BandEnergy>,
    pub outcome: Result<Localization, LocalizationError>,
}

/// Totals of a finished stream
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    /// Frames ingested per channel
    pub frames: u64,
    pub events: Vec<StreamEvent>,
    /// Events refused by the band gate
    pub rejected: usize,
    /// Events whose window was overwritten or never completed
    pub dropped: usize,
}

impl StreamSummary {
    pub fn localized(&self) -> impl Iterator<Item = &Localization> {
        self.events.iter().filter_map(|event| event.outcome.as_ref().ok())
    }
}

#[derive(Debug)]
pub struct StreamingLocalizer {
    localizer: Localizer,
    segmenter: EventSegmenter,
    gate: Option<BandEnergyGate>,
    pre_trigger: u64,
    pending: VecDeque<EventSegment>,
    rejected: usize,
    dropped: usize,
}

impl StreamingLocalizer {
    pub fn new(config: &AppConfig) -> Result<Self, LocalizationError> {
        Self::with_localizer(Localizer::new(config)?, config)
    }

    /// Wrap an already configured localizer (e.g. one with a predicate)
    pub fn with_localizer(localizer: Localizer, config: &AppConfig) -> Result<Self, LocalizationError> {
        let gate = config.band_gate.clone().map(BandEnergyGate::new).transpose()?;
        Ok(Self {
            localizer,
            segmenter: EventSegmenter::from_config(&config.detector),
            gate,
            pre_trigger: config.detector.pre_trigger_samples as u64,
            pending: VecDeque::new(),
            rejected: 0,
            dropped: 0,
        })
    }

    pub fn localizer(&self) -> &Localizer {
        &self.localizer
    }

    pub fn localizer_mut(&mut self) -> &mut Localizer {
        &mut self.localizer
    }

    /// Events detected but still waiting for their window to fill
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Append one chunk and localize every event whose window is complete
    pub fn push_chunk(&mut self, chunk: &Chunk) -> Vec<StreamEvent> {
        let reference = self.localizer.array().reference_index();
        for (index, receiver) in self.localizer.array_mut().receivers_mut().iter_mut().enumerate() {
            receiver.buffer_mut().extend_from_slice(chunk.channel(index));
        }

        let closed = self.segmenter.process(chunk.channel(reference), reference);
        for segment in &closed {
            tracing::debug!(
                "[Stream] Event on channel {}: samples {}..{}",
                segment.channel,
                segment.start,
                segment.end
            );
        }
        self.pending.extend(closed);
        self.drain_ready()
    }

    /// Drop events that can no longer complete
    ///
    /// # Returns
    /// Number of events dropped
    pub fn finish(&mut self) -> usize {
        let remaining = self.pending.len();
        if remaining > 0 {
            tracing::warn!(
                "[Stream] {} event(s) pending at end of stream, window incomplete",
                remaining
            );
        }
        self.pending.clear();
        self.dropped += remaining;
        remaining
    }

    fn drain_ready(&mut self) -> Vec<StreamEvent> {
        let size = self.localizer.transform().size() as u64;
        let ring = self.localizer.array().reference().buffer();
        let (ring_start, ring_end) = (ring.start_index(), ring.end_index());
        let mut events = Vec::new();

        while let Some(segment) = self.pending.front().copied() {
            let window_start = segment.start.saturating_sub(self.pre_trigger);
            if window_start + size > ring_end {
                break;
            }
            self.pending.pop_front();

            if window_start < ring_start {
                tracing::warn!(
                    "[Stream] Window for event at {} already overwritten, dropping",
                    segment.start
                );
                self.dropped += 1;
                continue;
            }

            let mut band_energy = None;
            if let Some(gate) = &self.gate {
                let window = self
                    .localizer
                    .array()
                    .reference()
                    .buffer()
                    .range(window_start, window_start + size);
                match gate.measure(self.localizer.transform(), &window) {
                    Ok(energy) if gate.accepts(&energy) => band_energy = Some(energy),
                    Ok(energy) => {
                        tracing::debug!(
                            "[Stream] Event at {} rejected by band gate (ratio {:.3}, band {:.3})",
                            segment.start,
                            energy.ratio(),
                            energy.band
                        );
                        self.rejected += 1;
                        continue;
                    }
                    Err(err) => {
                        events.push(StreamEvent {
                            segment,
                            window_start,
                            band_energy: None,
                            outcome: Err(err),
                        });
                        continue;
                    }
                }
            }

            let outcome = self.localizer.locate_window(window_start);
            if let Ok(localization) = &outcome {
                let position = localization.position();
                tracing::info!(
                    "[Stream] Event at {} localized to ({:.3}, {:.3}, {:.3})",
                    segment.start,
                    position.x,
                    position.y,
                    position.z
                );
            }
            events.push(StreamEvent {
                segment,
                window_start,
                band_energy,
                outcome,
            });
        }

        events
    }

    /// Stream `source` to exhaustion
    ///
    /// The source is read on a dedicated ingest thread; chunks travel
    /// through a [`ChunkPool`] sized by `stream`.
    pub fn run<S>(&mut self, source: S, stream: &StreamConfig) -> Result<StreamSummary, StreamError>
    where
        S: ChunkSource + 'static,
    {
        if stream.chunk_frames == 0 || stream.pool_size == 0 {
            return Err(LocalizationError::invalid_input(
                "stream chunk_frames and pool_size must be greater than 0",
            )
            .into());
        }
        self.check_source(&source)?;

        let (ingest, mut processing) =
            ChunkPool::new(stream.pool_size, stream.chunk_frames).split_for_threads();
        let ingest_thread = thread::Builder::new()
            .name("tdoa-ingest".to_string())
            .spawn(move || ingest_loop(source, ingest))?;

        tracing::info!(
            "[Stream] Started: {} frames per chunk, {} chunks in pool",
            stream.chunk_frames,
            stream.pool_size
        );

        let mut summary = StreamSummary::default();
        loop {
            let chunk = match processing.data_consumer.pop() {
                Ok(chunk) => chunk,
                Err(PopError::Empty) => {
                    if processing.data_consumer.is_abandoned() {
                        // Producer may have pushed its last chunk before hanging up
                        if processing.data_consumer.is_empty() {
                            break;
                        }
                        continue;
                    }
                    thread::sleep(IDLE_SLEEP);
                    continue;
                }
            };

            summary.frames += chunk.frames() as u64;
            summary.events.extend(self.push_chunk(&chunk));

            if processing.pool_producer.push(chunk).is_err() {
                tracing::warn!("[Stream] Pool queue full, dropping chunk");
            }
        }

        let ingested = ingest_thread.join().map_err(|_| StreamError::Disconnected {
            reason: "ingest thread panicked".to_string(),
        })?;
        let ingested = ingested.map_err(|err| {
            log_stream_error(&err, "StreamingLocalizer::run");
            err
        })?;

        self.finish();
        summary.rejected = self.rejected;
        summary.dropped = self.dropped;

        tracing::info!(
            "[Stream] Finished: {} frames ingested, {} events, {} rejected, {} dropped",
            ingested,
            summary.events.len(),
            summary.rejected,
            summary.dropped
        );
        Ok(summary)
    }

    fn check_source<S: ChunkSource>(&self, source: &S) -> Result<(), StreamError> {
        let expected_channels = self.localizer.array().receivers().len();
        if source.channels() != expected_channels {
            return Err(StreamError::ChannelMismatch {
                expected: expected_channels,
                found: source.channels(),
            });
        }
        let expected_rate = self.localizer.transform().sampling_rate();
        if source.sample_rate() != expected_rate {
            return Err(StreamError::UnsupportedFormat {
                reason: format!(
                    "source sample rate {} Hz does not match configured {} Hz",
                    source.sample_rate(),
                    expected_rate
                ),
            });
        }
        Ok(())
    }
}

/// Read `source` into pooled chunks until it runs dry
///
/// # Returns
/// Total frames read
fn ingest_loop<S: ChunkSource>(mut source: S, mut channels: IngestChannels) -> Result<u64, StreamError> {
    let mut total = 0u64;
    loop {
        let mut chunk = match channels.pool_consumer.pop() {
            Ok(chunk) => chunk,
            Err(PopError::Empty) => {
                if channels.pool_consumer.is_abandoned() {
                    return Err(StreamError::Disconnected {
                        reason: "localization loop stopped".to_string(),
                    });
                }
                thread::sleep(IDLE_SLEEP);
                continue;
            }
        };

        let frames = source.read_chunk(&mut chunk)?;
        if frames == 0 {
            return Ok(total);
        }
        total += frames as u64;

        if channels.data_producer.push(chunk).is_err() {
            return Err(StreamError::Disconnected {
                reason: "data queue rejected chunk".to_string(),
            });
        }
    }
}

/// Build a [`StreamingLocalizer`] from `config` and stream `source` through it
pub fn run_stream<S>(source: S, config: &AppConfig) -> Result<StreamSummary, StreamError>
where
    S: ChunkSource + 'static,
{
    let mut streaming = StreamingLocalizer::new(config)?;
    streaming.run(source, &config.stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArrayConfig;
    use crate::geometry::Position;
    use crate::simulation::{PulseShape, SimulationContext};

    fn stream_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.array = ArrayConfig {
            positions: [
                [-1.5, -1.5, -1.5],
                [-1.5, 1.5, 1.5],
                [1.5, 1.5, -1.5],
                [1.5, -1.5, -1.5],
            ],
            reference_index: 0,
        };
        config.delay.sample_rate = 48_000;
        config.delay.interpolation_factor = 8;
        config.detector.pre_trigger_samples = 2048;
        config.stream.chunk_frames = 1000;
        config.stream.pool_size = 4;
        config
    }

    fn pulse_train(count: usize) -> PulseShape {
        PulseShape {
            length: 48_000,
            count,
            interval: 0.25,
            emission_sample: 3000.0,
            ..PulseShape::default()
        }
    }

    #[test]
    fn test_push_chunk_localizes_after_window_fills() {
        let config = stream_config();
        let source_position = Position::new(0.4, -0.3, 0.2);
        let mut streaming = StreamingLocalizer::new(&config).unwrap();
        let context = SimulationContext::new(source_position, 340.0);
        let mut source = SyntheticChunkSource::from_simulation(
            &context,
            streaming.localizer().array(),
            &pulse_train(1),
        )
        .unwrap();

        let mut chunk = Chunk::with_capacity(500);
        let mut events = Vec::new();
        while source.read_chunk(&mut chunk).unwrap() > 0 {
            events.extend(streaming.push_chunk(&chunk));
        }

        assert_eq!(events.len(), 1);
        assert_eq!(streaming.pending_events(), 0);
        let localization = events[0].outcome.as_ref().unwrap();
        assert!((localization.position() - source_position).norm() < 0.01);
        assert!(localization.delay_confidence.is_some());
    }

    #[test]
    fn test_run_stream_over_synthetic_source() {
        let config = stream_config();
        let source_position = Position::new(-0.8, 0.6, 0.5);
        let array = Localizer::new(&config).unwrap().array().clone();
        let context = SimulationContext::new(source_position, 340.0);
        let source = SyntheticChunkSource::from_simulation(&context, &array, &pulse_train(3)).unwrap();

        let summary = run_stream(source, &config).unwrap();
        assert_eq!(summary.frames, 48_000);
        assert_eq!(summary.events.len(), 3);
        assert_eq!(summary.localized().count(), 3);
        for localization in summary.localized() {
            assert!((localization.position() - source_position).norm() < 0.01);
        }
    }

    #[test]
    fn test_band_gate_rejects_baseband_pulses() {
        let mut config = stream_config();
        config.band_gate = Some(crate::config::BandGateConfig {
            low_hz: 20_000.0,
            high_hz: 23_000.0,
            min_part: 0.5,
            max_part: 1.0,
            noise_floor: 0.0,
        });
        let array = Localizer::new(&config).unwrap().array().clone();
        let context = SimulationContext::new(Position::new(0.3, -0.2, 0.1), 340.0);
        let pulse = PulseShape {
            width: 6.0 / 48_000.0,
            ..pulse_train(2)
        };
        let source = SyntheticChunkSource::from_simulation(&context, &array, &pulse).unwrap();

        let summary = run_stream(source, &config).unwrap();
        assert_eq!(summary.events.len(), 0);
        assert_eq!(summary.rejected, 2);
    }

    #[test]
    fn test_sample_rate_mismatch_is_rejected() {
        let config = stream_config();
        let source = SyntheticChunkSource::new(std::array::from_fn(|_| vec![0.0; 16]), 8_000).unwrap();
        assert!(matches!(
            run_stream(source, &config),
            Err(StreamError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_zero_sized_stream_config_is_an_error() {
        let config = stream_config();
        for (chunk_frames, pool_size) in [(0, 4), (1000, 0)] {
            let mut streaming = StreamingLocalizer::new(&config).unwrap();
            let source = SyntheticChunkSource::new(std::array::from_fn(|_| vec![0.0; 16]), 48_000).unwrap();
            let stream = StreamConfig {
                chunk_frames,
                pool_size,
            };
            assert!(matches!(
                streaming.run(source, &stream),
                Err(StreamError::Localization(LocalizationError::InvalidInput { .. }))
            ));
        }
    }

    #[test]
    fn test_unfinished_event_is_dropped() {
        let mut config = stream_config();
        config.detector.release_factor = 0.5;
        let mut streaming = StreamingLocalizer::new(&config).unwrap();

        // Click closes within the chunk, but its window runs past the data
        let mut chunk = Chunk::with_capacity(3000);
        for channel in chunk.channels_mut().iter_mut() {
            channel[2500] = 1.0;
        }
        chunk.set_frames(3000);
        assert!(streaming.push_chunk(&chunk).is_empty());
        assert_eq!(streaming.pending_events(), 1);

        assert_eq!(streaming.finish(), 1);
        assert_eq!(streaming.pending_events(), 0);
    }
}
