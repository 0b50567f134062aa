// Chunk sources - where streamed receiver samples come from
//
// A source hands out de-interleaved four-channel chunks until it runs
// dry. WAV recordings are read with hound (one channel per receiver, in
// receiver order); synthetic sources replay buffers rendered by a
// simulation.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::StreamError;
use crate::geometry::{ReceiverArray, RECEIVER_COUNT};
use crate::pipeline::stream::chunk_pool::Chunk;
use crate::simulation::{PulseShape, SimulationContext};

/// Producer of four-channel sample chunks
pub trait ChunkSource: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    /// Fill `chunk` with the next frames
    ///
    /// # Returns
    /// Number of frames written; 0 once the source is exhausted
    fn read_chunk(&mut self, chunk: &mut Chunk) -> Result<usize, StreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WavEncoding {
    Float,
    Int { bits: u16 },
}

/// Four-channel WAV file source
pub struct WavChunkSource {
    reader: hound::WavReader<BufReader<File>>,
    encoding: WavEncoding,
    sample_rate: u32,
    path: PathBuf,
}

impl std::fmt::Debug for WavChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavChunkSource")
            .field("path", &self.path)
            .field("encoding", &self.encoding)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl WavChunkSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.channels as usize != RECEIVER_COUNT {
            return Err(StreamError::ChannelMismatch {
                expected: RECEIVER_COUNT,
                found: spec.channels as usize,
            });
        }

        let encoding = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => WavEncoding::Float,
            (hound::SampleFormat::Int, bits @ (16 | 24 | 32)) => WavEncoding::Int { bits },
            (format, bits) => {
                return Err(StreamError::UnsupportedFormat {
                    reason: format!(
                        "{:?} samples with {} bits in {}",
                        format,
                        bits,
                        path.display()
                    ),
                })
            }
        };

        Ok(Self {
            reader,
            encoding,
            sample_rate: spec.sample_rate,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total frames in the file
    pub fn duration_frames(&self) -> u32 {
        self.reader.duration()
    }
}

impl ChunkSource for WavChunkSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        RECEIVER_COUNT
    }

    fn read_chunk(&mut self, chunk: &mut Chunk) -> Result<usize, StreamError> {
        match self.encoding {
            WavEncoding::Float => fill_interleaved(self.reader.samples::<f32>(), chunk, f64::from),
            WavEncoding::Int { bits } => {
                let max = ((1i64 << (bits - 1)) - 1) as f64;
                fill_interleaved(self.reader.samples::<i32>(), chunk, |v: i32| v as f64 / max)
            }
        }
    }
}

/// De-interleave whole frames from `samples` into `chunk`
///
/// A trailing partial frame at end of file is discarded.
fn fill_interleaved<S, I, F>(mut samples: I, chunk: &mut Chunk, convert: F) -> Result<usize, StreamError>
where
    I: Iterator<Item = hound::Result<S>>,
    F: Fn(S) -> f64,
{
    let capacity = chunk.capacity();
    let channels = chunk.channels_mut();
    let mut frames = 0;
    let mut channel = 0;

    while frames < capacity {
        let Some(sample) = samples.next() else {
            break;
        };
        channels[channel][frames] = convert(sample?);
        channel += 1;
        if channel == RECEIVER_COUNT {
            channel = 0;
            frames += 1;
        }
    }

    chunk.set_frames(frames);
    Ok(frames)
}

/// Write four receiver channels as a 32-bit float WAV file
pub fn write_wav(
    path: impl AsRef<Path>,
    channels: &[Vec<f64>; RECEIVER_COUNT],
    sample_rate: u32,
) -> Result<(), StreamError> {
    let frames = channels[0].len();
    if let Some(other) = channels.iter().find(|c| c.len() != frames) {
        return Err(StreamError::UnsupportedFormat {
            reason: format!("channel lengths differ ({} vs {})", frames, other.len()),
        });
    }

    let spec = hound::WavSpec {
        channels: RECEIVER_COUNT as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for frame in 0..frames {
        for channel in channels.iter() {
            writer.write_sample(channel[frame] as f32)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// In-memory source replaying pre-rendered channels
#[derive(Debug, Clone)]
pub struct SyntheticChunkSource {
    channels: [Vec<f64>; RECEIVER_COUNT],
    sample_rate: u32,
    position: usize,
}

impl SyntheticChunkSource {
    pub fn new(channels: [Vec<f64>; RECEIVER_COUNT], sample_rate: u32) -> Result<Self, StreamError> {
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(StreamError::UnsupportedFormat {
                reason: "synthetic channels must have equal length".to_string(),
            });
        }
        Ok(Self {
            channels,
            sample_rate,
            position: 0,
        })
    }

    /// Render `pulse` for `array` as seen from `context`'s source
    pub fn from_simulation(
        context: &SimulationContext,
        array: &ReceiverArray,
        pulse: &PulseShape,
    ) -> Result<Self, StreamError> {
        let channels = context.synthesize(array, pulse)?;
        Self::new(channels, pulse.sample_rate)
    }

    pub fn remaining_frames(&self) -> usize {
        self.channels[0].len() - self.position
    }
}

impl ChunkSource for SyntheticChunkSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        RECEIVER_COUNT
    }

    fn read_chunk(&mut self, chunk: &mut Chunk) -> Result<usize, StreamError> {
        let frames = self.remaining_frames().min(chunk.capacity());
        let start = self.position;
        for (target, source) in chunk.channels_mut().iter_mut().zip(self.channels.iter()) {
            target[..frames].copy_from_slice(&source[start..start + frames]);
        }
        self.position += frames;
        chunk.set_frames(frames);
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tdoa_source_{}_{}.wav", std::process::id(), name))
    }

    #[test]
    fn test_synthetic_source_chunks_until_empty() {
        let channels = std::array::from_fn(|c| (0..10).map(|i| (c * 100 + i) as f64).collect());
        let mut source = SyntheticChunkSource::new(channels, 8_000).unwrap();
        let mut chunk = Chunk::with_capacity(4);

        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 4);
        assert_eq!(chunk.channel(1), &[100.0, 101.0, 102.0, 103.0]);
        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 4);
        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 2);
        assert_eq!(chunk.channel(3), &[308.0, 309.0]);
        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 0);
    }

    #[test]
    fn test_synthetic_source_rejects_ragged_channels() {
        let channels = [vec![0.0; 4], vec![0.0; 4], vec![0.0; 3], vec![0.0; 4]];
        assert!(SyntheticChunkSource::new(channels, 8_000).is_err());
    }

    #[test]
    fn test_wav_float_roundtrip_deinterleaves() {
        let path = temp_path("float");
        let channels: [Vec<f64>; RECEIVER_COUNT] =
            std::array::from_fn(|c| (0..6).map(|i| (c as f64 + 1.0) * 0.1 * i as f64).collect());
        write_wav(&path, &channels, 41_666).unwrap();

        let mut source = WavChunkSource::open(&path).unwrap();
        assert_eq!(source.sample_rate(), 41_666);
        assert_eq!(source.duration_frames(), 6);

        let mut chunk = Chunk::with_capacity(4);
        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 4);
        for (c, expected) in channels.iter().enumerate() {
            for (got, want) in chunk.channel(c).iter().zip(expected.iter()) {
                assert!((got - want).abs() < 1e-6);
            }
        }
        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 2);
        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wav_int16_is_normalized() {
        let path = temp_path("int16");
        let spec = hound::WavSpec {
            channels: 4,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [i16::MAX, 0, i16::MIN + 1, 16_384] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavChunkSource::open(&path).unwrap();
        let mut chunk = Chunk::with_capacity(8);
        assert_eq!(source.read_chunk(&mut chunk).unwrap(), 1);
        assert_eq!(chunk.channel(0), &[1.0]);
        assert_eq!(chunk.channel(1), &[0.0]);
        assert_eq!(chunk.channel(2), &[-1.0]);
        assert!((chunk.channel(3)[0] - 0.5).abs() < 1e-4);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wav_with_wrong_channel_count() {
        let path = temp_path("stereo");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            WavChunkSource::open(&path),
            Err(StreamError::ChannelMismatch {
                expected: 4,
                found: 2
            })
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_wav_is_io_error() {
        let result = WavChunkSource::open(temp_path("does_not_exist"));
        assert!(matches!(result, Err(StreamError::Io { .. })));
    }
}
