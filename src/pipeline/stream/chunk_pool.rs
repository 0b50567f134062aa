// ChunkPool - recycled multi-channel sample chunks over dual SPSC queues
//
// Two lock-free rtrb ring buffers move pre-allocated chunks between the
// ingest thread and the localization loop, so steady-state streaming
// allocates nothing per chunk.
//
// Chunk flow:
// 1. Ingest thread pops an empty chunk from the pool queue
// 2. Ingest thread fills it from the chunk source
// 3. Ingest thread pushes it to the data queue
// 4. Localization loop pops it, feeds the receivers and the segmenter
// 5. Localization loop pushes it back to the pool queue

use rtrb::{Consumer, Producer};

use crate::geometry::RECEIVER_COUNT;

/// De-interleaved block of frames, one vector per receiver
///
/// Every channel vector keeps its full capacity; only the first
/// `frames()` samples are valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    channels: [Vec<f64>; RECEIVER_COUNT],
    frames: usize,
}

impl Chunk {
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| vec![0.0; frames]),
            frames: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.channels[0].len()
    }

    /// Number of valid frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Mark the first `frames` samples of every channel valid (clamped to capacity)
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.capacity());
    }

    /// Valid samples of one channel
    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channels[index][..self.frames]
    }

    /// Full-capacity channel storage for filling
    pub fn channels_mut(&mut self) -> &mut [Vec<f64>; RECEIVER_COUNT] {
        &mut self.channels
    }
}

/// Queue ends used by the thread that reads the chunk source
pub struct IngestChannels {
    pub pool_consumer: Consumer<Chunk>,
    pub data_producer: Producer<Chunk>,
}

/// Queue ends used by the localization loop
pub struct ProcessingChannels {
    pub data_consumer: Consumer<Chunk>,
    pub pool_producer: Producer<Chunk>,
}

/// All four queue ends, as returned by [`ChunkPool::new`]
pub struct ChunkPoolChannels {
    pub data_producer: Producer<Chunk>,
    pub data_consumer: Consumer<Chunk>,
    pub pool_producer: Producer<Chunk>,
    pub pool_consumer: Consumer<Chunk>,
}

impl ChunkPoolChannels {
    pub fn split_for_threads(self) -> (IngestChannels, ProcessingChannels) {
        (
            IngestChannels {
                pool_consumer: self.pool_consumer,
                data_producer: self.data_producer,
            },
            ProcessingChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

pub struct ChunkPool;

impl ChunkPool {
    /// Pre-allocate `chunk_count` chunks of `chunk_frames` frames
    ///
    /// # Panics
    /// Panics if either argument is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(chunk_count: usize, chunk_frames: usize) -> ChunkPoolChannels {
        assert!(chunk_count > 0, "chunk_count must be greater than 0");
        assert!(chunk_frames > 0, "chunk_frames must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(chunk_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(chunk_count);

        for _ in 0..chunk_count {
            // Queue capacity equals chunk_count, so this never overflows
            let _ = pool_producer.push(Chunk::with_capacity(chunk_frames));
        }

        ChunkPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}
