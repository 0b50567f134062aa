// SampleRing - fixed-capacity rolling sample buffer
//
// Each receiver owns one ring. Samples are addressed by their absolute
// index since the ring was created, so event boundaries reported by the
// segmenter can be cut out directly while the data is still retained.

/// Fixed-capacity ring buffer of samples with absolute-index range queries
#[derive(Debug, Clone)]
pub struct SampleRing {
    data: Vec<f64>,
    /// Next write slot
    head: usize,
    /// Total samples ever pushed
    written: u64,
}

impl SampleRing {
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            data: vec![0.0; capacity],
            head: 0,
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of samples currently retained
    pub fn len(&self) -> usize {
        self.written.min(self.data.len() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Absolute index one past the newest sample
    pub fn end_index(&self) -> u64 {
        self.written
    }

    /// Absolute index of the oldest retained sample
    pub fn start_index(&self) -> u64 {
        self.written - self.len() as u64
    }

    pub fn push(&mut self, sample: f64) {
        self.data[self.head] = sample;
        self.head = (self.head + 1) % self.data.len();
        self.written += 1;
    }

    pub fn extend_from_slice(&mut self, samples: &[f64]) {
        for &sample in samples {
            self.push(sample);
        }
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.written = 0;
    }

    /// Copy samples with absolute indices in `[start, end)`
    ///
    /// The range is clamped to what the ring still holds, so the result
    /// may be shorter than requested (or empty).
    pub fn range(&self, start: u64, end: u64) -> Vec<f64> {
        let start = start.max(self.start_index());
        let end = end.min(self.end_index());
        if start >= end {
            return Vec::new();
        }

        let capacity = self.data.len() as u64;
        (start..end)
            .map(|idx| self.data[(idx % capacity) as usize])
            .collect()
    }

    /// Copy of the newest `count` samples (fewer if not yet available)
    pub fn latest(&self, count: usize) -> Vec<f64> {
        let end = self.end_index();
        self.range(end.saturating_sub(count as u64), end)
    }
}
