// Receiver - one microphone of the array

use crate::detection::SampleRing;
use crate::geometry::Position;

/// Default rolling buffer length per receiver (samples)
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct Receiver {
    id: usize,
    position: Position,
    is_reference: bool,
    /// Arrival time difference to the reference receiver in seconds,
    /// overwritten every localization cycle
    pub tdoa: f64,
    buffer: SampleRing,
}

impl Receiver {
    pub fn new(id: usize, position: Position) -> Self {
        Self::with_buffer_capacity(id, position, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_buffer_capacity(id: usize, position: Position, capacity: usize) -> Self {
        Self {
            id,
            position,
            is_reference: false,
            tdoa: 0.0,
            buffer: SampleRing::new(capacity),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    pub(crate) fn set_reference(&mut self, is_reference: bool) {
        self.is_reference = is_reference;
    }

    /// Squared distance of the receiver from the coordinate origin
    pub fn k(&self) -> f64 {
        self.position.norm_squared()
    }

    pub fn distance_to(&self, point: &Position) -> f64 {
        (self.position - point).norm()
    }

    pub fn buffer(&self) -> &SampleRing {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut SampleRing {
        &mut self.buffer
    }
}
