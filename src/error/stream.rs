// Stream error types and constants

use crate::error::{ErrorCode, LocalizationError};
use log::error;
use std::fmt;

/// Stream error code constants
///
/// Error code range: 2001-2005
pub struct StreamErrorCodes {}

impl StreamErrorCodes {
    /// Reading the input source failed
    pub const IO: i32 = 2001;

    /// Input file uses an unsupported sample layout
    pub const UNSUPPORTED_FORMAT: i32 = 2002;

    /// Input channel count does not match the receiver array
    pub const CHANNEL_MISMATCH: i32 = 2003;

    /// Ingest thread stopped or the chunk queue closed unexpectedly
    pub const DISCONNECTED: i32 = 2004;

    /// A localization cycle failed inside the stream
    pub const LOCALIZATION: i32 = 2005;
}

/// Log a stream error with structured context
pub fn log_stream_error(err: &StreamError, context: &str) {
    error!(
        "Stream error in {}: code={}, component=StreamingLocalizer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Streaming front-end errors
///
/// These errors cover sample ingestion (WAV files, synthetic sources),
/// the ingest/processing hand-off and localization failures surfaced
/// while streaming.
///
/// Error code ranges: 2001-2005
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Reading samples failed
    Io { details: String },

    /// Unsupported sample format or bit depth
    UnsupportedFormat { reason: String },

    /// Wrong number of channels for a four-receiver array
    ChannelMismatch { expected: usize, found: usize },

    /// Ingest thread hung up
    Disconnected { reason: String },

    /// Localization of a detected event failed
    Localization(LocalizationError),
}

impl ErrorCode for StreamError {
    fn code(&self) -> i32 {
        match self {
            StreamError::Io { .. } => StreamErrorCodes::IO,
            StreamError::UnsupportedFormat { .. } => StreamErrorCodes::UNSUPPORTED_FORMAT,
            StreamError::ChannelMismatch { .. } => StreamErrorCodes::CHANNEL_MISMATCH,
            StreamError::Disconnected { .. } => StreamErrorCodes::DISCONNECTED,
            StreamError::Localization(_) => StreamErrorCodes::LOCALIZATION,
        }
    }

    fn message(&self) -> String {
        match self {
            StreamError::Io { details } => format!("I/O error: {}", details),
            StreamError::UnsupportedFormat { reason } => {
                format!("Unsupported input format: {}", reason)
            }
            StreamError::ChannelMismatch { expected, found } => {
                format!("Expected {} channels, found {}", expected, found)
            }
            StreamError::Disconnected { reason } => format!("Stream disconnected: {}", reason),
            StreamError::Localization(inner) => inner.message(),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Localization(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for StreamError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => io.into(),
            hound::Error::Unsupported => StreamError::UnsupportedFormat {
                reason: "unsupported WAV feature".to_string(),
            },
            other => StreamError::UnsupportedFormat {
                reason: other.to_string(),
            },
        }
    }
}

impl From<LocalizationError> for StreamError {
    fn from(err: LocalizationError) -> Self {
        StreamError::Localization(err)
    }
}
