// Error types for the TDoA localizer
//
// This module defines custom error types for localization and streaming
// operations, providing structured error handling with numeric error codes
// suitable for a remote reporting layer.

mod localization;
mod stream;

pub use localization::{log_localization_error, LocalizationError, LocalizationErrorCodes};
pub use stream::{log_stream_error, StreamError, StreamErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error reporting across
/// the library and the reporting layer.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
