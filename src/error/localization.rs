// Localization error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Localization error code constants
///
/// Single source of truth for the numeric codes carried by
/// [`LocalizationError`] and by outbound error reports.
///
/// Error code range: 1001-1005
pub struct LocalizationErrorCodes {}

impl LocalizationErrorCodes {
    /// Malformed caller input (receiver count, reference index, factors)
    pub const INVALID_INPUT: i32 = 1001;

    /// Singular relative-position matrix or vanishing quadratic coefficient
    pub const DEGENERATE_GEOMETRY: i32 = 1002;

    /// Spectral input does not match the configured transform size
    pub const INVALID_SIGNAL_LENGTH: i32 = 1003;

    /// Negative discriminant rejected by the configured policy
    pub const NO_REAL_SOLUTION: i32 = 1004;

    /// Iterative root finder did not converge
    pub const NO_CONVERGENCE: i32 = 1005;
}

/// Log a localization error with structured context
///
/// Emits a single line with the numeric code, the failing component and
/// the human-readable message. Only the pipeline layer calls this; the
/// numeric core returns errors without logging them.
pub fn log_localization_error(err: &LocalizationError, context: &str) {
    error!(
        "Localization error in {}: code={}, component=Localizer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Localization-related errors
///
/// These errors cover spectral transforms, delay estimation, receiver
/// geometry and the multilateration solver.
///
/// Error code ranges: 1001-1005
#[derive(Debug, Clone, PartialEq)]
pub enum LocalizationError {
    /// Malformed caller input
    InvalidInput { reason: String },

    /// Receiver geometry cannot produce a unique solution
    DegenerateGeometry { reason: String },

    /// Buffer length does not match the transform size
    InvalidSignalLength { expected: usize, actual: usize },

    /// `b² − 4ac` is negative and the discriminant policy is `Reject`
    NoRealSolution { discriminant: f64 },

    /// Iterative solver exhausted its iteration budget
    NoConvergence { iterations: usize },
}

impl LocalizationError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        LocalizationError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        LocalizationError::DegenerateGeometry {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for LocalizationError {
    fn code(&self) -> i32 {
        match self {
            LocalizationError::InvalidInput { .. } => LocalizationErrorCodes::INVALID_INPUT,
            LocalizationError::DegenerateGeometry { .. } => {
                LocalizationErrorCodes::DEGENERATE_GEOMETRY
            }
            LocalizationError::InvalidSignalLength { .. } => {
                LocalizationErrorCodes::INVALID_SIGNAL_LENGTH
            }
            LocalizationError::NoRealSolution { .. } => LocalizationErrorCodes::NO_REAL_SOLUTION,
            LocalizationError::NoConvergence { .. } => LocalizationErrorCodes::NO_CONVERGENCE,
        }
    }

    fn message(&self) -> String {
        match self {
            LocalizationError::InvalidInput { reason } => format!("Invalid input: {}", reason),
            LocalizationError::DegenerateGeometry { reason } => {
                format!("Degenerate geometry: {}", reason)
            }
            LocalizationError::InvalidSignalLength { expected, actual } => {
                format!(
                    "Invalid signal length: {} (transform expects {})",
                    actual, expected
                )
            }
            LocalizationError::NoRealSolution { discriminant } => {
                format!(
                    "No real solution: discriminant {:e} is negative",
                    discriminant
                )
            }
            LocalizationError::NoConvergence { iterations } => {
                format!("Iterative solver did not converge after {} iterations", iterations)
            }
        }
    }
}

impl fmt::Display for LocalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocalizationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for LocalizationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localization_error_codes() {
        assert_eq!(
            LocalizationError::invalid_input("x").code(),
            LocalizationErrorCodes::INVALID_INPUT
        );
        assert_eq!(
            LocalizationError::degenerate("x").code(),
            LocalizationErrorCodes::DEGENERATE_GEOMETRY
        );
        assert_eq!(
            LocalizationError::InvalidSignalLength {
                expected: 513,
                actual: 12
            }
            .code(),
            LocalizationErrorCodes::INVALID_SIGNAL_LENGTH
        );
        assert_eq!(
            LocalizationError::NoRealSolution { discriminant: -1.0 }.code(),
            LocalizationErrorCodes::NO_REAL_SOLUTION
        );
        assert_eq!(
            LocalizationError::NoConvergence { iterations: 100 }.code(),
            LocalizationErrorCodes::NO_CONVERGENCE
        );
    }

    #[test]
    fn test_localization_error_messages() {
        let err = LocalizationError::InvalidSignalLength {
            expected: 513,
            actual: 12,
        };
        assert_eq!(
            err.message(),
            "Invalid signal length: 12 (transform expects 513)"
        );

        let err = LocalizationError::degenerate("singular matrix");
        assert!(err.message().contains("singular matrix"));
    }

    #[test]
    fn test_localization_error_display() {
        let err = LocalizationError::NoConvergence { iterations: 7 };
        let display = format!("{}", err);
        assert!(display.contains("LocalizationError"));
        assert!(display.contains(&err.code().to_string()));
    }
}
