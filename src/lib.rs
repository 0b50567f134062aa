// TDoA Localizer - acoustic source localization from time differences of arrival
// Four receivers, GCC-PHAT delay estimation and closed-form multilateration

// Module declarations
pub mod config;
pub mod detection;
pub mod dsp;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod report;
pub mod simulation;
pub mod solver;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::{ErrorCode, LocalizationError, StreamError};
pub use geometry::{Position, Receiver, ReceiverArray, RECEIVER_COUNT};
pub use pipeline::stream::{run_stream, StreamSummary, StreamingLocalizer};
pub use pipeline::{Localization, Localizer};
pub use report::OutboundMessage;
pub use simulation::{PulseShape, SimulationContext};
pub use solver::{MultilaterationSolver, SolverResult};

/// Install the fmt subscriber at `level`
///
/// `log` records are forwarded to the subscriber as well. Calling this
/// again after a subscriber is installed does nothing.
pub fn init_logging(level: tracing::Level) {
    if tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
    {
        tracing::debug!("[Logging] Subscriber installed at {}", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(tracing::Level::DEBUG);
        init_logging(tracing::Level::INFO);
    }
}
