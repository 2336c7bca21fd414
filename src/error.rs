//! Error taxonomy for the driver and its collaborators.
//!
//! Configuration problems are detected eagerly before integration starts;
//! everything else carries enough context (time, interval, counts) to
//! reproduce the failure. "No event in this step" is a normal outcome and
//! never surfaces as an error.

use thiserror::Error;

/// Failure reported by a backend while attempting to advance.
///
/// A backend raises this only when its own error control could not complete
/// a step after internal retries; single-step rejections are reported through
/// [`crate::backend::AdvanceOutcome::Rejected`] instead.
#[derive(Debug, Clone, Error)]
#[error("backend failure at t = {t}: {message}")]
pub struct BackendError {
    /// Time at which the backend gave up
    pub t: f64,
    /// Backend-specific description of the failure
    pub message: String,
}

/// Errors raised by the stepping driver.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Communication grid is empty, non-monotone, or lies outside the span.
    #[error("invalid communication grid: {reason}")]
    InvalidGrid {
        /// What the validation found
        reason: String,
    },

    /// Malformed tolerance configuration.
    #[error("invalid tolerance: {reason}")]
    InvalidTolerance {
        /// What the validation found
        reason: String,
    },

    /// Non-finite initial time, horizon, or state component.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What the validation found
        reason: String,
    },

    /// The backend could not complete a step within its own error control.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Event localization did not converge inside the bracket.
    #[error("event localization failed to converge in [{t_lo}, {t_hi}]")]
    RootLocalization {
        /// Lower end of the offending bracket
        t_lo: f64,
        /// Upper end of the offending bracket
        t_hi: f64,
    },

    /// Too many consecutive step rejections.
    #[error("{count} consecutive rejected steps at t = {t} (last attempted h = {h_last})")]
    ExcessiveRejections {
        /// Time at which progress stalled
        t: f64,
        /// Step size of the last rejected attempt
        h_last: f64,
        /// Number of consecutive rejections
        count: u32,
    },

    /// Global step-count safeguard tripped.
    #[error("maximum number of internal steps exceeded at t = {t}")]
    MaxStepsExceeded {
        /// Time reached when the limit was hit
        t: f64,
    },

    /// An accepted step produced a non-finite state component.
    #[error("non-finite state detected at t = {t}")]
    NonFiniteState {
        /// Time of the offending step end
        t: f64,
    },
}
