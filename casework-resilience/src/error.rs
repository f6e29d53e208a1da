//! Terminal errors surfaced by the retry layer.

use crate::classify::ClassifiedError;
use crate::executor::RetryState;
use thiserror::Error;

/// Terminal outcome of a retried operation.
///
/// Every variant that wraps a [`ClassifiedError`] exposes it through
/// [`ResilienceError::classified`], so callers can always reach the
/// user-facing message and recovery suggestions.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The first failure was not retryable.
    #[error("operation rejected: {}", .0.user_message)]
    Rejected(ClassifiedError),

    /// The session expired; the session-expiry side effect has already fired.
    #[error("session expired: {}", .0.user_message)]
    Session(ClassifiedError),

    /// The retry budget ran out. Distinct from [`ResilienceError::Rejected`]
    /// so callers can tell "gave up after N tries" from "failed once".
    #[error("gave up after {attempts} attempt(s): {}", .last.user_message)]
    Exhausted {
        /// Number of invocations made.
        attempts: u32,
        /// Classification of the last underlying failure.
        last: ClassifiedError,
    },

    /// The registered operation was cancelled.
    #[error("retry operation '{id}' was cancelled")]
    Cancelled {
        /// Registered operation id.
        id: String,
    },

    /// Automatic retry is disabled and the failed operation now awaits a
    /// manual trigger through the retry manager.
    #[error("operation '{id}' awaiting manual retry after {} attempt(s)", .state.attempt)]
    AwaitingManual {
        /// Registered operation id.
        id: String,
        /// State to drive the UI's retry control.
        state: Box<RetryState>,
    },

    /// No operation is registered under the given id.
    #[error("no registered retry operation '{id}'")]
    Unknown {
        /// Requested operation id.
        id: String,
    },

    /// The registered operation is still being driven automatically; a
    /// manual trigger is only accepted once it is awaiting one.
    #[error("retry operation '{id}' is still in flight")]
    InFlight {
        /// Registered operation id.
        id: String,
    },

    /// The retry policy is malformed.
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl ResilienceError {
    /// The classification attached to this error, when one exists.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Rejected(c) | Self::Session(c) => Some(c),
            Self::Exhausted { last, .. } => Some(last),
            Self::AwaitingManual { state, .. } => state.last_error.as_ref(),
            Self::Cancelled { .. }
            | Self::Unknown { .. }
            | Self::InFlight { .. }
            | Self::InvalidPolicy(_) => None,
        }
    }

    /// User-facing message for this error.
    pub fn user_message(&self) -> String {
        match self.classified() {
            Some(c) => c.user_message.clone(),
            None => self.to_string(),
        }
    }

    /// Ordered recovery suggestions, empty when none apply.
    pub fn recovery_suggestions(&self) -> &[String] {
        self.classified()
            .map(|c| c.recovery_suggestions.as_slice())
            .unwrap_or(&[])
    }

    /// Whether this is the retry-exhausted terminal error.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Whether the underlying failure was a session expiry.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

/// Result type for retried operations.
pub type ResilienceResult<T> = Result<T, ResilienceError>;
