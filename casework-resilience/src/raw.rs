//! Raw boundary errors.
//!
//! [`RawError`] is the shape every transport collaborator must produce on
//! failure: an optional HTTP status, an optional machine error code, and a
//! human-oriented message. The classifier consumes nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An untyped failure as reported by a transport collaborator.
///
/// Controlled transports should always populate `status` and `code`; the
/// message-based heuristics in the classifier exist only for errors from
/// uncontrolled sources.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawError {
    /// HTTP status code, if the failure came from an HTTP response.
    /// `Some(0)` is the conventional "no response at all" marker.
    pub status: Option<u16>,
    /// Machine-readable error code, e.g. `SESSION_EXPIRED` or `BR_SELF_APPROVAL`.
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl From<anyhow::Error> for RawError {
    fn from(err: anyhow::Error) -> Self {
        Self::message(err.to_string())
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code.as_deref()) {
            (Some(status), Some(code)) => {
                write!(f, "{} (status {}, code {})", self.message, status, code)
            }
            (Some(status), None) => write!(f, "{} (status {})", self.message, status),
            (None, Some(code)) => write!(f, "{} (code {})", self.message, code),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl RawError {
    /// Create an error from an HTTP response status and message.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    /// Create an error carrying a machine error code.
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Create a connection-level error (no response was received).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            code: Some("ERR_NETWORK".to_string()),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            code: Some("ETIMEDOUT".to_string()),
            message: message.into(),
        }
    }

    /// Create a bare message error with no status or code.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether any structured field (status or code) is populated.
    pub fn is_structured(&self) -> bool {
        self.status.is_some() || self.code.is_some()
    }

    /// The error code in uppercase, or an empty string.
    pub(crate) fn code_upper(&self) -> String {
        self.code.as_deref().unwrap_or("").to_ascii_uppercase()
    }

    /// The message lowercased for wording checks.
    pub(crate) fn message_lower(&self) -> String {
        self.message.to_ascii_lowercase()
    }
}
