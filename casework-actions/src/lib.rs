//! # casework-actions
//!
//! Maker-checker review actions for the casework compliance frontend.
//!
//! This crate is the service layer between presentation code and the REST
//! backend: it validates inputs, runs each call under the retry executor
//! from [`casework_resilience`], and wires session-expiry handling so an
//! expired session anywhere in a retried call redirects to login with the
//! user's place preserved.
//!
//! ## Example
//!
//! ```ignore
//! use casework_actions::{HttpReviewTransport, ReviewActions};
//! use std::sync::Arc;
//! use url::Url;
//!
//! let transport = Arc::new(HttpReviewTransport::new(
//!     Url::parse("https://api.example.com/v1/")?,
//! ));
//! let actions = ReviewActions::new(transport);
//!
//! let decision = actions
//!     .reject_review("rev-42", "due diligence incomplete")
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod actions;
pub mod transport;
pub mod types;

// Re-exports
pub use actions::ReviewActions;
pub use transport::{HttpReviewTransport, HttpReviewTransportBuilder, ReviewTransport};
pub use types::{ReviewDecision, ReviewStatus, ReviewSummary};
