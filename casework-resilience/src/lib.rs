//! # casework-resilience
//!
//! Retry execution and error classification for the casework compliance
//! frontend services.
//!
//! Transport failures arrive as a [`RawError`] (status, code, message). The
//! classifier maps each one onto a [`ClassifiedError`] with a category,
//! severity, retryability flag, user-facing message and recovery
//! suggestions. The retry executor consults that classification to decide
//! whether to re-attempt with capped exponential backoff plus jitter.
//!
//! ## Core Concepts
//!
//! - **[`classify()`]**: map a raw failure onto the error taxonomy
//! - **[`RetryPolicy`]**: configure attempt budget and backoff
//! - **[`RetryExecutor`]**: automatic-mode execution with backoff sleeps
//! - **[`ManualRetry`]**: manual mode, surfacing [`RetryState`] to the UI
//! - **[`RetryManager`]**: named registry of concurrent retried operations
//! - **[`SessionExpiryHandler`]**: snapshot + auth teardown + login redirect
//!
//! ## Example
//!
//! ```ignore
//! use casework_resilience::{RetryExecutor, RetryPolicy, RawError};
//! use std::time::Duration;
//!
//! let executor = RetryExecutor::new(
//!     RetryPolicy::new()
//!         .max_attempts(3)
//!         .base_delay(Duration::from_millis(1000))
//!         .max_delay(Duration::from_secs(10)),
//! );
//!
//! let review = executor
//!     .execute(|| async {
//!         // Your transport call here
//!         Ok::<_, RawError>("review")
//!     })
//!     .await?;
//! ```
//!
//! Retryable categories (network, system, workflow conflicts) are retried up
//! to the policy budget; everything else propagates on first occurrence, and
//! a session expiry additionally fires the redirect side effect exactly once.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod classify;
pub mod error;
pub mod executor;
pub mod manager;
pub mod policy;
pub mod raw;
pub mod session;

// Re-exports
pub use backoff::{FixedJitter, Jitter, NoJitter, ThreadRngJitter, JITTER_RATIO};
pub use classify::{classify, ClassifiedError, ErrorCategory, ErrorContext, Severity};
pub use error::{ResilienceError, ResilienceResult};
pub use executor::{execute, ManualRetry, RetryExecutor, RetryState, SessionHook};
pub use manager::RetryManager;
pub use policy::{RetryCondition, RetryPolicy};
pub use raw::RawError;
pub use session::{
    AuthStore, LoginRedirect, MemorySnapshotStore, SessionExpiryHandler, SessionSnapshot,
    SnapshotStore, SESSION_SNAPSHOT_KEY,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        classify, ClassifiedError, ErrorCategory, ErrorContext, RawError, ResilienceError,
        ResilienceResult, RetryExecutor, RetryManager, RetryPolicy, RetryState, Severity,
    };
}
