//! Session expiry handling.
//!
//! When a retried operation fails with a session-expired classification, the
//! handler captures a snapshot of where the user was (location, context,
//! best-effort form values), persists it under a fixed short-lived key,
//! clears locally held authentication state, and hands the caller a login
//! redirect carrying a return-path hint. The handler itself never retries
//! anything, and it fires at most once per detected expiry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Fixed key under which the snapshot is stored.
pub const SESSION_SNAPSHOT_KEY: &str = "casework.session.snapshot";

/// What the user was doing when the session expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Navigable location to return to after login.
    pub url: String,
    /// When the expiry was detected.
    pub timestamp: DateTime<Utc>,
    /// Optional context hint, e.g. the active component.
    pub context: Option<String>,
    /// Best-effort serializable form-field values.
    pub form_data: serde_json::Value,
}

impl SessionSnapshot {
    /// Capture a snapshot for the given location, stamped now.
    pub fn capture(
        url: impl Into<String>,
        context: Option<String>,
        form_data: serde_json::Value,
    ) -> Self {
        Self {
            url: url.into(),
            timestamp: Utc::now(),
            context,
            form_data,
        }
    }
}

/// Short-lived store for session snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot under a key, replacing any previous one.
    fn put(&self, key: &str, snapshot: &SessionSnapshot);

    /// Remove and return the snapshot stored under a key.
    fn take(&self, key: &str) -> Option<SessionSnapshot>;
}

/// In-memory snapshot store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, SessionSnapshot>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn put(&self, key: &str, snapshot: &SessionSnapshot) {
        self.entries
            .lock()
            .insert(key.to_string(), snapshot.clone());
    }

    fn take(&self, key: &str) -> Option<SessionSnapshot> {
        self.entries.lock().remove(key)
    }
}

/// Locally persisted authentication state.
pub trait AuthStore: Send + Sync {
    /// Discard all persisted authentication state.
    fn clear(&self);
}

/// Redirect target for the login entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRedirect {
    /// Path of the login entry point.
    pub path: String,
    /// Path to return to after a successful login, not yet encoded.
    pub return_path: String,
}

impl LoginRedirect {
    /// Full redirect URL with the return path URL-encoded.
    pub fn to_url(&self) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(self.return_path.as_bytes())
            .collect();
        format!("{}?returnTo={}", self.path, encoded)
    }
}

/// Runs the session-expiry side effect.
///
/// Guarded so that repeated detections (e.g. several in-flight operations all
/// hitting a 401 at once) produce the side effect only once; call
/// [`SessionExpiryHandler::reset`] after a successful re-login to re-arm.
pub struct SessionExpiryHandler {
    snapshots: Arc<dyn SnapshotStore>,
    auth: Arc<dyn AuthStore>,
    login_path: String,
    fired: AtomicBool,
}

impl SessionExpiryHandler {
    /// Create a handler with the default `/login` entry point.
    pub fn new(snapshots: Arc<dyn SnapshotStore>, auth: Arc<dyn AuthStore>) -> Self {
        Self {
            snapshots,
            auth,
            login_path: "/login".to_string(),
            fired: AtomicBool::new(false),
        }
    }

    /// Override the login entry point path.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Run the expiry side effect: snapshot, clear auth, produce redirect.
    ///
    /// Returns `None` if the handler already fired since its last reset.
    pub fn handle(
        &self,
        current_url: &str,
        context: Option<String>,
        form_data: serde_json::Value,
    ) -> Option<LoginRedirect> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return None;
        }

        let snapshot = SessionSnapshot::capture(current_url, context, form_data);
        self.snapshots.put(SESSION_SNAPSHOT_KEY, &snapshot);
        self.auth.clear();

        info!(url = current_url, "session expired, redirecting to login");

        Some(LoginRedirect {
            path: self.login_path.clone(),
            return_path: current_url.to_string(),
        })
    }

    /// Whether the side effect has fired since the last reset.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Re-arm the handler, e.g. after a successful login.
    pub fn reset(&self) {
        self.fired.store(false, Ordering::SeqCst);
    }
}
