//! Named retry registry.
//!
//! Tracks concurrent retried operations by caller-chosen id so UIs can
//! inspect, manually re-trigger, or cancel them, and tear everything down on
//! navigation. Each id has at most one active timer; a cancelled id's due
//! timer is suppressed by re-checking registry membership before every
//! scheduled retry. Cancellation is cooperative: an in-flight transport call
//! is not aborted, its late result is discarded.

use crate::backoff::{delay_for, Jitter, ThreadRngJitter};
use crate::classify::{classify, ErrorContext};
use crate::error::{ResilienceError, ResilienceResult};
use crate::executor::{RetryState, SessionHook};
use crate::policy::RetryPolicy;
use crate::raw::RawError;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type SharedOperation<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, RawError>> + Send + Sync>;

struct Entry<T: 'static> {
    state: RetryState,
    operation: SharedOperation<T>,
    policy: RetryPolicy,
    token: CancellationToken,
    // True only while the entry sits idle waiting for a manual trigger.
    // While the automatic loop or a manual invocation is running, it is
    // false, so overlapping triggers cannot spend extra attempts.
    awaiting_manual: bool,
}

/// Registry of named retried operations, all producing the same result type.
///
/// No module-level state: construct an instance and pass it through call
/// sites; [`RetryManager::clear_all`] is the teardown hook.
pub struct RetryManager<T: 'static> {
    registry: Arc<Mutex<HashMap<String, Entry<T>>>>,
    jitter: Arc<dyn Jitter>,
    context: ErrorContext,
    session_hook: Option<SessionHook>,
}

impl<T: 'static> Default for RetryManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> RetryManager<T> {
    /// Create an empty manager with the default jitter source.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            jitter: Arc::new(ThreadRngJitter),
            context: ErrorContext::default(),
            session_hook: None,
        }
    }

    /// Replace the jitter source.
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set classification context hints.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    /// Install the session-expiry callback.
    pub fn on_session_expiry(mut self, hook: SessionHook) -> Self {
        self.session_hook = Some(hook);
        self
    }

    /// Register an operation under an id and drive it to a terminal outcome.
    ///
    /// Starts automatic-mode execution immediately. Ids are not deduplicated;
    /// registering twice under the same id replaces the first entry, so the
    /// caller must keep ids unique per logical operation. If the policy has
    /// automatic retry disabled, a retryable failure leaves the entry in the
    /// registry and returns [`ResilienceError::AwaitingManual`] so the UI can
    /// call [`RetryManager::manual_retry`].
    pub async fn register_retry<F, Fut>(
        &self,
        id: &str,
        operation: F,
        policy: RetryPolicy,
    ) -> ResilienceResult<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RawError>> + Send + 'static,
    {
        policy.validate()?;

        let operation: SharedOperation<T> = Arc::new(move || operation().boxed());
        let token = CancellationToken::new();
        {
            let mut registry = self.registry.lock();
            registry.insert(
                id.to_string(),
                Entry {
                    state: RetryState::new(policy.max_attempts),
                    operation: Arc::clone(&operation),
                    policy: policy.clone(),
                    token: token.clone(),
                    awaiting_manual: false,
                },
            );
        }

        let result = self.drive(id, &operation, &policy, &token).await;
        if matches!(result, Err(ResilienceError::AwaitingManual { .. })) {
            if let Some(entry) = self.registry.lock().get_mut(id) {
                entry.awaiting_manual = true;
            }
        } else {
            self.registry.lock().remove(id);
        }
        result
    }

    /// Re-invoke a registered operation once, after a manual trigger.
    ///
    /// Only accepted while the entry is awaiting a manual trigger; while the
    /// automatic loop is still driving the id (including during a backoff
    /// sleep), [`ResilienceError::InFlight`] is returned and no invocation
    /// is made, so the attempt budget cannot be overspent. Continues the
    /// attempt count of the registered entry. Terminal outcomes remove the
    /// entry; a further retryable failure with budget left keeps it and
    /// returns [`ResilienceError::AwaitingManual`] again.
    pub async fn manual_retry(&self, id: &str) -> ResilienceResult<T> {
        let (operation, policy, token) = {
            let mut registry = self.registry.lock();
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| ResilienceError::Unknown {
                    id: id.to_string(),
                })?;
            if !entry.awaiting_manual {
                return Err(ResilienceError::InFlight { id: id.to_string() });
            }
            entry.awaiting_manual = false;
            (
                Arc::clone(&entry.operation),
                entry.policy.clone(),
                entry.token.clone(),
            )
        };

        let attempt = match self.update_state(id, |state| {
            state.attempt += 1;
            state.is_auto_retrying = false;
        }) {
            Some(state) => state.attempt,
            None => {
                return Err(ResilienceError::Cancelled { id: id.to_string() });
            }
        };

        debug!(id, attempt, "manual retry");

        let result = tokio::select! {
            _ = token.cancelled() => {
                return Err(ResilienceError::Cancelled { id: id.to_string() });
            }
            result = (operation)() => result,
        };
        if token.is_cancelled() {
            return Err(ResilienceError::Cancelled { id: id.to_string() });
        }

        match result {
            Ok(value) => {
                self.registry.lock().remove(id);
                Ok(value)
            }
            Err(raw) => {
                let err = self.settle(id, attempt, &policy, &raw);
                if matches!(err, ResilienceError::AwaitingManual { .. }) {
                    if let Some(entry) = self.registry.lock().get_mut(id) {
                        entry.awaiting_manual = true;
                    }
                } else {
                    self.registry.lock().remove(id);
                }
                Err(err)
            }
        }
    }

    /// Cancel a registered operation.
    ///
    /// The awaiting caller is resolved with [`ResilienceError::Cancelled`]
    /// and any timer scheduled for the id becomes a no-op. Returns whether
    /// the id was registered.
    pub fn cancel_retry(&self, id: &str) -> bool {
        match self.registry.lock().remove(id) {
            Some(entry) => {
                entry.token.cancel();
                debug!(id, "cancelled retry operation");
                true
            }
            None => false,
        }
    }

    /// Cancel everything and empty the registry. Teardown hook.
    pub fn clear_all(&self) {
        let entries: Vec<_> = {
            let mut registry = self.registry.lock();
            registry.drain().collect()
        };
        for (id, entry) in &entries {
            entry.token.cancel();
            debug!(id = %id, "cancelled retry operation during teardown");
        }
    }

    /// Snapshot of the state for an id, if registered.
    pub fn get_state(&self, id: &str) -> Option<RetryState> {
        self.registry.lock().get(id).map(|entry| entry.state.clone())
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Automatic-mode loop for a registered operation.
    async fn drive(
        &self,
        id: &str,
        operation: &SharedOperation<T>,
        policy: &RetryPolicy,
        token: &CancellationToken,
    ) -> ResilienceResult<T> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if self
                .update_state(id, |state| {
                    state.attempt = attempt;
                    state.is_auto_retrying = false;
                })
                .is_none()
            {
                return Err(ResilienceError::Cancelled { id: id.to_string() });
            }

            debug!(id, attempt, max_attempts = policy.max_attempts, "executing attempt");

            let result = tokio::select! {
                _ = token.cancelled() => {
                    return Err(ResilienceError::Cancelled { id: id.to_string() });
                }
                result = (operation)() => result,
            };
            // The operation may settle after cancellation; discard its result.
            if token.is_cancelled() {
                return Err(ResilienceError::Cancelled { id: id.to_string() });
            }

            match result {
                Ok(value) => return Ok(value),
                Err(raw) => {
                    let err = self.settle(id, attempt, policy, &raw);
                    match err {
                        ResilienceError::AwaitingManual { .. } if policy.auto_retry => {
                            // settle only returns AwaitingManual when another
                            // attempt is allowed; with auto retry on, sleep
                            // and go around instead of surfacing it.
                            let state = self
                                .update_state(id, |state| state.is_auto_retrying = true)
                                .ok_or_else(|| ResilienceError::Cancelled {
                                    id: id.to_string(),
                                })?;
                            let wait = state
                                .next_retry_delay
                                .unwrap_or(policy.base_delay);
                            debug!(
                                id,
                                attempt,
                                wait_ms = wait.as_millis() as u64,
                                "waiting before retry"
                            );
                            tokio::select! {
                                _ = token.cancelled() => {
                                    return Err(ResilienceError::Cancelled {
                                        id: id.to_string(),
                                    });
                                }
                                _ = sleep(wait) => {}
                            }
                            // Timer fired: a cancelled id must not re-invoke.
                            if !self.registry.lock().contains_key(id) {
                                return Err(ResilienceError::Cancelled {
                                    id: id.to_string(),
                                });
                            }
                        }
                        err => return Err(err),
                    }
                }
            }
        }
    }

    /// Classify a failure, update the registered state, and build the
    /// resulting error. `AwaitingManual` doubles as the "may retry" signal
    /// for the automatic loop in [`RetryManager::drive`].
    fn settle(
        &self,
        id: &str,
        attempt: u32,
        policy: &RetryPolicy,
        raw: &RawError,
    ) -> ResilienceError {
        let classified = classify(raw, &self.context);

        if classified.is_session_expired() {
            if let Some(hook) = &self.session_hook {
                hook(&classified);
            }
            warn!(id, error = %raw, "session expired during registered operation");
            self.update_state(id, |state| {
                state.record_failure(classified.clone(), false, None)
            });
            return ResilienceError::Session(classified);
        }

        let retryable = policy.retry_on.should_retry(&classified);
        if !retryable {
            warn!(id, attempt, category = %classified.category, "failure is not retryable");
            self.update_state(id, |state| {
                state.record_failure(classified.clone(), false, None)
            });
            return ResilienceError::Rejected(classified);
        }

        if attempt >= policy.max_attempts {
            warn!(id, attempts = attempt, "retry budget exhausted");
            self.update_state(id, |state| {
                state.record_failure(classified.clone(), false, None)
            });
            return ResilienceError::Exhausted {
                attempts: attempt,
                last: classified,
            };
        }

        let wait = delay_for(policy, attempt, self.jitter.as_ref());
        let state = self
            .update_state(id, |state| {
                state.record_failure(classified.clone(), true, Some(wait));
            })
            .unwrap_or_else(|| RetryState::new(policy.max_attempts));
        ResilienceError::AwaitingManual {
            id: id.to_string(),
            state: Box::new(state),
        }
    }

    /// Mutate the registered state for an id, returning the updated copy.
    /// `None` when the id is no longer registered.
    fn update_state(&self, id: &str, f: impl FnOnce(&mut RetryState)) -> Option<RetryState> {
        let mut registry = self.registry.lock();
        registry.get_mut(id).map(|entry| {
            f(&mut entry.state);
            entry.state.clone()
        })
    }
}
