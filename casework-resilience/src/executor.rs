//! Retry executor.
//!
//! Wraps an asynchronous operation and re-attempts it on retryable failures
//! with capped exponential backoff plus jitter. Attempts are strictly
//! sequential: a retry is never issued until the previous attempt has fully
//! settled.
//!
//! Two modes:
//! - automatic ([`RetryExecutor::execute`]): sleeps and retries on its own;
//! - manual ([`ManualRetry`]): never sleeps, returns a [`RetryState`] to the
//!   caller so a UI can present an explicit retry control.

use crate::backoff::{delay_for, Jitter, ThreadRngJitter};
use crate::classify::{classify, ClassifiedError, ErrorContext};
use crate::error::{ResilienceError, ResilienceResult};
use crate::policy::RetryPolicy;
use crate::raw::RawError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Callback fired when a session-expired classification is detected.
///
/// Fired at most once per execution, at whichever attempt the expiry is
/// detected, before the terminal error propagates.
pub type SessionHook = Arc<dyn Fn(&ClassifiedError) + Send + Sync>;

/// Boxed retryable operation, as stored by [`ManualRetry`] and the manager.
pub type BoxedOperation<T> =
    Box<dyn Fn() -> BoxFuture<'static, Result<T, RawError>> + Send + Sync>;

/// Mutable state of one in-flight retried operation.
///
/// Created at call start, updated after every failed attempt, discarded on
/// success or on a terminal failure. `attempt` never exceeds `max_attempts`.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempt: u32,
    /// Invocation budget from the policy.
    pub max_attempts: u32,
    /// Classification of the most recent failure.
    pub last_error: Option<ClassifiedError>,
    /// Whether another attempt is still possible.
    pub can_retry: bool,
    /// Whether the executor is currently sleeping before an automatic retry.
    pub is_auto_retrying: bool,
    /// Hint for the delay before the next attempt, for countdown UIs.
    pub next_retry_delay: Option<Duration>,
}

impl RetryState {
    /// Create the initial state for a policy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_error: None,
            can_retry: false,
            is_auto_retrying: false,
            next_retry_delay: None,
        }
    }

    /// Record a failed attempt.
    pub(crate) fn record_failure(
        &mut self,
        classified: ClassifiedError,
        retryable: bool,
        next_delay: Option<Duration>,
    ) {
        self.can_retry = retryable && self.attempt < self.max_attempts;
        self.next_retry_delay = if self.can_retry { next_delay } else { None };
        self.last_error = Some(classified);
    }
}

/// Executor for automatic-mode retries.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    jitter: Arc<dyn Jitter>,
    context: ErrorContext,
    session_hook: Option<SessionHook>,
}

impl RetryExecutor {
    /// Create an executor with the default thread-RNG jitter source.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            jitter: Arc::new(ThreadRngJitter),
            context: ErrorContext::default(),
            session_hook: None,
        }
    }

    /// Replace the jitter source. Tests pass a deterministic one.
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

    /// The executor's policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation, retrying retryable failures automatically.
    ///
    /// A permanently failing retryable operation is invoked exactly
    /// `policy.max_attempts` times before [`ResilienceError::Exhausted`]
    /// is returned.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ResilienceResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        self.execute_with_state(operation).await.0
    }

    /// Execute an operation and also return the final [`RetryState`].
    pub async fn execute_with_state<F, Fut, T>(
        &self,
        operation: F,
    ) -> (ResilienceResult<T>, RetryState)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        let mut state = RetryState::new(self.policy.max_attempts);
        if let Err(err) = self.policy.validate() {
            return (Err(err), state);
        }

        loop {
            state.attempt += 1;
            state.is_auto_retrying = false;

            debug!(
                attempt = state.attempt,
                max_attempts = state.max_attempts,
                "executing attempt"
            );

            match operation().await {
                Ok(value) => return (Ok(value), state),
                Err(raw) => {
                    let outcome = self.settle_failure(&mut state, &raw);
                    match outcome {
                        FailureOutcome::Terminal(err) => return (Err(err), state),
                        FailureOutcome::RetryAfter(wait) => {
                            state.is_auto_retrying = true;
                            debug!(
                                attempt = state.attempt,
                                wait_ms = wait.as_millis() as u64,
                                error = %raw,
                                "waiting before retry"
                            );
                            sleep(wait).await;
                        }
                    }
                }
            }
        }
    }

    /// Classify a failure and decide between retrying and giving up.
    fn settle_failure(&self, state: &mut RetryState, raw: &RawError) -> FailureOutcome {
        let classified = classify(raw, &self.context);

        if classified.is_session_expired() {
            if let Some(hook) = &self.session_hook {
                hook(&classified);
            }
            warn!(error = %raw, "session expired during retried operation");
            state.record_failure(classified.clone(), false, None);
            return FailureOutcome::Terminal(ResilienceError::Session(classified));
        }

        let retryable = self.policy.retry_on.should_retry(&classified);
        if !retryable {
            warn!(
                attempt = state.attempt,
                category = %classified.category,
                error = %raw,
                "failure is not retryable"
            );
            state.record_failure(classified.clone(), false, None);
            return FailureOutcome::Terminal(ResilienceError::Rejected(classified));
        }

        if state.attempt >= self.policy.max_attempts {
            warn!(
                attempts = state.attempt,
                error = %raw,
                "retry budget exhausted"
            );
            state.record_failure(classified.clone(), false, None);
            return FailureOutcome::Terminal(ResilienceError::Exhausted {
                attempts: state.attempt,
                last: classified,
            });
        }

        let wait = delay_for(&self.policy, state.attempt, self.jitter.as_ref());
        state.record_failure(classified, true, Some(wait));
        FailureOutcome::RetryAfter(wait)
    }
}

enum FailureOutcome {
    Terminal(ResilienceError),
    RetryAfter(Duration),
}

/// Execute an operation with retries under a policy.
///
/// Convenience wrapper over [`RetryExecutor`] for call sites that need no
/// custom jitter, context or session hook.
pub async fn execute<F, Fut, T>(policy: &RetryPolicy, operation: F) -> ResilienceResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RawError>>,
{
    RetryExecutor::new(policy.clone()).execute(operation).await
}

/// Manual-mode retry wrapper.
///
/// Never sleeps and never re-attempts on its own. Each [`ManualRetry::attempt`]
/// invokes the closed-over operation once; on failure the caller gets an
/// updated [`RetryState`] (with a next-delay hint) to drive a "Retry" control.
pub struct ManualRetry<T: 'static> {
    policy: RetryPolicy,
    jitter: Arc<dyn Jitter>,
    context: ErrorContext,
    session_hook: Option<SessionHook>,
    operation: BoxedOperation<T>,
    state: RetryState,
}

impl<T: 'static> ManualRetry<T> {
    /// Wrap an operation for manual retrying.
    pub fn new<F, Fut>(policy: RetryPolicy, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RawError>> + Send + 'static,
    {
        let state = RetryState::new(policy.max_attempts);
        Self {
            policy,
            jitter: Arc::new(ThreadRngJitter),
            context: ErrorContext::default(),
            session_hook: None,
            operation: Box::new(move || operation().boxed()),
            state,
        }
    }

    /// Replace the jitter source used for next-delay hints.
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

    /// The current retry state.
    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Invoke the operation once. No sleeping, no automatic re-attempts.
    ///
    /// Returns the updated state on failure; once `can_retry` is false,
    /// further calls return the same state without touching the operation.
    pub async fn attempt(&mut self) -> Result<T, RetryState> {
        if self.state.attempt > 0 && !self.state.can_retry {
            return Err(self.state.clone());
        }

        self.state.attempt += 1;
        self.state.is_auto_retrying = false;

        debug!(
            attempt = self.state.attempt,
            max_attempts = self.state.max_attempts,
            "manual attempt"
        );

        match (self.operation)().await {
            Ok(value) => Ok(value),
            Err(raw) => {
                let classified = classify(&raw, &self.context);
                if classified.is_session_expired() {
                    if let Some(hook) = &self.session_hook {
                        hook(&classified);
                    }
                    self.state.record_failure(classified, false, None);
                    return Err(self.state.clone());
                }

                let retryable = self.policy.retry_on.should_retry(&classified);
                let next_delay = retryable.then(|| {
                    delay_for(&self.policy, self.state.attempt, self.jitter.as_ref())
                });
                self.state.record_failure(classified, retryable, next_delay);
                Err(self.state.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::NoJitter;
    use crate::classify::ErrorCategory;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(max_attempts)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let executor = RetryExecutor::new(quick_policy(3));
        let result = executor.execute(|| async { Ok::<_, RawError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_eventual_success_counts_attempts() {
        let executor = RetryExecutor::new(quick_policy(5));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = executor
            .execute(|| {
                let attempts = attempts_clone.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(RawError::http(503, "unavailable"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_invokes_exactly_max_attempts() {
        let executor = RetryExecutor::new(quick_policy(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: ResilienceResult<i32> = executor
            .execute(|| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(RawError::http(503, "still down"))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ResilienceError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.category, ErrorCategory::System);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_retries() {
        let executor = RetryExecutor::new(quick_policy(1));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: ResilienceResult<i32> = executor
            .execute(|| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(RawError::http(503, "down"))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_exhausted());
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_on_first_failure() {
        let executor = RetryExecutor::new(quick_policy(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: ResilienceResult<i32> = executor
            .execute(|| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(RawError::http(400, "bad request"))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        match result.unwrap_err() {
            ResilienceError::Rejected(c) => {
                assert_eq!(c.category, ErrorCategory::Validation)
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_expiry_fires_hook_once_and_stops() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();
        let executor = RetryExecutor::new(quick_policy(3)).on_session_expiry(Arc::new(
            move |classified| {
                assert_eq!(classified.category, ErrorCategory::Session);
                fired_clone.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: ResilienceResult<i32> = executor
            .execute(|| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(RawError::http(401, "token expired"))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_session_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        // 3 attempts, 1000ms base, factor 2, no jitter: delays are exactly
        // 1000ms then 2000ms, so the whole run takes 3000ms of virtual time.
        let policy = RetryPolicy::new()
            .max_attempts(3)
            .base_delay(Duration::from_millis(1000))
            .max_delay(Duration::from_millis(10_000))
            .backoff_factor(2.0);
        let executor = RetryExecutor::new(policy).with_jitter(Arc::new(NoJitter));

        let start = Instant::now();
        let result: ResilienceResult<i32> = executor
            .execute(|| async { Err(RawError::network("connection refused")) })
            .await;

        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_upper_bound() {
        // Full jitter adds 10%: delays become 1100ms and 2200ms.
        let policy = RetryPolicy::new()
            .max_attempts(3)
            .base_delay(Duration::from_millis(1000))
            .max_delay(Duration::from_millis(10_000));
        let executor = RetryExecutor::new(policy).with_jitter(Arc::new(crate::backoff::FixedJitter(1.0)));

        let start = Instant::now();
        let _: ResilienceResult<i32> = executor
            .execute(|| async { Err(RawError::http(503, "down")) })
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed <= Duration::from_millis(3300));
        assert!(elapsed >= Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_invalid_policy_rejected_before_invoking() {
        let mut policy = RetryPolicy::new();
        policy.backoff_factor = 0.5;
        let executor = RetryExecutor::new(policy);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: ResilienceResult<i32> = executor
            .execute(|| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::InvalidPolicy(_)
        ));
    }

    #[tokio::test]
    async fn test_manual_mode_never_sleeps() {
        let mut manual = ManualRetry::new(
            RetryPolicy::new()
                .max_attempts(3)
                .base_delay(Duration::from_secs(60))
                .max_delay(Duration::from_secs(60)),
            || async { Err::<i32, _>(RawError::http(503, "down")) },
        )
        .with_jitter(Arc::new(NoJitter));

        let started = std::time::Instant::now();
        let state = manual.attempt().await.unwrap_err();
        // A 60s base delay would be obvious; a manual attempt settles at once.
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(state.attempt, 1);
        assert!(state.can_retry);
        assert_eq!(state.next_retry_delay, Some(Duration::from_secs(60)));
        assert!(!state.is_auto_retrying);
    }

    #[tokio::test]
    async fn test_manual_mode_exhausts_budget() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let mut manual = ManualRetry::new(quick_policy(2), move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(RawError::http(503, "down"))
            }
        });

        let state = manual.attempt().await.unwrap_err();
        assert!(state.can_retry);
        let state = manual.attempt().await.unwrap_err();
        assert!(!state.can_retry);
        assert_eq!(state.attempt, 2);

        // Budget spent: further calls do not touch the operation.
        let state = manual.attempt().await.unwrap_err();
        assert_eq!(state.attempt, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_mode_succeeds_on_second_call() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let mut manual = ManualRetry::new(quick_policy(3), move || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(RawError::http(503, "down"))
                } else {
                    Ok(7)
                }
            }
        });

        assert!(manual.attempt().await.is_err());
        assert_eq!(manual.attempt().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_manual_session_expiry_blocks_retry() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();
        let mut manual = ManualRetry::new(quick_policy(3), || async {
            Err::<i32, _>(RawError::coded("SESSION_EXPIRED", "session expired"))
        })
        .on_session_expiry(Arc::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let state = manual.attempt().await.unwrap_err();
        assert!(!state.can_retry);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(
            state.last_error.unwrap().category,
            ErrorCategory::Session
        );
    }

    #[tokio::test]
    async fn test_free_function_wrapper() {
        let policy = quick_policy(2);
        let result = execute(&policy, || async { Ok::<_, RawError>("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }
}
