//! Maker-checker review actions.
//!
//! Service layer between the UI and the review transport. Every call runs
//! under the automatic retry executor; input validation happens before any
//! transport call, so a blank rejection reason never reaches the backend.

use crate::transport::ReviewTransport;
use crate::types::{ReviewDecision, ReviewSummary};
use casework_resilience::{
    ClassifiedError, ErrorContext, Jitter, ResilienceError, ResilienceResult, RetryExecutor,
    RetryPolicy, SessionExpiryHandler, ThreadRngJitter,
};
use std::sync::Arc;
use tracing::info;

/// Review actions for a checker, wrapped in retry and session handling.
pub struct ReviewActions<T: ReviewTransport> {
    transport: Arc<T>,
    policy: RetryPolicy,
    jitter: Arc<dyn Jitter>,
    session: Option<Arc<SessionExpiryHandler>>,
}

impl<T: ReviewTransport> ReviewActions<T> {
    /// Create the action service with the default read policy.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::for_reads(),
            jitter: Arc::new(ThreadRngJitter),
            session: None,
        }
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the jitter source.
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wire the session-expiry handler fired on expired-session failures.
    pub fn with_session_handler(mut self, handler: Arc<SessionExpiryHandler>) -> Self {
        self.session = Some(handler);
        self
    }

    /// Fetch a review.
    pub async fn fetch_review(&self, review_id: &str) -> ResilienceResult<ReviewSummary> {
        require_id(review_id)?;
        let executor = self.executor(review_id);
        let transport = &self.transport;
        executor
            .execute(|| async move { transport.fetch_review(review_id).await })
            .await
    }

    /// Approve a pending review.
    pub async fn approve_review(
        &self,
        review_id: &str,
        comment: Option<&str>,
    ) -> ResilienceResult<ReviewDecision> {
        require_id(review_id)?;
        let executor = self.executor(review_id);
        let transport = &self.transport;
        let decision = executor
            .execute(|| async move { transport.approve_review(review_id, comment).await })
            .await?;
        info!(review_id, "review approved");
        Ok(decision)
    }

    /// Reject a pending review.
    ///
    /// A blank (empty or whitespace-only) reason fails immediately with a
    /// validation-category error; the transport is never called.
    pub async fn reject_review(
        &self,
        review_id: &str,
        reason: &str,
    ) -> ResilienceResult<ReviewDecision> {
        require_id(review_id)?;
        if reason.trim().is_empty() {
            return Err(ResilienceError::Rejected(ClassifiedError::validation(
                "A rejection reason is required.",
                [
                    "Enter the reason the review is being rejected",
                    "Submit the rejection again",
                ],
            )));
        }

        let executor = self.executor(review_id);
        let transport = &self.transport;
        let decision = executor
            .execute(|| async move { transport.reject_review(review_id, reason).await })
            .await?;
        info!(review_id, "review rejected");
        Ok(decision)
    }

    /// Build the executor for one action, wiring context and session hook.
    fn executor(&self, review_id: &str) -> RetryExecutor {
        let mut executor = RetryExecutor::new(self.policy.clone())
            .with_jitter(Arc::clone(&self.jitter))
            .with_context(
                ErrorContext::new()
                    .component("review-actions")
                    .workflow("risk review"),
            );

        if let Some(handler) = &self.session {
            let handler = Arc::clone(handler);
            let return_path = format!("/reviews/{}", review_id);
            executor = executor.on_session_expiry(Arc::new(move |_| {
                handler.handle(
                    &return_path,
                    Some("review-actions".to_string()),
                    serde_json::Value::Null,
                );
            }));
        }
        executor
    }
}

fn require_id(review_id: &str) -> ResilienceResult<()> {
    if review_id.trim().is_empty() {
        return Err(ResilienceError::Rejected(ClassifiedError::validation(
            "A review must be selected.",
            ["Select a review from the list"],
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReviewStatus;
    use async_trait::async_trait;
    use casework_resilience::{ErrorCategory, MemorySnapshotStore, NoJitter, RawError};
    use casework_resilience::{AuthStore, SnapshotStore, SESSION_SNAPSHOT_KEY};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    fn decision(review_id: &str, status: ReviewStatus) -> ReviewDecision {
        ReviewDecision {
            review_id: review_id.to_string(),
            status,
            decided_by: "chen".to_string(),
            decided_at: Utc::now(),
        }
    }

    /// Transport that fails the first `fail_times` calls with `error`.
    struct ScriptedTransport {
        calls: AtomicU32,
        fail_times: u32,
        error: RawError,
    }

    impl ScriptedTransport {
        fn new(fail_times: u32, error: RawError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_times,
                error,
            }
        }

        fn always_ok() -> Self {
            Self::new(0, RawError::message("unused"))
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Result<(), RawError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ReviewTransport for ScriptedTransport {
        async fn fetch_review(&self, review_id: &str) -> Result<ReviewSummary, RawError> {
            self.next()?;
            Ok(ReviewSummary {
                id: review_id.to_string(),
                client_id: "cli-1".to_string(),
                risk_rating: "HIGH".to_string(),
                status: ReviewStatus::PendingApproval,
                maker: "maria".to_string(),
                checker: None,
            })
        }

        async fn approve_review(
            &self,
            review_id: &str,
            _comment: Option<&str>,
        ) -> Result<ReviewDecision, RawError> {
            self.next()?;
            Ok(decision(review_id, ReviewStatus::Approved))
        }

        async fn reject_review(
            &self,
            review_id: &str,
            _reason: &str,
        ) -> Result<ReviewDecision, RawError> {
            self.next()?;
            Ok(decision(review_id, ReviewStatus::Rejected))
        }
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(max_attempts)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
    }

    fn actions(transport: Arc<ScriptedTransport>) -> ReviewActions<ScriptedTransport> {
        ReviewActions::new(transport)
            .with_policy(quick_policy(3))
            .with_jitter(Arc::new(NoJitter))
    }

    #[rstest::rstest]
    #[case("")]
    #[case("   ")]
    #[tokio::test]
    async fn test_blank_rejection_reason_never_hits_transport(#[case] reason: &str) {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let service = actions(Arc::clone(&transport));

        let err = service.reject_review("rev-1", reason).await.unwrap_err();
        assert_eq!(
            err.classified().unwrap().category,
            ErrorCategory::Validation
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_review_id_rejected() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let service = actions(Arc::clone(&transport));

        let err = service.approve_review(" ", None).await.unwrap_err();
        assert_eq!(
            err.classified().unwrap().category,
            ErrorCategory::Validation
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_reject_with_reason_succeeds() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let service = actions(Arc::clone(&transport));

        let decision = service
            .reject_review("rev-1", "due diligence incomplete")
            .await
            .unwrap();
        assert_eq!(decision.status, ReviewStatus::Rejected);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_approve_retries_transient_failures() {
        let transport = Arc::new(ScriptedTransport::new(
            2,
            RawError::http(503, "service unavailable"),
        ));
        let service = actions(Arc::clone(&transport));

        let decision = service.approve_review("rev-1", Some("ok")).await.unwrap();
        assert_eq!(decision.status, ReviewStatus::Approved);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_terminal_error() {
        let transport = Arc::new(ScriptedTransport::new(
            u32::MAX,
            RawError::network("connection refused"),
        ));
        let service = actions(Arc::clone(&transport));

        let err = service.fetch_review("rev-1").await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_business_rule_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(
            u32::MAX,
            RawError::http(409, "own submission").with_code("BR_SELF_APPROVAL"),
        ));
        let service = actions(Arc::clone(&transport));

        let err = service.approve_review("rev-1", None).await.unwrap_err();
        assert_eq!(
            err.classified().unwrap().category,
            ErrorCategory::BusinessRule
        );
        assert_eq!(transport.calls(), 1);
    }

    #[derive(Default)]
    struct RecordingAuthStore {
        cleared: AtomicBool,
    }

    impl AuthStore for RecordingAuthStore {
        fn clear(&self) {
            self.cleared.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_session_expiry_fires_handler_once() {
        let transport = Arc::new(ScriptedTransport::new(
            u32::MAX,
            RawError::http(401, "token expired"),
        ));
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let auth = Arc::new(RecordingAuthStore::default());
        let handler = Arc::new(SessionExpiryHandler::new(
            snapshots.clone(),
            auth.clone(),
        ));
        let service = actions(Arc::clone(&transport)).with_session_handler(handler.clone());

        let err = service.approve_review("rev-7", None).await.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(transport.calls(), 1);
        assert!(handler.has_fired());
        assert!(auth.cleared.load(Ordering::SeqCst));

        let snapshot = snapshots.take(SESSION_SNAPSHOT_KEY).unwrap();
        assert_eq!(snapshot.url, "/reviews/rev-7");
        assert_eq!(snapshot.context.as_deref(), Some("review-actions"));
    }
}
