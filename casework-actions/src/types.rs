//! Review DTOs exchanged with the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a risk review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    /// Submitted by a maker, awaiting a checker decision.
    PendingApproval,
    /// Approved by a checker.
    Approved,
    /// Rejected by a checker.
    Rejected,
}

/// A client risk review as listed for checkers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    /// Review identifier.
    pub id: String,
    /// Client under review.
    pub client_id: String,
    /// Current risk rating of the client, e.g. "HIGH".
    pub risk_rating: String,
    /// Review lifecycle status.
    pub status: ReviewStatus,
    /// User who submitted the review.
    pub maker: String,
    /// User who decided it, once decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checker: Option<String>,
}

/// Outcome of an approve/reject call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    /// Review identifier.
    pub review_id: String,
    /// Status after the decision.
    pub status: ReviewStatus,
    /// Checker who made the decision.
    pub decided_by: String,
    /// When the decision was recorded.
    pub decided_at: DateTime<Utc>,
}
