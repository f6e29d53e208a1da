//! Error classification.
//!
//! Maps a [`RawError`] from any transport collaborator onto a structured
//! [`ClassifiedError`]: category, severity, retryability, a user-facing
//! message and ordered recovery suggestions. Classification is a pure
//! function of the error and the optional [`ErrorContext`] hints; the same
//! inputs always produce the same output.
//!
//! Matching is first-match-wins, in this order: session, permission,
//! validation, business rule, workflow conflict, network/system, unknown.
//! Session is deliberately checked before permission: a 401 means "log in
//! again" when the wording or code points at an expired session, and "you
//! may not do this" otherwise.

use crate::raw::RawError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Transport-level failure: no response, connection loss, timeout.
    Network,
    /// The caller's session is no longer valid.
    Session,
    /// The request was rejected as malformed or incomplete.
    Validation,
    /// The caller is not allowed to perform the operation.
    Permission,
    /// A domain business rule blocked the operation.
    BusinessRule,
    /// The target entity is in a conflicting workflow state.
    Workflow,
    /// The backend failed (5xx).
    System,
    /// Nothing matched.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "NETWORK",
            Self::Session => "SESSION",
            Self::Validation => "VALIDATION",
            Self::Permission => "PERMISSION",
            Self::BusinessRule => "BUSINESS_RULE",
            Self::Workflow => "WORKFLOW",
            Self::System => "SYSTEM",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Severity assigned to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Cosmetic or informational.
    Low,
    /// Degraded but recoverable by the user.
    Medium,
    /// Blocks the current task.
    High,
    /// Blocks the user entirely.
    Critical,
}

/// Optional hints that refine user-facing messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Component or screen the error surfaced in.
    pub component: Option<String>,
    /// Workflow the operation belongs to, e.g. "risk-review".
    pub workflow: Option<String>,
    /// Role of the acting user, e.g. "maker" or "checker".
    pub user_role: Option<String>,
}

impl ErrorContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the component hint.
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Set the workflow hint.
    pub fn workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }

    /// Set the user-role hint.
    pub fn user_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = Some(role.into());
        self
    }
}

/// A raw error after classification.
///
/// Derived fresh from each [`RawError`]; never persisted. UIs are expected
/// to show `user_message` and `recovery_suggestions`, never
/// `technical_message`, by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Assigned category.
    pub category: ErrorCategory,
    /// Assigned severity.
    pub severity: Severity,
    /// Whether the retry executor may re-attempt the operation.
    pub retryable: bool,
    /// Message suitable for end users.
    pub user_message: String,
    /// Message for logs and support, never shown by default.
    pub technical_message: String,
    /// Machine error code, derived when the raw error carried none.
    pub error_code: String,
    /// Ordered recovery steps for the user.
    pub recovery_suggestions: Vec<String>,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{:?}] {}",
            self.category, self.severity, self.user_message
        )
    }
}

impl ClassifiedError {
    /// Whether this error indicates an expired session.
    pub fn is_session_expired(&self) -> bool {
        self.category == ErrorCategory::Session
    }

    /// Build a validation error directly, bypassing classification.
    ///
    /// Used by callers that reject input before any transport call is made.
    pub fn validation(
        user_message: impl Into<String>,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let user_message = user_message.into();
        Self {
            category: ErrorCategory::Validation,
            severity: Severity::Medium,
            retryable: false,
            technical_message: user_message.clone(),
            user_message,
            error_code: "VALIDATION_FAILED".to_string(),
            recovery_suggestions: suggestions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Error codes that indicate an expired session regardless of status.
const SESSION_CODES: &[&str] = &["SESSION_EXPIRED", "TOKEN_EXPIRED", "AUTH_TOKEN_INVALID"];

/// Wording that marks a 401 as a session problem rather than a permission one.
const SESSION_WORDS: &[&str] = &["session", "token"];

const PERMISSION_WORDS: &[&str] = &["permission", "access denied", "forbidden", "not authorized"];

const VALIDATION_WORDS: &[&str] = &["validation", "required", "invalid", "must be"];

const WORKFLOW_WORDS: &[&str] = &["workflow", "state", "already in progress"];

const NETWORK_WORDS: &[&str] = &["timeout", "timed out", "connection", "network", "unreachable"];

/// Transient transport error codes that are safe to retry.
const TRANSIENT_CODES: &[&str] = &["ECONNABORTED", "ECONNRESET", "ETIMEDOUT", "ERR_NETWORK"];

/// Known business-rule codes with their user-facing refinements.
///
/// Entries are (code substring, user message, recovery suggestion). The first
/// entry whose code substring occurs in the raw error code wins.
const BUSINESS_RULE_TABLE: &[(&str, &str, &str)] = &[
    (
        "BR_CLIENT_NOT_HIGH_RISK",
        "This client is not rated high-risk, so a risk review cannot be opened.",
        "Re-run the risk rating before opening a review",
    ),
    (
        "BR_SELF_APPROVAL",
        "You submitted this review, so another checker must decide it.",
        "Ask a different checker to approve or reject this review",
    ),
    (
        "BR_REVIEW_ALREADY_DECIDED",
        "This review has already been approved or rejected.",
        "Refresh the review list to see its current status",
    ),
    (
        "BR_DUE_DILIGENCE_INCOMPLETE",
        "Due diligence on this client is incomplete.",
        "Complete the outstanding due-diligence items first",
    ),
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn derived_code(error: &RawError, fallback: &str) -> String {
    if let Some(code) = &error.code {
        return code.clone();
    }
    match error.status {
        Some(status) if status > 0 => format!("HTTP_{}", status),
        _ => fallback.to_string(),
    }
}

/// Classify a raw transport error.
///
/// Pure: no logging, no side effects, and referentially transparent for a
/// given error and context.
pub fn classify(error: &RawError, context: &ErrorContext) -> ClassifiedError {
    let code = error.code_upper();
    let message = error.message_lower();
    let status = error.status;

    // 1. Session. Requires an explicit session code, or a 401 whose wording
    // points at the session/token rather than at entitlements.
    let explicit_session = SESSION_CODES.iter().any(|c| code.contains(c));
    if explicit_session || (status == Some(401) && contains_any(&message, SESSION_WORDS)) {
        return ClassifiedError {
            category: ErrorCategory::Session,
            severity: Severity::High,
            retryable: false,
            user_message: "Your session has expired. Please sign in again.".to_string(),
            technical_message: error.to_string(),
            error_code: derived_code(error, "SESSION_EXPIRED"),
            recovery_suggestions: vec![
                "Sign in again; you will be returned to this page".to_string(),
            ],
        };
    }

    // 2. Permission. Status takes precedence; wording alone never reclassifies
    // a 400/422, which must stay validation.
    let permission_status = matches!(status, Some(401) | Some(403));
    let permission_wording = !matches!(status, Some(400) | Some(422))
        && contains_any(&message, PERMISSION_WORDS);
    if permission_status || permission_wording {
        let mut suggestions = vec!["Contact your administrator to request access".to_string()];
        if context.user_role.as_deref() == Some("maker") {
            suggestions.insert(
                0,
                "This action may require checker privileges".to_string(),
            );
        }
        return ClassifiedError {
            category: ErrorCategory::Permission,
            severity: Severity::High,
            retryable: false,
            user_message: "You do not have permission to perform this action.".to_string(),
            technical_message: error.to_string(),
            error_code: derived_code(error, "PERMISSION_DENIED"),
            recovery_suggestions: suggestions,
        };
    }

    // 3. Validation. 400/422 always land here, whatever the message says.
    if matches!(status, Some(400) | Some(422)) || contains_any(&message, VALIDATION_WORDS) {
        return ClassifiedError {
            category: ErrorCategory::Validation,
            severity: Severity::Medium,
            retryable: false,
            user_message: "Some of the submitted information is invalid.".to_string(),
            technical_message: error.to_string(),
            error_code: derived_code(error, "VALIDATION_FAILED"),
            recovery_suggestions: vec![
                "Check the highlighted fields and correct them".to_string(),
                "Submit the form again".to_string(),
            ],
        };
    }

    // 4. Business rule.
    if let Some((_, user_message, suggestion)) = BUSINESS_RULE_TABLE
        .iter()
        .find(|(rule_code, _, _)| code.contains(rule_code))
    {
        return ClassifiedError {
            category: ErrorCategory::BusinessRule,
            severity: Severity::High,
            retryable: false,
            user_message: (*user_message).to_string(),
            technical_message: error.to_string(),
            error_code: derived_code(error, "BUSINESS_RULE"),
            recovery_suggestions: vec![(*suggestion).to_string()],
        };
    }

    // 5. Workflow / state conflict.
    if code.contains("WORKFLOW") || code.contains("STATUS") || contains_any(&message, WORKFLOW_WORDS)
    {
        let workflow = context.workflow.as_deref().unwrap_or("workflow");
        return ClassifiedError {
            category: ErrorCategory::Workflow,
            severity: Severity::Medium,
            retryable: true,
            user_message: format!(
                "The {} state changed while you were working. Please try again.",
                workflow
            ),
            technical_message: error.to_string(),
            error_code: derived_code(error, "WORKFLOW_CONFLICT"),
            recovery_suggestions: vec![
                "Reload the item to pick up its latest state".to_string(),
                "Retry the action".to_string(),
            ],
        };
    }

    // 6. Network / system. Status 0 means no response was received at all.
    let server_error = matches!(status, Some(s) if s >= 500);
    let no_response = status == Some(0);
    let transient_code = TRANSIENT_CODES.iter().any(|c| code.contains(c));
    if server_error || no_response || transient_code || contains_any(&message, NETWORK_WORDS) {
        let (category, severity, user_message) = if server_error {
            (
                ErrorCategory::System,
                Severity::High,
                "The service is currently unavailable. Please try again shortly.".to_string(),
            )
        } else {
            (
                ErrorCategory::Network,
                Severity::Medium,
                "A network problem interrupted the request.".to_string(),
            )
        };
        return ClassifiedError {
            category,
            severity,
            retryable: true,
            user_message,
            technical_message: error.to_string(),
            error_code: derived_code(error, "NETWORK_ERROR"),
            recovery_suggestions: vec![
                "Check your connection".to_string(),
                "Retry the action".to_string(),
                "Contact support if the problem persists".to_string(),
            ],
        };
    }

    // 7. Fallback.
    ClassifiedError {
        category: ErrorCategory::Unknown,
        severity: Severity::Medium,
        retryable: false,
        user_message: "Something went wrong. Please try again or contact support.".to_string(),
        technical_message: error.to_string(),
        error_code: derived_code(error, "UNKNOWN"),
        recovery_suggestions: vec!["Contact support with the time this happened".to_string()],
    }
}
