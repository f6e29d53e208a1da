//! REST transport for review operations.
//!
//! The trait is the seam the action layer retries against; the reqwest
//! implementation turns every failure mode into a [`RawError`] so the
//! classifier sees structured status and code fields whenever the backend
//! provides them. Request timeouts are reqwest's concern, not the retry
//! layer's; a timeout simply arrives here as one more raw error.

use crate::types::{ReviewDecision, ReviewSummary};
use async_trait::async_trait;
use casework_resilience::RawError;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Backend operations the action layer depends on.
#[async_trait]
pub trait ReviewTransport: Send + Sync {
    /// Fetch a single review.
    async fn fetch_review(&self, review_id: &str) -> Result<ReviewSummary, RawError>;

    /// Approve a pending review, with an optional checker comment.
    async fn approve_review(
        &self,
        review_id: &str,
        comment: Option<&str>,
    ) -> Result<ReviewDecision, RawError>;

    /// Reject a pending review with a reason.
    async fn reject_review(&self, review_id: &str, reason: &str)
        -> Result<ReviewDecision, RawError>;
}

/// JSON error envelope the backend uses for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApproveBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RejectBody<'a> {
    reason: &'a str,
}

/// Convert a reqwest failure into the classifier's input shape.
fn raw_from_reqwest(err: reqwest::Error) -> RawError {
    if err.is_timeout() {
        RawError::timeout(err.to_string())
    } else if err.is_connect() {
        RawError::network(err.to_string())
    } else {
        match err.status() {
            Some(status) => RawError::http(status.as_u16(), err.to_string()),
            None => RawError::network(err.to_string()),
        }
    }
}

/// Review transport over HTTP.
#[derive(Debug, Clone)]
pub struct HttpReviewTransport {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpReviewTransport {
    /// Create a transport for a backend base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
            bearer_token: None,
        }
    }

    /// Create a builder.
    pub fn builder(base_url: Url) -> HttpReviewTransportBuilder {
        HttpReviewTransportBuilder {
            base_url,
            client: None,
            bearer_token: None,
            timeout: None,
        }
    }

    /// Set the bearer token sent with each request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RawError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RawError::message("base URL cannot be a base"))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn send_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<R, RawError> {
        debug!(method = %method, url = %url, "review transport request");

        let mut request = self.client.request(method, url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(raw_from_reqwest)?;
        let response = check_response(response).await?;
        response.json::<R>().await.map_err(raw_from_reqwest)
    }
}

/// Turn a non-2xx response into a [`RawError`], extracting the backend's
/// error envelope when it sends one.
async fn check_response(response: Response) -> Result<Response, RawError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_code = status.as_u16();
    let body = response.text().await.unwrap_or_default();
    let envelope: Option<ErrorEnvelope> = serde_json::from_str(&body).ok();

    let (code, message) = match envelope {
        Some(envelope) => (
            envelope.code,
            envelope
                .message
                .unwrap_or_else(|| default_status_message(status)),
        ),
        None if !body.is_empty() => (None, body),
        None => (None, default_status_message(status)),
    };

    let mut raw = RawError::http(status_code, message);
    if let Some(code) = code {
        raw = raw.with_code(code);
    }
    Err(raw)
}

fn default_status_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

#[async_trait]
impl ReviewTransport for HttpReviewTransport {
    async fn fetch_review(&self, review_id: &str) -> Result<ReviewSummary, RawError> {
        let url = self.endpoint(&["reviews", review_id])?;
        self.send_json::<(), _>(reqwest::Method::GET, url, None).await
    }

    async fn approve_review(
        &self,
        review_id: &str,
        comment: Option<&str>,
    ) -> Result<ReviewDecision, RawError> {
        let url = self.endpoint(&["reviews", review_id, "approve"])?;
        self.send_json(reqwest::Method::POST, url, Some(&ApproveBody { comment }))
            .await
    }

    async fn reject_review(
        &self,
        review_id: &str,
        reason: &str,
    ) -> Result<ReviewDecision, RawError> {
        let url = self.endpoint(&["reviews", review_id, "reject"])?;
        self.send_json(reqwest::Method::POST, url, Some(&RejectBody { reason }))
            .await
    }
}

/// Builder for [`HttpReviewTransport`].
#[derive(Debug)]
pub struct HttpReviewTransportBuilder {
    base_url: Url,
    client: Option<Client>,
    bearer_token: Option<String>,
    timeout: Option<Duration>,
}

impl HttpReviewTransportBuilder {
    /// Use a pre-configured reqwest client.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the bearer token.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the request timeout on the underlying client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HttpReviewTransport, RawError> {
        let client = match self.client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder
                    .build()
                    .map_err(|err| RawError::message(err.to_string()))?
            }
        };
        Ok(HttpReviewTransport {
            client,
            base_url: self.base_url,
            bearer_token: self.bearer_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let transport =
            HttpReviewTransport::new(Url::parse("https://api.example.com/v1/").unwrap());
        let url = transport.endpoint(&["reviews", "rev-1", "approve"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/reviews/rev-1/approve"
        );
    }

    #[test]
    fn test_builder() {
        let transport = HttpReviewTransport::builder(
            Url::parse("https://api.example.com").unwrap(),
        )
        .bearer_token("t0ken")
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
        assert_eq!(transport.bearer_token.as_deref(), Some("t0ken"));
    }

    #[test]
    fn test_error_envelope_parsing() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"code":"BR_SELF_APPROVAL","message":"own submission"}"#)
                .unwrap();
        assert_eq!(envelope.code.as_deref(), Some("BR_SELF_APPROVAL"));
        assert_eq!(envelope.message.as_deref(), Some("own submission"));
    }
}
