// =============================================================================
// Notification Dispatcher — independent, retried delivery to every provider
// =============================================================================
//
// Each endpoint gets its own retry budget and its own outcome.  A failing
// provider never blocks or aborts another; the dispatcher never returns an
// error, only outcomes, and leaves escalation to the caller.
//
// A delivery attempt succeeds on any 2xx status.  The response body is then
// inspected only for logging: ServerChan-style APIs acknowledge with
// `code == 0` (or `errno == 0`).
// =============================================================================

use anyhow::{Context, Result};
use futures_util::future::join_all;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::provider::{encode_component, ProviderEndpoint};
use crate::report::NotificationPayload;
use crate::retry::{attempt_with_retry, RetryPolicy};

/// A single failed delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Final result of delivering one payload to one provider.
///
/// `error` is `Some` exactly when `success` is `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub provider: String,
    pub success: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    fn delivered(provider: &str, attempts: u32) -> Self {
        Self {
            provider: provider.to_string(),
            success: true,
            attempts,
            error: None,
        }
    }

    fn failed(provider: &str, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            success: false,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// Run-level success: at least one provider accepted the payload.
pub fn delivered_any(outcomes: &[DeliveryOutcome]) -> bool {
    outcomes.iter().any(|o| o.success)
}

/// Sends notification payloads over HTTP GET.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    client: reqwest::Client,
}

impl NotificationDispatcher {
    /// Create a dispatcher with its own HTTP client.  Per-attempt timeouts come
    /// from the retry policy passed to [`dispatch`](Self::dispatch).
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client for notifications")?;
        Ok(Self::with_client(client))
    }

    /// Create a dispatcher that re-uses an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Deliver `payload` to every endpoint concurrently and collect one outcome
    /// per endpoint, in endpoint order.
    pub async fn dispatch(
        &self,
        payload: &NotificationPayload,
        endpoints: &[ProviderEndpoint],
        policy: &RetryPolicy,
    ) -> Vec<DeliveryOutcome> {
        info!(title = %payload.title, providers = endpoints.len(), "dispatching notification");
        info!(
            chars = payload.body.chars().count(),
            line_breaks = payload.body.matches('\n').count(),
            encoded_title_len = encode_component(&payload.title).len(),
            encoded_body_len = encode_component(&payload.body).len(),
            "payload prepared"
        );

        let outcomes = join_all(
            endpoints
                .iter()
                .map(|endpoint| self.deliver(endpoint, payload, policy)),
        )
        .await;

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        if succeeded > 0 {
            info!(succeeded, total = outcomes.len(), "notification dispatch finished");
        } else {
            warn!(total = outcomes.len(), "no provider accepted the notification");
        }

        outcomes
    }

    #[instrument(skip_all, fields(provider = %endpoint.name))]
    async fn deliver(
        &self,
        endpoint: &ProviderEndpoint,
        payload: &NotificationPayload,
        policy: &RetryPolicy,
    ) -> DeliveryOutcome {
        let url = endpoint.render_url(&payload.title, &payload.body);
        debug!(url_len = url.len(), "provider URL rendered");

        let attempted = attempt_with_retry(policy, &endpoint.name, || {
            self.send_once(&url, policy)
        })
        .await;

        match attempted.result {
            Ok(()) => {
                info!(attempts = attempted.attempts, "notification delivered");
                DeliveryOutcome::delivered(&endpoint.name, attempted.attempts)
            }
            Err(e) => {
                error!(
                    attempts = attempted.attempts,
                    error = %e,
                    "notification delivery failed after all retries"
                );
                DeliveryOutcome::failed(&endpoint.name, attempted.attempts, e.to_string())
            }
        }
    }

    /// One GET with the policy's per-attempt timeout.
    async fn send_once(&self, url: &str, policy: &RetryPolicy) -> Result<(), DeliveryError> {
        let resp = self
            .client
            .get(url)
            .timeout(policy.timeout())
            .send()
            .await
            // The URL carries credentials; keep it out of error messages.
            .map_err(|e| DeliveryError::Transport(e.without_url()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(DeliveryError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        log_acknowledgement(&body);
        Ok(())
    }
}

/// Log whether the provider acknowledged the push in its JSON body.
///
/// `Some(true)` for `code == 0` or `errno == 0`, `Some(false)` for any other
/// JSON body, `None` when the body is not JSON.
fn log_acknowledgement(body: &str) -> Option<bool> {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        debug!("provider response is not JSON; assuming delivered");
        return None;
    };

    let acknowledged = json.get("code").and_then(|v| v.as_i64()) == Some(0)
        || json.get("errno").and_then(|v| v.as_i64()) == Some(0);
    if acknowledged {
        debug!("provider confirmed delivery");
    } else {
        warn!(response = %json, "provider answered 2xx without a success code");
    }
    Some(acknowledged)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::constant(max_retries, Duration::from_millis(5), Duration::from_secs(5))
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "RSI-1个超买,0个超卖信号".to_string(),
            body: "## RSI 1d 极值提醒\n\n| BTC | RSI-14 | 72.50 | $63,123.45 |".to_string(),
        }
    }

    fn endpoint_at(server: &MockServer, name: &str, token: &str) -> ProviderEndpoint {
        ProviderEndpoint::single_token(name, token).with_template(format!(
            "{}/{{token}}.send?title={{title}}&desp={{content}}",
            server.uri()
        ))
    }

    #[tokio::test]
    async fn delivers_encoded_payload() {
        let server = MockServer::start().await;
        let p = payload();
        Mock::given(method("GET"))
            .and(path("/SCT1.send"))
            .and(query_param("title", p.title.as_str()))
            .and(query_param("desp", p.body.as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "code": 0 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = NotificationDispatcher::with_client(reqwest::Client::new());
        let outcomes = dispatcher
            .dispatch(&p, &[endpoint_at(&server, "serverchan", "SCT1")], &policy(2))
            .await;

        assert_eq!(outcomes, vec![DeliveryOutcome::delivered("serverchan", 1)]);
        assert!(delivered_any(&outcomes));
    }

    #[tokio::test]
    async fn failing_endpoint_does_not_block_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/BAD.send"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/GOOD.send"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let endpoints = vec![
            endpoint_at(&server, "a", "BAD"),
            endpoint_at(&server, "b", "GOOD"),
        ];
        let dispatcher = NotificationDispatcher::with_client(reqwest::Client::new());
        let outcomes = dispatcher.dispatch(&payload(), &endpoints, &policy(2)).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].provider, "a");
        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].attempts, 3);
        assert!(outcomes[0].error.as_deref().unwrap().contains("500"));
        assert_eq!(outcomes[1], DeliveryOutcome::delivered("b", 1));
        assert!(delivered_any(&outcomes));
    }

    #[tokio::test]
    async fn all_failures_are_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let endpoints = vec![
            endpoint_at(&server, "a", "X"),
            endpoint_at(&server, "b", "Y"),
        ];
        let dispatcher = NotificationDispatcher::with_client(reqwest::Client::new());
        let outcomes = dispatcher.dispatch(&payload(), &endpoints, &policy(1)).await;

        assert!(outcomes.iter().all(|o| !o.success && o.attempts == 2 && o.error.is_some()));
        assert!(!delivered_any(&outcomes));
    }

    #[tokio::test]
    async fn recovers_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dispatcher = NotificationDispatcher::with_client(reqwest::Client::new());
        let outcomes = dispatcher
            .dispatch(&payload(), &[endpoint_at(&server, "a", "T")], &policy(3))
            .await;

        assert_eq!(outcomes, vec![DeliveryOutcome::delivered("a", 2)]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_failure() {
        // Nothing listens on port 9 (discard) on test hosts.
        let endpoint = ProviderEndpoint::single_token("dead", "T")
            .with_template("http://127.0.0.1:9/{token}?title={title}&desp={content}");
        let dispatcher = NotificationDispatcher::with_client(reqwest::Client::new());
        let outcomes = dispatcher.dispatch(&payload(), &[endpoint], &policy(1)).await;

        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].attempts, 2);
        let err = outcomes[0].error.as_deref().unwrap();
        assert!(err.starts_with("transport error"));
        assert!(!err.contains("title="));
    }

    #[test]
    fn no_endpoints_is_not_a_success() {
        assert!(!delivered_any(&[]));
    }

    #[test]
    fn acknowledgement_reads_code_or_errno() {
        assert_eq!(log_acknowledgement(r#"{"code": 0, "data": {}}"#), Some(true));
        assert_eq!(log_acknowledgement(r#"{"errno": 0}"#), Some(true));
        assert_eq!(
            log_acknowledgement(r#"{"code": 40001, "message": "bad key"}"#),
            Some(false)
        );
        assert_eq!(log_acknowledgement("OK"), None);
        assert_eq!(log_acknowledgement(""), None);
    }

    #[tokio::test]
    async fn unacknowledged_2xx_still_counts_as_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code": 40001}"#))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = NotificationDispatcher::new().unwrap();
        let outcomes = dispatcher
            .dispatch(&payload(), &[endpoint_at(&server, "sc", "K")], &policy(2))
            .await;

        assert_eq!(outcomes, vec![DeliveryOutcome::delivered("sc", 1)]);
    }
}
