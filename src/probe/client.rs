use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::probe::outcome::{Outcome, ProbeError};
use crate::probe::retry::RetryPolicy;

/// The four REST calls a probe run issues against one table.
///
/// Implementations never fail: every error is folded into [`Outcome::HttpError`].
#[async_trait]
pub trait RestProbe: Send + Sync {
    /// `GET /rest/v1/{table}?select=*&limit=1`; success only on HTTP 200.
    async fn probe_select(&self, table: &str) -> Outcome;

    /// `POST /rest/v1/{table}` with `payload`; success only on HTTP 201.
    async fn probe_insert(&self, table: &str, payload: &Value) -> Outcome;

    /// `PATCH /rest/v1/{table}?id=eq.{id}` with `payload`; success on any 2xx.
    async fn probe_update(&self, table: &str, id: &str, payload: &Value) -> Outcome;

    /// `DELETE /rest/v1/{table}?id=eq.{id}`; success on any 2xx.
    async fn probe_delete(&self, table: &str, id: &str) -> Outcome;
}

/// `PostgREST` client authenticated with the anonymous key only.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    rest_base: String,
    anon_key: String,
    retry: RetryPolicy,
}

impl RestClient {
    /// Build a client for `base_url` (with or without a trailing `/rest/v1`).
    pub fn new(
        base_url: &str,
        anon_key: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Network(format!("Failed to build HTTP client: {e}")))?;

        let trimmed = base_url.trim().trim_end_matches('/');
        let rest_base = if trimmed.ends_with("/rest/v1") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/rest/v1")
        };

        Ok(Self {
            http,
            rest_base,
            anon_key: anon_key.to_string(),
            retry,
        })
    }

    /// Build a client from validated configuration.
    pub fn from_config(config: &ProbeConfig) -> Result<Self, ProbeError> {
        Self::new(
            &config.target.base_url,
            &config.target.anon_key,
            config.probe.timeout(),
            RetryPolicy::from(&config.retry),
        )
    }

    /// Full URL for a table endpoint.
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_base, table.trim())
    }

    fn request(&self, method: &Method, table: &str) -> RequestBuilder {
        self.http
            .request(method.clone(), self.table_url(table))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    /// Retry policy for `method`.
    ///
    /// POST and PATCH get a single attempt: a request that timed out may
    /// still have written a row, and only the last attempt's id is known.
    pub fn retry_for(&self, method: &Method) -> RetryPolicy {
        if *method == Method::POST || *method == Method::PATCH {
            RetryPolicy::none()
        } else {
            self.retry
        }
    }

    async fn execute(
        &self,
        label: &str,
        method: Method,
        expected: fn(StatusCode) -> bool,
        build: impl Fn() -> RequestBuilder,
    ) -> Outcome {
        let result = self
            .retry_for(&method)
            .run(label, || send_expecting(build(), expected))
            .await;

        match result {
            Ok(body) => {
                debug!(%label, "probe succeeded");
                Outcome::success(body)
            }
            Err(err) => {
                debug!(%label, error = %err, "probe failed");
                Outcome::from(err)
            }
        }
    }
}

async fn send_expecting(
    request: RequestBuilder,
    expected: fn(StatusCode) -> bool,
) -> Result<Value, ProbeError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !expected(status) {
        return Err(ProbeError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ProbeError::Parse(e.to_string()))
}

fn is_ok(status: StatusCode) -> bool {
    status == StatusCode::OK
}

fn is_created(status: StatusCode) -> bool {
    status == StatusCode::CREATED
}

fn is_any_success(status: StatusCode) -> bool {
    status.is_success()
}

#[async_trait]
impl RestProbe for RestClient {
    async fn probe_select(&self, table: &str) -> Outcome {
        let label = format!("select {table}");
        self.execute(&label, Method::GET, is_ok, || {
            self.request(&Method::GET, table)
                .query(&[("select", "*"), ("limit", "1")])
        })
        .await
    }

    async fn probe_insert(&self, table: &str, payload: &Value) -> Outcome {
        let label = format!("insert {table}");
        self.execute(&label, Method::POST, is_created, || {
            self.request(&Method::POST, table)
                .header("Prefer", "return=representation")
                .json(payload)
        })
        .await
    }

    async fn probe_update(&self, table: &str, id: &str, payload: &Value) -> Outcome {
        let label = format!("update {table}");
        let filter = format!("eq.{id}");
        self.execute(&label, Method::PATCH, is_any_success, || {
            self.request(&Method::PATCH, table)
                .query(&[("id", filter.as_str())])
                .header("Prefer", "return=minimal")
                .json(payload)
        })
        .await
    }

    async fn probe_delete(&self, table: &str, id: &str) -> Outcome {
        let label = format!("delete {table}");
        let filter = format!("eq.{id}");
        self.execute(&label, Method::DELETE, is_any_success, || {
            self.request(&Method::DELETE, table)
                .query(&[("id", filter.as_str())])
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_base_is_normalized() {
        let plain = RestClient::new(
            "https://demo.supabase.co/",
            "anon",
            Duration::from_secs(1),
            RetryPolicy::none(),
        )
        .expect("client should build");
        assert_eq!(
            plain.table_url("proveedores"),
            "https://demo.supabase.co/rest/v1/proveedores"
        );

        let suffixed = RestClient::new(
            "http://localhost:54321/rest/v1",
            "anon",
            Duration::from_secs(1),
            RetryPolicy::none(),
        )
        .expect("client should build");
        assert_eq!(
            suffixed.table_url("audit_log"),
            "http://localhost:54321/rest/v1/audit_log"
        );
    }

    #[test]
    fn writes_are_never_retried() {
        let client = RestClient::new(
            "https://demo.supabase.co",
            "anon",
            Duration::from_secs(1),
            RetryPolicy::new(3, Duration::from_millis(10)),
        )
        .expect("client should build");
        assert_eq!(client.retry_for(&Method::POST).max_attempts, 1);
        assert_eq!(client.retry_for(&Method::PATCH).max_attempts, 1);
        assert_eq!(client.retry_for(&Method::GET).max_attempts, 3);
        assert_eq!(client.retry_for(&Method::DELETE).max_attempts, 3);
    }

    #[tokio::test]
    async fn unreachable_host_yields_sentinel_outcome() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = RestClient::new(
            "http://127.0.0.1:9",
            "anon",
            Duration::from_millis(500),
            RetryPolicy::none(),
        )
        .expect("client should build");

        let outcome = client.probe_select("organizaciones").await;
        assert_eq!(outcome.status(), Some(0));
        let body = outcome.error_body().unwrap_or_default();
        assert!(
            body.starts_with("Network error") || body == "Timeout",
            "unexpected body: {body}"
        );
    }
}
