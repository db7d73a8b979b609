use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Sentinel status for failures that never produced an HTTP response.
pub const NO_RESPONSE_STATUS: u16 = 0;

/// Result of a single REST call, as seen by callers of the probe client.
///
/// The client never returns `Err`: network failures, timeouts, and
/// unparseable bodies all become [`Outcome::HttpError`] with status
/// [`NO_RESPONSE_STATUS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// 2xx response with its decoded body (`Null` when empty).
    Success {
        /// Decoded JSON body.
        body: Value,
    },
    /// Anything else.
    HttpError {
        /// HTTP status, or 0 when no response arrived.
        status: u16,
        /// Raw response body or a description of the failure.
        body: String,
    },
}

impl Outcome {
    /// Build a success outcome.
    pub fn success(body: Value) -> Self {
        Outcome::Success { body }
    }

    /// Build an error outcome.
    pub fn http_error(status: u16, body: impl Into<String>) -> Self {
        Outcome::HttpError {
            status,
            body: body.into(),
        }
    }

    /// True for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// HTTP status for errors; `None` on success.
    pub fn status(&self) -> Option<u16> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::HttpError { status, .. } => Some(*status),
        }
    }

    /// Error body text; `None` on success.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::HttpError { body, .. } => Some(body),
        }
    }

    /// Structured error code carried in a `PostgREST` error body.
    ///
    /// `PostgREST` forwards the Postgres SQLSTATE (e.g. `42501`) or its own
    /// `PGRSTxxx` code in the `code` field of a JSON error object.
    pub fn error_code(&self) -> Option<String> {
        let body = self.error_body()?;
        let parsed: Value = serde_json::from_str(body).ok()?;
        match parsed.get("code")? {
            Value::String(code) if !code.trim().is_empty() => Some(code.trim().to_string()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        }
    }

    /// Identifier of the row returned by an INSERT with `Prefer: return=representation`.
    pub fn inserted_id(&self) -> Option<String> {
        let Outcome::Success { body } = self else {
            return None;
        };
        let row = match body {
            Value::Array(rows) => rows.first()?,
            Value::Object(_) => body,
            _ => return None,
        };
        match row.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Failure of a single HTTP attempt, before normalization into [`Outcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// No response within the configured timeout.
    #[error("Timeout")]
    Timeout,

    /// Connection refused, DNS failure, TLS failure, and similar.
    #[error("Network error: {0}")]
    Network(String),

    /// A 2xx response whose body was not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A non-2xx response.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },
}

impl ProbeError {
    /// Transient failures are worth retrying: timeouts, network errors, and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ProbeError::Timeout | ProbeError::Network(_) => true,
            ProbeError::Status { status, .. } => *status >= 500,
            ProbeError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else if err.is_decode() {
            ProbeError::Parse(err.to_string())
        } else {
            ProbeError::Network(err.to_string())
        }
    }
}

impl From<ProbeError> for Outcome {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Status { status, body } => Outcome::HttpError { status, body },
            other => Outcome::HttpError {
                status: NO_RESPONSE_STATUS,
                body: other.to_string(),
            },
        }
    }
}
