// src/error.rs
//! Error taxonomy.
//!
//! * [`CallError`] is returned by every external call. `Transient` is retried by
//!   [`crate::retry::RetryPolicy`]; `Permanent` and `Exhausted` fail the item or stage.
//! * [`PipelineError`] is the only error that leaves [`crate::orchestrator::Pipeline::run`].

use reqwest::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Network timeout, rate limit, 5xx.
    #[error("transient: {0}")]
    Transient(String),
    /// Validation failure, bad request, unusable response.
    #[error("permanent: {0}")]
    Permanent(String),
    /// Retries ran out on a transient error.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: String },
}

impl CallError {
    pub fn transient(msg: impl Into<String>) -> Self {
        CallError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        CallError::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transient(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(what: &str, status: StatusCode, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let msg = format!("{what}: HTTP {status}: {snippet}");
        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            CallError::Transient(msg)
        } else {
            CallError::Permanent(msg)
        }
    }

    /// Classify a transport-level reqwest error.
    pub fn from_reqwest(what: &str, e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return CallError::from_status(what, status, &e.to_string());
        }
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            CallError::Transient(format!("{what}: {e}"))
        } else {
            CallError::Permanent(format!("{what}: {e}"))
        }
    }
}

/// Errors that abort a whole run before any item is processed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("a run is already in progress; trigger skipped")]
    AlreadyRunning,
    #[error("idempotency ledger unavailable: {0}")]
    LedgerUnavailable(CallError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(CallError::from_status("x", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(CallError::from_status("x", StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!CallError::from_status("x", StatusCode::UNAUTHORIZED, "").is_transient());
        assert!(!CallError::from_status("x", StatusCode::BAD_REQUEST, "nope").is_transient());
    }
}
