//! Maps transport and HTTP outcomes into [`AuthError`].

use reqwest::StatusCode;
use shared::error::AuthError;

pub fn classify_status(status: StatusCode) -> Result<(), AuthError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(AuthError::Rejected(status.as_u16()))
    }
}

/// Timeouts, refused connections and DNS failures all land in `Unreachable`.
pub fn classify_transport_error(err: reqwest::Error) -> AuthError {
    if err.is_decode() {
        return AuthError::MalformedResponse;
    }
    if let Some(status) = err.status() {
        return AuthError::Rejected(status.as_u16());
    }
    if err.is_timeout() {
        return AuthError::Unreachable(format!("request timed out: {err}"));
    }
    AuthError::Unreachable(err.to_string())
}

pub fn classify_body_error(err: serde_json::Error) -> AuthError {
    tracing::debug!("remote: response body did not match expected shape err={err}");
    AuthError::MalformedResponse
}

pub(crate) fn cache_error(err: anyhow::Error) -> AuthError {
    AuthError::Cache(format!("{err:#}"))
}
