use thiserror::Error;

/// Closed set of outcomes a login or profile call can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Rejected locally before any network traffic.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("request rejected with status {0}")]
    Rejected(u16),
    #[error("server unreachable: {0}")]
    Unreachable(String),
    /// Success status whose body could not be read as the expected shape.
    #[error("malformed response from server")]
    MalformedResponse,
    /// Local key-value cache failure while persisting a new session.
    #[error("session cache failure: {0}")]
    Cache(String),
}

impl AuthError {
    pub fn missing_credentials() -> Self {
        AuthError::InvalidInput("username and password are required".to_string())
    }

    pub fn login_in_progress() -> Self {
        AuthError::InvalidInput("login already in progress".to_string())
    }

    /// A logout or restore replaced the session while the login request was pending.
    pub fn login_superseded() -> Self {
        AuthError::InvalidInput("login superseded before it completed".to_string())
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, AuthError::Rejected(401 | 403))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::Rejected(_) => "rejected",
            AuthError::Unreachable(_) => "unreachable",
            AuthError::MalformedResponse => "malformed_response",
            AuthError::Cache(_) => "cache",
        }
    }

    /// Text suitable for direct display next to a login form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidInput(detail) if detail.contains("in progress") => {
                "Sign-in already in progress; please wait.".to_string()
            }
            AuthError::InvalidInput(detail) if detail.contains("superseded") => {
                "Sign-in was cancelled.".to_string()
            }
            AuthError::InvalidInput(_) => "Enter username & password".to_string(),
            AuthError::Rejected(401 | 403) => "Invalid username/email or password".to_string(),
            AuthError::Rejected(code) => format!("Login failed: {code}"),
            AuthError::Unreachable(_) => {
                "Server unreachable; check URL/network and retry sign-in.".to_string()
            }
            AuthError::MalformedResponse => {
                "Unexpected response from server; please retry.".to_string()
            }
            AuthError::Cache(_) => "Could not save session on this device.".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
