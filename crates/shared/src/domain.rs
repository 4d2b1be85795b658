use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lenient::{null_as_default, optional_timestamp, string_or_number};

const TOKEN_PREVIEW_LEN: usize = 6;

/// Login input. Only ever handed to the remote login call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            issued_at,
        }
    }

    /// Short prefix of the token, safe to put in log lines.
    pub fn token_preview(&self) -> String {
        token_preview(&self.token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token_preview())
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_PREVIEW_LEN).collect();
    format!("{prefix}…")
}

/// Known roles are matched case-insensitively; anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Admin,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Other(raw) => raw,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Other(String::new())
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "USER" => Role::User,
            "ADMIN" => Role::Admin,
            _ => Role::Other(raw),
        }
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        Role::from(raw.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User profile as returned by the backend and as persisted under the `user` cache key.
///
/// Every field tolerates absence and `null`; the UI always gets a concrete value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub role: Role,
    #[serde(deserialize_with = "null_as_default")]
    pub is_active: bool,
    #[serde(
        deserialize_with = "optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn member_since(&self) -> String {
        self.created_at
            .map(|created_at| created_at.format("%B %-d, %Y").to_string())
            .unwrap_or_else(|| "Not available".to_string())
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_active {
            "Active"
        } else {
            "Inactive"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Cached,
    Fetched,
}

/// Observable lifecycle state. Only the session controller moves between these.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated {
        profile: Profile,
        freshness: Freshness,
    },
    /// Signed in on cached data because the last refresh failed.
    Degraded {
        profile: Profile,
    },
    LoggedOut,
}

impl SessionState {
    pub fn authenticated(profile: Profile, freshness: Freshness) -> Self {
        SessionState::Authenticated { profile, freshness }
    }

    pub fn degraded(profile: Profile) -> Self {
        SessionState::Degraded { profile }
    }

    /// True for the states that own a live session.
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticated { .. } | SessionState::Degraded { .. }
        )
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            SessionState::Authenticated { profile, .. } | SessionState::Degraded { profile } => {
                Some(profile)
            }
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated {
                freshness: Freshness::Cached,
                ..
            } => "authenticated(cached)",
            SessionState::Authenticated {
                freshness: Freshness::Fetched,
                ..
            } => "authenticated(fetched)",
            SessionState::Degraded { .. } => "degraded",
            SessionState::LoggedOut => "logged_out",
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
