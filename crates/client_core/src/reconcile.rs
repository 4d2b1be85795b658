//! Cached-versus-fetched profile policy shared by every client surface.

use shared::{
    domain::{Freshness, Profile, SessionState},
    error::AuthError,
};

/// What the caller must do to the `user` cache key after reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheWrite {
    Keep,
    Store(Profile),
}

/// A fetched profile always wins. On failure a cached profile degrades the session;
/// without one the session fails closed.
pub fn reconcile(
    cached: Option<Profile>,
    fetched: Result<Profile, AuthError>,
) -> (SessionState, CacheWrite) {
    match (cached, fetched) {
        (_, Ok(profile)) => (
            SessionState::authenticated(profile.clone(), Freshness::Fetched),
            CacheWrite::Store(profile),
        ),
        (Some(cached), Err(_)) => (SessionState::degraded(cached), CacheWrite::Keep),
        (None, Err(_)) => (SessionState::Unauthenticated, CacheWrite::Keep),
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
