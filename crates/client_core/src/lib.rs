//! Client-side session lifecycle: login, cached restore with background refresh, logout.

mod controller;
pub mod error;
pub mod reconcile;
pub mod remote;

pub use controller::{SessionController, SessionEvent};
pub use reconcile::{reconcile, CacheWrite};
pub use remote::{AuthRemote, HttpAuthRemote, LoginGrant, DEFAULT_PROFILE_PATH};
pub use shared::{
    domain::{Credentials, Freshness, Profile, Role, Session, SessionState},
    error::AuthError,
};
