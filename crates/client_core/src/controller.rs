use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use shared::{
    domain::{Credentials, Freshness, Profile, Session, SessionState},
    error::AuthError,
};
use storage::{KeyValueStore, TOKEN_KEY, USER_KEY};
use tokio::{
    sync::{broadcast, Mutex, MutexGuard},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::cache_error,
    reconcile::{reconcile, CacheWrite},
    remote::AuthRemote,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const CACHE_CLEAR_ATTEMPTS: usize = 3;
const CACHE_CLEAR_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A background refresh failed; the state change it caused is sent first.
    RefreshFailed(AuthError),
    /// Restore failed with nothing cached to fall back on.
    RedirectToLogin,
}

struct ControllerState {
    state: SessionState,
    session: Option<Session>,
    /// Bumped by every operation that supersedes an outstanding profile refresh.
    epoch: u64,
}

/// Owns the client session: login, restore with background refresh, logout.
pub struct SessionController {
    remote: Arc<dyn AuthRemote>,
    store: Arc<dyn KeyValueStore>,
    inner: Mutex<ControllerState>,
    login_in_flight: AtomicBool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SessionEvent>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionController {
    pub fn new(remote: Arc<dyn AuthRemote>, store: Arc<dyn KeyValueStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            remote,
            store,
            inner: Mutex::new(ControllerState {
                state: SessionState::Unauthenticated,
                session: None,
                epoch: 0,
            }),
            login_in_flight: AtomicBool::new(false),
            refresh_task: Mutex::new(None),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        if !credentials.is_complete() {
            debug!("session: login rejected locally reason=missing_credentials");
            return Err(AuthError::missing_credentials());
        }
        if self
            .login_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("session: login rejected reason=already_in_progress");
            return Err(AuthError::login_in_progress());
        }
        let _in_flight = InFlight(&self.login_in_flight);

        let (epoch, previous_state, previous_session) = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            let previous_session = inner.session.take();
            // A login supersedes any pending refresh, so there is nothing to wait for.
            let previous_state = match &inner.state {
                SessionState::Authenticating => SessionState::Unauthenticated,
                state => state.clone(),
            };
            self.transition(&mut inner, SessionState::Authenticating);
            (inner.epoch, previous_state, previous_session)
        };

        let outcome = self.remote.login(credentials).await;

        let mut inner = self.inner.lock().await;
        // A logout or restore issued while the request was pending owns the state now.
        let superseded = inner.epoch != epoch;
        let grant = match outcome {
            Ok(_) if superseded => {
                info!(
                    "session: discarding login superseded while pending username={} epoch={epoch} current={}",
                    credentials.username, inner.epoch
                );
                return Err(AuthError::login_superseded());
            }
            Ok(grant) => grant,
            Err(err) => {
                warn!(
                    "session: login failed username={} kind={} err={err} superseded={superseded}",
                    credentials.username,
                    err.kind()
                );
                if !superseded {
                    inner.session = previous_session;
                    self.transition(&mut inner, previous_state);
                }
                return Err(err);
            }
        };

        let session = Session::new(grant.token, Utc::now());
        if let Err(err) = self.persist_session(&session.token, &grant.profile).await {
            error!("session: failed to persist new session err={err}");
            self.transition(&mut inner, SessionState::Unauthenticated);
            return Err(err);
        }

        info!(
            "session: logged in username={} role={} token={}",
            grant.profile.username,
            grant.profile.role,
            session.token_preview()
        );
        inner.session = Some(session.clone());
        self.transition(
            &mut inner,
            SessionState::authenticated(grant.profile, Freshness::Fetched),
        );
        Ok(session)
    }

    /// Adopts the cached session immediately and refreshes the profile in the background.
    ///
    /// The returned state is the optimistic one; the refresh outcome arrives as events.
    pub async fn restore_session(self: &Arc<Self>) -> SessionState {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        let epoch = inner.epoch;

        let token = match self.store.get(TOKEN_KEY).await {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(err) => {
                warn!("session: token read failed err={err:#}");
                None
            }
        };
        let Some(token) = token else {
            debug!("session: no cached token; restore skipped");
            inner.session = None;
            return self.transition(&mut inner, SessionState::Unauthenticated);
        };

        let cached = self.load_cached_profile().await;
        let optimistic = match &cached {
            Some(profile) => {
                let session = match inner.session.take() {
                    Some(existing) if existing.token == token => existing,
                    _ => Session::new(token.clone(), Utc::now()),
                };
                inner.session = Some(session);
                SessionState::authenticated(profile.clone(), Freshness::Cached)
            }
            None => {
                inner.session = None;
                SessionState::Authenticating
            }
        };
        let state = self.transition(&mut inner, optimistic);
        drop(inner);

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            controller.refresh_profile(epoch, token, cached).await;
        });
        // A superseded refresh is left to finish; its epoch check discards the result.
        self.refresh_task.lock().await.replace(task);

        state
    }

    /// Waits for the most recent background refresh, if any, and returns the state after it.
    pub async fn wait_for_refresh(&self) -> SessionState {
        let task = self.refresh_task.lock().await.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!("session: profile refresh task ended abnormally err={err}");
            }
        }
        self.state().await
    }

    pub async fn logout(&self) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.session = None;
        if let Err(err) = self.clear_cached_session().await {
            error!("session: cache not fully cleared on logout err={err}");
        }
        self.transition(&mut inner, SessionState::LoggedOut);
        info!("session: logged out");
    }

    async fn refresh_profile(&self, epoch: u64, token: String, cached: Option<Profile>) {
        let fetched = self.remote.fetch_profile(&token).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            debug!(
                "session: discarding stale profile refresh epoch={epoch} current={}",
                inner.epoch
            );
            return;
        }

        let failure = fetched.as_ref().err().cloned();
        let (next, write) = reconcile(cached, fetched);

        if let CacheWrite::Store(profile) = &write {
            if let Err(err) = self.store_profile(profile).await {
                warn!("session: fetched profile not cached err={err}");
            }
        }

        let redirect = match &next {
            SessionState::Unauthenticated => {
                inner.session = None;
                if let Err(err) = self.clear_cached_session().await {
                    error!("session: failed to clear rejected token err={err}");
                }
                true
            }
            _ => {
                if inner.session.is_none() {
                    inner.session = Some(Session::new(token, Utc::now()));
                }
                false
            }
        };

        self.transition(&mut inner, next);
        if let Some(err) = failure {
            warn!(
                "session: profile refresh failed kind={} err={err} redirect={redirect}",
                err.kind()
            );
            let _ = self.events.send(SessionEvent::RefreshFailed(err));
        }
        if redirect {
            let _ = self.events.send(SessionEvent::RedirectToLogin);
        }
    }

    async fn load_cached_profile(&self) -> Option<Profile> {
        let raw = match self.store.get(USER_KEY).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("session: cached profile read failed err={err:#}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!("session: failed to parse stored profile err={err}");
                None
            }
        }
    }

    async fn store_profile(&self, profile: &Profile) -> Result<(), AuthError> {
        let raw = serde_json::to_string(profile).map_err(|err| AuthError::Cache(err.to_string()))?;
        self.store.set(USER_KEY, &raw).await.map_err(cache_error)
    }

    /// Token first, then profile. A failed profile write rolls both keys back.
    async fn persist_session(&self, token: &str, profile: &Profile) -> Result<(), AuthError> {
        let raw = serde_json::to_string(profile).map_err(|err| AuthError::Cache(err.to_string()))?;
        self.store.set(TOKEN_KEY, token).await.map_err(cache_error)?;
        if let Err(err) = self.store.set(USER_KEY, &raw).await {
            if let Err(rollback) = self.clear_cached_session().await {
                error!("session: rollback after partial write failed err={rollback}");
            }
            return Err(cache_error(err));
        }
        Ok(())
    }

    /// Profile first, then token, so no cached profile outlives its token.
    async fn clear_cached_session(&self) -> Result<(), AuthError> {
        let mut first_failure = None;
        for key in [USER_KEY, TOKEN_KEY] {
            if let Err(err) = self.delete_with_retry(key).await {
                first_failure.get_or_insert(err);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    async fn delete_with_retry(&self, key: &str) -> Result<(), AuthError> {
        let mut attempt = 1;
        loop {
            match self.store.delete(key).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < CACHE_CLEAR_ATTEMPTS => {
                    warn!("session: cache delete failed key={key} attempt={attempt} err={err:#}");
                    attempt += 1;
                    tokio::time::sleep(CACHE_CLEAR_RETRY_DELAY).await;
                }
                Err(err) => return Err(cache_error(err)),
            }
        }
    }

    fn transition(
        &self,
        inner: &mut MutexGuard<'_, ControllerState>,
        next: SessionState,
    ) -> SessionState {
        debug_assert_eq!(
            next.has_session(),
            inner.session.is_some(),
            "session must exist exactly in authenticated and degraded states"
        );
        debug!("session: {} -> {}", inner.state.label(), next.label());
        inner.state = next.clone();
        let _ = self.events.send(SessionEvent::StateChanged(next.clone()));
        next
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
