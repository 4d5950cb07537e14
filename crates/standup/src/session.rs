//! Cached client session.
//!
//! The signed-in profile lives in [`Storage`] under [`USER_CACHE_KEY`] with a
//! `lastChecked` stamp; the provider tokens live under [`AUTH_SESSION_KEY`].
//! A fresh cache is served immediately and revalidated in the background; a
//! stale one blocks on revalidation.
//!
//! Revalidation is single-flight: while a check is running, every other
//! trigger (load, focus, timer) awaits the same shared future, so a burst of
//! triggers costs one backend round-trip. A focus refresh that arrives during
//! a plain validation runs once that validation finishes.
//!
//! An expired or rejected access token is exchanged with the refresh token
//! before the session is given up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthError, AuthSession, SessionBackend};
use crate::models::CachedUser;
use crate::storage::{
    read_json, write_json, Storage, StorageError, StorageEvent, AUTH_SESSION_KEY, USER_CACHE_KEY,
};
use crate::StandupError;

pub const SIGN_IN_PATH: &str = "/auth/signin";

/// Access tokens this close to expiry are refreshed instead of validated.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A cache younger than this is served without waiting for the backend.
    pub cache_max_age: Duration,
    /// Minimum gap between two focus-triggered refreshes.
    pub visibility_interval: Duration,
    /// Upper bound on any single auth check.
    pub auth_timeout: Duration,
    /// Delay before the background check that follows a cached load.
    pub background_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_max_age: Duration::from_secs(30 * 60),
            visibility_interval: Duration::from_secs(60),
            auth_timeout: Duration::from_secs(5),
            background_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated(CachedUser),
    SignedOut,
}

impl SessionStatus {
    pub fn user(&self) -> Option<&CachedUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::SignedOut => None,
        }
    }

    /// Where the client should go next, if anywhere.
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            Self::Authenticated(_) => None,
            Self::SignedOut => Some(SIGN_IN_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckKind {
    /// Confirm the stored access token.
    Validate,
    /// Exchange the refresh token first.
    Refresh,
}

type CheckResult = Result<SessionStatus, StorageError>;
type SharedCheck = Shared<BoxFuture<'static, CheckResult>>;

struct InFlight {
    generation: u64,
    kind: CheckKind,
    check: SharedCheck,
}

struct Inner {
    backend: Arc<dyn SessionBackend>,
    storage: Arc<dyn Storage>,
    config: SessionConfig,
    in_flight: Mutex<Option<InFlight>>,
    background: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    last_visible_check: Mutex<Option<Instant>>,
    status: watch::Sender<SessionStatus>,
}

/// Cheap to clone; clones share the cache, the in-flight check and the
/// status channel.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        storage: Arc<dyn Storage>,
        config: SessionConfig,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::SignedOut);
        Self {
            inner: Arc::new(Inner {
                backend,
                storage,
                config,
                in_flight: Mutex::new(None),
                background: Mutex::new(None),
                generation: AtomicU64::new(0),
                last_visible_check: Mutex::new(None),
                status,
            }),
        }
    }

    /// Latest status published by any check, sign-in or storage event.
    pub fn statuses(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn cached_user(&self) -> Result<Option<CachedUser>, StandupError> {
        Ok(read_json(self.inner.storage.as_ref(), USER_CACHE_KEY)?)
    }

    pub fn stored_session(&self) -> Result<Option<AuthSession>, StandupError> {
        Ok(read_json(self.inner.storage.as_ref(), AUTH_SESSION_KEY)?)
    }

    fn is_fresh(&self, user: &CachedUser) -> bool {
        let max_age = self.inner.config.cache_max_age.as_millis() as i64;
        user.last_checked
            .map(|checked| now_ms() - checked < max_age)
            .unwrap_or(false)
    }

    fn publish(&self, status: &SessionStatus) {
        self.inner.status.send_replace(status.clone());
    }

    /// Serve a fresh cache right away, otherwise wait for a full check.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<SessionStatus, StandupError> {
        if let Some(user) = self.cached_user()? {
            if self.is_fresh(&user) {
                debug!(email = %user.email, "serving cached profile");
                let this = self.clone();
                let delay = self.inner.config.background_delay;
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(err) = this.revalidate().await {
                        warn!(error = %err, "background session check failed");
                    }
                });
                *lock(&self.inner.background) = Some(handle);
                let status = SessionStatus::Authenticated(user);
                self.publish(&status);
                return Ok(status);
            }
        }
        self.revalidate().await
    }

    /// Wait for the background check scheduled by a cached [`load`], then
    /// report the latest status. Short-lived clients call this before they
    /// exit so the check is not lost with the runtime.
    ///
    /// [`load`]: Self::load
    pub async fn settle(&self) -> SessionStatus {
        let pending = lock(&self.inner.background).take();
        if let Some(handle) = pending {
            if let Err(err) = handle.await {
                warn!(error = %err, "background session check did not finish");
            }
        }
        self.inner.status.borrow().clone()
    }

    /// Validate the stored session and rebuild the cached profile.
    pub async fn revalidate(&self) -> Result<SessionStatus, StandupError> {
        Ok(self.single_flight(CheckKind::Validate).await?)
    }

    /// Focus regained. Refreshes the tokens unless the previous focus check
    /// was less than `visibility_interval` ago, in which case `None`.
    pub async fn on_visible(&self) -> Result<Option<SessionStatus>, StandupError> {
        {
            let mut last = lock(&self.inner.last_visible_check);
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.inner.config.visibility_interval {
                    return Ok(None);
                }
            }
            *last = Some(now);
        }
        Ok(Some(self.single_flight(CheckKind::Refresh).await?))
    }

    /// Join the running check, except that a refresh requested during a
    /// plain validation is chained after it and takes over the slot.
    fn single_flight(&self, kind: CheckKind) -> SharedCheck {
        let mut slot = lock(&self.inner.in_flight);
        let prior = match slot.as_ref() {
            Some(current) if current.kind == CheckKind::Refresh || kind == CheckKind::Validate => {
                return current.check.clone();
            }
            Some(current) => Some(current.check.clone()),
            None => None,
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        let check = async move {
            if let Some(prior) = prior {
                // Its outcome is superseded by this refresh.
                let _ = prior.await;
            }
            let result = this.check(kind).await;
            this.finish(generation);
            result
        }
        .boxed()
        .shared();

        *slot = Some(InFlight { generation, kind, check: check.clone() });
        check
    }

    /// Release the slot unless a newer check has already replaced it.
    fn finish(&self, generation: u64) {
        let mut slot = lock(&self.inner.in_flight);
        if matches!(slot.as_ref(), Some(current) if current.generation == generation) {
            *slot = None;
        }
    }

    async fn check(&self, kind: CheckKind) -> CheckResult {
        let storage = self.inner.storage.as_ref();
        let Some(session) = read_json::<AuthSession>(storage, AUTH_SESSION_KEY)? else {
            storage.remove(USER_CACHE_KEY)?;
            let status = SessionStatus::SignedOut;
            self.publish(&status);
            return Ok(status);
        };

        let timeout = self.inner.config.auth_timeout;
        let outcome = tokio::time::timeout(timeout, self.resolve(&session, kind)).await;

        let status = match outcome {
            Err(_) => {
                // Too slow to trust; the stored session stays for the next try.
                warn!(?timeout, "auth check timed out");
                SessionStatus::SignedOut
            }
            Ok(Ok((user, refreshed))) => {
                if let Some(refreshed) = refreshed {
                    write_json(storage, AUTH_SESSION_KEY, &refreshed)?;
                }
                write_json(storage, USER_CACHE_KEY, &user)?;
                SessionStatus::Authenticated(user)
            }
            Ok(Err(err)) if err.is_invalid_session() => {
                info!(error = %err, "session rejected, clearing cache");
                storage.remove(USER_CACHE_KEY)?;
                storage.remove(AUTH_SESSION_KEY)?;
                SessionStatus::SignedOut
            }
            Ok(Err(err)) => {
                warn!(error = %err, "auth backend unavailable, keeping cached profile");
                match read_json::<CachedUser>(storage, USER_CACHE_KEY)? {
                    Some(user) => SessionStatus::Authenticated(user),
                    None => SessionStatus::SignedOut,
                }
            }
        };

        self.publish(&status);
        Ok(status)
    }

    async fn resolve(
        &self,
        session: &AuthSession,
        kind: CheckKind,
    ) -> Result<(CachedUser, Option<AuthSession>), AuthError> {
        let backend = self.inner.backend.as_ref();
        let refreshed = match kind {
            CheckKind::Refresh => Some(backend.refresh(session).await?),
            CheckKind::Validate
                if session.expires_within(Utc::now().timestamp(), EXPIRY_MARGIN_SECS) =>
            {
                debug!("access token expired, refreshing");
                Some(backend.refresh(session).await?)
            }
            CheckKind::Validate => match backend.validate(session).await {
                Ok(_) => None,
                // The refresh token may outlive a rejected access token.
                Err(err) if err.is_invalid_session() => {
                    debug!(error = %err, "access token rejected, trying the refresh token");
                    Some(backend.refresh(session).await?)
                }
                Err(err) => return Err(err),
            },
        };

        let current = refreshed.as_ref().unwrap_or(session);
        let mut user = backend.load_profile(current).await?;
        user.last_checked = Some(now_ms());
        Ok((user, refreshed))
    }

    /// React to a write made through another storage handle.
    ///
    /// Removal of the profile or the tokens means that instance signed out;
    /// a new profile value means it signed in or the user changed.
    pub fn handle_storage_event(&self, event: &StorageEvent) -> Option<SessionStatus> {
        if event.origin == self.inner.storage.origin() {
            return None;
        }

        let status = match (event.key.as_str(), event.new_value.as_deref()) {
            (USER_CACHE_KEY | AUTH_SESSION_KEY, None) => SessionStatus::SignedOut,
            (USER_CACHE_KEY, Some(raw)) => match serde_json::from_str::<CachedUser>(raw) {
                Ok(user) => SessionStatus::Authenticated(user),
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable profile from storage event");
                    return None;
                }
            },
            _ => return None,
        };

        debug!(key = %event.key, "session changed in another instance");
        self.publish(&status);
        Some(status)
    }

    /// Revalidate every `interval` and follow storage events until the
    /// returned handle is aborted.
    pub fn watch(&self, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        let mut events = self.inner.storage.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = this.revalidate().await {
                            warn!(error = %err, "periodic session check failed");
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                this.handle_storage_event(&event);
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "missed storage events, revalidating");
                                if let Err(err) = this.revalidate().await {
                                    warn!(error = %err, "session check failed");
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        })
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionStatus, StandupError> {
        let backend = self.inner.backend.as_ref();
        let timeout = self.inner.config.auth_timeout;

        let session = tokio::time::timeout(timeout, backend.sign_in(email, password))
            .await
            .map_err(|_| AuthError::Unavailable("sign-in timed out".into()))??;
        write_json(self.inner.storage.as_ref(), AUTH_SESSION_KEY, &session)?;

        let mut user = tokio::time::timeout(timeout, backend.load_profile(&session))
            .await
            .map_err(|_| AuthError::Unavailable("profile lookup timed out".into()))??;
        user.last_checked = Some(now_ms());
        write_json(self.inner.storage.as_ref(), USER_CACHE_KEY, &user)?;

        info!(email = %user.email, role = %user.role, "signed in");
        let status = SessionStatus::Authenticated(user);
        self.publish(&status);
        Ok(status)
    }

    /// Local state is cleared first; the provider call is best effort.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), StandupError> {
        let session = self.stored_session()?;
        self.inner.storage.remove(USER_CACHE_KEY)?;
        self.inner.storage.remove(AUTH_SESSION_KEY)?;
        self.publish(&SessionStatus::SignedOut);

        if let Some(session) = session {
            let call = self.inner.backend.sign_out(&session);
            match tokio::time::timeout(self.inner.config.auth_timeout, call).await {
                Ok(Ok(())) => info!("signed out"),
                Ok(Err(err)) => warn!(error = %err, "provider sign-out failed"),
                Err(_) => warn!("provider sign-out timed out"),
            }
        }
        Ok(())
    }
}
