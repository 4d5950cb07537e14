//! Tests for the cached session manager, against a scripted backend and
//! in-memory storage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::auth::{AuthError, AuthIdentity, AuthSession, SessionBackend};
use crate::models::{CachedUser, Role};
use crate::session::{SessionConfig, SessionManager, SessionStatus};
use crate::storage::{read_json, write_json, MemoryStorage, Storage, AUTH_SESSION_KEY, USER_CACHE_KEY};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Accept,
    Reject,
    Hang,
    Down,
}

struct ScriptedBackend {
    behaviour: Behaviour,
    refresh_behaviour: Behaviour,
    delay: Duration,
    validate_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Self::with_delay(behaviour, Duration::ZERO)
    }

    /// Validation and refresh answer differently.
    fn with_refresh(behaviour: Behaviour, refresh_behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            refresh_behaviour,
            delay: Duration::ZERO,
            validate_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        })
    }

    fn with_delay(behaviour: Behaviour, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            refresh_behaviour: behaviour,
            delay,
            validate_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        })
    }

    async fn respond<T>(&self, ok: T) -> Result<T, AuthError> {
        self.respond_as(self.behaviour, ok).await
    }

    async fn respond_as<T>(&self, behaviour: Behaviour, ok: T) -> Result<T, AuthError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match behaviour {
            Behaviour::Accept => Ok(ok),
            Behaviour::Reject => Err(AuthError::InvalidSession("jwt expired".into())),
            Behaviour::Down => Err(AuthError::Unavailable("connection refused".into())),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

fn session_for(email: &str) -> AuthSession {
    AuthSession {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        expires_at: None,
        user_id: "u-1".into(),
        email: email.into(),
    }
}

fn profile(email: &str) -> CachedUser {
    CachedUser {
        id: "u-1".into(),
        email: email.into(),
        name: "Asha".into(),
        role: Role::User,
        team_id: None,
        team_name: Some("Platform".into()),
        last_checked: None,
    }
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<AuthSession, AuthError> {
        self.respond(session_for(email)).await
    }

    async fn validate(&self, session: &AuthSession) -> Result<AuthIdentity, AuthError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(AuthIdentity { user_id: session.user_id.clone(), email: session.email.clone() })
            .await
    }

    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut next = session.clone();
        next.access_token = format!("{}-refreshed", session.access_token);
        self.respond_as(self.refresh_behaviour, next).await
    }

    async fn load_profile(&self, session: &AuthSession) -> Result<CachedUser, AuthError> {
        Ok(profile(&session.email))
    }

    async fn sign_out(&self, _session: &AuthSession) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(()).await
    }
}

fn manager(backend: Arc<ScriptedBackend>, storage: &MemoryStorage) -> SessionManager {
    SessionManager::new(backend, Arc::new(storage.clone()), SessionConfig::default())
}

fn seed_signed_in(storage: &MemoryStorage, checked_minutes_ago: i64) {
    let mut user = profile("asha@example.com");
    user.last_checked = Some(Utc::now().timestamp_millis() - checked_minutes_ago * 60_000);
    write_json(storage, USER_CACHE_KEY, &user).unwrap();
    write_json(storage, AUTH_SESSION_KEY, &session_for("asha@example.com")).unwrap();
}

// ============================================================
// load / revalidate
// ============================================================

#[tokio::test]
async fn fresh_cache_is_served_without_waiting_for_backend() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 5);
    let backend = ScriptedBackend::with_delay(Behaviour::Accept, Duration::from_secs(60));
    let sessions = manager(backend.clone(), &storage);

    let status = tokio::time::timeout(Duration::from_millis(500), sessions.load())
        .await
        .expect("load must not block on a fresh cache")
        .unwrap();

    assert_eq!(status.user().map(|u| u.email.as_str()), Some("asha@example.com"));
}

#[tokio::test]
async fn stale_cache_blocks_on_revalidation_and_restamps() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let backend = ScriptedBackend::new(Behaviour::Accept);
    let sessions = manager(backend.clone(), &storage);

    let before = Utc::now().timestamp_millis();
    let status = sessions.load().await.unwrap();

    assert!(matches!(status, SessionStatus::Authenticated(_)));
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 1);
    let cached: CachedUser = read_json(&storage, USER_CACHE_KEY).unwrap().unwrap();
    assert!(cached.last_checked.unwrap() >= before);
}

#[tokio::test]
async fn concurrent_revalidations_share_one_backend_call() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let backend = ScriptedBackend::with_delay(Behaviour::Accept, Duration::from_millis(50));
    let sessions = manager(backend.clone(), &storage);

    let results = futures::future::join_all((0..5).map(|_| sessions.revalidate())).await;

    assert!(results.iter().all(|r| matches!(r, Ok(SessionStatus::Authenticated(_)))));
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 1);

    // Once settled, the next trigger starts a new check.
    sessions.revalidate().await.unwrap();
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_session_clears_cache_and_redirects() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let sessions = manager(ScriptedBackend::new(Behaviour::Reject), &storage);

    let status = sessions.revalidate().await.unwrap();

    assert_eq!(status, SessionStatus::SignedOut);
    assert_eq!(status.redirect(), Some("/auth/signin"));
    assert_eq!(storage.get(USER_CACHE_KEY).unwrap(), None);
    assert_eq!(storage.get(AUTH_SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_instead_of_validated() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let mut expired = session_for("asha@example.com");
    expired.expires_at = Some(Utc::now().timestamp() - 60);
    write_json(&storage, AUTH_SESSION_KEY, &expired).unwrap();
    let backend = ScriptedBackend::with_refresh(Behaviour::Reject, Behaviour::Accept);
    let sessions = manager(backend.clone(), &storage);

    let status = sessions.load().await.unwrap();

    assert!(matches!(status, SessionStatus::Authenticated(_)));
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    let stored: AuthSession = read_json(&storage, AUTH_SESSION_KEY).unwrap().unwrap();
    assert_eq!(stored.access_token, "access-refreshed");
}

#[tokio::test]
async fn rejected_access_token_falls_back_to_refresh() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let backend = ScriptedBackend::with_refresh(Behaviour::Reject, Behaviour::Accept);
    let sessions = manager(backend.clone(), &storage);

    let status = sessions.revalidate().await.unwrap();

    assert_eq!(status.user().map(|u| u.email.as_str()), Some("asha@example.com"));
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(storage.get(USER_CACHE_KEY).unwrap().is_some());
}

#[tokio::test]
async fn settle_waits_for_the_background_check() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 5);
    let backend = ScriptedBackend::new(Behaviour::Reject);
    let sessions = manager(backend.clone(), &storage);

    let cached = sessions.load().await.unwrap();
    assert!(matches!(cached, SessionStatus::Authenticated(_)));

    assert_eq!(sessions.settle().await, SessionStatus::SignedOut);
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(storage.get(USER_CACHE_KEY).unwrap(), None);
}

#[tokio::test]
async fn settle_without_a_background_check_reports_current_status() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let backend = ScriptedBackend::new(Behaviour::Accept);
    let sessions = manager(backend.clone(), &storage);

    sessions.load().await.unwrap();

    assert!(matches!(sessions.settle().await, SessionStatus::Authenticated(_)));
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_session_reports_signed_out() {
    let storage = MemoryStorage::new();
    let backend = ScriptedBackend::new(Behaviour::Accept);
    let sessions = manager(backend.clone(), &storage);

    assert_eq!(sessions.load().await.unwrap(), SessionStatus::SignedOut);
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_check_times_out_as_signed_out_but_keeps_tokens() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let sessions = manager(ScriptedBackend::new(Behaviour::Hang), &storage);

    let status = sessions.revalidate().await.unwrap();

    assert_eq!(status, SessionStatus::SignedOut);
    assert!(storage.get(AUTH_SESSION_KEY).unwrap().is_some());
}

#[tokio::test]
async fn unavailable_backend_keeps_cached_profile() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let sessions = manager(ScriptedBackend::new(Behaviour::Down), &storage);

    let status = sessions.revalidate().await.unwrap();

    assert_eq!(status.user().map(|u| u.name.as_str()), Some("Asha"));
    assert!(storage.get(AUTH_SESSION_KEY).unwrap().is_some());
}

// ============================================================
// focus checks
// ============================================================

#[tokio::test(start_paused = true)]
async fn focus_refresh_is_throttled_to_once_a_minute() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 5);
    let backend = ScriptedBackend::new(Behaviour::Accept);
    let sessions = manager(backend.clone(), &storage);

    assert!(sessions.on_visible().await.unwrap().is_some());
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(sessions.on_visible().await.unwrap().is_none());
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(sessions.on_visible().await.unwrap().is_some());
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 2);

    let stored: AuthSession = read_json(&storage, AUTH_SESSION_KEY).unwrap().unwrap();
    assert_eq!(stored.access_token, "access-refreshed-refreshed");
}

#[tokio::test(start_paused = true)]
async fn focus_during_a_validation_still_refreshes() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 45);
    let backend = ScriptedBackend::with_delay(Behaviour::Accept, Duration::from_millis(200));
    let sessions = manager(backend.clone(), &storage);

    let validation = sessions.revalidate();
    let focus = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        sessions.on_visible().await
    };
    let late = async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        sessions.revalidate().await
    };
    let (validated, focused, late) = tokio::join!(validation, focus, late);

    assert!(matches!(validated.unwrap(), SessionStatus::Authenticated(_)));
    assert!(matches!(focused.unwrap(), Some(SessionStatus::Authenticated(_))));
    assert!(matches!(late.unwrap(), SessionStatus::Authenticated(_)));
    assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    let stored: AuthSession = read_json(&storage, AUTH_SESSION_KEY).unwrap().unwrap();
    assert_eq!(stored.access_token, "access-refreshed");
}

#[tokio::test]
async fn failed_focus_refresh_signs_out() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 5);
    let sessions = manager(ScriptedBackend::new(Behaviour::Reject), &storage);

    let status = sessions.on_visible().await.unwrap();

    assert_eq!(status, Some(SessionStatus::SignedOut));
    assert_eq!(storage.get(USER_CACHE_KEY).unwrap(), None);
}

// ============================================================
// cross-instance storage events
// ============================================================

#[tokio::test]
async fn sign_out_in_another_instance_is_mirrored() {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.handle();
    seed_signed_in(&tab_a, 5);

    let backend = ScriptedBackend::new(Behaviour::Accept);
    let sessions_a = manager(backend.clone(), &tab_a);
    let sessions_b = manager(backend, &tab_b);
    let mut events = tab_a.subscribe();

    sessions_b.sign_out().await.unwrap();

    let mut mirrored = Vec::new();
    while let Ok(event) = events.try_recv() {
        mirrored.extend(sessions_a.handle_storage_event(&event));
    }
    assert_eq!(mirrored.first(), Some(&SessionStatus::SignedOut));
    assert_eq!(*sessions_a.statuses().borrow(), SessionStatus::SignedOut);
}

#[tokio::test]
async fn own_writes_are_not_treated_as_foreign_events() {
    let storage = MemoryStorage::new();
    let sessions = manager(ScriptedBackend::new(Behaviour::Accept), &storage);
    let mut events = storage.subscribe();

    sessions.sign_in("asha@example.com", "pw").await.unwrap();

    while let Ok(event) = events.try_recv() {
        assert_eq!(sessions.handle_storage_event(&event), None);
    }
}

#[tokio::test]
async fn profile_written_by_another_instance_signs_this_one_in() {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.handle();
    let sessions_a = manager(ScriptedBackend::new(Behaviour::Accept), &tab_a);
    let sessions_b = manager(ScriptedBackend::new(Behaviour::Accept), &tab_b);
    let mut events = tab_a.subscribe();

    sessions_b.sign_in("asha@example.com", "pw").await.unwrap();

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let Some(status) = sessions_a.handle_storage_event(&event) {
            last = Some(status);
        }
    }
    assert_eq!(last.and_then(|s| s.user().map(|u| u.email.clone())), Some("asha@example.com".into()));
}

// ============================================================
// sign in / out
// ============================================================

#[tokio::test]
async fn sign_in_persists_session_and_stamped_profile() {
    let storage = MemoryStorage::new();
    let sessions = manager(ScriptedBackend::new(Behaviour::Accept), &storage);

    let status = sessions.sign_in("asha@example.com", "pw").await.unwrap();

    assert!(status.user().unwrap().last_checked.is_some());
    assert!(sessions.stored_session().unwrap().is_some());
    assert_eq!(sessions.cached_user().unwrap().unwrap().email, "asha@example.com");
}

#[tokio::test]
async fn rejected_sign_in_is_an_auth_error() {
    let storage = MemoryStorage::new();
    let sessions = manager(ScriptedBackend::new(Behaviour::Reject), &storage);

    let err = sessions.sign_in("asha@example.com", "wrong").await.unwrap_err();

    assert!(matches!(err, crate::StandupError::Auth(AuthError::InvalidSession(_))));
    assert_eq!(storage.get(AUTH_SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn sign_out_clears_local_state_even_when_provider_fails() {
    let storage = MemoryStorage::new();
    seed_signed_in(&storage, 5);
    let backend = ScriptedBackend::new(Behaviour::Down);
    let sessions = manager(backend.clone(), &storage);

    sessions.sign_out().await.unwrap();

    assert_eq!(backend.sign_out_calls.load(Ordering::SeqCst), 1);
    assert_eq!(storage.get(USER_CACHE_KEY).unwrap(), None);
    assert_eq!(storage.get(AUTH_SESSION_KEY).unwrap(), None);
}
