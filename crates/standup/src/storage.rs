//! Client-side key/value storage.
//!
//! The session cache and the draft form persist through a [`Storage`]. Every
//! handle carries an origin id; a write from one handle is broadcast to the
//! others as a [`StorageEvent`], so two client instances sharing one store
//! see each other's sign-ins and sign-outs.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

pub const USER_CACHE_KEY: &str = "standup_user_cache";
pub const AUTH_SESSION_KEY: &str = "standup_auth_session";
pub const FORM_DATA_KEY: &str = "standup_update_form_data";
pub const BLOCKERS_KEY: &str = "standup_update_blockers";
pub const SELECTED_TEAM_KEY: &str = "standup_selected_team";

const EVENT_CAPACITY: usize = 64;

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

fn next_origin() -> u64 {
    NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed)
}

/// `Clone` so a failed session check can be handed to every waiter.
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage serialization error: {0}")]
    Json(Arc<serde_json::Error>),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

/// A change made through some handle. `new_value == None` means removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
    pub origin: u64,
}

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Id stamped on events written through this handle.
    fn origin(&self) -> u64;

    /// Events from every handle, this one included; filter on `origin`.
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

/// Read and parse a JSON value. Unparseable content counts as absent.
pub fn read_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(key, error = %err, "ignoring unreadable stored value");
            Ok(None)
        }
    }
}

pub fn write_json<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    storage.set(key, &serde_json::to_string(value)?)
}

fn emit(tx: &broadcast::Sender<StorageEvent>, key: &str, new_value: Option<&str>, origin: u64) {
    // No receivers is fine.
    let _ = tx.send(StorageEvent {
        key: key.to_owned(),
        new_value: new_value.map(str::to_owned),
        origin,
    });
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

struct MemoryShared {
    values: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// Process-local storage. Clones share the same origin; [`handle`] creates a
/// new origin over the same values, like a second browser tab.
///
/// [`handle`]: MemoryStorage::handle
#[derive(Clone)]
pub struct MemoryStorage {
    shared: Arc<MemoryShared>,
    origin: u64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(MemoryShared { values: Mutex::new(HashMap::new()), events }),
            origin: next_origin(),
        }
    }

    pub fn handle(&self) -> Self {
        Self { shared: Arc::clone(&self.shared), origin: next_origin() }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.shared.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values().insert(key.to_owned(), value.to_owned());
        emit(&self.shared.events, key, Some(value), self.origin);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.values().remove(key).is_some() {
            emit(&self.shared.events, key, None, self.origin);
        }
        Ok(())
    }

    fn origin(&self) -> u64 {
        self.origin
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// One file per key under a data directory. Used by the terminal client so
/// the session and draft survive between invocations.
///
/// Writes land atomically through a uniquely named temp file. Storage events
/// reach only handles opened in the same process; another process sees the
/// new value on its next read.
#[derive(Clone)]
pub struct FileStorage {
    dir: PathBuf,
    events: broadcast::Sender<StorageEvent>,
    origin: u64,
}

impl FileStorage {
    /// Open (creating if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self { dir, events, origin: next_origin() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn handle(&self) -> Self {
        Self { dir: self.dir.clone(), events: self.events.clone(), origin: next_origin() }
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path(key)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(&path).map_err(|err| StorageError::from(err.error))?;
        emit(&self.events, key, Some(value), self.origin);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(key)?) {
            Ok(()) => {
                emit(&self.events, key, None, self.origin);
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn origin(&self) -> u64 {
        self.origin
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_values_and_see_each_others_events() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.handle();
        let mut events = tab_b.subscribe();

        tab_a.set(USER_CACHE_KEY, "{}").unwrap();
        assert_eq!(tab_b.get(USER_CACHE_KEY).unwrap().as_deref(), Some("{}"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.key, USER_CACHE_KEY);
        assert_eq!(event.origin, tab_a.origin());
        assert_ne!(event.origin, tab_b.origin());

        tab_a.remove(USER_CACHE_KEY).unwrap();
        assert_eq!(events.try_recv().unwrap().new_value, None);
    }

    #[test]
    fn removing_a_missing_key_emits_nothing() {
        let storage = MemoryStorage::new();
        let mut events = storage.subscribe();
        storage.remove(FORM_DATA_KEY).unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn file_storage_round_trips_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("data")).unwrap();

        assert_eq!(storage.get(BLOCKERS_KEY).unwrap(), None);
        storage.set(BLOCKERS_KEY, "[]").unwrap();
        assert_eq!(storage.get(BLOCKERS_KEY).unwrap().as_deref(), Some("[]"));

        // Reopening sees the same data.
        let reopened = FileStorage::open(storage.dir()).unwrap();
        assert_eq!(reopened.get(BLOCKERS_KEY).unwrap().as_deref(), Some("[]"));

        storage.remove(BLOCKERS_KEY).unwrap();
        storage.remove(BLOCKERS_KEY).unwrap();
        assert_eq!(reopened.get(BLOCKERS_KEY).unwrap(), None);
    }

    #[test]
    fn concurrent_file_writes_leave_one_whole_value() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let handle = storage.handle();
                std::thread::spawn(move || {
                    let value = format!("{{\"writer\":{n},\"pad\":\"{}\"}}", "x".repeat(4096));
                    for _ in 0..20 {
                        handle.set(FORM_DATA_KEY, &value).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let raw = storage.get(FORM_DATA_KEY).unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed["writer"].as_u64().unwrap() < 8);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from(format!("{FORM_DATA_KEY}.json"))]);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(matches!(storage.set("../escape", "x"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn unreadable_json_reads_as_absent() {
        let storage = MemoryStorage::new();
        storage.set(SELECTED_TEAM_KEY, "not json").unwrap();
        let value: Option<String> = read_json(&storage, SELECTED_TEAM_KEY).unwrap();
        assert_eq!(value, None);
    }
}
