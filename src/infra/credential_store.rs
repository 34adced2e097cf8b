//! Usage: Persisted credential store (access/refresh pair, cached identity, activity timestamp).
//!
//! Entries are string-valued and keyed the same way the dashboard frontend keeps them, so a
//! snapshot written here can be inspected or seeded by hand. Every mutation rewrites the whole
//! snapshot under one lock: readers never observe a half-cleared session.

use crate::domain::session::{CredentialPair, SessionIdentity, SessionUser};
use crate::shared::error::{io_err, AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
pub const LAST_ACTIVITY_KEY: &str = "lastActivityTime";

const SESSION_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_KEY,
    LAST_ACTIVITY_KEY,
];

pub type Entries = BTreeMap<String, String>;

/// Where the session snapshot lives between process runs.
pub trait StorageBackend: Send + Sync {
    fn load(&self) -> AppResult<Entries>;
    fn persist(&self, entries: &Entries) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<Entries>,
}

impl MemoryBackend {
    pub fn with_entries(entries: Entries) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn snapshot(&self) -> Entries {
        self.entries.lock_or_recover().clone()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> AppResult<Entries> {
        Ok(self.snapshot())
    }

    fn persist(&self, entries: &Entries) -> AppResult<()> {
        *self.entries.lock_or_recover() = entries.clone();
        Ok(())
    }
}

/// JSON object file, replaced atomically via a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for JsonFileBackend {
    fn load(&self) -> AppResult<Entries> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(err) => return Err(io_err("read session store", err)),
        };
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Entries::new());
        }
        serde_json::from_slice(&content).map_err(|e| {
            AppError::with_source(
                "STORE_CORRUPT",
                format!("session store {} is not a string map", self.path.display()),
                e,
            )
        })
    }

    fn persist(&self, entries: &Entries) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_err("create session store dir", e))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(entries)
            .map_err(|e| format!("INTERNAL_ERROR: failed to serialize session store: {e}"))?;
        std::fs::write(&tmp_path, content).map_err(|e| io_err("write session store temp", e))?;
        if let Err(err) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_err("finalize session store", err));
        }
        Ok(())
    }
}

pub struct CredentialStore {
    backend: Box<dyn StorageBackend>,
    entries: Mutex<Entries>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Loads the persisted snapshot; an unreadable snapshot starts an empty session.
    pub fn open(backend: impl StorageBackend + 'static) -> Self {
        let entries = match backend.load() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "session store unreadable; starting signed out");
                Entries::new()
            }
        };
        Self {
            backend: Box::new(backend),
            entries: Mutex::new(entries),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryBackend::default())
    }

    fn mutate(&self, f: impl FnOnce(&mut Entries) -> bool) -> AppResult<bool> {
        let mut guard = self.entries.lock_or_recover();
        if !f(&mut guard) {
            return Ok(false);
        }
        self.backend.persist(&guard)?;
        Ok(true)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock_or_recover()
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn save(&self, pair: &CredentialPair, identity: &SessionIdentity) -> AppResult<()> {
        let user = serde_json::to_string(&identity.user)
            .map_err(|e| format!("INTERNAL_ERROR: failed to serialize session user: {e}"))?;
        self.mutate(|entries| {
            entries.insert(ACCESS_TOKEN_KEY.to_string(), pair.access_token.clone());
            entries.insert(REFRESH_TOKEN_KEY.to_string(), pair.refresh_token.clone());
            entries.insert(USER_KEY.to_string(), user);
            true
        })?;
        Ok(())
    }

    /// Renewal write: swaps the pair, keeps identity and activity untouched. Guarded by the
    /// refresh token that was spent; returns `false` and writes nothing when the session was
    /// cleared or replaced while the renewal was in flight.
    pub fn replace_pair_if_current(
        &self,
        renewed_refresh: &str,
        pair: &CredentialPair,
    ) -> AppResult<bool> {
        self.mutate(|entries| {
            let current = entries.get(REFRESH_TOKEN_KEY).map(|v| v.trim());
            if current != Some(renewed_refresh.trim()) {
                return false;
            }
            entries.insert(ACCESS_TOKEN_KEY.to_string(), pair.access_token.clone());
            entries.insert(REFRESH_TOKEN_KEY.to_string(), pair.refresh_token.clone());
            true
        })
    }

    pub fn read(&self) -> Option<CredentialPair> {
        let guard = self.entries.lock_or_recover();
        let access = guard.get(ACCESS_TOKEN_KEY).map(|v| v.trim())?;
        let refresh = guard.get(REFRESH_TOKEN_KEY).map(|v| v.trim())?;
        if access.is_empty() || refresh.is_empty() {
            return None;
        }
        Some(CredentialPair::new(access, refresh))
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        let raw = self.get(USER_KEY)?;
        match serde_json::from_str::<SessionUser>(&raw) {
            Ok(user) => Some(SessionIdentity { user }),
            Err(err) => {
                tracing::debug!(error = %err, "cached session user is not valid json");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Removes pair, identity and activity timestamp in one write. Returns whether anything was
    /// present.
    pub fn clear(&self) -> AppResult<bool> {
        self.mutate(|entries| {
            let before = entries.len();
            for key in SESSION_KEYS {
                entries.remove(key);
            }
            entries.len() != before
        })
    }

    pub fn last_activity_ms(&self) -> Option<i64> {
        self.get(LAST_ACTIVITY_KEY)?.parse::<i64>().ok()
    }

    pub fn touch_activity(&self, now_unix_ms: i64) -> AppResult<()> {
        self.mutate(|entries| {
            entries.insert(LAST_ACTIVITY_KEY.to_string(), now_unix_ms.to_string());
            true
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            user: SessionUser {
                id: "u-1".to_string(),
                name: "Ada".to_string(),
                email: None,
                role: "user".to_string(),
            },
        }
    }

    struct SharedBackend(Arc<MemoryBackend>);

    impl StorageBackend for SharedBackend {
        fn load(&self) -> AppResult<Entries> {
            self.0.load()
        }

        fn persist(&self, entries: &Entries) -> AppResult<()> {
            self.0.persist(entries)
        }
    }

    #[test]
    fn save_then_read_round_trips_pair_and_identity() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.read(), None);

        store
            .save(&CredentialPair::new("a1", "r1"), &identity())
            .expect("save");

        assert_eq!(store.read(), Some(CredentialPair::new("a1", "r1")));
        assert_eq!(store.identity(), Some(identity()));
        assert!(store.is_authenticated());
    }

    #[test]
    fn clear_removes_every_session_key_in_one_persist() {
        let backend = Arc::new(MemoryBackend::default());
        let store = CredentialStore::open(SharedBackend(Arc::clone(&backend)));
        store
            .save(&CredentialPair::new("a1", "r1"), &identity())
            .expect("save");
        store.touch_activity(1_000).expect("touch");

        assert!(store.clear().expect("clear"));
        assert!(backend.snapshot().is_empty());
        assert_eq!(store.read(), None);
        assert_eq!(store.identity(), None);
        assert_eq!(store.last_activity_ms(), None);

        assert!(!store.clear().expect("second clear"));
    }

    #[test]
    fn replace_pair_keeps_identity_and_activity() {
        let store = CredentialStore::in_memory();
        store
            .save(&CredentialPair::new("a1", "r1"), &identity())
            .expect("save");
        store.touch_activity(42).expect("touch");

        assert!(store
            .replace_pair_if_current("r1", &CredentialPair::new("a2", "r2"))
            .expect("replace"));

        assert_eq!(store.read(), Some(CredentialPair::new("a2", "r2")));
        assert_eq!(store.identity(), Some(identity()));
        assert_eq!(store.last_activity_ms(), Some(42));
    }

    #[test]
    fn guarded_replace_refuses_a_cleared_or_replaced_session() {
        let store = CredentialStore::in_memory();
        store
            .save(&CredentialPair::new("a1", "r1"), &identity())
            .expect("save");

        assert!(store
            .replace_pair_if_current("r1", &CredentialPair::new("a2", "r2"))
            .expect("replace"));
        assert!(!store
            .replace_pair_if_current("r1", &CredentialPair::new("a3", "r3"))
            .expect("stale replace"));
        assert_eq!(store.read(), Some(CredentialPair::new("a2", "r2")));

        store.clear().expect("clear");
        assert!(!store
            .replace_pair_if_current("r2", &CredentialPair::new("a4", "r4"))
            .expect("replace after clear"));
        assert_eq!(store.read(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn clear_keeps_unrelated_keys() {
        let mut seeded = Entries::new();
        seeded.insert("theme".to_string(), "dark".to_string());
        seeded.insert(ACCESS_TOKEN_KEY.to_string(), "a1".to_string());
        let backend = Arc::new(MemoryBackend::with_entries(seeded));
        let store = CredentialStore::open(SharedBackend(Arc::clone(&backend)));

        store.clear().expect("clear");
        let snapshot = backend.snapshot();
        assert_eq!(snapshot.get("theme").map(String::as_str), Some("dark"));
        assert!(!snapshot.contains_key(ACCESS_TOKEN_KEY));
    }

    #[test]
    fn garbage_activity_value_reads_as_none() {
        let mut seeded = Entries::new();
        seeded.insert(LAST_ACTIVITY_KEY.to_string(), "yesterday".to_string());
        let store = CredentialStore::open(MemoryBackend::with_entries(seeded));
        assert_eq!(store.last_activity_ms(), None);
    }
}
