//! Process-wide key-value settings with change notifications.
//!
//! One `Settings` instance is shared (behind an `Arc`) by the registry and
//! every preference store. All writes go through a single lock, so the
//! read-modify-write in [`Settings::update`] holds even when callers live on
//! different threads.

use sled::Db;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// JSON blob holding every provider's preferences, keyed by provider name
pub const PREFS_KEY: &str = "translators-prefs";
/// Name of the provider the user selected most recently
pub const LAST_TRANSLATOR_KEY: &str = "last-translator";
/// Name of the provider to start with
pub const DEFAULT_TRANSLATOR_KEY: &str = "default-translator";

type ChangeHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle returned by [`Settings::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    key: String,
    handler: ChangeHandler,
}

enum Backend {
    Memory(HashMap<String, String>),
    Disk(Db),
}

impl Backend {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Memory(values) => values.get(key).cloned(),
            Self::Disk(db) => match db.get(key.as_bytes()) {
                Ok(Some(value)) => Some(String::from_utf8_lossy(&value).into_owned()),
                Ok(None) => None,
                Err(e) => {
                    warn!("Settings read error for {}: {}", key, e);
                    None
                }
            },
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match self {
            Self::Memory(values) => {
                values.insert(key.to_string(), value.to_string());
                Ok(())
            }
            Self::Disk(db) => {
                let store_err = |reason: String| Error::SettingsStore {
                    key: key.to_string(),
                    reason,
                };

                db.insert(key.as_bytes(), value.as_bytes())
                    .map_err(|e| store_err(e.to_string()))?;

                // Flush to ensure persistence
                db.flush()
                    .map_err(|e| store_err(format!("Flush failed: {e}")))?;

                Ok(())
            }
        }
    }
}

/// Persisted settings collaborator shared by the registry and preference stores
pub struct Settings {
    backend: Mutex<Backend>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Settings {
    fn with_backend(backend: Backend) -> Self {
        Self {
            backend: Mutex::new(backend),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Volatile settings, useful for tests and one-shot runs
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory(HashMap::new()))
    }

    /// Open (or create) a sled-backed settings database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::SettingsOpen(format!(
                    "Failed to create settings directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = sled::open(path).map_err(|e| {
            let err_str = e.to_string();
            // Detect lock errors and provide actionable fix
            if err_str.contains("WouldBlock") || err_str.contains("lock") {
                Error::SettingsOpen(format!(
                    "Settings locked at {}\n\n\
                    Another process is using the settings, or a previous instance crashed.\n\
                    To fix: rm {}/db/LOCK",
                    path.display(),
                    path.display()
                ))
            } else {
                Error::SettingsOpen(format!(
                    "Failed to open settings at {}: {}",
                    path.display(),
                    e
                ))
            }
        })?;

        debug!("Opened settings store at {}", path.display());

        Ok(Self::with_backend(Backend::Disk(db)))
    }

    /// Value stored under `key`; unset keys read as the empty string
    pub fn get_string(&self, key: &str) -> String {
        lock(&self.backend).get(key).unwrap_or_default()
    }

    /// Store `value` under `key` and notify subscribers of that key
    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.backend).set(key, value)?;
        self.notify(key, value);
        Ok(())
    }

    /// Store `value` only when `key` is unset or blank.
    ///
    /// Returns whether a value was written.
    pub fn set_default(&self, key: &str, value: &str) -> Result<bool> {
        let mut backend = lock(&self.backend);
        if backend.get(key).is_some_and(|v| !v.trim().is_empty()) {
            return Ok(false);
        }
        backend.set(key, value)?;
        drop(backend);

        self.notify(key, value);
        Ok(true)
    }

    /// Read-modify-write `key` atomically with respect to other writers.
    ///
    /// `modify` receives the current value (empty when unset) and returns the
    /// replacement. Returns the stored value.
    pub fn update<F>(&self, key: &str, modify: F) -> Result<String>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let mut backend = lock(&self.backend);
        let current = backend.get(key).unwrap_or_default();
        let updated = modify(&current)?;
        backend.set(key, &updated)?;
        drop(backend);

        self.notify(key, &updated);
        Ok(updated)
    }

    /// Call `handler` with the new value every time `key` is written
    pub fn connect<F>(&self, key: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push(Subscriber {
            id,
            key: key.to_string(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a subscription; returns `false` if it was already gone
    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    fn notify(&self, key: &str, value: &str) {
        // Handlers run without the subscriber lock so they may (dis)connect
        let handlers: Vec<ChangeHandler> = lock(&self.subscribers)
            .iter()
            .filter(|s| s.key == key)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in handlers {
            handler(value);
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match *lock(&self.backend) {
            Backend::Memory(_) => "memory",
            Backend::Disk(_) => "disk",
        };
        f.debug_struct("Settings")
            .field("backend", &backend)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
