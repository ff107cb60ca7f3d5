//! Per-provider language preferences persisted in the shared settings store.
//!
//! Every provider's preferences live in one JSON object stored under
//! [`PREFS_KEY`], keyed by provider name. Writes merge into the provider's own
//! sub-object so one provider never clobbers another.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::config::{DEFAULT_SOURCE_LANG, DEFAULT_TARGET_LANG, Lang};
use crate::error::{Error, Result};
use crate::settings::{PREFS_KEY, Settings, SubscriptionId};

/// In-memory copy of one provider's preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderPreferences {
    pub default_source: Lang,
    pub default_target: Lang,
    /// Blank when the provider has never translated anything
    pub last_source: Lang,
    pub last_target: Lang,
    pub remember_last_lang: bool,
}

impl Default for ProviderPreferences {
    fn default() -> Self {
        Self {
            default_source: Lang::new(DEFAULT_SOURCE_LANG),
            default_target: Lang::new(DEFAULT_TARGET_LANG),
            last_source: Lang::new(""),
            last_target: Lang::new(""),
            remember_last_lang: false,
        }
    }
}

impl ProviderPreferences {
    /// Build from a stored entry, falling back field by field.
    ///
    /// Missing, blank and mistyped values all take the fallback.
    fn from_entry(entry: &Value) -> Self {
        let text = |field: &str| {
            entry
                .get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let fallback = Self::default();
        Self {
            default_source: text("default_source").map_or(fallback.default_source, Lang::from),
            default_target: text("default_target").map_or(fallback.default_target, Lang::from),
            last_source: text("last_source").map_or(fallback.last_source, Lang::from),
            last_target: text("last_target").map_or(fallback.last_target, Lang::from),
            remember_last_lang: entry
                .get("remember_last_lang")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Parse `name`'s entry out of the whole preferences blob.
    ///
    /// A blank or unparsable blob yields the fallbacks. A well-formed blob
    /// without an entry for `name` is an error: defaulting there would hide
    /// lost data.
    pub fn from_blob(name: &str, blob: &str) -> Result<Self> {
        if blob.trim().is_empty() {
            return Ok(Self::default());
        }

        let parsed: Value = match serde_json::from_str(blob) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unparsable preferences blob, using defaults for {}: {}", name, e);
                return Ok(Self::default());
            }
        };

        parsed
            .get(name)
            .map(Self::from_entry)
            .ok_or_else(|| Error::PrefsMissing(name.to_string()))
    }
}

/// Partial update merged into a provider's stored entry.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreferenceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_source: Option<Lang>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_target: Option<Lang>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_source: Option<Lang>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_target: Option<Lang>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_last_lang: Option<bool>,
}

impl PreferenceUpdate {
    fn into_fields(self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Ok(Map::new()),
            Err(e) => Err(Error::PrefsCorrupt(e.to_string())),
        }
    }
}

fn parse_root(blob: &str) -> Result<Map<String, Value>> {
    if blob.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str(blob) {
        Ok(Value::Object(root)) => Ok(root),
        Ok(_) => Err(Error::PrefsCorrupt("top level is not an object".to_string())),
        Err(e) => Err(Error::PrefsCorrupt(e.to_string())),
    }
}

fn serialize_root(root: &Map<String, Value>) -> Result<String> {
    serde_json::to_string(root).map_err(|e| Error::PrefsCorrupt(e.to_string()))
}

/// Live, persisted preferences of one provider
pub struct PreferenceStore {
    name: String,
    settings: Arc<Settings>,
    state: Arc<RwLock<ProviderPreferences>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl PreferenceStore {
    /// Load `name`'s preferences and follow later changes to the blob.
    pub fn load(name: impl Into<String>, settings: Arc<Settings>) -> Result<Self> {
        let name = name.into();
        let prefs = ProviderPreferences::from_blob(&name, &settings.get_string(PREFS_KEY))?;
        let state = Arc::new(RwLock::new(prefs));

        let watched = Arc::clone(&state);
        let watched_name = name.clone();
        let subscription = settings.connect(PREFS_KEY, move |blob| {
            match ProviderPreferences::from_blob(&watched_name, blob) {
                Ok(prefs) => {
                    *watched.write().unwrap_or_else(PoisonError::into_inner) = prefs;
                }
                Err(e) => warn!("Ignoring preferences change: {}", e),
            }
        });

        debug!("Loaded preferences for {}", name);

        Ok(Self {
            name,
            settings,
            state,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Write fallback preferences for `name` unless an entry already exists.
    ///
    /// Returns whether an entry was created.
    pub fn initialize(name: &str, settings: &Settings) -> Result<bool> {
        let mut created = false;
        let current = settings.get_string(PREFS_KEY);
        if parse_root(&current)?.contains_key(name) {
            return Ok(false);
        }

        settings.update(PREFS_KEY, |blob| {
            let mut root = parse_root(blob)?;
            if !root.contains_key(name) {
                let fallback = serde_json::to_value(ProviderPreferences::default())
                    .map_err(|e| Error::PrefsCorrupt(e.to_string()))?;
                root.insert(name.to_string(), fallback);
                created = true;
            }
            serialize_root(&root)
        })?;

        Ok(created)
    }

    /// Provider name the preferences belong to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current in-memory preferences
    pub fn snapshot(&self) -> ProviderPreferences {
        self.read().clone()
    }

    /// Re-read the stored entry, replacing the in-memory copy
    pub fn reload(&self) -> Result<()> {
        let blob = self.settings.get_string(PREFS_KEY);
        let prefs = ProviderPreferences::from_blob(&self.name, &blob)?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = prefs;
        Ok(())
    }

    /// Merge `update` into this provider's stored entry.
    pub fn save(&self, update: PreferenceUpdate) -> Result<()> {
        let fields = update.into_fields()?;
        if fields.is_empty() {
            return Ok(());
        }

        self.settings.update(PREFS_KEY, |blob| {
            let mut root = parse_root(blob)?;
            let entry = root
                .entry(self.name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(stored) = entry {
                stored.extend(fields);
            }
            serialize_root(&root)
        })?;

        // The change notification already refreshed the state; this covers a
        // store whose subscription was dropped by destroy()
        self.reload()
    }

    pub fn default_source(&self) -> Lang {
        self.read().default_source.clone()
    }

    pub fn set_default_source(&self, lang: Lang) -> Result<()> {
        self.save(PreferenceUpdate {
            default_source: Some(lang),
            ..Default::default()
        })
    }

    pub fn default_target(&self) -> Lang {
        self.read().default_target.clone()
    }

    pub fn set_default_target(&self, lang: Lang) -> Result<()> {
        self.save(PreferenceUpdate {
            default_target: Some(lang),
            ..Default::default()
        })
    }

    /// `None` until a source language has been recorded
    pub fn last_source(&self) -> Option<Lang> {
        Some(self.read().last_source.clone()).filter(|l| !l.is_blank())
    }

    /// Record the last source language; a blank code clears it
    pub fn set_last_source(&self, lang: Lang) -> Result<()> {
        self.save(PreferenceUpdate {
            last_source: Some(lang),
            ..Default::default()
        })
    }

    /// `None` until a target language has been recorded
    pub fn last_target(&self) -> Option<Lang> {
        Some(self.read().last_target.clone()).filter(|l| !l.is_blank())
    }

    /// Record the last target language; a blank code clears it
    pub fn set_last_target(&self, lang: Lang) -> Result<()> {
        self.save(PreferenceUpdate {
            last_target: Some(lang),
            ..Default::default()
        })
    }

    pub fn remember_last_lang(&self) -> bool {
        self.read().remember_last_lang
    }

    pub fn set_remember_last_lang(&self, enable: bool) -> Result<()> {
        self.save(PreferenceUpdate {
            remember_last_lang: Some(enable),
            ..Default::default()
        })
    }

    /// Record a used language pair when remembering is enabled.
    ///
    /// Returns whether anything was written.
    pub fn remember(&self, source: &Lang, target: &Lang) -> Result<bool> {
        if !self.remember_last_lang() {
            return Ok(false);
        }

        self.save(PreferenceUpdate {
            last_source: Some(source.clone()),
            last_target: Some(target.clone()),
            ..Default::default()
        })?;
        Ok(true)
    }

    /// Language pair to start the next translation with
    pub fn effective_languages(&self) -> (Lang, Lang) {
        let prefs = self.read();
        let pick = |last: &Lang, default: &Lang| {
            if prefs.remember_last_lang && !last.is_blank() {
                last.clone()
            } else {
                default.clone()
            }
        };

        (
            pick(&prefs.last_source, &prefs.default_source),
            pick(&prefs.last_target, &prefs.default_target),
        )
    }

    /// Stop following changes. Persisted data is kept.
    pub fn destroy(&self) {
        let id = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(id) = id {
            self.settings.disconnect(id);
            debug!("Preferences for {} detached", self.name);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ProviderPreferences> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PreferenceStore {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("name", &self.name)
            .field("prefs", &*self.read())
            .finish_non_exhaustive()
    }
}
