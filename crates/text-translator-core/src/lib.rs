//! Text Translator Core Library
//!
//! This library provides the provider framework behind the text translator:
//! - A registry of interchangeable translation backends (web APIs and
//!   translate-shell engines)
//! - HTTP and process execution strategies
//! - Normalization of backend output into display-safe markup
//! - Per-provider language preferences persisted in a shared settings store

pub mod config;
pub mod error;
pub mod executor;
pub mod languages;
pub mod normalize;
pub mod prefs;
pub mod provider;
pub mod registry;
pub mod settings;
pub mod util;

pub use config::{
    AppConfig, DEFAULT_PROVIDER, DEFAULT_SOURCE_LANG, DEFAULT_TARGET_LANG, HttpConfig, Lang,
};
pub use error::{Error, Result};
pub use executor::{Dispatcher, Executor, HttpExecutor, ProcessExecutor, Request};
pub use languages::{LanguageEntry, language_name, languages, sorted_languages};
pub use normalize::{escape_html, normalize};
pub use prefs::{PreferenceStore, PreferenceUpdate, ProviderPreferences};
pub use provider::{
    EngineDescriptor, EngineKind, Provider, RequestHandle, ResponseFormat, builtin_engines,
};
pub use registry::{ProviderRegistry, Selector};
pub use settings::Settings;

use std::sync::Arc;

/// Open the configured settings store and load every provider.
///
/// Pass `persist = false` to keep settings in memory for this run only.
pub fn open_registry(config: &AppConfig, persist: bool) -> Result<ProviderRegistry> {
    let settings = if persist {
        Settings::open(config.settings_path())?
    } else {
        Settings::in_memory()
    };

    ProviderRegistry::load(config, Arc::new(settings))
}
