//! Registration table of providers and the current/default/last-used selection.

use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::executor::{Dispatcher, Executor};
use crate::prefs::ProviderPreferences;
use crate::provider::{EngineDescriptor, Provider, builtin_engines};
use crate::settings::{DEFAULT_TRANSLATOR_KEY, LAST_TRANSLATOR_KEY, PREFS_KEY, Settings};

/// Origin recorded for engines compiled into the binary
pub const BUILTIN_ORIGIN: &str = "builtin";
/// Origin recorded for engines declared in the config file
pub const CONFIG_ORIGIN: &str = "config";

/// What to select: a loaded provider or a name to look up
#[derive(Debug, Clone)]
pub enum Selector {
    Provider(Arc<Provider>),
    Name(String),
}

impl From<&Arc<Provider>> for Selector {
    fn from(provider: &Arc<Provider>) -> Self {
        Self::Provider(Arc::clone(provider))
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Selector {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Owns every provider and tracks which one is in use
pub struct ProviderRegistry {
    providers: Vec<Arc<Provider>>,
    settings: Arc<Settings>,
    default: Option<Arc<Provider>>,
    current: RwLock<Option<Arc<Provider>>>,
}

impl ProviderRegistry {
    /// Register built-in and configured engines behind the real HTTP/process strategies
    pub fn load(config: &AppConfig, settings: Arc<Settings>) -> Result<Self> {
        let executor = Dispatcher::from_config(config)?;
        Self::with_executor(config, settings, executor)
    }

    /// Like [`ProviderRegistry::load`] with a caller-supplied executor
    pub fn with_executor(
        config: &AppConfig,
        settings: Arc<Settings>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        let engines: Vec<(EngineDescriptor, &str)> = builtin_engines()
            .into_iter()
            .map(|engine| (engine, BUILTIN_ORIGIN))
            .chain(config.engines.iter().cloned().map(|engine| (engine, CONFIG_ORIGIN)))
            .map(|(engine, origin)| (engine.with_default_program(&config.translate_shell), origin))
            .collect();

        seed_settings(&settings, config, engines.iter().map(|(engine, _)| engine))?;

        Ok(Self::from_engines(engines, settings, executor))
    }

    /// Build providers for `engines` in order.
    ///
    /// Engines whose preferences cannot be loaded are skipped. When two engines
    /// share a name the first one wins every lookup.
    pub fn from_engines<'a, I>(
        engines: I,
        settings: Arc<Settings>,
        executor: Arc<dyn Executor>,
    ) -> Self
    where
        I: IntoIterator<Item = (EngineDescriptor, &'a str)>,
    {
        let mut providers: Vec<Arc<Provider>> = Vec::new();

        for (engine, origin) in engines {
            let name = engine.name.clone();

            if providers.iter().any(|p| same_name(p.name(), &name)) {
                warn!("Duplicate provider name {} from {}; lookups use the first", name, origin);
            }

            match Provider::new(engine, origin, Arc::clone(&settings), Arc::clone(&executor)) {
                Ok(provider) => {
                    debug!("Registered {} ({})", name, origin);
                    providers.push(Arc::new(provider));
                }
                Err(e) => error!("Skipping provider {}: {}", name, e),
            }
        }

        let default = find(&providers, &settings.get_string(DEFAULT_TRANSLATOR_KEY));
        info!(
            "Loaded {} providers, default {}",
            providers.len(),
            default.as_ref().map_or("<none>", |p| p.name())
        );

        Self {
            providers,
            settings,
            current: RwLock::new(default.clone()),
            default,
        }
    }

    /// Case-insensitive lookup; `None` for unknown or blank names
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Provider>> {
        find(&self.providers, name)
    }

    /// Provider in use, `None` if the last selection did not resolve
    pub fn current(&self) -> Option<Arc<Provider>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Select a provider and persist its name as the last selection.
    ///
    /// An unknown name still gets persisted and leaves `current()` empty.
    pub fn set_current(&self, selector: impl Into<Selector>) -> Result<Option<Arc<Provider>>> {
        let (name, provider) = match selector.into() {
            Selector::Provider(provider) => (provider.name().to_string(), Some(provider)),
            Selector::Name(name) => {
                let provider = self.get_by_name(&name);
                (name, provider)
            }
        };

        if provider.is_none() {
            warn!("No provider named {}", name);
        }

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = provider.clone();
        self.settings.set_string(LAST_TRANSLATOR_KEY, &name)?;
        Ok(provider)
    }

    /// Provider named by the default-provider setting when the registry was built
    #[allow(clippy::should_implement_trait)]
    pub fn default(&self) -> Option<Arc<Provider>> {
        self.default.clone()
    }

    /// Persist `selector` as the default provider for the next start.
    ///
    /// The running registry keeps its default. A `default_provider` in the
    /// config file overrides this on the next start.
    pub fn set_default_provider(
        &self,
        selector: impl Into<Selector>,
    ) -> Result<Option<Arc<Provider>>> {
        let provider = match selector.into() {
            Selector::Provider(provider) => Some(provider),
            Selector::Name(name) => self.get_by_name(&name),
        };

        if let Some(provider) = &provider {
            self.settings.set_string(DEFAULT_TRANSLATOR_KEY, provider.name())?;
            info!("Default provider set to {}", provider.name());
        }
        Ok(provider)
    }

    /// Provider named by the last-selected setting, read now
    pub fn last_used(&self) -> Option<Arc<Provider>> {
        self.get_by_name(&self.settings.get_string(LAST_TRANSLATOR_KEY))
    }

    /// Last used provider, falling back to the default
    pub fn preferred(&self) -> Option<Arc<Provider>> {
        self.last_used().or_else(|| self.default())
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn providers(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub const fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Detach every provider's preferences from the settings store
    pub fn destroy(&self) {
        for provider in &self.providers {
            provider.destroy();
        }
    }
}

fn find(providers: &[Arc<Provider>], name: &str) -> Option<Arc<Provider>> {
    if name.trim().is_empty() {
        return None;
    }

    providers
        .iter()
        .find(|p| same_name(p.name(), name))
        .cloned()
}

/// Provider names compare case-insensitively, Unicode-aware
fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Write start-up values: the default provider name and, when the
/// preferences blob is blank, a fallback entry per engine.
///
/// A `default_provider` set in the config replaces the stored one; otherwise
/// the stored name survives and is only seeded when blank.
fn seed_settings<'a>(
    settings: &Settings,
    config: &AppConfig,
    engines: impl Iterator<Item = &'a EngineDescriptor>,
) -> Result<()> {
    match config.default_provider.as_deref() {
        Some(name) => settings.set_string(DEFAULT_TRANSLATOR_KEY, name)?,
        None => {
            settings.set_default(DEFAULT_TRANSLATOR_KEY, config.default_provider())?;
        }
    }

    let fallback = serde_json::to_value(ProviderPreferences::default())
        .map_err(|e| Error::PrefsCorrupt(e.to_string()))?;
    let blob: Map<String, Value> = engines
        .map(|engine| (engine.name.clone(), fallback.clone()))
        .collect();
    let count = blob.len();
    let blob = serde_json::to_string(&blob).map_err(|e| Error::PrefsCorrupt(e.to_string()))?;

    if settings.set_default(PREFS_KEY, &blob)? {
        debug!("Initialized preferences for {} providers", count);
    }
    Ok(())
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("default", &self.default.as_ref().map(|p| p.name()))
            .finish_non_exhaustive()
    }
}
