use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::provider::{EngineDescriptor, EngineKind};

/// Language codes following ISO 639-1 with regional variants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lang(pub String);

impl Lang {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank codes stand for "not set" in the preferences blob
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Lang {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Lang {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Shared HTTP session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("text-translator/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider used when nothing else has been selected yet.
    ///
    /// When set, it replaces the stored default on every start. When unset,
    /// the stored default is kept, seeded with [`DEFAULT_PROVIDER`] on first run.
    #[serde(default)]
    pub default_provider: Option<String>,

    /// Settings database directory (defaults to $XDG_DATA_HOME/text-translator/settings)
    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    /// HTTP session configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Maximum dispatches in flight per execution strategy
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// translate-shell executable, resolved through PATH
    #[serde(default = "default_translate_shell")]
    pub translate_shell: String,

    /// Additional engines registered next to the built-in ones
    #[serde(default)]
    pub engines: Vec<EngineDescriptor>,
}

const fn default_max_in_flight() -> usize {
    8
}

fn default_translate_shell() -> String {
    "trans".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            settings_path: None,
            http: HttpConfig::default(),
            max_in_flight: default_max_in_flight(),
            translate_shell: default_translate_shell(),
            engines: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations (~/.config/text-translator/config.toml, ./config.toml)
    pub fn load() -> Self {
        // Try user config
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("text-translator").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Try local config
        let local_config = std::path::PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Reject values the registry cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::ConfigInvalid {
                field: "max_in_flight".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        for engine in &self.engines {
            let field = format!("engines.{}", engine.name);
            if engine.name.trim().is_empty() {
                return Err(Error::ConfigInvalid {
                    field: "engines.name".to_string(),
                    reason: "must not be blank".to_string(),
                });
            }
            if engine.limit < 2 {
                return Err(Error::ConfigInvalid {
                    field,
                    reason: "limit must be at least 2".to_string(),
                });
            }
            if let EngineKind::Http { url_template } = &engine.kind
                && !url_template.contains("{query}")
            {
                return Err(Error::ConfigInvalid {
                    field,
                    reason: "url_template has no {query} slot".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Configured default provider, or the built-in one
    pub fn default_provider(&self) -> &str {
        self.default_provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    /// Settings database location, falling back to the XDG data directory
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(crate::util::settings_path)
    }
}

/// Provider selected on a fresh install
pub const DEFAULT_PROVIDER: &str = "Google.Translate";
/// Source language used when a provider has no stored preference
pub const DEFAULT_SOURCE_LANG: &str = "en";
/// Target language used when a provider has no stored preference
pub const DEFAULT_TARGET_LANG: &str = "ru";
