use thiserror::Error;

/// Unified error type for text-translator-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Preference operations (missing entries, corrupted blobs)
/// - Settings store operations (opening, reading, writing)
/// - Dispatch operations (process spawn, HTTP client setup)
/// - Configuration operations (loading, validation)
/// - General I/O operations
///
/// Transport failures (non-200 responses) are deliberately absent: they
/// surface as an empty translation, never as an error.
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Preference Errors
    // ==========================================================================
    /// The preferences blob exists but holds no entry for this provider
    #[error("can't load prefs for {0}")]
    PrefsMissing(String),

    /// The preferences blob could not be parsed for a read-modify-write
    #[error("preferences blob is corrupted: {0}")]
    PrefsCorrupt(String),

    // ==========================================================================
    // Settings Store Errors
    // ==========================================================================
    /// Failed to open the persisted settings database
    #[error("failed to open settings store: {0}")]
    SettingsOpen(String),

    /// Failed to read or write a settings key
    #[error("settings store error for '{key}': {reason}")]
    SettingsStore { key: String, reason: String },

    // ==========================================================================
    // Dispatch Errors
    // ==========================================================================
    /// The external translator process could not be started
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// The shared HTTP session could not be created
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
