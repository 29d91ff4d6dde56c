//! Error types for mono
//!
//! All modules use `MonoResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mono operations
pub type MonoResult<T> = Result<T, MonoError>;

/// All errors that can occur in mono
#[derive(Error, Debug)]
pub enum MonoError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Unknown artifact kind '{kind}' for artifact '{name}': no default paths")]
    UnknownArtifactKind { name: String, kind: String },

    // Cache home resolution
    #[error("Could not resolve home directory for the cache")]
    CacheHomeUnresolved,

    // Cache key errors
    #[error("Failed to read key file {path}: {source}")]
    KeyFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key command failed: {command}: {reason}")]
    KeyCommandFailed { command: String, reason: String },

    // Cache operation errors
    #[error("Build in progress for {artifact} (marker: {marker}), refusing to sync")]
    BuildInProgress { artifact: String, marker: PathBuf },

    #[error("Failed to restore {artifact} from cache: {reason}")]
    RestoreFailed { artifact: String, reason: String },

    #[error("Failed to store {artifact} to cache: {reason}")]
    StoreFailed { artifact: String, reason: String },

    #[error("Failed to seed {artifact} from root: {reason}")]
    SeedFailed { artifact: String, reason: String },

    // Environment registry errors
    #[error("Environment not found: {0}")]
    EnvironmentNotFound(PathBuf),

    #[error("Environment already exists: {0}")]
    EnvironmentExists(PathBuf),

    // Script errors
    #[error("Script failed with exit code {code}: {script}")]
    ScriptFailed { script: String, code: i32 },

    #[error("Script timed out after {minutes} minutes: {script}")]
    ScriptTimeout { script: String, minutes: u64 },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed to start: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // State database errors
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonoError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the caller can fall back to a rebuild after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RestoreFailed { .. } | Self::StoreFailed { .. } | Self::SeedFailed { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BuildInProgress { .. } => Some("Wait for the build to finish, then retry"),
            Self::EnvironmentNotFound(_) => Some("Run: mono init <path>"),
            Self::EnvironmentExists(_) => Some("Run: mono destroy <path> first"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = MonoError::BuildInProgress {
            artifact: "cargo".to_string(),
            marker: PathBuf::from("/w/target/.cargo-lock"),
        };
        assert!(err.to_string().contains("Build in progress"));
        assert!(err.to_string().contains("cargo"));
    }

    #[test]
    fn error_hint() {
        let err = MonoError::EnvironmentNotFound(PathBuf::from("/w"));
        assert_eq!(err.hint(), Some("Run: mono init <path>"));
    }

    #[test]
    fn error_recoverable() {
        let restore = MonoError::RestoreFailed {
            artifact: "cargo".to_string(),
            reason: "boom".to_string(),
        };
        assert!(restore.is_recoverable());
        assert!(!MonoError::CacheHomeUnresolved.is_recoverable());
    }
}
