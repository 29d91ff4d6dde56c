//! Configuration schema for mono
//!
//! Per-project configuration is stored at `<working-copy>/mono.toml`.

use crate::error::{MonoError, MonoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lifecycle script hooks
    pub scripts: Scripts,

    /// Build artifact cache settings
    pub build: BuildConfig,

    /// Extra environment variables injected into script hooks
    pub env: HashMap<String, String>,
}

/// Lifecycle script hooks, run with `sh -c` in the working copy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scripts {
    /// Run during `mono init`, after cache restore and before store
    pub init: Option<String>,

    /// Run during `mono destroy`, after artifacts are captured
    pub destroy: Option<String>,
}

/// Build cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Tri-state sccache override: unset = auto-detect, true = force on,
    /// false = force off
    pub sccache: Option<bool>,

    /// Cacheable artifacts; filled in by the detector when empty
    pub artifacts: Vec<ArtifactConfig>,
}

/// One cacheable artifact class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Unique name within a project (e.g. `cargo`, `npm-web`)
    pub name: String,

    /// Working-copy-relative files whose bytes feed the cache key.
    /// Missing files are skipped silently.
    pub key_files: Vec<String>,

    /// Shell commands whose stdout feeds the cache key.
    /// A failing command is a hard error.
    pub key_commands: Vec<String>,

    /// Working-copy-relative directories that constitute the artifact tree
    pub paths: Vec<String>,
}

impl ArtifactConfig {
    /// The base artifact kind, i.e. the name up to the first hyphen
    /// (`npm-web` is kind `npm`).
    pub fn kind(&self) -> &str {
        self.name.split('-').next().unwrap_or(&self.name)
    }

    /// Fill in default `paths` for a recognized kind when none were given
    pub fn apply_default_paths(&mut self) -> MonoResult<()> {
        if !self.paths.is_empty() {
            return Ok(());
        }
        let dir = default_output_dir(self.kind()).ok_or_else(|| MonoError::UnknownArtifactKind {
            name: self.name.clone(),
            kind: self.kind().to_string(),
        })?;
        self.paths = vec![dir.to_string()];
        Ok(())
    }
}

/// Canonical output directory for a recognized artifact kind
pub fn default_output_dir(kind: &str) -> Option<&'static str> {
    match kind {
        "cargo" => Some("target"),
        "npm" | "yarn" | "pnpm" | "bun" => Some("node_modules"),
        _ => None,
    }
}
