//! Configuration management for mono

pub mod schema;

pub use schema::{ArtifactConfig, BuildConfig, Config, Scripts};

use crate::cache::detect::detect_artifacts;
use crate::error::{MonoError, MonoResult};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Name of the per-project configuration file
pub const CONFIG_FILE: &str = "mono.toml";

impl Config {
    /// Load configuration from `<dir>/mono.toml`, returning defaults when
    /// the file does not exist.
    pub async fn load(dir: &Path) -> MonoResult<Self> {
        let path = dir.join(CONFIG_FILE);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} found, using defaults", CONFIG_FILE);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(MonoError::io(
                    format!("reading config from {}", path.display()),
                    e,
                ))
            }
        };

        toml::from_str(&content).map_err(|e| MonoError::ConfigInvalid {
            path,
            reason: e.to_string(),
        })
    }

    /// Fill in detector-provided artifacts when none are configured, and
    /// resolve default paths for explicitly configured artifacts.
    pub fn apply_defaults(&mut self, working_copy: &Path) -> MonoResult<()> {
        if self.build.artifacts.is_empty() {
            self.build.artifacts = detect_artifacts(working_copy);
            debug!(
                "Detected {} artifact(s) in {}",
                self.build.artifacts.len(),
                working_copy.display()
            );
        }

        for artifact in &mut self.build.artifacts {
            artifact.apply_default_paths()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).await.unwrap();
        assert!(config.build.artifacts.is_empty());
        assert!(config.scripts.init.is_none());
    }

    #[tokio::test]
    async fn load_rejects_invalid_toml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "not [valid").unwrap();

        let err = Config::load(temp.path()).await.unwrap_err();
        assert!(matches!(err, MonoError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn load_parses_scripts_and_build() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            r#"
                [scripts]
                init = "cargo build"

                [build]
                sccache = true
            "#,
        )
        .unwrap();

        let config = Config::load(temp.path()).await.unwrap();
        assert_eq!(config.scripts.init.as_deref(), Some("cargo build"));
        assert_eq!(config.build.sccache, Some(true));
    }

    #[tokio::test]
    async fn apply_defaults_uses_detector() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Cargo.lock"), "[[package]]").unwrap();

        let mut config = Config::default();
        config.apply_defaults(temp.path()).unwrap();

        assert_eq!(config.build.artifacts.len(), 1);
        assert_eq!(config.build.artifacts[0].name, "cargo");
        assert_eq!(config.build.artifacts[0].paths, vec!["target".to_string()]);
    }

    #[tokio::test]
    async fn apply_defaults_keeps_explicit_artifacts() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Cargo.lock"), "[[package]]").unwrap();

        let mut config = Config::default();
        config.build.artifacts = vec![ArtifactConfig {
            name: "npm".to_string(),
            key_files: vec!["package-lock.json".to_string()],
            ..Default::default()
        }];
        config.apply_defaults(temp.path()).unwrap();

        assert_eq!(config.build.artifacts.len(), 1);
        assert_eq!(config.build.artifacts[0].name, "npm");
        assert_eq!(
            config.build.artifacts[0].paths,
            vec!["node_modules".to_string()]
        );
    }
}
