//! Cache directory layout and project namespace tokens
//!
//! Everything the cache persists lives under the mono home directory:
//!
//! ```text
//! <home>/
//!   cache_local/<project>/<artifact>/<key>/<basename>/...
//!   cache_local/<project>/<artifact>/<key>.lock
//!   state.db
//! ```

use crate::cache::digest::Digest;
use crate::error::{MonoError, MonoResult};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the mono home directory
pub const HOME_ENV: &str = "MONO_HOME";

/// Directory under the home that holds the local artifact cache
pub const CACHE_DIR_NAME: &str = "cache_local";

/// Resolve the mono home directory: `$MONO_HOME` if set, else `~/.mono`.
///
/// Read once at `CacheManager` construction; the override is not consulted
/// again afterwards.
pub fn mono_home() -> MonoResult<PathBuf> {
    if let Some(custom) = env::var_os(HOME_ENV) {
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    dirs::home_dir()
        .map(|h| h.join(".mono"))
        .ok_or(MonoError::CacheHomeUnresolved)
}

/// Path to the state database under the given home
pub fn db_path(home: &Path) -> PathBuf {
    home.join("state.db")
}

/// Derive the project namespace token from the root working copy path.
///
/// `<basename>-<8 hex of sha256(path)>`: stable across invocations,
/// recognizable in listings, and distinct for unrelated projects that share
/// a directory name. The token is only ever used as a directory name.
pub fn project_token(root_path: &Path) -> String {
    let basename = root_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());

    let mut digest = Digest::new();
    digest.update(root_path.to_string_lossy().as_bytes());
    format!("{}-{}", basename, digest.finish_hex(8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_token_stable() {
        let a = project_token(Path::new("/Users/x/project1"));
        let b = project_token(Path::new("/Users/x/project1"));
        assert_eq!(a, b);
    }

    #[test]
    fn project_token_distinct_paths() {
        let a = project_token(Path::new("/Users/x/project1"));
        let b = project_token(Path::new("/Users/x/project2"));
        assert_ne!(a, b);
    }

    #[test]
    fn project_token_same_basename_distinct_parent() {
        // Two unrelated projects named "app" must not share a namespace
        let a = project_token(Path::new("/Users/x/app"));
        let b = project_token(Path::new("/Users/y/app"));
        assert_ne!(a, b);
        assert!(a.starts_with("app-"));
        assert!(b.starts_with("app-"));
    }

    #[test]
    fn project_token_is_safe_directory_name() {
        let token = project_token(Path::new("/tmp/my-project"));
        assert!(!token.contains('/'));
        assert!(token.starts_with("my-project-"));
        // basename + hyphen + 8 hex chars
        assert_eq!(token.len(), "my-project".len() + 1 + 8);
    }
}
