//! CLI command implementations

pub mod cache;
pub mod destroy;
pub mod detect;
pub mod init;
pub mod list;
pub mod sync;

pub use cache::execute as cache;
pub use destroy::execute as destroy;
pub use detect::execute as detect;
pub use init::execute as init;
pub use list::execute as list;
pub use sync::execute as sync;

use crate::error::{MonoError, MonoResult};
use std::path::{Component, Path, PathBuf};

/// Resolve an optional path argument to an absolute, existing directory
pub(crate) fn resolve_working_copy(path: Option<PathBuf>) -> MonoResult<PathBuf> {
    let path = match path {
        Some(p) => p,
        None => std::env::current_dir()
            .map_err(|e| MonoError::io("getting current directory", e))?,
    };
    let path = path
        .canonicalize()
        .map_err(|_| MonoError::PathNotFound(path.clone()))?;
    if !path.is_dir() {
        return Err(MonoError::PathNotFound(path));
    }
    Ok(path)
}

/// Derive a human-readable environment name from a working copy path.
///
/// Paths shaped `.../workspaces/<project>/<workspace>` (the layout used by
/// working-copy managers) become `<project>-<workspace>`; anything else
/// falls back to the basename.
pub(crate) fn derive_env_name(path: &Path) -> String {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    for (i, part) in parts.iter().enumerate() {
        if *part == "workspaces" && i + 2 < parts.len() {
            return format!("{}-{}", parts[i + 1], parts[i + 2]);
        }
    }

    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "env".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_name_from_workspaces_layout() {
        let name = derive_env_name(Path::new("/home/x/workspaces/myproj/feature-1"));
        assert_eq!(name, "myproj-feature-1");
    }

    #[test]
    fn env_name_falls_back_to_basename() {
        let name = derive_env_name(Path::new("/home/x/checkouts/myproj"));
        assert_eq!(name, "myproj");
    }

    #[test]
    fn env_name_workspaces_needs_two_levels() {
        let name = derive_env_name(Path::new("/home/x/workspaces/only"));
        assert_eq!(name, "only");
    }
}
