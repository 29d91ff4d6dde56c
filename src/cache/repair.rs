//! Post-restore repair of path-dependent artifact metadata
//!
//! Hardlink restores preserve timestamps and symlinks from the working copy
//! that originally built the tree. Each artifact kind gets a small,
//! idempotent fixup after materialization instead of a rewrite:
//!
//! - cargo: touch `dep-*` fingerprint files so their mtimes are newer than
//!   every build output, keeping the build driver from recompiling.
//! - npm/yarn/pnpm/bun: drop `node_modules/.bin` whose symlinks point into
//!   the original working copy; the package manager regenerates it.

use crate::error::{MonoError, MonoResult};
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::debug;

/// Worker count for the fingerprint touch
const TOUCH_WORKERS: usize = 8;

/// Run the repair appropriate for `artifact_name` on a restored tree
pub async fn apply_post_restore_fixes(artifact_name: &str, env_path: &Path) -> MonoResult<()> {
    match artifact_name.split('-').next().unwrap_or(artifact_name) {
        "cargo" => touch_cargo_fingerprints(env_path).await,
        "npm" | "yarn" | "pnpm" | "bun" => clean_node_modules_bin(env_path).await,
        _ => Ok(()),
    }
}

/// Set atime and mtime to now on every `dep-*` file under
/// `<target>/{debug,release}/.fingerprint`.
async fn touch_cargo_fingerprints(target_dir: &Path) -> MonoResult<()> {
    let now = FileTime::now();

    for profile in ["debug", "release"] {
        let fingerprint_dir = target_dir.join(profile).join(".fingerprint");
        if !fingerprint_dir.is_dir() {
            continue;
        }
        touch_dep_files(&fingerprint_dir, now).await?;
    }

    Ok(())
}

async fn touch_dep_files(fingerprint_dir: &Path, now: FileTime) -> MonoResult<()> {
    let dep_files = {
        let dir = fingerprint_dir.to_path_buf();
        tokio::task::spawn_blocking(move || collect_dep_files(&dir))
            .await
            .map_err(|e| MonoError::Internal(format!("fingerprint scan panicked: {e}")))??
    };

    if dep_files.is_empty() {
        return Ok(());
    }
    debug!(
        "Touching {} fingerprint dep files under {}",
        dep_files.len(),
        fingerprint_dir.display()
    );

    let files = Arc::new(dep_files);
    let next = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicBool::new(false));
    let first_error = Arc::new(Mutex::new(None::<MonoError>));

    let mut pool = JoinSet::new();
    for _ in 0..TOUCH_WORKERS.min(files.len()) {
        let files = Arc::clone(&files);
        let next = Arc::clone(&next);
        let cancelled = Arc::clone(&cancelled);
        let first_error = Arc::clone(&first_error);

        pool.spawn_blocking(move || loop {
            if cancelled.load(Ordering::Relaxed) {
                return;
            }
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(path) = files.get(index) else {
                return;
            };
            if let Err(e) = filetime::set_file_times(path, now, now) {
                cancelled.store(true, Ordering::Relaxed);
                let mut slot = first_error.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(MonoError::io(
                        format!("touching fingerprint {}", path.display()),
                        e,
                    ));
                }
                return;
            }
        });
    }

    while let Some(joined) = pool.join_next().await {
        joined.map_err(|e| MonoError::Internal(format!("fingerprint touch panicked: {e}")))?;
    }

    if let Some(err) = first_error.lock().unwrap().take() {
        return Err(err);
    }
    Ok(())
}

/// `.fingerprint/<crate>/dep-*` regular files, one directory level deep
fn collect_dep_files(fingerprint_dir: &Path) -> MonoResult<Vec<PathBuf>> {
    let mut dep_files = Vec::new();

    let crates = std::fs::read_dir(fingerprint_dir)
        .map_err(|e| MonoError::io(format!("reading {}", fingerprint_dir.display()), e))?;

    for crate_entry in crates.flatten() {
        if !crate_entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let Ok(files) = std::fs::read_dir(crate_entry.path()) else {
            continue;
        };
        for file_entry in files.flatten() {
            if !file_entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if file_entry.file_name().to_string_lossy().starts_with("dep-") {
                dep_files.push(file_entry.path());
            }
        }
    }

    Ok(dep_files)
}

/// Remove `<node_modules>/.bin` recursively if present
async fn clean_node_modules_bin(node_modules_dir: &Path) -> MonoResult<()> {
    let bin_dir = node_modules_dir.join(".bin");
    match tokio::fs::remove_dir_all(&bin_dir).await {
        Ok(()) => {
            debug!("Removed {}", bin_dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MonoError::io(
            format!("cleaning .bin at {}", bin_dir.display()),
            e,
        )),
    }
}
