//! Cache manager: prepare, restore, store, sync, seed, enumerate, remove
//!
//! Owns the cache directory tree under `<home>/cache_local` and composes
//! the leaves (key builder, materializer, locks, repair) into the
//! operations exposed to the front end. Multiple processes may operate on
//! the same cache concurrently; writers coordinate through per-entry
//! advisory locks and publish entries atomically via rename.

use crate::cache::key::compute_cache_key;
use crate::cache::lock::CacheLock;
use crate::cache::materialize::{
    copy_dir_recursive, is_cross_device, seed_directory, SeedOptions,
};
use crate::cache::paths::{self, project_token, CACHE_DIR_NAME};
use crate::cache::repair::apply_post_restore_fixes;
use crate::config::{ArtifactConfig, BuildConfig};
use crate::error::{MonoError, MonoResult};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// One prepared cache entry for one artifact
#[derive(Debug, Clone)]
pub struct ArtifactCacheEntry {
    /// Artifact name (e.g. `cargo`, `npm-web`)
    pub name: String,
    /// Content-derived cache key
    pub key: String,
    /// Absolute cache entry directory
    pub cache_path: PathBuf,
    /// Absolute artifact directories inside the working copy
    pub env_paths: Vec<PathBuf>,
    /// Whether the cache entry existed at prepare time
    pub hit: bool,
}

/// Options for [`CacheManager::sync`]
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Materialize back onto the working copy after capture. `true` for
    /// "capture and keep working", `false` when the working copy is about
    /// to be deleted.
    pub hardlink_back: bool,
}

/// One cache entry with its summed regular-file size
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheSizeEntry {
    pub project: String,
    pub artifact: String,
    pub cache_key: String,
    pub size: u64,
}

/// The cache engine. Construct once; the home directory override is read
/// at construction only.
pub struct CacheManager {
    home_dir: PathBuf,
    local_cache_dir: PathBuf,
    sccache_available: bool,
}

impl CacheManager {
    /// Create a manager rooted at `$MONO_HOME` or `~/.mono`
    pub fn new() -> MonoResult<Self> {
        Ok(Self::with_home(paths::mono_home()?))
    }

    /// Create a manager rooted at an explicit home directory
    pub fn with_home(home_dir: PathBuf) -> Self {
        let local_cache_dir = home_dir.join(CACHE_DIR_NAME);
        Self {
            home_dir,
            local_cache_dir,
            sccache_available: detect_sccache(),
        }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn local_cache_dir(&self) -> &Path {
        &self.local_cache_dir
    }

    pub fn sccache_available(&self) -> bool {
        self.sccache_available
    }

    /// Create the cache directory tree
    pub async fn ensure_directories(&self) -> MonoResult<()> {
        fs::create_dir_all(&self.local_cache_dir).await.map_err(|e| {
            MonoError::io(
                format!("creating cache directory {}", self.local_cache_dir.display()),
                e,
            )
        })
    }

    /// Environment variables to inject into user scripts for build caching
    pub fn env_vars(&self, cfg: &BuildConfig) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if self.should_enable_sccache(cfg) {
            vars.push(("RUSTC_WRAPPER".to_string(), "sccache".to_string()));
        }
        vars
    }

    /// Cache outcome hints injected alongside [`Self::env_vars`]
    pub fn hint_vars(&self, all_hit: bool) -> Vec<(String, String)> {
        vec![
            ("MONO_CACHE_HIT".to_string(), all_hit.to_string()),
            (
                "MONO_CACHE_DIR".to_string(),
                self.local_cache_dir.to_string_lossy().into_owned(),
            ),
        ]
    }

    fn should_enable_sccache(&self, cfg: &BuildConfig) -> bool {
        match cfg.sccache {
            Some(enabled) => enabled && self.sccache_available,
            None => self.sccache_available,
        }
    }

    /// Cache directory for one project, namespaced by the root path
    pub fn project_cache_dir(&self, root_path: &Path) -> PathBuf {
        self.local_cache_dir.join(project_token(root_path))
    }

    /// Cache entry directory for `(project, artifact, key)`
    pub fn artifact_cache_path(&self, root_path: &Path, artifact_name: &str, key: &str) -> PathBuf {
        self.project_cache_dir(root_path).join(artifact_name).join(key)
    }

    /// Compute keys and probe the cache for every artifact, preserving
    /// input order. Key failures are fatal.
    pub async fn prepare_artifact_cache(
        &self,
        artifacts: &[ArtifactConfig],
        root_path: &Path,
        working_copy: &Path,
    ) -> MonoResult<Vec<ArtifactCacheEntry>> {
        let mut entries = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let key = compute_cache_key(artifact, working_copy).await?;
            let cache_path = self.artifact_cache_path(root_path, &artifact.name, &key);
            let hit = dir_exists(&cache_path).await;

            entries.push(ArtifactCacheEntry {
                name: artifact.name.clone(),
                key,
                cache_path,
                env_paths: artifact.paths.iter().map(|p| working_copy.join(p)).collect(),
                hit,
            });
        }

        Ok(entries)
    }

    /// Materialize a cache hit into the working copy and repair it.
    ///
    /// The existing artifact tree is removed first; on failure the tree is
    /// indeterminate and the caller falls back to a rebuild.
    pub async fn restore_from_cache(&self, entry: &ArtifactCacheEntry) -> MonoResult<()> {
        for env_path in &entry.env_paths {
            let mut source = entry.cache_path.join(basename(env_path));
            if !dir_exists(&source).await {
                // Legacy entries were stored under the artifact name
                source = entry.cache_path.join(&entry.name);
            }

            match fs::remove_dir_all(env_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(MonoError::RestoreFailed {
                        artifact: entry.name.clone(),
                        reason: format!("removing existing {}: {e}", env_path.display()),
                    })
                }
            }

            seed_directory(&source, env_path, SeedOptions::new(&entry.name, "restoring"))
                .await
                .map_err(|e| MonoError::RestoreFailed {
                    artifact: entry.name.clone(),
                    reason: e.to_string(),
                })?;

            apply_post_restore_fixes(&entry.name, env_path).await?;
        }
        Ok(())
    }

    /// First-time publish of freshly built artifacts: rename each tree into
    /// the cache, then hardlink it back onto the working copy.
    ///
    /// The entry directory is created only once there is something to put
    /// in it, so an entry never becomes observable while empty.
    pub async fn store_to_cache(&self, entry: &ArtifactCacheEntry) -> MonoResult<()> {
        let Some(_lock) = CacheLock::acquire(&entry.cache_path)? else {
            debug!("Another process is storing {} ({}), skipping", entry.name, entry.key);
            return Ok(());
        };

        for env_path in &entry.env_paths {
            if !dir_exists(env_path).await {
                continue;
            }

            fs::create_dir_all(&entry.cache_path).await.map_err(|e| {
                MonoError::io(format!("creating cache dir {}", entry.cache_path.display()), e)
            })?;
            let cache_dst = entry.cache_path.join(basename(env_path));

            // Lock held: an existing tree means another writer published
            // this entry after our prepare probe
            if dir_exists(&cache_dst).await {
                continue;
            }

            match fs::rename(env_path, &cache_dst).await {
                Ok(()) => {}
                Err(e) if is_cross_device(&e) => {
                    // Copy-then-remove stands in for the rename; the
                    // materialize-back below then rebuilds env_path as the
                    // same filtered shadow the same-device path produces
                    copy_tree(env_path, &cache_dst).await.map_err(|e| {
                        MonoError::StoreFailed {
                            artifact: entry.name.clone(),
                            reason: format!("cross-device copy to cache: {e}"),
                        }
                    })?;
                    fs::remove_dir_all(env_path).await.map_err(|e| {
                        MonoError::StoreFailed {
                            artifact: entry.name.clone(),
                            reason: format!("removing {} after copy: {e}", env_path.display()),
                        }
                    })?;
                }
                Err(e) => {
                    let _ = std::fs::remove_dir(&entry.cache_path);
                    return Err(MonoError::StoreFailed {
                        artifact: entry.name.clone(),
                        reason: format!("moving {} to cache: {e}", env_path.display()),
                    })
                }
            }

            if let Err(link_err) =
                seed_directory(&cache_dst, env_path, SeedOptions::new(&entry.name, "storing")).await
            {
                return Err(self
                    .recover_failed_publish(&entry.name, env_path, &cache_dst, link_err)
                    .await);
            }
        }

        Ok(())
    }

    /// Idempotent capture of the working copy's current artifacts
    pub async fn sync(
        &self,
        artifacts: &[ArtifactConfig],
        root_path: &Path,
        working_copy: &Path,
        opts: SyncOptions,
    ) -> MonoResult<()> {
        for artifact in artifacts {
            self.sync_artifact(artifact, root_path, working_copy, opts).await?;
        }
        Ok(())
    }

    async fn sync_artifact(
        &self,
        artifact: &ArtifactConfig,
        root_path: &Path,
        working_copy: &Path,
        opts: SyncOptions,
    ) -> MonoResult<()> {
        if let Some(marker) = build_in_progress_marker(working_copy, artifact).await {
            return Err(MonoError::BuildInProgress {
                artifact: artifact.name.clone(),
                marker,
            });
        }

        // No lockfile at all means the artifact isn't present here
        if !artifact.key_files.is_empty() && !any_key_file_exists(artifact, working_copy).await {
            debug!("No key files for {} in {}, skipping sync", artifact.name, working_copy.display());
            return Ok(());
        }

        let key = compute_cache_key(artifact, working_copy).await?;
        let cache_path = self.artifact_cache_path(root_path, &artifact.name, &key);

        if dir_exists(&cache_path).await {
            debug!("{} already cached at key {}", artifact.name, key);
            return Ok(());
        }

        let Some(_lock) = CacheLock::acquire(&cache_path)? else {
            debug!("Another process is syncing {} ({}), skipping", artifact.name, key);
            return Ok(());
        };

        for path in &artifact.paths {
            let local_path = working_copy.join(path);
            if !dir_exists(&local_path).await {
                continue;
            }
            self.move_to_cache(&artifact.name, &local_path, &cache_path, opts.hardlink_back)
                .await?;
        }

        Ok(())
    }

    /// Move one artifact tree into the cache under the held entry lock
    async fn move_to_cache(
        &self,
        artifact_name: &str,
        local_path: &Path,
        cache_path: &Path,
        hardlink_back: bool,
    ) -> MonoResult<()> {
        let target = cache_path.join(basename(local_path));

        // Lock held: a populated target means another process got here
        // between our existence probe and acquisition
        if dir_exists(&target).await {
            return Ok(());
        }

        fs::create_dir_all(cache_path).await.map_err(|e| {
            MonoError::io(format!("creating cache dir {}", cache_path.display()), e)
        })?;

        match fs::rename(local_path, &target).await {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                // Copy-then-remove stands in for the rename; the
                // hardlink_back branch below applies either way
                copy_tree(local_path, &target)
                    .await
                    .map_err(|e| MonoError::StoreFailed {
                        artifact: artifact_name.to_string(),
                        reason: format!("cross-device copy to cache: {e}"),
                    })?;
                fs::remove_dir_all(local_path).await.map_err(|e| {
                    MonoError::io(format!("removing {}", local_path.display()), e)
                })?;
            }
            Err(e) => {
                let _ = std::fs::remove_dir(cache_path);
                return Err(MonoError::StoreFailed {
                    artifact: artifact_name.to_string(),
                    reason: format!("moving {} to cache: {e}", local_path.display()),
                })
            }
        }

        if hardlink_back {
            if let Err(link_err) =
                seed_directory(&target, local_path, SeedOptions::new(artifact_name, "storing")).await
            {
                return Err(self
                    .recover_failed_publish(artifact_name, local_path, &target, link_err)
                    .await);
            }
        }

        Ok(())
    }

    /// The hardlink-back failed after the tree was renamed into the cache.
    /// Put the tree back where the user's build left it, drop the empty
    /// cache entry, and report what happened.
    async fn recover_failed_publish(
        &self,
        artifact_name: &str,
        env_path: &Path,
        cache_dst: &Path,
        link_err: MonoError,
    ) -> MonoError {
        match fs::rename(cache_dst, env_path).await {
            Ok(()) => {
                // The entry directory may still hold other basenames;
                // only drop it when empty
                if let Some(entry_dir) = cache_dst.parent() {
                    let _ = std::fs::remove_dir(entry_dir);
                }
                MonoError::StoreFailed {
                    artifact: artifact_name.to_string(),
                    reason: format!("hardlink back failed ({link_err}); working copy recovered"),
                }
            }
            Err(recover_err) => MonoError::StoreFailed {
                artifact: artifact_name.to_string(),
                reason: format!(
                    "hardlink back failed ({link_err}) and recovery rename failed ({recover_err}); \
                     artifact tree is in the cache at {}",
                    cache_dst.display()
                ),
            },
        }
    }

    /// Populate the cache from the canonical root working copy when a peer
    /// has identical dependency state. Read-only with respect to the root.
    pub async fn seed_from_root(
        &self,
        artifacts: &[ArtifactConfig],
        root_path: &Path,
        working_copy: &Path,
    ) -> MonoResult<()> {
        for artifact in artifacts {
            self.seed_artifact_from_root(artifact, root_path, working_copy).await?;
        }
        Ok(())
    }

    async fn seed_artifact_from_root(
        &self,
        artifact: &ArtifactConfig,
        root_path: &Path,
        working_copy: &Path,
    ) -> MonoResult<()> {
        if root_path == working_copy {
            return Ok(());
        }

        let env_key = compute_cache_key(artifact, working_copy).await?;
        let cache_path = self.artifact_cache_path(root_path, &artifact.name, &env_key);
        if dir_exists(&cache_path).await {
            return Ok(());
        }

        let root_key = compute_cache_key(artifact, root_path).await?;
        if env_key != root_key {
            debug!(
                "Keys diverge for {} (root {}, working copy {}), not seeding",
                artifact.name, root_key, env_key
            );
            return Ok(());
        }

        if build_in_progress_marker(root_path, artifact).await.is_some() {
            debug!("Build in progress in root, not seeding {}", artifact.name);
            return Ok(());
        }

        let Some(_lock) = CacheLock::acquire(&cache_path)? else {
            debug!("Another process is seeding {} ({}), skipping", artifact.name, env_key);
            return Ok(());
        };

        for path in &artifact.paths {
            let root_artifact = root_path.join(path);
            if !dir_exists(&root_artifact).await {
                continue;
            }

            let target = cache_path.join(basename(&root_artifact));
            if dir_exists(&target).await {
                continue;
            }

            fs::create_dir_all(&cache_path).await.map_err(|e| {
                MonoError::io(format!("creating cache dir {}", cache_path.display()), e)
            })?;

            seed_directory(&root_artifact, &target, SeedOptions::new(&artifact.name, "seeding"))
                .await
                .map_err(|e| MonoError::SeedFailed {
                    artifact: artifact.name.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }

    /// Enumerate every cache entry with its summed regular-file size
    pub async fn cache_sizes(&self) -> MonoResult<Vec<CacheSizeEntry>> {
        let cache_dir = self.local_cache_dir.clone();
        tokio::task::spawn_blocking(move || collect_cache_sizes(&cache_dir))
            .await
            .map_err(|e| MonoError::Internal(format!("cache size scan panicked: {e}")))?
    }

    /// Remove one cache entry and prune now-empty parents
    pub async fn remove_entry(&self, project: &str, artifact: &str, key: &str) -> MonoResult<()> {
        let artifact_dir = self.local_cache_dir.join(project).join(artifact);
        let entry_dir = artifact_dir.join(key);

        match fs::remove_dir_all(&entry_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MonoError::io(
                    format!("removing cache entry {}", entry_dir.display()),
                    e,
                ))
            }
        }

        // The stale lock file goes with the entry; without it the artifact
        // directory can actually become empty
        let _ = fs::remove_file(crate::cache::lock::lock_file_path(&entry_dir)).await;

        prune_if_empty(&artifact_dir).await;
        prune_if_empty(&self.local_cache_dir.join(project)).await;

        Ok(())
    }

    /// Drop the entire local cache, returning entry count and total bytes
    pub async fn remove_all(&self) -> MonoResult<(usize, u64)> {
        let entries = self.cache_sizes().await?;
        let total: u64 = entries.iter().map(|e| e.size).sum();

        match fs::remove_dir_all(&self.local_cache_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MonoError::io(
                    format!("removing cache directory {}", self.local_cache_dir.display()),
                    e,
                ))
            }
        }

        Ok((entries.len(), total))
    }
}

/// Marker files that indicate a toolchain is mutating the artifact tree
/// right now. The cache reads these; it never creates them.
async fn build_in_progress_marker(working_copy: &Path, artifact: &ArtifactConfig) -> Option<PathBuf> {
    if artifact.kind() != "cargo" {
        return None;
    }
    for path in &artifact.paths {
        let marker = working_copy.join(path).join(".cargo-lock");
        if file_exists(&marker).await {
            return Some(marker);
        }
    }
    None
}

async fn any_key_file_exists(artifact: &ArtifactConfig, working_copy: &Path) -> bool {
    for key_file in &artifact.key_files {
        if file_exists(&working_copy.join(key_file)).await {
            return true;
        }
    }
    false
}

async fn dir_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn file_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

fn basename(path: &Path) -> std::ffi::OsString {
    path.file_name()
        .map(|n| n.to_owned())
        .unwrap_or_else(|| std::ffi::OsString::from("artifact"))
}

async fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_recursive(&src, &dst))
        .await
        .map_err(|e| std::io::Error::other(format!("copy task panicked: {e}")))?
}

async fn prune_if_empty(dir: &Path) {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };
    match entries.next_entry().await {
        Ok(None) => {
            if let Err(e) = fs::remove_dir(dir).await {
                warn!("Failed to prune empty cache dir {}: {}", dir.display(), e);
            }
        }
        _ => {}
    }
}

/// Walk `cache_local` three levels deep (`project/artifact/key`) and sum
/// regular-file sizes per leaf
fn collect_cache_sizes(cache_dir: &Path) -> MonoResult<Vec<CacheSizeEntry>> {
    let mut entries = Vec::new();

    if !cache_dir.is_dir() {
        return Ok(entries);
    }

    let projects = std::fs::read_dir(cache_dir)
        .map_err(|e| MonoError::io(format!("reading cache directory {}", cache_dir.display()), e))?;

    let mut project_dirs: Vec<_> = projects.flatten().filter(|e| e.path().is_dir()).collect();
    project_dirs.sort_by_key(|e| e.file_name());

    for project_dir in project_dirs {
        let project = project_dir.file_name().to_string_lossy().into_owned();

        let Ok(artifacts) = std::fs::read_dir(project_dir.path()) else {
            continue;
        };
        let mut artifact_dirs: Vec<_> = artifacts.flatten().filter(|e| e.path().is_dir()).collect();
        artifact_dirs.sort_by_key(|e| e.file_name());

        for artifact_dir in artifact_dirs {
            let artifact = artifact_dir.file_name().to_string_lossy().into_owned();

            let Ok(keys) = std::fs::read_dir(artifact_dir.path()) else {
                continue;
            };
            let mut key_dirs: Vec<_> = keys.flatten().filter(|e| e.path().is_dir()).collect();
            key_dirs.sort_by_key(|e| e.file_name());

            for key_dir in key_dirs {
                let Ok(size) = dir_size(&key_dir.path()) else {
                    continue;
                };
                entries.push(CacheSizeEntry {
                    project: project.clone(),
                    artifact: artifact.clone(),
                    cache_key: key_dir.file_name().to_string_lossy().into_owned(),
                    size,
                });
            }
        }
    }

    Ok(entries)
}

fn dir_size(path: &Path) -> MonoResult<u64> {
    let mut size = 0u64;
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry.map_err(|e| MonoError::io(format!("walking {}", path.display()), e.into()))?;
        if entry.file_type().is_file() {
            size += entry
                .metadata()
                .map_err(|e| MonoError::io(format!("stat {}", entry.path().display()), e.into()))?
                .len();
        }
    }
    Ok(size)
}

fn detect_sccache() -> bool {
    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path_var).any(|dir| is_executable(&dir.join("sccache")))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Format bytes as a human-readable size (e.g. "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
