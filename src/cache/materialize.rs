//! Parallel tree materialization
//!
//! Reproduces a source directory at a destination using hardlinks where the
//! filesystem allows and byte copies where it doesn't. One walk collects
//! directories and files; directories are created sequentially in pre-order;
//! files are distributed across a blocking worker pool. The first worker
//! error cancels the rest.

use crate::cache::progress::ProgressReporter;
use crate::error::{MonoError, MonoResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use walkdir::WalkDir;

/// Default number of file workers
pub const DEFAULT_WORKERS: usize = 16;

/// Options for [`seed_directory`]
#[derive(Debug, Clone)]
pub struct SeedOptions {
    /// Artifact name, used for skip rules and progress labels
    pub artifact_name: String,
    /// Worker count; 0 means [`DEFAULT_WORKERS`]
    pub workers: usize,
    /// Operation label for progress lines ("seeding", "restoring", ...)
    pub operation: String,
}

impl SeedOptions {
    pub fn new(artifact_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            workers: 0,
            operation: operation.into(),
        }
    }
}

struct DirEntryPlan {
    path: PathBuf,
    mode: u32,
}

struct FileEntryPlan {
    src: PathBuf,
    dst: PathBuf,
    rel: PathBuf,
}

/// Materialize `src` at `dst`.
///
/// Hardlink per file with byte-copy fallback on cross-device or
/// unsupported-link errors; "already exists" counts as done. Per-artifact
/// skip rules prune both files and whole directories.
pub async fn seed_directory(src: &Path, dst: &Path, opts: SeedOptions) -> MonoResult<()> {
    let workers = if opts.workers == 0 {
        DEFAULT_WORKERS
    } else {
        opts.workers
    };

    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    let artifact = opts.artifact_name.clone();

    // Walk and mkdir are one blocking unit; file work fans out afterwards.
    let plan = {
        let src = src.clone();
        let dst = dst.clone();
        let artifact = artifact.clone();
        tokio::task::spawn_blocking(move || collect_and_create_dirs(&src, &dst, &artifact))
            .await
            .map_err(|e| MonoError::Internal(format!("materialize walk task panicked: {e}")))??
    };

    let progress = Arc::new(ProgressReporter::new(
        format!("{} {}", opts.operation, artifact),
        plan.len() as u64,
    ));
    let files = Arc::new(plan);
    let next = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicBool::new(false));
    let first_error = Arc::new(Mutex::new(None::<MonoError>));

    let mut pool = JoinSet::new();
    for _ in 0..workers.min(files.len().max(1)) {
        let files = Arc::clone(&files);
        let next = Arc::clone(&next);
        let cancelled = Arc::clone(&cancelled);
        let first_error = Arc::clone(&first_error);
        let progress = Arc::clone(&progress);

        pool.spawn_blocking(move || {
            loop {
                if cancelled.load(Ordering::Relaxed) {
                    return;
                }
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(file) = files.get(index) else {
                    return;
                };

                if let Err(e) = link_or_copy_file(&file.src, &file.dst) {
                    cancelled.store(true, Ordering::Relaxed);
                    let mut slot = first_error.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(MonoError::io(
                            format!("failed to link {}", file.rel.display()),
                            e,
                        ));
                    }
                    return;
                }

                progress.increment();
            }
        });
    }

    while let Some(joined) = pool.join_next().await {
        joined.map_err(|e| MonoError::Internal(format!("materialize worker panicked: {e}")))?;
    }

    if let Some(err) = first_error.lock().unwrap().take() {
        return Err(err);
    }

    progress.finish();
    Ok(())
}

/// Walk the source, apply skip rules, create destination directories in
/// pre-order, and return the file work list.
fn collect_and_create_dirs(
    src: &Path,
    dst: &Path,
    artifact: &str,
) -> MonoResult<Vec<FileEntryPlan>> {
    let mut dirs: Vec<DirEntryPlan> = Vec::new();
    let mut files: Vec<FileEntryPlan> = Vec::new();

    let mut walker = WalkDir::new(src).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| {
            MonoError::io(
                format!("walking source directory {}", src.display()),
                e.into(),
            )
        })?;

        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| MonoError::Internal(format!("walk produced foreign path: {e}")))?
            .to_path_buf();

        if entry.file_type().is_dir() {
            // Trailing separator disambiguates directory skip rules
            if should_skip_path(&format!("{}/", rel.display()), artifact) {
                walker.skip_current_dir();
                continue;
            }
            let mode = entry_mode(&entry)?;
            dirs.push(DirEntryPlan {
                path: dst.join(&rel),
                mode,
            });
            continue;
        }

        if !entry.file_type().is_file() {
            // Symlinks inside artifact trees are either skipped by repair
            // rules or regenerated by the toolchain; only regular files
            // are materialized.
            continue;
        }

        if should_skip_path(&rel.display().to_string(), artifact) {
            continue;
        }

        files.push(FileEntryPlan {
            src: entry.path().to_path_buf(),
            dst: dst.join(&rel),
            rel,
        });
    }

    for dir in &dirs {
        fs::create_dir_all(&dir.path).map_err(|e| {
            MonoError::io(format!("creating directory {}", dir.path.display()), e)
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&dir.path, fs::Permissions::from_mode(dir.mode));
        }
    }

    Ok(files)
}

#[cfg(unix)]
fn entry_mode(entry: &walkdir::DirEntry) -> MonoResult<u32> {
    use std::os::unix::fs::PermissionsExt;
    let meta = entry
        .metadata()
        .map_err(|e| MonoError::io(format!("stat {}", entry.path().display()), e.into()))?;
    Ok(meta.permissions().mode())
}

#[cfg(not(unix))]
fn entry_mode(_entry: &walkdir::DirEntry) -> MonoResult<u32> {
    Ok(0)
}

/// Hardlink `src` to `dst`, copying when the filesystem can't link
pub fn link_or_copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) if is_hardlink_unsupported(&e) => {
            // fs::copy carries permission bits along
            fs::copy(src, dst).map(|_| ())
        }
        Err(e) => Err(e),
    }
}

/// Whether an error means "this filesystem pair can't hardlink", as opposed
/// to a real failure. Matched on structured OS codes, not message text.
pub fn is_hardlink_unsupported(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EXDEV) | Some(libc::EPERM) | Some(libc::EMLINK) | Some(libc::EOPNOTSUPP)
    )
}

/// Whether a rename failed because source and destination are on different
/// filesystems
pub fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

/// Byte-copy an entire tree, preserving directory modes. Fallback path for
/// cross-device renames.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = entry.metadata().map_err(io::Error::other)?.permissions().mode();
                let _ = fs::set_permissions(&target, fs::Permissions::from_mode(mode));
            }
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Per-artifact skip rules. Directory paths carry a trailing separator.
///
/// Skips trade cache size for a slightly colder first build; wrong results
/// are not on the table.
pub fn should_skip_path(rel_path: &str, artifact_name: &str) -> bool {
    match base_kind(artifact_name) {
        "cargo" => should_skip_cargo_path(rel_path),
        _ => false,
    }
}

fn base_kind(artifact_name: &str) -> &str {
    artifact_name.split('-').next().unwrap_or(artifact_name)
}

fn should_skip_cargo_path(rel_path: &str) -> bool {
    if rel_path.ends_with(".o") || rel_path.ends_with(".d") {
        return true;
    }
    if rel_path.starts_with("incremental/") || rel_path.contains("/incremental/") {
        return true;
    }
    rel_path == ".cargo-lock"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn materializes_tree_with_hardlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src.join("file.txt"), "content");
        write(&src.join("subdir/nested.txt"), "nested");

        seed_directory(&src, &dst, SeedOptions::new("npm", "seeding"))
            .await
            .unwrap();

        let src_ino = fs::metadata(src.join("file.txt")).unwrap().ino();
        let dst_ino = fs::metadata(dst.join("file.txt")).unwrap().ino();
        assert_eq!(src_ino, dst_ino);

        assert!(dst.join("subdir/nested.txt").exists());
    }

    #[tokio::test]
    async fn replace_breaks_link() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src.join("file.txt"), "original");

        seed_directory(&src, &dst, SeedOptions::new("npm", "seeding"))
            .await
            .unwrap();

        // Replace-then-rename semantics: remove and recreate
        let dst_file = dst.join("file.txt");
        fs::remove_file(&dst_file).unwrap();
        fs::write(&dst_file, "modified").unwrap();

        assert_eq!(fs::read_to_string(src.join("file.txt")).unwrap(), "original");
        let src_ino = fs::metadata(src.join("file.txt")).unwrap().ino();
        let dst_ino = fs::metadata(&dst_file).unwrap().ino();
        assert_ne!(src_ino, dst_ino);
    }

    #[tokio::test]
    async fn existing_destination_files_are_fine() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src.join("file.txt"), "content");
        write(&dst.join("file.txt"), "already here");

        seed_directory(&src, &dst, SeedOptions::new("npm", "seeding"))
            .await
            .unwrap();

        // "Already exists" is success; the present file stays
        assert_eq!(fs::read_to_string(dst.join("file.txt")).unwrap(), "already here");
    }

    #[tokio::test]
    async fn cargo_skip_rules_applied() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src.join("debug/app"), "binary");
        write(&src.join("debug/app.d"), "depinfo");
        write(&src.join("debug/obj.o"), "object");
        write(&src.join("incremental/session/data.bin"), "incr");
        write(&src.join(".cargo-lock"), "");

        seed_directory(&src, &dst, SeedOptions::new("cargo", "storing"))
            .await
            .unwrap();

        assert!(dst.join("debug/app").exists());
        assert!(!dst.join("debug/app.d").exists());
        assert!(!dst.join("debug/obj.o").exists());
        assert!(!dst.join("incremental").exists());
        assert!(!dst.join(".cargo-lock").exists());
    }

    #[tokio::test]
    async fn nested_artifact_uses_base_kind_rules() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src.join("debug/obj.o"), "object");
        write(&src.join("debug/app"), "binary");

        seed_directory(&src, &dst, SeedOptions::new("cargo-svc-api", "storing"))
            .await
            .unwrap();

        assert!(dst.join("debug/app").exists());
        assert!(!dst.join("debug/obj.o").exists());
    }

    #[tokio::test]
    async fn empty_source_materializes_empty_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(&src).unwrap();

        seed_directory(&src, &dst, SeedOptions::new("cargo", "restoring"))
            .await
            .unwrap();

        assert!(dst.is_dir());
        assert_eq!(fs::read_dir(&dst).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_source_errors() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("nope");
        let dst = temp.path().join("dst");

        let result = seed_directory(&src, &dst, SeedOptions::new("cargo", "restoring")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        let script = src.join("bin/run.sh");
        write(&script, "#!/bin/sh\n");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        seed_directory(&src, &dst, SeedOptions::new("npm", "seeding"))
            .await
            .unwrap();

        let mode = fs::metadata(dst.join("bin/run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn skip_rules_table() {
        assert!(should_skip_path("debug/foo.o", "cargo"));
        assert!(should_skip_path("debug/foo.d", "cargo"));
        assert!(should_skip_path("incremental/", "cargo"));
        assert!(should_skip_path("debug/incremental/x", "cargo"));
        assert!(should_skip_path(".cargo-lock", "cargo"));
        assert!(!should_skip_path("debug/foo", "cargo"));
        assert!(!should_skip_path("anything.o", "npm"));
    }

    #[test]
    fn copy_dir_recursive_copies_bytes() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src.join("a/b.txt"), "data");

        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("a/b.txt")).unwrap(), "data");
        // Byte copy, not a link
        let src_ino = fs::metadata(src.join("a/b.txt")).unwrap().ino();
        let dst_ino = fs::metadata(dst.join("a/b.txt")).unwrap().ino();
        assert_ne!(src_ino, dst_ino);
    }
}
