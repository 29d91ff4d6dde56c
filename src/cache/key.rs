//! Cache key computation
//!
//! A key hashes the declared key files (in order, concatenated, missing
//! files contribute nothing) followed by the stdout of each key command.
//! Key commands run under a POSIX shell; callers must not rely on the
//! working directory.

use crate::cache::digest::{Digest, KEY_HEX_LEN};
use crate::config::ArtifactConfig;
use crate::error::{MonoError, MonoResult};
use std::path::Path;
use tokio::process::Command;

/// Compute the cache key for one artifact in one working copy
pub async fn compute_cache_key(
    artifact: &ArtifactConfig,
    working_copy: &Path,
) -> MonoResult<String> {
    let mut digest = Digest::new();

    for key_file in &artifact.key_files {
        let path = working_copy.join(key_file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => digest.update(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(MonoError::KeyFileRead { path, source: e }),
        }
    }

    for command in &artifact.key_commands {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| MonoError::KeyCommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MonoError::KeyCommandFailed {
                command: command.clone(),
                reason: format!(
                    "exit status {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        digest.update(&output.stdout);
    }

    Ok(digest.finish_hex(KEY_HEX_LEN))
}
