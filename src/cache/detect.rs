//! Artifact detection from package manager lockfiles
//!
//! Walks a working copy looking for known lockfile names and produces an
//! ordered `ArtifactConfig` list. Same working copy = same list, in the
//! same order.

use crate::config::ArtifactConfig;
use std::path::{Component, Path};
use tracing::debug;
use walkdir::WalkDir;

/// One recognized lockfile kind
struct LockfileSpec {
    filename: &'static str,
    output_dir: &'static str,
    key_command: &'static str,
    kind: &'static str,
}

const LOCKFILE_SPECS: &[LockfileSpec] = &[
    LockfileSpec {
        filename: "Cargo.lock",
        output_dir: "target",
        key_command: "rustc --version",
        kind: "cargo",
    },
    LockfileSpec {
        filename: "package-lock.json",
        output_dir: "node_modules",
        key_command: "node --version",
        kind: "npm",
    },
    LockfileSpec {
        filename: "yarn.lock",
        output_dir: "node_modules",
        key_command: "node --version",
        kind: "yarn",
    },
    LockfileSpec {
        filename: "pnpm-lock.yaml",
        output_dir: "node_modules",
        key_command: "node --version",
        kind: "pnpm",
    },
    LockfileSpec {
        filename: "bun.lock",
        output_dir: "node_modules",
        key_command: "bun --version",
        kind: "bun",
    },
    LockfileSpec {
        filename: "bun.lockb",
        output_dir: "node_modules",
        key_command: "bun --version",
        kind: "bun",
    },
];

/// Well-known output directories never descended into
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    ".git",
    "vendor",
    "dist",
    "build",
    ".next",
    ".nuxt",
];

fn spec_for(filename: &str) -> Option<&'static LockfileSpec> {
    LOCKFILE_SPECS.iter().find(|s| s.filename == filename)
}

/// Detect cacheable artifacts in a working copy.
///
/// A lockfile at the root yields the base kind name (`cargo`, `npm`, ...);
/// a lockfile in `a/b` yields `<kind>-a-b` with the kind's output directory
/// joined under `a/b`. The first artifact to claim a name wins.
pub fn detect_artifacts(working_copy: &Path) -> Vec<ArtifactConfig> {
    let mut artifacts = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let walker = WalkDir::new(working_copy)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_skip_dir(e.file_name().to_str())));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(spec) = spec_for(name) else {
            continue;
        };
        let Ok(rel) = entry.path().strip_prefix(working_copy) else {
            continue;
        };

        let config = artifact_for_lockfile(rel, spec);
        if seen.insert(config.name.clone()) {
            debug!("Found {} lockfile: {}", spec.kind, rel.display());
            artifacts.push(config);
        }
    }

    artifacts
}

fn is_skip_dir(name: Option<&str>) -> bool {
    name.is_some_and(|n| SKIP_DIRS.contains(&n))
}

fn artifact_for_lockfile(rel_path: &Path, spec: &LockfileSpec) -> ArtifactConfig {
    let dir = rel_path.parent().unwrap_or(Path::new(""));

    let (name, artifact_path) = if dir.as_os_str().is_empty() {
        (spec.kind.to_string(), spec.output_dir.to_string())
    } else {
        (
            format!("{}-{}", spec.kind, sanitize_name(dir)),
            dir.join(spec.output_dir).to_string_lossy().into_owned(),
        )
    };

    ArtifactConfig {
        name,
        key_files: vec![rel_path.to_string_lossy().into_owned()],
        key_commands: vec![spec.key_command.to_string()],
        paths: vec![artifact_path],
    }
}

/// Turn a relative directory into a name fragment: separators and dots
/// become hyphens, everything lowercased.
fn sanitize_name(dir: &Path) -> String {
    let joined = dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("-");
    joined.replace('.', "-").to_lowercase()
}
