//! Detect command - show what the artifact detector finds

use crate::cache::detect_artifacts;
use crate::cli::args::DetectArgs;
use crate::cli::commands::resolve_working_copy;
use crate::error::MonoResult;
use console::style;

/// Execute the detect command
pub async fn execute(args: DetectArgs) -> MonoResult<()> {
    let path = resolve_working_copy(args.path)?;

    println!("Working copy: {}", path.display());
    println!();

    let artifacts = detect_artifacts(&path);
    if artifacts.is_empty() {
        println!("No lockfiles detected.");
        return Ok(());
    }

    println!("Detected artifacts:");
    for artifact in &artifacts {
        println!(
            "  {} {} (key files: {}; paths: {})",
            style("•").cyan(),
            style(&artifact.name).bold(),
            artifact.key_files.join(", "),
            artifact.paths.join(", "),
        );
    }

    Ok(())
}
