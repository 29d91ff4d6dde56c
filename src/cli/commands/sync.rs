//! Sync command - capture current build artifacts into the cache

use crate::cache::{CacheManager, SyncOptions};
use crate::cli::args::SyncArgs;
use crate::cli::commands::resolve_working_copy;
use crate::config::Config;
use crate::db::Db;
use crate::error::{MonoError, MonoResult};
use console::style;

/// Execute the sync command
pub async fn execute(args: SyncArgs) -> MonoResult<()> {
    let path = resolve_working_copy(args.path)?;

    let db = Db::open()?;
    let env = db
        .environment_by_path(&path)?
        .ok_or_else(|| MonoError::EnvironmentNotFound(path.clone()))?;

    let root = env.root_path.ok_or_else(|| {
        MonoError::Internal(format!(
            "environment {} has no root path recorded",
            path.display()
        ))
    })?;

    let mut config = Config::load(&path).await?;
    config.apply_defaults(&path)?;

    let manager = CacheManager::new()?;
    manager.ensure_directories().await?;
    manager
        .sync(
            &config.build.artifacts,
            &root,
            &path,
            SyncOptions {
                hardlink_back: !args.no_hardlink_back,
            },
        )
        .await?;

    println!("{} Sync complete", style("✓").green());
    Ok(())
}
