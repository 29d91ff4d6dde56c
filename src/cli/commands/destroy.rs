//! Destroy command - capture artifacts and unregister a working copy
//!
//! The working copy is about to be deleted by the caller, so the capture
//! moves trees into the cache without hardlinking them back.

use crate::cache::{CacheManager, SyncOptions};
use crate::cli::args::DestroyArgs;
use crate::cli::commands::{derive_env_name, resolve_working_copy};
use crate::config::Config;
use crate::db::Db;
use crate::error::{MonoError, MonoResult};
use crate::script::{run_script, ScriptEnv};
use console::style;
use tracing::{info, warn};

/// Execute the destroy command
pub async fn execute(args: DestroyArgs) -> MonoResult<()> {
    let path = resolve_working_copy(args.path)?;
    let env_name = derive_env_name(&path);

    let db = Db::open()?;
    let env = db
        .environment_by_path(&path)?
        .ok_or_else(|| MonoError::EnvironmentNotFound(path.clone()))?;

    let config = match Config::load(&path).await {
        Ok(mut config) => {
            if let Err(e) = config.apply_defaults(&path) {
                warn!("Failed to resolve artifact defaults: {}", e);
            }
            config
        }
        Err(e) => {
            warn!("Failed to load config, skipping capture: {}", e);
            Config::default()
        }
    };

    if let Some(root) = env.root_path.as_deref() {
        let manager = CacheManager::new()?;
        match manager
            .sync(
                &config.build.artifacts,
                root,
                &path,
                SyncOptions {
                    hardlink_back: false,
                },
            )
            .await
        {
            Ok(()) => info!("Synced artifacts to cache before destroy"),
            Err(e) => warn!("Failed to sync before destroy: {}", e),
        }
    }

    if let Some(destroy_script) = config.scripts.destroy.clone() {
        let script_env = ScriptEnv {
            env_name: env_name.clone(),
            env_id: env.id,
            env_path: path.clone(),
            root_path: env.root_path.clone(),
        };

        let mut vars = script_env.to_vars();
        vars.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        info!("Running destroy script: {}", destroy_script);
        if let Err(e) = run_script(&path, &destroy_script, &vars).await {
            warn!("Destroy script failed: {}", e);
        } else {
            info!("Destroy script completed");
        }
    }

    db.delete_environment(&path)?;
    info!("Removed from registry");

    println!(
        "{} Environment destroyed: {}",
        style("✓").green(),
        style(&env_name).bold()
    );
    Ok(())
}
