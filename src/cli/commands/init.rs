//! Init command - register a working copy and warm it from the cache
//!
//! The typical session: prepare entries, seed the cache from the root on a
//! miss, restore hits, run the init hook with cache hints injected, then
//! store whatever the hook built for the misses.

use crate::cache::{project_token, CacheManager};
use crate::cli::args::InitArgs;
use crate::cli::commands::{derive_env_name, resolve_working_copy};
use crate::config::Config;
use crate::db::{CacheEvent, Db};
use crate::error::{MonoError, MonoResult};
use crate::script::{run_script, ScriptEnv};
use console::style;
use tracing::{info, warn};

/// Execute the init command
pub async fn execute(args: InitArgs) -> MonoResult<()> {
    let path = resolve_working_copy(args.path)?;
    let env_name = derive_env_name(&path);

    let db = Db::open()?;
    if db.environment_exists(&path)? {
        return Err(MonoError::EnvironmentExists(path));
    }

    let mut config = Config::load(&path).await?;
    config.apply_defaults(&path)?;

    let manager = CacheManager::new()?;
    manager.ensure_directories().await?;

    if manager.sccache_available() {
        info!("sccache detected, compilation caching enabled");
    } else {
        info!("sccache not found, compilation caching disabled");
        info!("hint: install sccache for faster builds: cargo install sccache");
    }

    let root_path = args.root;
    let mut cache_entries = Vec::new();

    if let Some(root) = root_path.as_deref() {
        if !config.build.artifacts.is_empty() {
            match manager
                .prepare_artifact_cache(&config.build.artifacts, root, &path)
                .await
            {
                Ok(entries) => cache_entries = entries,
                Err(e) => warn!("Failed to prepare artifact cache: {}", e),
            }

            if cache_entries.iter().any(|e| !e.hit) {
                match manager
                    .seed_from_root(&config.build.artifacts, root, &path)
                    .await
                {
                    Ok(()) => info!("Attempted to seed cache from project root"),
                    Err(e) => warn!("Failed to seed cache from root: {}", e),
                }

                match manager
                    .prepare_artifact_cache(&config.build.artifacts, root, &path)
                    .await
                {
                    Ok(entries) => cache_entries = entries,
                    Err(e) => warn!("Failed to re-prepare artifact cache: {}", e),
                }
            }

            let project = project_token(root);
            for entry in &mut cache_entries {
                if entry.hit {
                    info!("Cache hit for {} (key: {})", entry.name, entry.key);
                    if let Err(e) = manager.restore_from_cache(entry).await {
                        warn!("Failed to restore cache: {}", e);
                        entry.hit = false;
                    } else if let Err(e) =
                        db.record_cache_event(CacheEvent::Hit, &project, &entry.name, &entry.key)
                    {
                        warn!("Failed to record cache hit: {}", e);
                    }
                } else {
                    info!("Cache miss for {} (key: {})", entry.name, entry.key);
                    if let Err(e) =
                        db.record_cache_event(CacheEvent::Miss, &project, &entry.name, &entry.key)
                    {
                        warn!("Failed to record cache miss: {}", e);
                    }
                }
            }
        }
    }

    let all_hit = cache_entries.iter().all(|e| e.hit);

    let env_id = db.insert_environment(&path, None, root_path.as_deref())?;
    info!("Registered environment (id={})", env_id);

    if let Some(init_script) = config.scripts.init.clone() {
        let script_env = ScriptEnv {
            env_name: env_name.clone(),
            env_id,
            env_path: path.clone(),
            root_path: root_path.clone(),
        };

        let mut vars = script_env.to_vars();
        vars.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(manager.env_vars(&config.build));
        vars.extend(manager.hint_vars(all_hit));

        info!("Running init script: {}", init_script);
        if let Err(e) = run_script(&path, &init_script, &vars).await {
            if let Err(cleanup) = db.delete_environment(&path) {
                warn!("Failed to unregister after init failure: {}", cleanup);
            }
            return Err(e);
        }
        info!("Init script completed");
    }

    for entry in &mut cache_entries {
        if !entry.hit {
            if let Err(e) = manager.store_to_cache(entry).await {
                warn!("Failed to store {} to cache: {}", entry.name, e);
            } else {
                info!("Stored {} to cache (key: {})", entry.name, entry.key);
                entry.hit = true;
            }
        }
    }

    println!(
        "{} Environment initialized: {}",
        style("✓").green(),
        style(&env_name).bold()
    );
    println!("  Path: {}", path.display());
    if let Some(root) = &root_path {
        println!("  Root: {}", root.display());
    }
    if !cache_entries.is_empty() {
        let hits = cache_entries.iter().filter(|e| e.hit).count();
        println!("  Cache: {}/{} artifact(s) warm", hits, cache_entries.len());
    }

    Ok(())
}
