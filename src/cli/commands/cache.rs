//! Cache command - inspect and prune the artifact cache

use crate::cache::{format_bytes, CacheManager, CacheSizeEntry};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::db::{CacheStats, Db};
use crate::error::MonoResult;
use chrono::{DateTime, Utc};
use console::style;
use std::collections::HashMap;
use std::io::{self, Write};
use tracing::warn;

/// Execute the cache command
pub async fn execute(args: CacheArgs) -> MonoResult<()> {
    let manager = CacheManager::new()?;

    match args.action {
        CacheAction::List { format } => list_entries(&manager, format).await,
        CacheAction::Stats => show_stats(&manager).await,
        CacheAction::Remove {
            project,
            artifact,
            key,
        } => remove_entry(&manager, &project, &artifact, &key).await,
        CacheAction::Clear { yes } => clear_all(&manager, yes).await,
    }
}

/// List all cache entries with sizes
async fn list_entries(manager: &CacheManager, format: OutputFormat) -> MonoResult<()> {
    let sizes = manager.cache_sizes().await?;

    if sizes.is_empty() {
        println!("No cache entries found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_size_table(&sizes),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sizes)?),
        OutputFormat::Plain => {
            for entry in &sizes {
                println!("{}/{}/{}", entry.project, entry.artifact, entry.cache_key);
            }
        }
    }

    Ok(())
}

fn print_size_table(sizes: &[CacheSizeEntry]) {
    println!(
        "{:<28} {:<12} {:<18} {:>10}",
        "PROJECT", "ARTIFACT", "KEY", "SIZE"
    );
    println!("{}", "-".repeat(72));

    let mut total = 0u64;
    for entry in sizes {
        total += entry.size;
        println!(
            "{:<28} {:<12} {:<18} {:>10}",
            entry.project,
            entry.artifact,
            entry.cache_key,
            format_bytes(entry.size)
        );
    }

    println!("{}", "-".repeat(72));
    println!("Total: {} entries, {}", sizes.len(), format_bytes(total));
}

/// Show per-entry hit/miss statistics merged with on-disk sizes
async fn show_stats(manager: &CacheManager) -> MonoResult<()> {
    let sizes = manager.cache_sizes().await?;

    if sizes.is_empty() {
        println!("No cache entries found.");
        return Ok(());
    }

    let db = Db::open()?;
    let stats = db.cache_stats()?;
    let stats_map: HashMap<String, &CacheStats> = stats
        .iter()
        .map(|s| (entry_key(&s.project, &s.artifact, &s.cache_key), s))
        .collect();

    println!(
        "{:<28} {:<12} {:<18} {:>6} {:>8} {:>10}   {}",
        "PROJECT", "ARTIFACT", "KEY", "HITS", "MISSES", "SIZE", "LAST USED"
    );
    println!("{}", "-".repeat(100));

    let mut total = 0u64;
    for entry in &sizes {
        total += entry.size;
        let key = entry_key(&entry.project, &entry.artifact, &entry.cache_key);

        let (hits, misses, last_used) = match stats_map.get(&key) {
            Some(s) => (s.hits, s.misses, format_time_ago(s.last_used)),
            None => (0, 0, "never".to_string()),
        };

        println!(
            "{:<28} {:<12} {:<18} {:>6} {:>8} {:>10}   {}",
            entry.project,
            entry.artifact,
            entry.cache_key,
            hits,
            misses,
            format_bytes(entry.size),
            last_used
        );
    }

    println!("{}", "-".repeat(100));
    println!("Total: {} entries, {}", sizes.len(), format_bytes(total));

    Ok(())
}

fn entry_key(project: &str, artifact: &str, key: &str) -> String {
    format!("{project}/{artifact}/{key}")
}

/// Remove a single cache entry plus its event rows
async fn remove_entry(
    manager: &CacheManager,
    project: &str,
    artifact: &str,
    key: &str,
) -> MonoResult<()> {
    manager.remove_entry(project, artifact, key).await?;

    match Db::open() {
        Ok(db) => {
            if let Err(e) = db.delete_cache_events(project, artifact, key) {
                warn!("Failed to delete cache events: {}", e);
            }
        }
        Err(e) => warn!("Failed to open state database: {}", e),
    }

    println!(
        "{} Removed {}/{}/{}",
        style("✓").green(),
        project,
        artifact,
        key
    );
    Ok(())
}

/// Remove everything, with confirmation
async fn clear_all(manager: &CacheManager, skip_confirm: bool) -> MonoResult<()> {
    let sizes = manager.cache_sizes().await?;

    if sizes.is_empty() {
        println!("No cache entries to clear.");
        return Ok(());
    }

    let total: u64 = sizes.iter().map(|e| e.size).sum();
    println!(
        "This will remove {} cache entries ({}).",
        sizes.len(),
        format_bytes(total)
    );

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let (count, bytes) = manager.remove_all().await?;

    match Db::open() {
        Ok(db) => {
            if let Err(e) = db.delete_all_cache_events() {
                warn!("Failed to clear cache events: {}", e);
            }
        }
        Err(e) => warn!("Failed to open state database: {}", e),
    }

    println!(
        "{} Removed {} entries ({})",
        style("✓").green(),
        count,
        format_bytes(bytes)
    );
    Ok(())
}

fn format_time_ago(t: DateTime<Utc>) -> String {
    let elapsed = Utc::now() - t;

    if elapsed < chrono::Duration::minutes(1) {
        return "just now".to_string();
    }
    if elapsed < chrono::Duration::hours(1) {
        let mins = elapsed.num_minutes();
        return if mins == 1 {
            "1 minute ago".to_string()
        } else {
            format!("{mins} minutes ago")
        };
    }
    if elapsed < chrono::Duration::days(1) {
        let hours = elapsed.num_hours();
        return if hours == 1 {
            "1 hour ago".to_string()
        } else {
            format!("{hours} hours ago")
        };
    }
    if elapsed < chrono::Duration::weeks(1) {
        let days = elapsed.num_days();
        return if days == 1 {
            "1 day ago".to_string()
        } else {
            format!("{days} days ago")
        };
    }
    let weeks = elapsed.num_weeks();
    if weeks == 1 {
        "1 week ago".to_string()
    } else {
        format!("{weeks} weeks ago")
    }
}
