//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// mono - Build-artifact cache for parallel working copies
///
/// Shares target/ and node_modules/ trees across working copies of the
/// same project via hardlinks into a content-addressed local cache.
#[derive(Parser, Debug)]
#[command(name = "mono")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a working copy and restore cached artifacts into it
    Init(InitArgs),

    /// Capture artifacts, run the destroy hook, and unregister
    Destroy(DestroyArgs),

    /// Capture current build artifacts into the cache
    Sync(SyncArgs),

    /// List registered working copies
    List(ListArgs),

    /// Show artifacts the detector finds in a working copy
    Detect(DetectArgs),

    /// Manage the artifact cache
    Cache(CacheArgs),
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Working copy to initialize (defaults to current directory)
    pub path: Option<PathBuf>,

    /// Canonical root working copy used for cache namespacing and seeding
    #[arg(long, env = "MONO_ROOT_PATH")]
    pub root: Option<PathBuf>,
}

/// Arguments for the destroy command
#[derive(Parser, Debug)]
pub struct DestroyArgs {
    /// Working copy to tear down (defaults to current directory)
    pub path: Option<PathBuf>,
}

/// Arguments for the sync command
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Working copy to capture (defaults to current directory)
    pub path: Option<PathBuf>,

    /// Move artifacts into the cache without hardlinking them back
    /// (teardown capture)
    #[arg(long)]
    pub no_hardlink_back: bool,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the detect command
#[derive(Parser, Debug)]
pub struct DetectArgs {
    /// Working copy to scan (defaults to current directory)
    pub path: Option<PathBuf>,
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cache entries and their sizes
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show hit/miss statistics per cache entry
    Stats,

    /// Remove one cache entry
    Remove {
        /// Project namespace token (see `mono cache list`)
        project: String,
        /// Artifact name
        artifact: String,
        /// Cache key
        key: String,
    },

    /// Remove every cache entry
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
