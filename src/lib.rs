//! mono - Build-artifact cache for parallel working copies
//!
//! Shares large, reproducible build outputs (`target/`, `node_modules/`)
//! across working copies of the same project via hardlinks into a
//! content-addressed local cache.

pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod script;

pub use error::{MonoError, MonoResult};
