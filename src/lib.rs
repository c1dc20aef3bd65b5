//! Usage statistics across locally stored AI coding agent session logs.
//!
//! The engine keeps a versioned on-disk cache of per-session numbers and
//! only rereads session files that appeared or changed since the last run.

pub mod config;
pub mod cost;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod parser;
pub mod provider;
pub mod reconcile;
pub mod stats;
pub mod stats_cache;

pub use config::Config;
pub use engine::{StatsEngine, StatsProgress, PROGRESS_BATCH};
pub use error::{Error, Result};
pub use provider::{all_providers, provider_spec, ProviderSource, ProviderSpec, CLAUDE_CODE, CODEX};
pub use stats::{CachedSessionStats, GlobalAggregate, ProviderAggregate, Totals};
pub use stats_cache::{GlobalStatsCache, StatsCacheStore, STATS_CACHE_VERSION};
