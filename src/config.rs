use log::warn;
use std::env;
use std::path::PathBuf;

use crate::provider::{all_providers, ProviderSource};

const APP_DIR: &str = "agent-stats";
const CACHE_FILE: &str = "global-stats-cache.json";
const PRICING_FILE: &str = "openrouter-pricing.json";

pub const DEFAULT_PRICING_MODEL: &str = "claude-sonnet-4";

/// Runtime settings, resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: Vec<ProviderSource>,
    pub cache_path: PathBuf,
    pub pricing_cache_path: PathBuf,
    /// Model whose rates price the costed providers
    pub pricing_model: String,
    pub refresh_pricing: bool,
}

fn home_dir() -> String {
    home_or_cwd(non_empty_var("HOME"))
}

fn home_or_cwd(home: Option<String>) -> String {
    home.unwrap_or_else(|| {
        warn!("HOME is not set; resolving agent log roots against the current directory");
        ".".to_string()
    })
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// `$XDG_DATA_HOME/agent-stats`, or `~/.local/share/agent-stats`.
pub fn data_dir() -> PathBuf {
    let base = non_empty_var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(home_dir()).join(".local").join("share"));
    base.join(APP_DIR)
}

fn flag_enabled(key: &str) -> bool {
    non_empty_var(key).is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
}

impl Config {
    pub fn from_env() -> Self {
        let home = home_dir();
        let providers = all_providers()
            .iter()
            .map(|spec| ProviderSource::new(spec, spec.resolve_root(&home)))
            .collect();

        let data_dir = data_dir();
        let cache_path = non_empty_var("AGENT_STATS_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(CACHE_FILE));

        Self {
            providers,
            cache_path,
            pricing_cache_path: data_dir.join(PRICING_FILE),
            pricing_model: non_empty_var("AGENT_STATS_PRICING_MODEL")
                .unwrap_or_else(|| DEFAULT_PRICING_MODEL.to_string()),
            refresh_pricing: flag_enabled("AGENT_STATS_PRICING_REFRESH"),
        }
    }

    /// Explicit roots, for hosts that already know where logs live.
    pub fn for_roots(providers: Vec<ProviderSource>, cache_path: impl Into<PathBuf>) -> Self {
        let cache_path = cache_path.into();
        let pricing_cache_path = cache_path.with_file_name(PRICING_FILE);
        Self {
            providers,
            cache_path,
            pricing_cache_path,
            pricing_model: DEFAULT_PRICING_MODEL.to_string(),
            refresh_pricing: false,
        }
    }
}
