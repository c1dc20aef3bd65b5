use fxhash::FxHashMap;
use log::{debug, warn};
use std::path::Path;
use std::time::Duration;

const OPENROUTER_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";
const REMOTE_CACHE_MAX_AGE: Duration = Duration::from_secs(86400);

/// USD per token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl ModelPricing {
    const fn per_million(input: f64, output: f64, cache_read: f64, cache_write: f64) -> Self {
        Self {
            input: input / 1_000_000.0,
            output: output / 1_000_000.0,
            cache_read: cache_read / 1_000_000.0,
            cache_write: cache_write / 1_000_000.0,
        }
    }

    pub fn estimate(&self, input: u64, output: u64, cache_read: u64, cache_write: u64) -> f64 {
        input as f64 * self.input
            + output as f64 * self.output
            + cache_read as f64 * self.cache_read
            + cache_write as f64 * self.cache_write
    }
}

const OPUS: ModelPricing = ModelPricing::per_million(15.0, 75.0, 1.5, 18.75);
const SONNET: ModelPricing = ModelPricing::per_million(3.0, 15.0, 0.30, 3.75);
const HAIKU: ModelPricing = ModelPricing::per_million(1.0, 5.0, 0.10, 1.25);
const HAIKU_3_5: ModelPricing = ModelPricing::per_million(0.8, 4.0, 0.08, 1.0);

const BUILTIN_PRICING: &[(&str, ModelPricing)] = &[
    ("claude-opus-4", OPUS),
    ("claude-opus-4-1", OPUS),
    ("claude-sonnet-4", SONNET),
    ("claude-sonnet-4-5", SONNET),
    ("claude-3-7-sonnet", SONNET),
    ("claude-3-5-sonnet", SONNET),
    ("claude-haiku-4-5", HAIKU),
    ("claude-3-5-haiku", HAIKU_3_5),
];

/// Model slug → pricing. Built-in Claude rates, optionally overridden by
/// the OpenRouter model list.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: FxHashMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PricingTable {
    pub fn builtin() -> Self {
        let models = BUILTIN_PRICING
            .iter()
            .map(|(slug, p)| (slug.to_string(), *p))
            .collect();
        Self { models }
    }

    /// Built-in table with remote entries layered on top. `cache_path` holds
    /// the last OpenRouter response; it is reused while younger than a day.
    pub fn with_remote_refresh(cache_path: &Path) -> Self {
        let mut table = Self::builtin();
        let remote = fetch_remote_pricing(cache_path);
        debug!("Loaded {} remote pricing entries", remote.len());
        table.models.extend(remote);
        table
    }

    pub fn lookup(&self, model_name: &str) -> Option<ModelPricing> {
        let input = model_name.trim().to_ascii_lowercase();
        let slug = input.rsplit('/').next().unwrap_or(&input);

        if let Some(p) = self.models.get(slug) {
            return Some(*p);
        }

        let stripped = strip_date_suffix(slug);
        if stripped != slug {
            if let Some(p) = self.models.get(stripped) {
                return Some(*p);
            }
        }

        family_default(slug)
    }

    /// Pricing for `model_name`, falling back to Sonnet rates.
    pub fn resolve(&self, model_name: &str) -> ModelPricing {
        self.lookup(model_name).unwrap_or(SONNET)
    }
}

fn family_default(slug: &str) -> Option<ModelPricing> {
    if slug.contains("opus") {
        Some(OPUS)
    } else if slug.contains("sonnet") {
        Some(SONNET)
    } else if slug.contains("haiku") {
        Some(HAIKU)
    } else {
        None
    }
}

/// Strip a trailing `-YYYYMMDD` release date.
fn strip_date_suffix(slug: &str) -> &str {
    let Some(pos) = slug.rfind('-') else {
        return slug;
    };
    if looks_like_yyyymmdd(&slug[pos + 1..]) {
        return &slug[..pos];
    }
    slug
}

fn looks_like_yyyymmdd(tail: &str) -> bool {
    if tail.len() != 8 || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let yyyy: u32 = tail[0..4].parse().unwrap_or(0);
    let mm: u32 = tail[4..6].parse().unwrap_or(0);
    let dd: u32 = tail[6..8].parse().unwrap_or(0);
    (2020..=2100).contains(&yyyy) && (1..=12).contains(&mm) && (1..=31).contains(&dd)
}

// ---------------------------------------------------------------------------
// Remote refresh
// ---------------------------------------------------------------------------

fn parse_openrouter_body(body: &serde_json::Value) -> FxHashMap<String, ModelPricing> {
    let Some(data) = body.get("data").and_then(|d| d.as_array()) else {
        return FxHashMap::default();
    };
    let mut map = FxHashMap::default();
    for m in data {
        let Some(id) = m.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(pr) = m.get("pricing").and_then(|v| v.as_object()) else {
            continue;
        };
        // OpenRouter quotes prices as decimal strings per token
        let rate = |k: &str| -> f64 {
            pr.get(k)
                .and_then(|v| {
                    v.as_str()
                        .and_then(|s| s.parse().ok())
                        .or_else(|| v.as_f64())
                })
                .unwrap_or(0.0)
                .max(0.0)
        };
        let input = rate("prompt");
        let output = rate("completion");
        if input == 0.0 && output == 0.0 {
            continue;
        }
        let slug = id.rsplit('/').next().unwrap_or(id).to_ascii_lowercase();
        map.entry(slug).or_insert(ModelPricing {
            input,
            output,
            cache_read: rate("input_cache_read"),
            cache_write: rate("input_cache_write"),
        });
    }
    map
}

fn read_cached_body(path: &Path) -> Option<serde_json::Value> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn cache_is_fresh(path: &Path) -> bool {
    std::fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age < REMOTE_CACHE_MAX_AGE)
}

fn fetch_remote_pricing(cache_path: &Path) -> FxHashMap<String, ModelPricing> {
    if cache_is_fresh(cache_path) {
        if let Some(body) = read_cached_body(cache_path) {
            let map = parse_openrouter_body(&body);
            if !map.is_empty() {
                return map;
            }
        }
    }

    let body = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(30))
        .build()
        .get(OPENROUTER_MODELS_URL)
        .call()
        .map_err(|e| warn!("Pricing refresh failed: {}", e))
        .ok()
        .and_then(|r| r.into_json::<serde_json::Value>().ok());

    if let Some(ref b) = body {
        let map = parse_openrouter_body(b);
        if !map.is_empty() {
            if let Some(parent) = cache_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(cache_path, b.to_string()) {
                warn!("Failed to write pricing cache {}: {}", cache_path.display(), e);
            }
            return map;
        }
    }

    // Stale copy beats nothing
    read_cached_body(cache_path)
        .map(|b| parse_openrouter_body(&b))
        .unwrap_or_default()
}
