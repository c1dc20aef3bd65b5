use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

use crate::cost::ModelPricing;
use crate::stats_cache::ProviderCache;

/// Provider-specific path composition, e.g. `my-project/abc123` or
/// `2025/01/31/rollout-abc123`. Unique within one provider.
pub type SessionKey = String;

/// Parsed numbers for one session file. Replaced wholesale whenever the
/// file's mtime advances.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachedSessionStats {
    pub message_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cached_input_tokens: u64,
    pub size_bytes: u64,
    pub file_mtime_millis: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAggregate {
    pub session_count: u64,
    pub message_count: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cached_input_tokens: u64,
    pub cost_usd: f64,
    pub has_cost_data: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub sessions: u64,
    pub messages: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cached_input_tokens: u64,
    pub cost_usd: f64,
    pub size_bytes: u64,
}

/// One emitted snapshot.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAggregate {
    pub totals: Totals,
    pub has_cost_data: bool,
    pub is_complete: bool,
    pub by_provider: BTreeMap<String, ProviderAggregate>,
}

/// Sum every cached session of one provider. Cost is only computed for
/// providers whose logs can be billed.
pub fn aggregate_provider(
    cache: &ProviderCache,
    has_cost_data: bool,
    pricing: &ModelPricing,
) -> ProviderAggregate {
    let mut agg = cache
        .sessions
        .values()
        .fold(ProviderAggregate::default(), |mut acc, s| {
            acc.message_count = acc.message_count.saturating_add(s.message_count);
            acc.tokens_in = acc.tokens_in.saturating_add(s.input_tokens);
            acc.tokens_out = acc.tokens_out.saturating_add(s.output_tokens);
            acc.cache_read_tokens = acc.cache_read_tokens.saturating_add(s.cache_read_tokens);
            acc.cache_creation_tokens = acc
                .cache_creation_tokens
                .saturating_add(s.cache_creation_tokens);
            acc.cached_input_tokens = acc.cached_input_tokens.saturating_add(s.cached_input_tokens);
            acc.size_bytes = acc.size_bytes.saturating_add(s.size_bytes);
            acc
        });
    agg.session_count = cache.sessions.len() as u64;

    if has_cost_data {
        agg.has_cost_data = true;
        agg.cost_usd = pricing.estimate(
            agg.tokens_in,
            agg.tokens_out,
            agg.cache_read_tokens,
            agg.cache_creation_tokens,
        );
    }
    agg
}

/// Fold provider aggregates into one snapshot. Providers without sessions
/// are left out of `by_provider`.
pub fn aggregate_global<'a, I>(providers: I, is_complete: bool) -> GlobalAggregate
where
    I: IntoIterator<Item = (&'a str, ProviderAggregate)>,
{
    let mut global = GlobalAggregate {
        is_complete,
        ..Default::default()
    };

    for (id, agg) in providers {
        if agg.session_count == 0 {
            continue;
        }
        let t = &mut global.totals;
        // Counters saturate on absurd values from corrupt logs
        t.sessions = t.sessions.saturating_add(agg.session_count);
        t.messages = t.messages.saturating_add(agg.message_count);
        t.tokens_in = t.tokens_in.saturating_add(agg.tokens_in);
        t.tokens_out = t.tokens_out.saturating_add(agg.tokens_out);
        t.cache_read_tokens = t.cache_read_tokens.saturating_add(agg.cache_read_tokens);
        t.cache_creation_tokens = t
            .cache_creation_tokens
            .saturating_add(agg.cache_creation_tokens);
        t.cached_input_tokens = t.cached_input_tokens.saturating_add(agg.cached_input_tokens);
        t.cost_usd += agg.cost_usd;
        t.size_bytes = t.size_bytes.saturating_add(agg.size_bytes);
        global.has_cost_data |= agg.has_cost_data;
        global.by_provider.insert(id.to_string(), agg);
    }
    global
}

// ---------------------------------------------------------------------------
// Lenient numeric decoding for agent-owned JSON
// ---------------------------------------------------------------------------

/// Accepts integers, floats and numeric strings; anything else is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LenientU64(pub u64);

impl<'de> serde::Deserialize<'de> for LenientU64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{IgnoredAny, MapAccess, SeqAccess, Visitor};
        struct LenientVisitor;
        impl<'de> Visitor<'de> for LenientVisitor {
            type Value = u64;
            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a number")
            }
            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(v)
            }
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(v.max(0) as u64)
            }
            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
                Ok(if v.is_finite() && v > 0.0 { v as u64 } else { 0 })
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(v.trim().parse::<f64>().map(|f| f.max(0.0) as u64).unwrap_or(0))
            }
            fn visit_bool<E>(self, _: bool) -> Result<Self::Value, E> {
                Ok(0)
            }
            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(0)
            }
            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(0)
            }
            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(0)
            }
            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(0)
            }
        }
        deserializer.deserialize_any(LenientVisitor).map(LenientU64)
    }
}

impl Deref for LenientU64 {
    type Target = u64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

pub fn format_number_full(value: u64) -> String {
    let digits = value.to_string();
    let len = digits.len();
    if len <= 3 {
        return digits;
    }

    let mut out = String::with_capacity(len + (len - 1) / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_bytes(value: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", value)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::PricingTable;

    fn sonnet() -> ModelPricing {
        PricingTable::builtin().resolve("claude-sonnet-4")
    }

    fn session(input: u64, output: u64, messages: u64) -> CachedSessionStats {
        CachedSessionStats {
            message_count: messages,
            input_tokens: input,
            output_tokens: output,
            size_bytes: 10,
            ..Default::default()
        }
    }

    fn cache_of(entries: &[(&str, CachedSessionStats)]) -> ProviderCache {
        let mut cache = ProviderCache::default();
        for (k, s) in entries {
            cache.sessions.insert(k.to_string(), *s);
        }
        cache
    }

    #[test]
    fn test_aggregate_provider_sums_fields() {
        let cache = cache_of(&[("a/1", session(100, 10, 2)), ("a/2", session(50, 5, 3))]);
        let agg = aggregate_provider(&cache, false, &sonnet());
        assert_eq!(agg.session_count, 2);
        assert_eq!(agg.message_count, 5);
        assert_eq!(agg.tokens_in, 150);
        assert_eq!(agg.tokens_out, 15);
        assert_eq!(agg.size_bytes, 20);
    }

    #[test]
    fn test_cost_gated_by_capability() {
        let cache = cache_of(&[("x", session(5_000_000_000, 9_000_000_000, 1))]);
        let pricing = sonnet();

        let uncosted = aggregate_provider(&cache, false, &pricing);
        assert_eq!(uncosted.cost_usd, 0.0);
        assert!(!uncosted.has_cost_data);

        let costed = aggregate_provider(&cache, true, &pricing);
        assert!(costed.cost_usd > 0.0);
        assert!(costed.has_cost_data);
    }

    #[test]
    fn test_global_omits_empty_providers() {
        let pricing = sonnet();
        let a = aggregate_provider(&cache_of(&[("k", session(1, 2, 3))]), true, &pricing);
        let empty = aggregate_provider(&ProviderCache::default(), true, &pricing);

        let global = aggregate_global([("claude-code", a), ("codex", empty)], true);
        assert_eq!(global.by_provider.len(), 1);
        assert!(global.by_provider.contains_key("claude-code"));
        assert!(!global.by_provider.contains_key("codex"));
        assert_eq!(global.totals.sessions, 1);
        assert!(global.has_cost_data);
        assert!(global.is_complete);
    }

    #[test]
    fn test_global_cost_flag_false_without_costed_provider() {
        let pricing = sonnet();
        let b = aggregate_provider(&cache_of(&[("k", session(1, 2, 3))]), false, &pricing);
        let global = aggregate_global([("codex", b)], false);
        assert!(!global.has_cost_data);
        assert_eq!(global.totals.cost_usd, 0.0);
    }

    #[test]
    fn test_oversized_sessions_saturate() {
        let huge = session(u64::MAX - 1, u64::MAX, 1);
        let cache = cache_of(&[("a", huge), ("b", huge)]);
        let agg = aggregate_provider(&cache, true, &sonnet());
        assert_eq!(agg.tokens_in, u64::MAX);
        assert_eq!(agg.tokens_out, u64::MAX);
        assert_eq!(agg.message_count, 2);
        assert!(agg.cost_usd.is_finite());

        let global = aggregate_global([("claude-code", agg), ("codex", agg)], true);
        assert_eq!(global.totals.tokens_in, u64::MAX);
        assert_eq!(global.totals.sessions, 4);
        assert_eq!(global.totals.messages, 4);
    }

    #[test]
    fn test_lenient_u64() {
        #[derive(Deserialize)]
        struct Probe {
            v: LenientU64,
        }
        let parse = |s: &str| *serde_json::from_str::<Probe>(s).unwrap().v;
        assert_eq!(parse(r#"{"v": 42}"#), 42);
        assert_eq!(parse(r#"{"v": 42.9}"#), 42);
        assert_eq!(parse(r#"{"v": "17"}"#), 17);
        assert_eq!(parse(r#"{"v": -3}"#), 0);
        assert_eq!(parse(r#"{"v": null}"#), 0);
        assert_eq!(parse(r#"{"v": {"nested": 1}}"#), 0);
    }

    #[test]
    fn test_format_number_full() {
        assert_eq!(format_number_full(0), "0");
        assert_eq!(format_number_full(999), "999");
        assert_eq!(format_number_full(1000), "1,000");
        assert_eq!(format_number_full(1234567), "1,234,567");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
