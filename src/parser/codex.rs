use log::{debug, warn};
use serde::Deserialize;

use crate::stats::{CachedSessionStats, LenientU64};

#[derive(Deserialize, Default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    /// Legacy top-level message records carry the role inline
    role: Option<String>,
    payload: Option<RawPayload>,
}

#[derive(Deserialize, Default)]
struct RawPayload {
    #[serde(rename = "type")]
    payload_type: Option<String>,
    role: Option<String>,
    info: Option<TokenCountInfo>,
}

#[derive(Deserialize, Default)]
struct TokenCountInfo {
    total_token_usage: Option<TokenUsage>,
}

#[derive(Deserialize, Default)]
struct TokenUsage {
    #[serde(default)]
    input_tokens: LenientU64,
    #[serde(default)]
    cached_input_tokens: LenientU64,
    #[serde(default)]
    output_tokens: LenientU64,
}

fn is_conversation_role(role: Option<&str>) -> bool {
    matches!(role, Some("user") | Some("assistant"))
}

impl RawRecord {
    fn is_message(&self) -> bool {
        match self.record_type.as_deref() {
            Some("response_item") => self.payload.as_ref().is_some_and(|p| {
                p.payload_type.as_deref() == Some("message")
                    && is_conversation_role(p.role.as_deref())
            }),
            Some("message") => is_conversation_role(self.role.as_deref()),
            _ => false,
        }
    }

    fn token_usage(&self) -> Option<&TokenUsage> {
        if self.record_type.as_deref() != Some("event_msg") {
            return None;
        }
        let payload = self.payload.as_ref()?;
        if payload.payload_type.as_deref() != Some("token_count") {
            return None;
        }
        payload.info.as_ref()?.total_token_usage.as_ref()
    }
}

/// Codex rollout: one JSON record per line. Every `token_count` event's
/// usage snapshot is added to the running total.
pub fn parse_event_stream(content: &str) -> CachedSessionStats {
    let (stats, skipped) = scan_event_stream(content);
    if skipped > 0 {
        warn!("Skipped {} malformed Codex records", skipped);
    }
    stats
}

/// Returns the stats and the number of lines that failed to decode.
fn scan_event_stream(content: &str) -> (CachedSessionStats, usize) {
    let mut stats = CachedSessionStats::default();
    let mut skipped = 0;

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: RawRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                debug!("Malformed record on line {}: {}", line_no + 1, e);
                skipped += 1;
                continue;
            }
        };

        if record.is_message() {
            stats.message_count = stats.message_count.saturating_add(1);
        }
        if let Some(usage) = record.token_usage() {
            stats.input_tokens = stats.input_tokens.saturating_add(*usage.input_tokens);
            stats.output_tokens = stats.output_tokens.saturating_add(*usage.output_tokens);
            stats.cached_input_tokens = stats
                .cached_input_tokens
                .saturating_add(*usage.cached_input_tokens);
        }
    }
    (stats, skipped)
}
