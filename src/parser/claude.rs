use regex::Regex;
use std::sync::OnceLock;

use crate::stats::CachedSessionStats;

struct Markers {
    user: Regex,
    assistant: Regex,
    input_tokens: Regex,
    output_tokens: Regex,
    cache_read: Regex,
    cache_creation: Regex,
}

static MARKERS: OnceLock<Markers> = OnceLock::new();

fn markers() -> &'static Markers {
    MARKERS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("static marker pattern");
        Markers {
            user: re(r#""type"\s*:\s*"user""#),
            assistant: re(r#""type"\s*:\s*"assistant""#),
            input_tokens: re(r#""input_tokens"\s*:\s*(\d+)"#),
            output_tokens: re(r#""output_tokens"\s*:\s*(\d+)"#),
            cache_read: re(r#""cache_read_input_tokens"\s*:\s*(\d+)"#),
            cache_creation: re(r#""cache_creation_input_tokens"\s*:\s*(\d+)"#),
        }
    })
}

/// Sum of every numeric capture. Repeated fields are additive; a file that
/// logs the same usage block twice counts it twice.
fn sum_field(re: &Regex, content: &str) -> u64 {
    re.captures_iter(content)
        .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .fold(0u64, u64::saturating_add)
}

/// Claude Code transcript: scanned as one blob for message markers and
/// token-count fields, without decoding individual records.
pub fn parse_marker_scan(content: &str) -> CachedSessionStats {
    let m = markers();
    let user = m.user.find_iter(content).count() as u64;
    let assistant = m.assistant.find_iter(content).count() as u64;

    CachedSessionStats {
        message_count: user + assistant,
        input_tokens: sum_field(&m.input_tokens, content),
        output_tokens: sum_field(&m.output_tokens, content),
        cache_read_tokens: sum_field(&m.cache_read, content),
        cache_creation_tokens: sum_field(&m.cache_creation, content),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = concat!(
        r#"{"type":"user","message":{"role":"user","content":"hi"}}"#,
        "\n",
        r#"{"type":"assistant","message":{"usage":{"input_tokens":100,"cache_read_input_tokens":7,"cache_creation_input_tokens":3,"output_tokens":20}}}"#,
        "\n",
        r#"{"type" : "user","message":{"content":[{"type":"tool_result"}]}}"#,
        "\n",
        r#"{"type":"assistant","message":{"usage":{"input_tokens": 50,"output_tokens":5}}}"#,
        "\n",
    );

    #[test]
    fn test_counts_markers_and_sums_tokens() {
        let stats = parse_marker_scan(SESSION);
        assert_eq!(stats.message_count, 4);
        assert_eq!(stats.input_tokens, 150);
        assert_eq!(stats.output_tokens, 25);
        assert_eq!(stats.cache_read_tokens, 7);
        assert_eq!(stats.cache_creation_tokens, 3);
        assert_eq!(stats.cached_input_tokens, 0);
    }

    #[test]
    fn test_cache_fields_do_not_leak_into_input() {
        let stats = parse_marker_scan(r#"{"cache_read_input_tokens":9,"cache_creation_input_tokens":4}"#);
        assert_eq!(stats.input_tokens, 0);
        assert_eq!(stats.cache_read_tokens, 9);
        assert_eq!(stats.cache_creation_tokens, 4);
    }

    #[test]
    fn test_duplicate_usage_blocks_are_additive() {
        let line = r#"{"type":"assistant","message":{"id":"msg_1","usage":{"input_tokens":10}}}"#;
        let content = format!("{line}\n{line}\n");
        let stats = parse_marker_scan(&content);
        assert_eq!(stats.input_tokens, 20);
        assert_eq!(stats.message_count, 2);
    }

    #[test]
    fn test_malformed_content_contributes_zero() {
        let stats = parse_marker_scan(r#"{"input_tokens": "lots", "output_tokens": -4, truncated"#);
        assert_eq!(stats, CachedSessionStats::default());

        let overflow = parse_marker_scan(r#"{"input_tokens":99999999999999999999999,"output_tokens":2}"#);
        assert_eq!(overflow.input_tokens, 0);
        assert_eq!(overflow.output_tokens, 2);
    }
}
