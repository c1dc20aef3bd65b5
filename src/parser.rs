//! Per-provider session content parsers.
//!
//! Parsers are pure: raw content in, `CachedSessionStats` out. They never
//! fail; records that cannot be understood contribute zero. The file mtime
//! is stamped by the caller.

mod claude;
mod codex;

pub use claude::parse_marker_scan;
pub use codex::parse_event_stream;

use crate::provider::LogFormat;
use crate::stats::CachedSessionStats;

pub fn parse_session(format: LogFormat, content: &str, size_bytes: u64) -> CachedSessionStats {
    let mut stats = match format {
        LogFormat::MarkerScan => parse_marker_scan(content),
        LogFormat::EventStream => parse_event_stream(content),
    };
    stats.size_bytes = size_bytes;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_is_taken_from_caller() {
        let stats = parse_session(LogFormat::EventStream, "", 1234);
        assert_eq!(stats.size_bytes, 1234);
        assert_eq!(stats.file_mtime_millis, 0);
        assert_eq!(stats.message_count, 0);
    }

    #[test]
    fn test_garbage_never_panics() {
        let junk = "\u{0}\u{1}not json {{{ \"input_tokens\": abc";
        for format in [LogFormat::MarkerScan, LogFormat::EventStream] {
            let stats = parse_session(format, junk, 0);
            assert_eq!(stats.input_tokens, 0);
        }
    }
}
