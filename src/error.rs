use std::fmt;

/// Result type for agent-stats operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the stats engine.
///
/// Almost every failure inside a run is recovered locally (missing files,
/// malformed records, unwritable cache). Only `RunInProgress` reaches the
/// caller of `StatsEngine::compute_global_stats`.
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// JSON encoding or decoding failed
    Json(serde_json::Error),

    /// Another aggregation run is already active in this process
    RunInProgress,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::RunInProgress => write!(f, "a stats run is already in progress"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::RunInProgress => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
