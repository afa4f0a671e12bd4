use serde::{Deserialize, Serialize};

/// Metadata attached to a commit: who, why, when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Author identifier (free-form).
    pub author: String,
    /// Commit message.
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl CommitInfo {
    /// Create commit info stamped with the current wall-clock time.
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// Create commit info with an explicit timestamp.
    pub fn at(
        author: impl Into<String>,
        message: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            timestamp_ms,
        }
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
