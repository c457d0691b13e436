use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed view of one manifest row.
///
/// Built from the raw row by [`crate::manifest::Manifest::record`]; the raw
/// cells stay authoritative so untouched rows are written back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub posted: bool,
    /// Naive `YYYY-MM-DD HH:MM` in the schedule timezone, trimmed.
    pub scheduled_time: Option<String>,
    pub video_url: String,
    pub caption: String,
    pub share_to_feed: bool,
    pub cover_url: Option<String>,
}

impl Default for PostRecord {
    fn default() -> Self {
        Self {
            posted: false,
            scheduled_time: None,
            video_url: String::new(),
            caption: String::new(),
            share_to_feed: true,
            cover_url: None,
        }
    }
}

/// Parse a manifest boolean cell. Accepts `1`, `true`, `yes`, `y` in any
/// case; everything else is false.
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

/// Trimmed cell contents, or `None` when blank.
pub(crate) fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Processing state of a media container as reported by the platform
/// (`status_code` field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContainerStatus {
    Finished,
    InProgress,
    Error,
    Expired,
    Published,
    /// Anything the platform adds later. Treated as not finished.
    Other(String),
}

impl ContainerStatus {
    /// `ERROR` and `EXPIRED` can never become `FINISHED`.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Expired)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Finished => "FINISHED",
            Self::InProgress => "IN_PROGRESS",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
            Self::Published => "PUBLISHED",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ContainerStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "FINISHED" => Self::Finished,
            "IN_PROGRESS" => Self::InProgress,
            "ERROR" => Self::Error,
            "EXPIRED" => Self::Expired,
            "PUBLISHED" => Self::Published,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ContainerStatus> for String {
    fn from(status: ContainerStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful lifecycle. `media_id` may be empty when the
/// platform omits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedReel {
    pub container_id: String,
    pub media_id: String,
}
