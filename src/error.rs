//! Error types for the reel publishing pipeline.
//!
//! Record-scoped failures ([`ScheduleError`], [`PublishError`]) never abort a
//! batch run. Only [`ManifestError`] and [`ConfigError`] are fatal. No access
//! tokens appear in any of these messages.

use std::path::PathBuf;
use std::time::Duration;

use crate::model::ContainerStatus;

/// Why a record's schedule could not be resolved.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("scheduled time is missing")]
    Missing,

    #[error("bad time format `{value}`: {source}")]
    Invalid {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The wall-clock time falls into a DST gap of the schedule timezone.
    #[error("local time `{value}` does not exist in {timezone}")]
    NonexistentLocalTime { value: String, timezone: String },
}

/// Failure of a single record's container lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("record has no video_url")]
    MissingVideoUrl,

    #[error("container creation failed: {0}")]
    Create(String),

    #[error("status query for container {container_id} failed: {message}")]
    Transport {
        container_id: String,
        message: String,
    },

    #[error("container {container_id} failed with status: {status}")]
    ContainerFailed {
        container_id: String,
        status: ContainerStatus,
    },

    #[error("container {container_id} not ready within {timeout:?} ({polls} polls)")]
    Timeout {
        container_id: String,
        timeout: Duration,
        polls: u32,
    },

    #[error("publishing container {container_id} failed: {message}")]
    Publish {
        container_id: String,
        message: String,
    },
}

impl PublishError {
    /// Whether the failure was caused by the platform rejecting the media
    /// itself. Retrying without regenerating the media is unlikely to help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::ContainerFailed { .. } | Self::MissingVideoUrl
        )
    }
}

/// Failure to read or write the manifest. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("manifest {0} has no header row")]
    MissingHeader(PathBuf),
}

/// Invalid publisher configuration, detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("max concurrent publishes must be at least 1")]
    ZeroConcurrency,

    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),

    #[error("invalid API base URL `{value}`: {source}")]
    InvalidBaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}
