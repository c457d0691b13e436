use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::ConfigError;

pub const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com";
pub const DEFAULT_GRAPH_VERSION: &str = "v20.0";
pub const DEFAULT_MANIFEST_PATH: &str = "posts/manifest.csv";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 8;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";

/// Where and as whom to talk to the Graph API.
#[derive(Clone)]
pub struct GraphApiConfig {
    pub base_url: String,
    pub version: String,
    pub ig_user_id: String,
    pub access_token: String,
}

impl fmt::Debug for GraphApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphApiConfig")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("ig_user_id", &self.ig_user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Cadence and budget of container readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

/// Everything a batch run needs, resolved once at startup and passed in.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub graph: GraphApiConfig,
    pub manifest_path: PathBuf,
    pub poll: PollSettings,
    pub timezone: Tz,
    pub max_concurrent: usize,
}

impl PublisherConfig {
    /// Validate raw settings and build the config.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        graph: GraphApiConfig,
        manifest_path: PathBuf,
        poll_interval_secs: u64,
        poll_timeout_secs: u64,
        timezone: &str,
        max_concurrent: usize,
    ) -> Result<Self, ConfigError> {
        if graph.ig_user_id.trim().is_empty() {
            return Err(ConfigError::Empty("IG_USER_ID"));
        }
        if graph.access_token.trim().is_empty() {
            return Err(ConfigError::Empty("IG_ACCESS_TOKEN"));
        }
        if graph.version.trim().is_empty() {
            return Err(ConfigError::Empty("GRAPH_VERSION"));
        }
        url::Url::parse(&graph.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            value: graph.base_url.clone(),
            source,
        })?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(timezone.to_string()))?;

        Ok(Self {
            graph,
            manifest_path,
            poll: PollSettings {
                interval: Duration::from_secs(poll_interval_secs),
                timeout: Duration::from_secs(poll_timeout_secs),
            },
            timezone,
            max_concurrent,
        })
    }
}
