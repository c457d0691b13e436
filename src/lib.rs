// Core modules
mod config;
mod error;
mod graph_client;
mod model;
mod schedule;

pub mod manifest;
pub mod publish;

mod orchestrator;

// Re-export key types and functions
pub use config::{
    DEFAULT_GRAPH_BASE, DEFAULT_GRAPH_VERSION, DEFAULT_MANIFEST_PATH, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_TIMEZONE, GraphApiConfig, PollSettings, PublisherConfig,
};
pub use error::{ConfigError, ManifestError, PublishError, ScheduleError};
pub use graph_client::{ContainerRequest, GraphApiClient, ReelsApi};
pub use manifest::{CsvManifest, Manifest, ManifestStore};
pub use model::{ContainerStatus, PostRecord, PublishedReel, parse_bool};
pub use orchestrator::{DueEntry, Orchestrator, RunSummary};
pub use publish::ContainerLifecycle;
pub use schedule::{Clock, Eligibility, SCHEDULE_FORMAT, ScheduleEvaluator, SystemClock};

use std::sync::Arc;
use anyhow::Result;

/// Convenience function to build an orchestrator over the CSV manifest and
/// the Graph API client described by `config`.
pub fn create_orchestrator(config: &PublisherConfig) -> Result<Orchestrator<CsvManifest>> {
    let api = GraphApiClient::new(config.graph.clone())?;
    let store = CsvManifest::new(&config.manifest_path);

    Ok(Orchestrator::from_config(config, store, Arc::new(api)))
}
