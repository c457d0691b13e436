// Drives one due record from container creation to a live reel.
//
//   CREATED --FINISHED--> READY --publish ok--> PUBLISHED
//   CREATED --ERROR|EXPIRED--> FAILED
//   CREATED --deadline passed--> TIMED_OUT

use std::sync::Arc;

use tracing::{debug, info};

use super::poll::PollBudget;
use crate::config::PollSettings;
use crate::error::PublishError;
use crate::graph_client::{ContainerRequest, ReelsApi};
use crate::model::{ContainerStatus, PostRecord, PublishedReel};

/// Handle to a platform-side container. Lives for one lifecycle only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
}

/// Runs the create / poll / publish sequence for a single record.
pub struct ContainerLifecycle {
    api: Arc<dyn ReelsApi>,
    poll: PollSettings,
}

impl ContainerLifecycle {
    pub fn new(api: Arc<dyn ReelsApi>, poll: PollSettings) -> Self {
        Self { api, poll }
    }

    /// Publish `record` and return the resulting ids.
    ///
    /// Every error is scoped to this record; callers log it and move on.
    pub async fn publish(&self, record: &PostRecord) -> Result<PublishedReel, PublishError> {
        if record.video_url.is_empty() {
            return Err(PublishError::MissingVideoUrl);
        }

        info!(video_url = %record.video_url, "Creating container for due reel");
        let container = self.create(record).await?;
        info!(container_id = %container.id, "Container created, polling status");

        self.await_ready(&container).await?;
        info!(container_id = %container.id, "Container ready, publishing");

        let media_id = self.api.publish_container(&container.id).await?;
        info!(container_id = %container.id, media_id = %media_id, "Published reel");

        Ok(PublishedReel {
            container_id: container.id,
            media_id,
        })
    }

    async fn create(&self, record: &PostRecord) -> Result<Container, PublishError> {
        let request = ContainerRequest::from(record);
        let id = self.api.create_container(&request).await?;
        Ok(Container { id })
    }

    /// Poll until the container is `FINISHED`, has failed, or the budget
    /// runs out.
    async fn await_ready(&self, container: &Container) -> Result<(), PublishError> {
        let budget = PollBudget::start(self.poll);
        let mut polls = 0u32;

        loop {
            let status = self.api.container_status(&container.id).await?;
            polls += 1;

            match status {
                ContainerStatus::Finished => return Ok(()),
                status if status.is_failure() => {
                    return Err(PublishError::ContainerFailed {
                        container_id: container.id.clone(),
                        status,
                    });
                }
                status => {
                    debug!(container_id = %container.id, %status, polls, "Container not ready");
                }
            }

            if budget.wait().await.is_err() {
                return Err(PublishError::Timeout {
                    container_id: container.id.clone(),
                    timeout: budget.timeout(),
                    polls,
                });
            }
        }
    }
}
