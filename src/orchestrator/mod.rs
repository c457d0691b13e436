//! Batch run orchestration: evaluate every manifest record, publish the due
//! ones, and persist the manifest once if anything changed.

use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::PublisherConfig;
use crate::error::{ManifestError, PublishError};
use crate::graph_client::ReelsApi;
use crate::manifest::ManifestStore;
use crate::model::{PostRecord, PublishedReel};
use crate::publish::ContainerLifecycle;
use crate::schedule::{Eligibility, ScheduleEvaluator};

/// What one batch run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records found due this run.
    pub due_count: usize,
    /// Records flipped to `posted=true`.
    pub updated_count: usize,
    /// Due records whose lifecycle failed; they stay eligible next run.
    pub failed_count: usize,
    /// Unposted records without a usable schedule.
    pub skipped_count: usize,
    /// Whether the manifest was written back.
    pub persisted: bool,
}

/// A record that would be published by a run at the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    pub index: usize,
    pub video_url: String,
    pub scheduled_at: DateTime<Tz>,
}

type Outcome = (usize, Result<PublishedReel, PublishError>);

pub struct Orchestrator<S> {
    store: S,
    evaluator: ScheduleEvaluator,
    lifecycle: Arc<ContainerLifecycle>,
    max_concurrent: usize,
}

impl<S: ManifestStore> Orchestrator<S> {
    /// Sequential orchestrator: one lifecycle at a time, in manifest order.
    pub fn new(store: S, evaluator: ScheduleEvaluator, lifecycle: ContainerLifecycle) -> Self {
        Self {
            store,
            evaluator,
            lifecycle: Arc::new(lifecycle),
            max_concurrent: 1,
        }
    }

    pub fn from_config(config: &PublisherConfig, store: S, api: Arc<dyn ReelsApi>) -> Self {
        Self::new(
            store,
            ScheduleEvaluator::new(config.timezone),
            ContainerLifecycle::new(api, config.poll),
        )
        .with_max_concurrent(config.max_concurrent)
    }

    /// Allow up to `max` lifecycles in flight. Lifecycles still start in
    /// manifest order.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Classify every record, collecting the due ones.
    fn collect_due<Z: TimeZone>(
        &self,
        records: impl Iterator<Item = PostRecord>,
        now: &DateTime<Z>,
        summary: &mut RunSummary,
    ) -> Vec<(usize, PostRecord, DateTime<Tz>)> {
        let mut due = Vec::new();
        for (index, record) in records.enumerate() {
            match self.evaluator.evaluate(&record, now) {
                Eligibility::Due { at } => due.push((index, record, at)),
                Eligibility::NotYetDue { at } => {
                    debug!(row = index, scheduled_at = %at, "Not due yet");
                }
                Eligibility::Unscheduled | Eligibility::InvalidSchedule(_) => {
                    summary.skipped_count += 1;
                }
                Eligibility::AlreadyPosted => {}
            }
        }
        due
    }

    /// List what a run at `now` would publish, without calling the API or
    /// writing the manifest.
    pub fn preview<Z: TimeZone>(&self, now: &DateTime<Z>) -> Result<Vec<DueEntry>, ManifestError> {
        let manifest = self.store.load()?;
        let mut summary = RunSummary::default();

        Ok(self
            .collect_due(manifest.records(), now, &mut summary)
            .into_iter()
            .map(|(index, record, scheduled_at)| DueEntry {
                index,
                video_url: record.video_url,
                scheduled_at,
            })
            .collect())
    }

    /// Run one batch at `now`.
    ///
    /// Only a manifest load or save failure is returned as an error;
    /// per-record failures are logged and counted.
    pub async fn run<Z: TimeZone>(&self, now: &DateTime<Z>) -> Result<RunSummary, ManifestError> {
        let mut manifest = self.store.load()?;
        let mut summary = RunSummary::default();

        let due = self.collect_due(manifest.records(), now, &mut summary);
        summary.due_count = due.len();
        if due.is_empty() {
            info!("Nothing due to publish");
            return Ok(summary);
        }
        info!(due = due.len(), "Publishing due reels");

        let mut dirty = false;
        for (index, outcome) in self.publish_all(due).await {
            match outcome {
                Ok(reel) => {
                    if manifest.mark_posted(index) {
                        dirty = true;
                        summary.updated_count += 1;
                    }
                    info!(row = index, media_id = %reel.media_id, "Marked posted");
                }
                Err(err) => {
                    summary.failed_count += 1;
                    error!(
                        row = index,
                        permanent = err.is_permanent(),
                        "Failed to publish reel: {}",
                        err
                    );
                }
            }
        }

        if dirty {
            self.store.save(&manifest)?;
            summary.persisted = true;
            info!(updated = summary.updated_count, "Manifest updated");
        } else {
            warn!("No reels published, manifest left unchanged");
        }

        Ok(summary)
    }

    /// Run the lifecycles for `due`, at most `max_concurrent` at a time.
    ///
    /// Permits are taken in manifest order before each spawn, so with a
    /// single permit the lifecycles run strictly one after another. Outcomes
    /// are returned sorted by row index.
    async fn publish_all(&self, due: Vec<(usize, PostRecord, DateTime<Tz>)>) -> Vec<Outcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (index, record, scheduled_at) in due {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let lifecycle = self.lifecycle.clone();
            debug!(row = index, %scheduled_at, "Starting lifecycle");

            tasks.spawn(async move {
                let _permit = permit;
                (index, lifecycle.publish(&record).await)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Publish task aborted: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollSettings;
    use crate::manifest::Manifest;
    use crate::publish::lifecycle::tests::{Call, ScriptedApi};
    use chrono_tz::Asia::Kolkata;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Manifest store that keeps everything in memory and counts writes.
    struct MemoryStore {
        manifest: Mutex<Option<Manifest>>,
        saves: Mutex<usize>,
    }

    impl MemoryStore {
        fn new(rows: &[[&str; 6]]) -> Self {
            let headers: Vec<String> = [
                "posted",
                "scheduled_time_local",
                "video_url",
                "caption",
                "share_to_feed",
                "cover_url",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect();
            let rows: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect();
            Self {
                manifest: Mutex::new(Some(Manifest::new(headers, rows))),
                saves: Mutex::new(0),
            }
        }

        fn unreadable() -> Self {
            Self {
                manifest: Mutex::new(None),
                saves: Mutex::new(0),
            }
        }

        fn snapshot(&self) -> Manifest {
            self.manifest.lock().unwrap().clone().unwrap()
        }

        fn saves(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    impl ManifestStore for &MemoryStore {
        fn load(&self) -> Result<Manifest, ManifestError> {
            self.manifest.lock().unwrap().clone().ok_or_else(|| ManifestError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            })
        }

        fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
            *self.manifest.lock().unwrap() = Some(manifest.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn orchestrator<'a>(
        store: &'a MemoryStore,
        api: Arc<ScriptedApi>,
    ) -> Orchestrator<&'a MemoryStore> {
        let poll = PollSettings {
            interval: Duration::from_secs(8),
            timeout: Duration::from_secs(180),
        };
        let lifecycle = ContainerLifecycle::new(api, poll);
        Orchestrator::new(store, ScheduleEvaluator::new(Kolkata), lifecycle)
    }

    fn now() -> DateTime<Tz> {
        Kolkata.with_ymd_and_hms(2025, 1, 10, 9, 1, 30).unwrap()
    }

    #[tokio::test]
    async fn test_due_record_is_published_and_persisted_once() {
        let store = MemoryStore::new(&[
            ["false", "2025-01-10 09:00", "https://cdn/a.mp4", "hi", "true", ""],
        ]);
        let api = ScriptedApi::new(&["FINISHED"]);

        let summary = orchestrator(&store, api.clone()).run(&now()).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                due_count: 1,
                updated_count: 1,
                failed_count: 0,
                skipped_count: 0,
                persisted: true,
            }
        );
        assert_eq!(
            api.calls(),
            vec![
                Call::Create("https://cdn/a.mp4".to_string()),
                Call::Status("c1".to_string()),
                Call::Publish("c1".to_string()),
            ]
        );
        assert_eq!(store.saves(), 1);
        assert!(store.snapshot().record(0).unwrap().posted);
    }

    #[tokio::test]
    async fn test_posted_records_are_untouched() {
        let store = MemoryStore::new(&[
            ["YES", "2025-01-10 08:00", "https://cdn/old.mp4", "", "", ""],
            ["false", "2025-01-10 09:00", "https://cdn/new.mp4", "", "", ""],
        ]);
        let before = store.snapshot().rows()[0].clone();
        let api = ScriptedApi::new(&["FINISHED"]);

        orchestrator(&store, api.clone()).run(&now()).await.unwrap();

        assert_eq!(store.snapshot().rows()[0], before);
        assert!(
            !api.calls()
                .contains(&Call::Create("https://cdn/old.mp4".to_string()))
        );
    }

    #[tokio::test]
    async fn test_bad_schedule_is_skipped_without_calls_or_write() {
        let store = MemoryStore::new(&[
            ["false", "10/01/2025 9am", "https://cdn/a.mp4", "", "", ""],
            ["false", "", "https://cdn/b.mp4", "", "", ""],
        ]);
        let api = ScriptedApi::new(&["FINISHED"]);

        let summary = orchestrator(&store, api.clone()).run(&now()).await.unwrap();

        assert_eq!(summary.skipped_count, 2);
        assert_eq!(summary.due_count, 0);
        assert!(!summary.persisted);
        assert!(api.calls().is_empty());
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = MemoryStore::new(&[["", "2025-01-10 09:00", "https://cdn/a.mp4", "", "", ""]]);
        let api = ScriptedApi::new(&["FINISHED"]);
        let orchestrator = orchestrator(&store, api.clone());

        let first = orchestrator.run(&now()).await.unwrap();
        let second = orchestrator.run(&now()).await.unwrap();

        assert!(first.persisted);
        assert_eq!(second, RunSummary::default());
        assert_eq!(store.saves(), 1);
        assert_eq!(api.publish_calls(), 1);
    }

    #[tokio::test]
    async fn test_future_record_is_not_published() {
        let store = MemoryStore::new(&[
            ["false", "2025-01-10 09:02", "https://cdn/a.mp4", "", "", ""],
        ]);
        let api = ScriptedApi::new(&["FINISHED"]);

        let summary = orchestrator(&store, api.clone()).run(&now()).await.unwrap();

        assert_eq!(summary.due_count, 0);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_does_not_block_later_records() {
        let store = MemoryStore::new(&[
            ["false", "2025-01-10 08:00", "https://cdn/broken.mp4", "", "", ""],
            ["false", "2025-01-10 09:00", "https://cdn/ok.mp4", "", "", ""],
        ]);
        let api = ScriptedApi::new(&["FINISHED"]);
        api.fail_create_for("https://cdn/broken.mp4");

        let summary = orchestrator(&store, api.clone()).run(&now()).await.unwrap();

        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.updated_count, 1);
        let manifest = store.snapshot();
        assert!(!manifest.record(0).unwrap().posted);
        assert!(manifest.record(1).unwrap().posted);
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_leave_manifest_unwritten() {
        let store = MemoryStore::new(&[
            ["false", "2025-01-10 09:00", "https://cdn/a.mp4", "", "", ""],
        ]);
        let api = ScriptedApi::new(&["ERROR"]);

        let summary = orchestrator(&store, api.clone()).run(&now()).await.unwrap();

        assert_eq!(summary.failed_count, 1);
        assert!(!summary.persisted);
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_manifest_is_fatal() {
        let store = MemoryStore::unreadable();
        let api = ScriptedApi::new(&["FINISHED"]);

        let result = orchestrator(&store, api.clone()).run(&now()).await;

        assert!(matches!(result, Err(ManifestError::Io { .. })));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_run_follows_manifest_order() {
        let store = MemoryStore::new(&[
            ["false", "2025-01-10 09:00", "https://cdn/1.mp4", "", "", ""],
            ["false", "2025-01-09 09:00", "https://cdn/2.mp4", "", "", ""],
        ]);
        let api = ScriptedApi::new(&["FINISHED"]);

        orchestrator(&store, api.clone()).run(&now()).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::Create("https://cdn/1.mp4".to_string()),
                Call::Status("c1".to_string()),
                Call::Publish("c1".to_string()),
                Call::Create("https://cdn/2.mp4".to_string()),
                Call::Status("c2".to_string()),
                Call::Publish("c2".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_flips_the_right_rows() {
        let store = MemoryStore::new(&[
            ["false", "2025-01-10 09:00", "https://cdn/1.mp4", "", "", ""],
            ["false", "2025-02-10 09:00", "https://cdn/later.mp4", "", "", ""],
            ["false", "2025-01-10 09:00", "https://cdn/3.mp4", "", "", ""],
            ["false", "2025-01-10 09:00", "https://cdn/4.mp4", "", "", ""],
        ]);
        let api = ScriptedApi::new(&["IN_PROGRESS", "FINISHED"]);

        let summary = orchestrator(&store, api.clone())
            .with_max_concurrent(3)
            .run(&now())
            .await
            .unwrap();

        assert_eq!(summary.updated_count, 3);
        assert_eq!(store.saves(), 1);
        let posted: Vec<bool> = store.snapshot().records().map(|r| r.posted).collect();
        assert_eq!(posted, vec![true, false, true, true]);
    }

    #[tokio::test]
    async fn test_preview_lists_due_records_without_side_effects() {
        let store = MemoryStore::new(&[
            ["true", "2025-01-10 08:00", "https://cdn/done.mp4", "", "", ""],
            ["false", "2025-01-10 09:01", "https://cdn/due.mp4", "", "", ""],
            ["false", "2025-01-10 09:05", "https://cdn/later.mp4", "", "", ""],
        ]);
        let api = ScriptedApi::new(&["FINISHED"]);

        let due = orchestrator(&store, api.clone()).preview(&now()).unwrap();

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].index, 1);
        assert_eq!(due[0].video_url, "https://cdn/due.mp4");
        assert_eq!(due[0].scheduled_at, Kolkata.with_ymd_and_hms(2025, 1, 10, 9, 1, 0).unwrap());
        assert!(api.calls().is_empty());
        assert_eq!(store.saves(), 0);
    }
}
