//! Deciding whether a manifest record is due.
//!
//! Schedules are naive wall-clock strings authored in one fixed timezone.
//! Both sides of the comparison are resolved in that zone; comparing against
//! UTC or the host's local time would shift every post by the zone offset.

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::ScheduleError;
use crate::model::PostRecord;

/// Format of `scheduled_time_local` cells.
pub const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Source of "now" in the schedule timezone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock resolved into a fixed timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// Result of evaluating one record against the current time.
#[derive(Debug)]
pub enum Eligibility {
    AlreadyPosted,
    Unscheduled,
    InvalidSchedule(ScheduleError),
    NotYetDue { at: DateTime<Tz> },
    Due { at: DateTime<Tz> },
}

impl Eligibility {
    pub fn is_due(&self) -> bool {
        matches!(self, Self::Due { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleEvaluator {
    tz: Tz,
}

impl ScheduleEvaluator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Resolve a naive schedule string to an instant in the schedule timezone.
    ///
    /// A DST-ambiguous time resolves to its earlier instant; a time inside a
    /// DST gap is rejected.
    pub fn parse(&self, raw: &str) -> Result<DateTime<Tz>, ScheduleError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ScheduleError::Missing);
        }

        let naive = NaiveDateTime::parse_from_str(value, SCHEDULE_FORMAT).map_err(|source| {
            ScheduleError::Invalid {
                value: value.to_string(),
                source,
            }
        })?;

        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| ScheduleError::NonexistentLocalTime {
                value: value.to_string(),
                timezone: self.tz.name().to_string(),
            })
    }

    /// Classify `record` against `now`.
    ///
    /// `now` is truncated to the minute before comparing. Records with a
    /// missing or bad schedule are reported with a warning and never become
    /// due.
    pub fn evaluate<Z: TimeZone>(&self, record: &PostRecord, now: &DateTime<Z>) -> Eligibility {
        if record.posted {
            return Eligibility::AlreadyPosted;
        }

        let at = match record.scheduled_time.as_deref().map(|raw| self.parse(raw)) {
            Some(Ok(at)) => at,
            None | Some(Err(ScheduleError::Missing)) => {
                warn!(video_url = %record.video_url, "Skipping record: {}", ScheduleError::Missing);
                return Eligibility::Unscheduled;
            }
            Some(Err(err)) => {
                warn!(video_url = %record.video_url, "Skipping record: {}", err);
                return Eligibility::InvalidSchedule(err);
            }
        };

        if truncate_to_minute(now.with_timezone(&self.tz)) < at {
            Eligibility::NotYetDue { at }
        } else {
            Eligibility::Due { at }
        }
    }

    pub fn is_due<Z: TimeZone>(&self, record: &PostRecord, now: &DateTime<Z>) -> bool {
        self.evaluate(record, now).is_due()
    }
}

fn truncate_to_minute(now: DateTime<Tz>) -> DateTime<Tz> {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}
