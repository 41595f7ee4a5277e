// src/scheduler.rs
//! Twice-daily trigger in a named timezone.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Days, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::history::RunHistory;
use crate::model::RunRecord;
use crate::orchestrator::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    pub tz: Tz,
    /// Local hours of day, sorted and distinct.
    pub hours: Vec<u32>,
}

impl DailySchedule {
    pub fn new(tz: Tz, hours: &[u32]) -> Self {
        let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
        hours.sort_unstable();
        hours.dedup();
        Self { tz, hours }
    }

    /// First fire instant strictly after `now`. A local time that falls into a
    /// DST gap fires at the first valid instant after it; a repeated local time
    /// fires at its earlier occurrence.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.tz).date_naive();
        for offset in 0..=2u64 {
            let date = today.checked_add_days(Days::new(offset))?;
            for &h in &self.hours {
                let Some(naive) = date.and_hms_opt(h, 0, 0) else {
                    continue;
                };
                let Some(at) = self.resolve_local(naive) else {
                    continue;
                };
                if at > now {
                    return Some(at);
                }
            }
        }
        None
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(early, _) => Some(early.with_timezone(&Utc)),
            LocalResult::None => {
                // gaps are at most an hour in practice; probe forward minute by minute
                (1..=120).find_map(|m| {
                    self.tz
                        .from_local_datetime(&(naive + chrono::Duration::minutes(m)))
                        .earliest()
                        .map(|t| t.with_timezone(&Utc))
                })
            }
        }
    }
}

/// Run once and record the outcome. `None` when the run was skipped or fatal.
pub async fn trigger(pipeline: &Pipeline, history: &RunHistory, reason: &str) -> Option<RunRecord> {
    match pipeline.run().await {
        Ok(record) => {
            info!(target: "scheduler", reason, summary = %record.summary_line(), "run complete");
            history.push(record.clone());
            Some(record)
        }
        Err(PipelineError::AlreadyRunning) => {
            warn!(target: "scheduler", reason, "run already in progress; trigger skipped");
            None
        }
        Err(e) => {
            error!(target: "scheduler", reason, error = %e, "run aborted");
            None
        }
    }
}

/// Block until `shutdown` resolves, firing the pipeline on schedule.
pub async fn run_forever<S>(
    pipeline: Arc<Pipeline>,
    schedule: DailySchedule,
    run_on_start: bool,
    history: Arc<RunHistory>,
    shutdown: S,
) where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if run_on_start {
        tokio::select! {
            _ = &mut shutdown => return,
            _ = trigger(&pipeline, &history, "startup") => {}
        }
    }

    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_fire_after(now) else {
            error!(target: "scheduler", hours = ?schedule.hours, "no fire time could be computed; scheduler stopped");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            target: "scheduler",
            next = %next.with_timezone(&schedule.tz),
            wait_secs = wait.as_secs(),
            "next run scheduled"
        );

        tokio::select! {
            _ = &mut shutdown => {
                info!(target: "scheduler", "shutdown requested; scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!(target: "scheduler", "shutdown requested during run");
                return;
            }
            _ = trigger(&pipeline, &history, "schedule") => {}
        }
    }
}
