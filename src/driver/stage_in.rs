//! Stage-In Scheduler
//!
//! Picks the pending jobs whose start is close enough to begin staging, orders
//! them by expected start and offers the whole queue to every backend. Which
//! jobs actually get space is each backend's decision.

use super::aggregate::invoke_best_effort;
use super::metrics::DriverOp;
use super::BurstBufferDriver;
use crate::domain::job::JobRecord;
use crate::error::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Whether a job belongs in the stage-in queue at `now`
#[inline]
pub fn is_stage_in_candidate(job: &JobRecord, now: i64, horizon_secs: i64) -> bool {
    job.is_pending()
        && job.has_burst_buffer()
        && job.start_time_known()
        && job.start_time <= now.saturating_add(horizon_secs)
}

// =============================================================================
// Stage Queue
// =============================================================================

/// Stage-in candidates in ascending start-time order
///
/// Borrows from the caller's job table, so the caller's read lock must be
/// held for as long as the queue lives.
#[derive(Debug, Clone, Default)]
pub struct StageQueue<'a> {
    entries: Vec<&'a JobRecord>,
}

impl<'a> StageQueue<'a> {
    /// Collect and order candidates. Jobs with equal start times keep their
    /// scan order.
    pub fn build<I>(jobs: I, now: i64, horizon_secs: i64) -> Self
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        let mut entries: Vec<&'a JobRecord> = jobs
            .into_iter()
            .filter(|job| is_stage_in_candidate(job, now, horizon_secs))
            .collect();
        entries.sort_by_key(|job| job.start_time);
        Self { entries }
    }

    pub fn as_slice(&self) -> &[&'a JobRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn job_ids(&self) -> Vec<u32> {
        self.entries.iter().map(|job| job.job_id).collect()
    }
}

/// Build the stage-in queue for `now` with an explicit look-ahead
pub fn build_stage_queue<'a, I>(jobs: I, now: DateTime<Utc>, horizon: chrono::Duration) -> StageQueue<'a>
where
    I: IntoIterator<Item = &'a JobRecord>,
{
    StageQueue::build(jobs, now.timestamp(), horizon.num_seconds())
}

impl BurstBufferDriver {
    /// Offer the current stage-in queue to every backend.
    ///
    /// `jobs` is the live job table; the caller holds its read lock for the
    /// duration of the call.
    pub fn job_try_stage_in<'a, I>(&self, jobs: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        self.job_try_stage_in_at(jobs, Utc::now())
    }

    /// [`job_try_stage_in`](Self::job_try_stage_in) with an explicit clock
    pub fn job_try_stage_in_at<'a, I>(&self, jobs: I, now: DateTime<Utc>) -> Result<()>
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        let timer = self.metrics.start(DriverOp::TryStageIn);

        let horizon = self.registry.config().stage_in_horizon();
        let queue = build_stage_queue(jobs, now, horizon);
        debug!(candidates = queue.len(), "Built stage-in queue");

        let initial = self.registry.init();
        let rc = self.registry.with_plugins(|plugins| {
            invoke_best_effort(plugins, DriverOp::TryStageIn.as_str(), initial, |desc| {
                desc.plugin_mut().job_try_stage_in(queue.as_slice())
            })
        });
        timer.finish(rc.is_err());
        rc
    }
}
