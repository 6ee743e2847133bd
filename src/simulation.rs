//! Scheduling cycle simulator
//!
//! Drives a [`BurstBufferDriver`] the way a batch scheduler would, over a job
//! table loaded from JSON. One call to [`Simulation::run_cycle`] is one
//! scheduler pass:
//!
//! 1. `load_state` on every backend
//! 2. poll stage-out of completing jobs
//! 3. advance running jobs, starting stage-out once they have run long enough
//! 4. offer the stage-in queue to the backends
//! 5. poll stage-in of pending jobs and start the ones that are ready
//! 6. pack and decode the state snapshot

use crate::domain::job::{JobDescriptor, JobRecord, JobState};
use crate::domain::ports::StageStatus;
use crate::driver::BurstBufferDriver;
use crate::error::Result;
use crate::info::{BurstBufferInfoMsg, PROTOCOL_VERSION};
use crate::pack::PackBuffer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Initial snapshot buffer size; one backend record with a few reservations
const SNAPSHOT_CAPACITY: usize = 1024;

/// Read a JSON array of jobs
pub fn load_jobs(path: impl AsRef<Path>) -> Result<Vec<JobRecord>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let jobs = serde_json::from_str(&text)?;
    Ok(jobs)
}

/// What changed during one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle: u64,
    /// Jobs whose stage-in completed and that started running
    pub started: Vec<u32>,
    /// Jobs that began stage-out
    pub staging_out: Vec<u32>,
    pub completed: Vec<u32>,
    pub failed: Vec<u32>,
    /// Records in this cycle's state snapshot
    pub snapshot_records: usize,
}

/// A job table plus the driver staging its data
pub struct Simulation {
    driver: Arc<BurstBufferDriver>,
    jobs: RwLock<Vec<JobRecord>>,
    /// Cycles a job runs before it finishes
    run_ticks: u32,
    /// Cycles each running job has run so far
    running_for: HashMap<u32, u32>,
    cycle: u64,
}

impl Simulation {
    pub fn new(driver: Arc<BurstBufferDriver>, jobs: Vec<JobRecord>, run_ticks: u32) -> Self {
        Self {
            driver,
            jobs: RwLock::new(jobs),
            run_ticks,
            running_for: HashMap::new(),
            cycle: 0,
        }
    }

    /// Submit every pending job's request for validation. Rejected jobs are
    /// marked failed; accepted requests take the form the backends rewrote
    /// them into. Returns the number of rejected jobs.
    pub fn validate_jobs(&self) -> usize {
        let mut jobs = self.jobs.write();
        let mut rejected = 0;

        for job in jobs.iter_mut().filter(|job| job.is_pending()) {
            let mut desc = JobDescriptor::new(job.to_string(), job.user_id)
                .with_burst_buffer(job.burst_buffer.clone());
            match self.driver.job_validate(&mut desc, job.user_id) {
                Ok(()) => job.burst_buffer = desc.burst_buffer,
                Err(e) => {
                    warn!(job = %job, error = %e, action = ?e.action(), "Job rejected");
                    job.state = JobState::Failed;
                    rejected += 1;
                }
            }
        }
        rejected
    }

    /// Run one scheduler pass at `now`.
    ///
    /// Backend errors are logged and retried next cycle; only errors that
    /// make the backend list unusable are returned.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleSummary> {
        self.cycle += 1;
        let mut summary = CycleSummary {
            cycle: self.cycle,
            ..Default::default()
        };

        if let Err(e) = self.driver.load_state(self.cycle == 1) {
            if !e.is_retryable() {
                return Err(e);
            }
            warn!(error = %e, "load_state failed; continuing with stale state");
        }

        self.advance_stage_out(&mut summary);
        self.advance_running(&mut summary);

        {
            let jobs = self.jobs.read();
            if let Err(e) = self.driver.job_try_stage_in_at(jobs.iter(), now) {
                warn!(error = %e, "Stage-in attempt failed");
            }
        }

        self.advance_stage_in(&mut summary);

        let snapshot = self.snapshot()?;
        summary.snapshot_records = snapshot.record_count();
        debug!(cycle = self.cycle, snapshot = ?snapshot, "Burst buffer snapshot");

        info!(
            cycle = summary.cycle,
            started = summary.started.len(),
            staging_out = summary.staging_out.len(),
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            "Scheduling cycle finished"
        );
        Ok(summary)
    }

    fn advance_stage_out(&mut self, summary: &mut CycleSummary) {
        let mut jobs = self.jobs.write();
        for job in jobs.iter_mut().filter(|job| job.state == JobState::Completing) {
            match self.driver.job_test_stage_out(job) {
                StageStatus::Complete => {
                    job.state = JobState::Completed;
                    summary.completed.push(job.job_id);
                }
                StageStatus::Fatal => {
                    job.state = JobState::Failed;
                    summary.failed.push(job.job_id);
                }
                StageStatus::Underway => {}
            }
        }
    }

    fn advance_running(&mut self, summary: &mut CycleSummary) {
        let mut jobs = self.jobs.write();
        for job in jobs.iter_mut().filter(|job| job.state == JobState::Running) {
            let ran = self.running_for.entry(job.job_id).or_insert(0);
            *ran += 1;
            if *ran < self.run_ticks {
                continue;
            }

            self.running_for.remove(&job.job_id);
            job.state = JobState::Completing;
            summary.staging_out.push(job.job_id);
            if let Err(e) = self.driver.job_start_stage_out(job) {
                warn!(job = %job, error = %e, "Stage-out start failed; polling anyway");
            }
        }
    }

    fn advance_stage_in(&mut self, summary: &mut CycleSummary) {
        let mut jobs = self.jobs.write();
        for job in jobs.iter_mut().filter(|job| job.is_pending()) {
            match self.driver.job_test_stage_in(job) {
                StageStatus::Complete => {
                    job.state = JobState::Running;
                    summary.started.push(job.job_id);
                }
                StageStatus::Fatal => {
                    job.state = JobState::Failed;
                    summary.failed.push(job.job_id);
                }
                StageStatus::Underway => {}
            }
        }
    }

    /// Pack and decode the driver's current state snapshot
    pub fn snapshot(&self) -> Result<BurstBufferInfoMsg> {
        let mut buffer = PackBuffer::with_capacity(SNAPSHOT_CAPACITY);
        if let Err(e) = self.driver.state_pack(&mut buffer, PROTOCOL_VERSION) {
            warn!(error = %e, "state_pack reported an error");
        }
        BurstBufferInfoMsg::unpack(buffer.as_slice())
    }

    /// Copy of the job table
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.read().clone()
    }

    /// True once no job is pending, running or staging out
    pub fn is_finished(&self) -> bool {
        self.jobs.read().iter().all(|job| {
            !matches!(
                job.state,
                JobState::Pending | JobState::Running | JobState::Completing
            )
        })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn driver(&self) -> &Arc<BurstBufferDriver> {
        &self.driver
    }
}
