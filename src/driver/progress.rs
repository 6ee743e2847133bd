//! Stage Progress Tracker
//!
//! A job's staging is only as far along as its slowest backend, so polls
//! reduce by minimum and any FATAL wins.

use super::aggregate::{invoke_best_effort, poll_all};
use super::metrics::DriverOp;
use super::BurstBufferDriver;
use crate::domain::job::JobRecord;
use crate::domain::ports::StageStatus;
use crate::error::Result;
use tracing::warn;

impl BurstBufferDriver {
    /// Poll stage-in progress of `job` across every backend
    pub fn job_test_stage_in(&self, job: &JobRecord) -> StageStatus {
        let timer = self.metrics.start(DriverOp::TestStageIn);
        let initial = self.poll_start();
        let status = self.registry.with_plugins(|plugins| {
            poll_all(plugins, initial, |desc| desc.plugin_mut().job_test_stage_in(job))
        });
        if status == StageStatus::Fatal {
            warn!(job = %job, "Stage-in failed");
        }
        timer.finish(status == StageStatus::Fatal);
        status
    }

    /// Start stage-out of `job` on every backend
    pub fn job_start_stage_out(&self, job: &JobRecord) -> Result<()> {
        let timer = self.metrics.start(DriverOp::StartStageOut);
        let initial = self.registry.init();
        let rc = self.registry.with_plugins(|plugins| {
            invoke_best_effort(plugins, DriverOp::StartStageOut.as_str(), initial, |desc| {
                desc.plugin_mut().job_start_stage_out(job)
            })
        });
        timer.finish(rc.is_err());
        rc
    }

    /// Poll stage-out progress of `job` across every backend
    pub fn job_test_stage_out(&self, job: &JobRecord) -> StageStatus {
        let timer = self.metrics.start(DriverOp::TestStageOut);
        let initial = self.poll_start();
        let status = self.registry.with_plugins(|plugins| {
            poll_all(plugins, initial, |desc| desc.plugin_mut().job_test_stage_out(job))
        });
        if status == StageStatus::Fatal {
            warn!(job = %job, "Stage-out failed");
        }
        timer.finish(status == StageStatus::Fatal);
        status
    }

    /// COMPLETE when the registry is usable, FATAL otherwise
    fn poll_start(&self) -> StageStatus {
        match self.registry.init() {
            Ok(()) => StageStatus::Complete,
            Err(e) => {
                warn!(error = %e, "Burst buffer registry unavailable");
                StageStatus::Fatal
            }
        }
    }
}
