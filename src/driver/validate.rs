//! Job Validator

use super::aggregate::invoke_best_effort;
use super::metrics::DriverOp;
use super::BurstBufferDriver;
use crate::domain::job::JobDescriptor;
use crate::error::Result;

impl BurstBufferDriver {
    /// Offer a job submission to every backend in turn.
    ///
    /// Each backend sees the descriptor as left by the previous one and may
    /// rewrite its request. All backends are called even after a rejection;
    /// the worst rejection is returned.
    pub fn job_validate(&self, job_desc: &mut JobDescriptor, submit_uid: u32) -> Result<()> {
        let timer = self.metrics.start(DriverOp::JobValidate);
        let initial = self.registry.init();
        let rc = self.registry.with_plugins(|plugins| {
            invoke_best_effort(plugins, DriverOp::JobValidate.as_str(), initial, |desc| {
                desc.plugin_mut().job_validate(job_desc, submit_uid)
            })
        });
        timer.finish(rc.is_err());
        rc
    }
}
