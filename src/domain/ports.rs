//! Domain Ports - the backend capability set
//!
//! [`BurstBufferPlugin`] is the one trait every staging backend implements.
//! The driver owns each instance exclusively and only ever calls it while
//! holding the registry lock, so implementations take `&mut self` and need
//! no internal synchronization.

use crate::config::DriverConfig;
use crate::domain::job::{JobDescriptor, JobRecord};
use crate::error::Result;
use crate::pack::PackBuffer;

// =============================================================================
// Stage Status
// =============================================================================

/// Outcome of polling a job's stage-in or stage-out
///
/// Ordered so that the minimum over several backends is the overall answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageStatus {
    /// Staging failed and will not recover
    Fatal = -1,
    /// Staging is still in progress
    Underway = 0,
    /// Staging has finished
    Complete = 1,
}

impl StageStatus {
    /// Raw tri-state value (-1, 0, 1)
    pub fn as_i32(self) -> i32 {
        self as i32
    }

}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Fatal => write!(f, "fatal"),
            StageStatus::Underway => write!(f, "underway"),
            StageStatus::Complete => write!(f, "complete"),
        }
    }
}

// =============================================================================
// Burst Buffer Plugin Port
// =============================================================================

/// Capability set of a burst buffer backend
pub trait BurstBufferPlugin: Send {
    /// Backend type name, e.g. `generic`
    fn plugin_type(&self) -> &str;

    /// Refresh the backend's view of its capacity and reservations.
    /// `init_config` is true on the first call after controller start.
    fn load_state(&mut self, init_config: bool) -> Result<()>;

    /// Append this backend's record to `buffer`. Writing nothing is allowed
    /// and means the backend has no record to report.
    fn state_pack(&self, buffer: &mut PackBuffer, protocol_version: u16) -> Result<()>;

    /// Re-read backend parameters after a configuration change
    fn reconfig(&mut self, config: &DriverConfig) -> Result<()>;

    /// Accept, reject or rewrite a job submission's burst buffer request
    fn job_validate(&mut self, job_desc: &mut JobDescriptor, submit_uid: u32) -> Result<()>;

    /// Start staging for whichever prefix of the ordered queue fits
    fn job_try_stage_in(&mut self, queue: &[&JobRecord]) -> Result<()>;

    /// Report stage-in progress for one job
    fn job_test_stage_in(&mut self, job: &JobRecord) -> StageStatus;

    /// Begin flushing a finished job's data
    fn job_start_stage_out(&mut self, job: &JobRecord) -> Result<()>;

    /// Report stage-out progress for one job
    fn job_test_stage_out(&mut self, job: &JobRecord) -> StageStatus;

    /// Release backend resources when the registry is torn down
    fn fini(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Owned backend instance
pub type BoxedPlugin = Box<dyn BurstBufferPlugin>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_ordering() {
        assert!(StageStatus::Fatal < StageStatus::Underway);
        assert!(StageStatus::Underway < StageStatus::Complete);
        assert_eq!(StageStatus::Fatal.as_i32(), -1);
        assert_eq!(StageStatus::Complete.as_i32(), 1);
    }

    #[test]
    fn test_stage_status_display() {
        assert_eq!(format!("{}", StageStatus::Underway), "underway");
    }
}
