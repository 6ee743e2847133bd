//! State Coordinator
//!
//! Backend state refresh, reconfiguration and the snapshot used for status
//! queries.

use super::aggregate::{invoke_best_effort, invoke_fail_fast, worst};
use super::metrics::DriverOp;
use super::BurstBufferDriver;
use crate::error::Result;
use crate::pack::PackBuffer;
use tracing::debug;

impl BurstBufferDriver {
    /// Refresh every backend's state, stopping at the first failure.
    /// `init_config` is true on the first call after controller start.
    pub fn load_state(&self, init_config: bool) -> Result<()> {
        let timer = self.metrics.start(DriverOp::LoadState);
        let rc = self.registry.init().and_then(|()| {
            self.registry.with_plugins(|plugins| {
                invoke_fail_fast(plugins, DriverOp::LoadState.as_str(), |desc| {
                    desc.plugin_mut().load_state(init_config)
                })
            })
        });
        timer.finish(rc.is_err());
        rc
    }

    /// Push the current configuration to every backend, stopping at the
    /// first failure. The backend list itself is not reloaded.
    pub fn reconfig(&self) -> Result<()> {
        let timer = self.metrics.start(DriverOp::Reconfig);
        let rc = self.registry.init().and_then(|()| {
            let config = self.registry.config();
            self.registry.with_plugins(|plugins| {
                invoke_fail_fast(plugins, DriverOp::Reconfig.as_str(), |desc| {
                    desc.plugin_mut().reconfig(&config)
                })
            })
        });
        timer.finish(rc.is_err());
        rc
    }

    /// Append a snapshot of every backend: a record count followed by one
    /// record per backend that wrote anything.
    ///
    /// The count field is always written; when no backend contributes it
    /// stays zero and nothing follows it.
    pub fn state_pack(&self, buffer: &mut PackBuffer, protocol_version: u16) -> Result<()> {
        let timer = self.metrics.start(DriverOp::StatePack);

        let count_offset = buffer.offset();
        buffer.pack32(0);

        let mut records: u32 = 0;
        let initial = self.registry.init();
        let rc = self.registry.with_plugins(|plugins| {
            invoke_best_effort(plugins, DriverOp::StatePack.as_str(), initial, |desc| {
                let before = buffer.offset();
                let rc = desc.plugin().state_pack(buffer, protocol_version);
                if buffer.offset() != before {
                    records += 1;
                }
                rc
            })
        });

        let rc = if records > 0 {
            worst(rc, patch_count(buffer, count_offset, records))
        } else {
            rc
        };

        debug!(records, protocol_version, bytes = buffer.len(), "Packed burst buffer state");
        timer.finish(rc.is_err());
        rc
    }
}

/// Overwrite the reserved count field and return to the end of the data
fn patch_count(buffer: &mut PackBuffer, count_offset: usize, records: u32) -> Result<()> {
    let end = buffer.offset();
    buffer.set_offset(count_offset)?;
    buffer.pack32(records);
    buffer.set_offset(end)
}
