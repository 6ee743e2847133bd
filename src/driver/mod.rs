//! Burst Buffer Driver
//!
//! The scheduler-facing entry point. A [`BurstBufferDriver`] owns the plugin
//! registry and fans every call out to the configured backends:
//!
//! - [`registry`]: backend loading, teardown and the single invocation lock
//! - [`state`]: `load_state`, `reconfig`, `state_pack`
//! - [`validate`]: `job_validate`
//! - [`stage_in`]: stage-in queue building and `job_try_stage_in`
//! - [`progress`]: stage-in and stage-out polling, `job_start_stage_out`
//!
//! The registry is loaded on first use by any entry point and only unloaded
//! by [`BurstBufferDriver::fini`] (or drop).

pub mod aggregate;
pub mod metrics;
pub mod progress;
pub mod registry;
pub mod stage_in;
pub mod state;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::worst;
pub use metrics::{DriverMetrics, DriverOp, OpMetricsSnapshot};
pub use registry::{parse_plugin_list, PluginDescriptor, PluginRegistry, PLUGIN_PREFIX};
pub use stage_in::{build_stage_queue, is_stage_in_candidate, StageQueue};

use crate::backends::BackendCatalog;
use crate::config::DriverConfig;
use crate::error::Result;
use std::sync::Arc;
use tracing::warn;

/// Burst buffer driver context
#[derive(Debug)]
pub struct BurstBufferDriver {
    registry: PluginRegistry,
    metrics: DriverMetrics,
}

impl BurstBufferDriver {
    /// Driver over the built-in backends
    pub fn new(config: DriverConfig) -> Arc<Self> {
        Self::with_catalog(config, BackendCatalog::with_builtin())
    }

    /// Driver resolving backend names through `catalog`
    pub fn with_catalog(config: DriverConfig, catalog: BackendCatalog) -> Arc<Self> {
        Arc::new(Self {
            registry: PluginRegistry::new(config, catalog),
            metrics: DriverMetrics::new(),
        })
    }

    /// Load the configured backends now instead of on first use
    pub fn init(&self) -> Result<()> {
        let timer = self.metrics.start(DriverOp::Init);
        let rc = self.registry.init();
        timer.finish(rc.is_err());
        rc
    }

    /// Unload every backend. The next entry point call loads them again.
    pub fn fini(&self) -> Result<()> {
        let timer = self.metrics.start(DriverOp::Fini);
        let rc = self.registry.fini();
        timer.finish(rc.is_err());
        rc
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_initialized()
    }

    pub fn plugin_count(&self) -> Option<usize> {
        self.registry.plugin_count()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.registry.plugin_names()
    }

    pub fn config(&self) -> DriverConfig {
        self.registry.config()
    }

    /// Store a new configuration. Call [`reconfig`](Self::reconfig) to hand it
    /// to loaded backends; a changed backend list needs `fini` first.
    pub fn update_config(&self, config: DriverConfig) -> Result<()> {
        self.registry.update_config(config)
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &DriverMetrics {
        &self.metrics
    }
}

impl Drop for BurstBufferDriver {
    fn drop(&mut self) {
        if self.registry.is_initialized() {
            if let Err(e) = self.registry.fini() {
                warn!(error = %e, "Burst buffer teardown on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockCatalog;
    use super::*;
    use crate::domain::job::{JobDescriptor, JobRecord, JobState};
    use crate::domain::ports::StageStatus;
    use crate::error::Error;
    use crate::info::{BurstBufferInfoMsg, PROTOCOL_VERSION};
    use crate::pack::PackBuffer;
    use assert_matches::assert_matches;
    use chrono::{DateTime, Utc};

    const NOW: i64 = 1_700_000_000;

    fn driver(mocks: &MockCatalog, list: &str) -> Arc<BurstBufferDriver> {
        BurstBufferDriver::with_catalog(DriverConfig::with_backends(list), mocks.catalog())
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW, 0).unwrap()
    }

    fn staged_job(id: u32, start: i64) -> JobRecord {
        JobRecord::new(id, 1000)
            .with_burst_buffer("size=1GB")
            .with_start_time(start)
    }

    #[test]
    fn test_lazy_init_on_first_use() {
        let mocks = MockCatalog::new(&["a"]);
        let driver = driver(&mocks, "a");
        assert!(!driver.is_initialized());

        driver.load_state(true).unwrap();
        assert!(driver.is_initialized());
        assert_eq!(driver.plugin_names(), vec!["burst_buffer/a"]);
    }

    #[test]
    fn test_load_state_stops_at_first_failure() {
        let mocks = MockCatalog::new(&["a", "b", "c"]);
        mocks.configure("b", |p| p.load_state_error = Some(10));
        let driver = driver(&mocks, "a,b,c");

        assert_matches!(driver.load_state(false), Err(e) if e.code() == 10);
        assert_eq!(mocks.calls_of("load_state"), vec!["a", "b"]);
    }

    #[test]
    fn test_reconfig_stops_at_first_failure() {
        let mocks = MockCatalog::new(&["a", "b"]);
        mocks.configure("a", |p| p.reconfig_error = Some(3));
        let driver = driver(&mocks, "a,b");

        assert!(driver.reconfig().is_err());
        assert_eq!(mocks.calls_of("reconfig"), vec!["a"]);
    }

    #[test]
    fn test_validate_calls_every_backend_and_keeps_worst() {
        let mocks = MockCatalog::new(&["a", "b", "c"]);
        mocks.configure("a", |p| p.validate_error = Some(2101));
        mocks.configure("b", |p| p.validate_error = Some(2110));
        mocks.configure("c", |p| p.validate_error = Some(2102));
        let driver = driver(&mocks, "a,b,c");

        let mut desc = JobDescriptor::new("job", 1000);
        let err = driver.job_validate(&mut desc, 1000).unwrap_err();
        assert_eq!(err.code(), 2110);
        assert_eq!(mocks.calls_of("job_validate"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_validate_threads_descriptor_through_backends() {
        let mocks = MockCatalog::new(&["a", "b"]);
        mocks.configure("a", |p| p.validate_suffix = Some("+a".into()));
        mocks.configure("b", |p| p.validate_suffix = Some("+b".into()));
        let driver = driver(&mocks, "a,b");

        let mut desc = JobDescriptor::new("job", 1000).with_burst_buffer("bb");
        driver.job_validate(&mut desc, 1000).unwrap();
        assert_eq!(desc.burst_buffer, "bb+a+b");
    }

    #[test]
    fn test_zero_backends_is_a_no_op() {
        let driver = BurstBufferDriver::new(DriverConfig::default());
        let job = staged_job(1, NOW);

        driver.load_state(true).unwrap();
        driver.reconfig().unwrap();
        driver.job_validate(&mut JobDescriptor::new("j", 1), 1).unwrap();
        driver.job_try_stage_in_at([&job], now()).unwrap();
        driver.job_start_stage_out(&job).unwrap();
        assert_eq!(driver.job_test_stage_in(&job), StageStatus::Complete);
        assert_eq!(driver.job_test_stage_out(&job), StageStatus::Complete);
        assert_eq!(driver.plugin_count(), Some(0));
    }

    #[test]
    fn test_state_pack_without_backends() {
        let driver = BurstBufferDriver::new(DriverConfig::default());
        let mut buffer = PackBuffer::new();

        driver.state_pack(&mut buffer, PROTOCOL_VERSION).unwrap();
        assert_eq!(buffer.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_state_pack_counts_contributing_backends() {
        let mocks = MockCatalog::new(&["a", "b", "c"]);
        mocks.configure("b", |p| p.pack_record = false);
        let driver = driver(&mocks, "a,b,c");
        let mut buffer = PackBuffer::new();

        driver.state_pack(&mut buffer, PROTOCOL_VERSION).unwrap();
        assert_eq!(buffer.offset(), buffer.len());

        let msg = BurstBufferInfoMsg::unpack(buffer.as_slice()).unwrap();
        assert_eq!(msg.record_count(), 2);
        assert_eq!(msg.records[0].name, "a");
        assert_eq!(msg.records[1].name, "c");
        assert_eq!(mocks.calls_of("state_pack"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_state_pack_appends_after_existing_data() {
        let mocks = MockCatalog::new(&["a"]);
        let driver = driver(&mocks, "a");
        let mut buffer = PackBuffer::new();
        buffer.pack16(0xbeef);

        driver.state_pack(&mut buffer, PROTOCOL_VERSION).unwrap();
        let msg = BurstBufferInfoMsg::unpack(&buffer.as_slice()[2..]).unwrap();
        assert_eq!(msg.record_count(), 1);
    }

    #[test]
    fn test_state_pack_reports_worst_error_but_packs_others() {
        let mocks = MockCatalog::new(&["a", "b"]);
        mocks.configure("a", |p| p.pack_error = Some(7));
        let driver = driver(&mocks, "a,b");
        let mut buffer = PackBuffer::new();

        assert_matches!(driver.state_pack(&mut buffer, PROTOCOL_VERSION), Err(e) if e.code() == 7);
        let msg = BurstBufferInfoMsg::unpack(buffer.as_slice()).unwrap();
        assert_eq!(msg.record_count(), 1);
    }

    #[test]
    fn test_try_stage_in_sends_ordered_queue_to_every_backend() {
        let mocks = MockCatalog::new(&["a", "b"]);
        mocks.configure("a", |p| p.try_stage_in_error = Some(5));
        let driver = driver(&mocks, "a,b");

        let mut running = staged_job(4, NOW);
        running.state = JobState::Running;
        let jobs = vec![
            staged_job(1, NOW + 3 * 3600),
            staged_job(2, NOW + 3600),
            staged_job(3, NOW + 11 * 3600),
            running,
        ];

        assert_matches!(driver.job_try_stage_in_at(&jobs, now()), Err(e) if e.code() == 5);
        assert_eq!(
            mocks.queues(),
            vec![("a".to_string(), vec![2, 1]), ("b".to_string(), vec![2, 1])]
        );
    }

    #[test]
    fn test_try_stage_in_uses_configured_horizon() {
        let mocks = MockCatalog::new(&["a"]);
        let mut config = DriverConfig::with_backends("a");
        config.stage_in_horizon_secs = 3600;
        let driver = BurstBufferDriver::with_catalog(config, mocks.catalog());

        let jobs = vec![staged_job(1, NOW + 7200), staged_job(2, NOW + 60)];
        driver.job_try_stage_in_at(&jobs, now()).unwrap();
        assert_eq!(mocks.queues(), vec![("a".to_string(), vec![2])]);
    }

    #[test]
    fn test_stage_in_status_is_minimum() {
        let mocks = MockCatalog::new(&["a", "b"]);
        mocks.configure("b", |p| p.stage_in_status = StageStatus::Underway);
        let driver = driver(&mocks, "a,b");

        assert_eq!(driver.job_test_stage_in(&staged_job(1, NOW)), StageStatus::Underway);
    }

    #[test]
    fn test_fatal_wins_and_all_backends_polled() {
        let mocks = MockCatalog::new(&["a", "b", "c"]);
        mocks.configure("a", |p| p.stage_out_status = StageStatus::Fatal);
        mocks.configure("b", |p| p.stage_out_status = StageStatus::Underway);
        let driver = driver(&mocks, "a,b,c");

        assert_eq!(driver.job_test_stage_out(&staged_job(1, NOW)), StageStatus::Fatal);
        assert_eq!(mocks.calls_of("job_test_stage_out"), vec!["a", "b", "c"]);
        assert_eq!(driver.metrics().op(DriverOp::TestStageOut).errors, 1);
    }

    #[test]
    fn test_broken_backend_list() {
        let driver = BurstBufferDriver::new(DriverConfig::with_backends("generic,nosuch"));
        let job = staged_job(1, NOW);

        assert_matches!(driver.load_state(true), Err(Error::UnknownBackend { .. }));
        assert_matches!(driver.job_start_stage_out(&job), Err(Error::UnknownBackend { .. }));
        assert_eq!(driver.job_test_stage_in(&job), StageStatus::Fatal);
        assert_eq!(driver.job_test_stage_out(&job), StageStatus::Fatal);

        let mut buffer = PackBuffer::new();
        assert!(driver.state_pack(&mut buffer, PROTOCOL_VERSION).is_err());
        assert_eq!(buffer.as_slice(), &[0, 0, 0, 0]);
        assert!(!driver.is_initialized());
    }

    #[test]
    fn test_reconfig_passes_updated_config() {
        let driver = BurstBufferDriver::new(DriverConfig::with_backends("generic"));
        driver.init().unwrap();

        let mut config = driver.config();
        config.generic.prio_boost = 9;
        driver.update_config(config).unwrap();
        driver.reconfig().unwrap();

        let mut buffer = PackBuffer::new();
        driver.state_pack(&mut buffer, PROTOCOL_VERSION).unwrap();
        let msg = BurstBufferInfoMsg::unpack(buffer.as_slice()).unwrap();
        assert_eq!(msg.records[0].prio_boost, 9);
    }

    #[test]
    fn test_concurrent_callers_load_once_and_never_overlap() {
        let mocks = MockCatalog::new(&["a", "b"]);
        let driver = driver(&mocks, "a,b");
        let job = staged_job(1, NOW);
        let jobs = vec![staged_job(2, NOW), staged_job(3, NOW + 60)];

        std::thread::scope(|s| {
            for worker in 0..8 {
                let driver = &driver;
                let job = &job;
                let jobs = &jobs;
                s.spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(driver.job_test_stage_in(job), StageStatus::Complete);
                        if worker % 2 == 0 {
                            driver.job_try_stage_in_at(jobs, now()).unwrap();
                        } else {
                            driver.load_state(false).unwrap();
                        }
                    }
                });
            }
        });

        assert_eq!(mocks.loads(), 2);
        assert_eq!(driver.plugin_count(), Some(2));
        assert_eq!(mocks.calls_of("job_test_stage_in").len(), 8 * 50 * 2);
        assert_eq!(mocks.queues().len(), 4 * 50 * 2);
        assert_eq!(mocks.overlaps(), 0);
    }

    #[test]
    fn test_drop_tears_down_backends() {
        let mocks = MockCatalog::new(&["a", "b"]);
        let driver = driver(&mocks, "a,b");
        driver.init().unwrap();
        drop(driver);
        assert_eq!(mocks.finis(), 2);
    }

    #[test]
    fn test_generic_backend_end_to_end() {
        let mut config = DriverConfig::with_backends("burst_buffer/generic");
        config.generic.total_space = 10;
        config.generic.stage_in_polls = 1;
        config.generic.stage_out_polls = 0;
        let driver = BurstBufferDriver::new(config);

        let mut desc = JobDescriptor::new("big", 1000).with_burst_buffer("size=4GB");
        driver.job_validate(&mut desc, 1000).unwrap();

        let jobs = vec![
            staged_job(1, NOW + 60).with_burst_buffer("size=6GB"),
            staged_job(2, NOW + 120).with_burst_buffer("size=6GB"),
        ];
        driver.job_try_stage_in_at(&jobs, now()).unwrap();

        // only the earlier job fits
        assert_eq!(driver.job_test_stage_in(&jobs[1]), StageStatus::Underway);
        assert_eq!(driver.job_test_stage_in(&jobs[0]), StageStatus::Underway);
        assert_eq!(driver.job_test_stage_in(&jobs[0]), StageStatus::Complete);

        driver.job_start_stage_out(&jobs[0]).unwrap();
        assert_eq!(driver.job_test_stage_out(&jobs[0]), StageStatus::Complete);

        driver.job_try_stage_in_at(&jobs[1..], now()).unwrap();
        assert_eq!(driver.job_test_stage_in(&jobs[1]), StageStatus::Underway);
    }
}
