//! Prometheus exposition of driver metrics
//!
//! [`DriverMetrics`](crate::driver::DriverMetrics) keeps raw atomics on the
//! hot path; the exporter copies a snapshot into gauges each time it is
//! scraped.

use crate::driver::BurstBufferDriver;
use crate::error::Result;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Scrape-time bridge from driver counters to the Prometheus text format
pub struct MetricsExporter {
    registry: Registry,
    calls: IntGaugeVec,
    errors: IntGaugeVec,
    mean_us: IntGaugeVec,
    last_us: IntGaugeVec,
    max_us: IntGaugeVec,
    plugins_loaded: IntGauge,
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let op_gauge = |name: &str, help: &str| -> Result<IntGaugeVec> {
            let gauge = IntGaugeVec::new(Opts::new(name, help), &["operation"])?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let calls = op_gauge("burst_buffer_op_calls", "Calls per driver entry point")?;
        let errors = op_gauge(
            "burst_buffer_op_errors",
            "Calls that returned an error or FATAL",
        )?;
        let mean_us = op_gauge("burst_buffer_op_mean_us", "Mean call duration in microseconds")?;
        let last_us = op_gauge("burst_buffer_op_last_us", "Most recent call duration in microseconds")?;
        let max_us = op_gauge("burst_buffer_op_max_us", "Longest call duration in microseconds")?;

        let plugins_loaded = IntGauge::new(
            "burst_buffer_plugins_loaded",
            "Loaded backends, -1 while the registry is uninitialized",
        )?;
        registry.register(Box::new(plugins_loaded.clone()))?;

        Ok(Self {
            registry,
            calls,
            errors,
            mean_us,
            last_us,
            max_us,
            plugins_loaded,
        })
    }

    /// Copy the driver's current counters into the gauges
    pub fn refresh(&self, driver: &BurstBufferDriver) {
        for (op, snap) in driver.metrics().snapshot() {
            let label = [op.as_str()];
            self.calls.with_label_values(&label).set(saturate(snap.calls));
            self.errors.with_label_values(&label).set(saturate(snap.errors));
            self.mean_us.with_label_values(&label).set(saturate(snap.mean_us()));
            self.last_us.with_label_values(&label).set(saturate(snap.last_us));
            self.max_us.with_label_values(&label).set(saturate(snap.max_us));
        }
        self.plugins_loaded
            .set(driver.plugin_count().map_or(-1, |n| n as i64));
    }

    /// Refresh and render in the Prometheus text format
    pub fn encode(&self, driver: &BurstBufferDriver) -> Result<Vec<u8>> {
        self.refresh(driver);
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// Content type of [`encode`](Self::encode) output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}

#[inline]
fn saturate(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}
