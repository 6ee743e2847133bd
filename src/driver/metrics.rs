//! Driver Metrics
//!
//! Per-entry-point call counters and timers, cache-line aligned so scheduler
//! threads hitting different entry points never share a line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache line size for alignment
pub const CACHE_LINE_SIZE: usize = 64;

const OP_COUNT: usize = 10;

// =============================================================================
// Driver Operations
// =============================================================================

/// Entry points of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Init,
    Fini,
    LoadState,
    StatePack,
    Reconfig,
    JobValidate,
    TryStageIn,
    TestStageIn,
    StartStageOut,
    TestStageOut,
}

impl DriverOp {
    pub const ALL: [DriverOp; OP_COUNT] = [
        DriverOp::Init,
        DriverOp::Fini,
        DriverOp::LoadState,
        DriverOp::StatePack,
        DriverOp::Reconfig,
        DriverOp::JobValidate,
        DriverOp::TryStageIn,
        DriverOp::TestStageIn,
        DriverOp::StartStageOut,
        DriverOp::TestStageOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DriverOp::Init => "init",
            DriverOp::Fini => "fini",
            DriverOp::LoadState => "load_state",
            DriverOp::StatePack => "state_pack",
            DriverOp::Reconfig => "reconfig",
            DriverOp::JobValidate => "job_validate",
            DriverOp::TryStageIn => "job_try_stage_in",
            DriverOp::TestStageIn => "job_test_stage_in",
            DriverOp::StartStageOut => "job_start_stage_out",
            DriverOp::TestStageOut => "job_test_stage_out",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for DriverOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Per-Operation Metrics (Cache-Line Aligned)
// =============================================================================

/// Counters for one entry point
#[repr(C, align(64))]
#[derive(Debug)]
pub struct OpMetrics {
    /// Number of calls
    pub calls: AtomicU64,
    /// Calls that returned an error (or FATAL)
    pub errors: AtomicU64,
    /// Cumulative time spent, microseconds
    pub total_us: AtomicU64,
    /// Duration of the most recent call, microseconds
    pub last_us: AtomicU64,
    /// Longest call seen, microseconds
    pub max_us: AtomicU64,
    /// Padding to fill cache line
    _padding: [u8; 24],
}

// Verify size at compile time
const _: () = assert!(std::mem::size_of::<OpMetrics>() <= CACHE_LINE_SIZE);

impl Default for OpMetrics {
    fn default() -> Self {
        Self {
            calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_us: AtomicU64::new(0),
            last_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            _padding: [0; 24],
        }
    }
}

impl OpMetrics {
    /// Record one finished call
    #[inline]
    pub fn record(&self, elapsed: Duration, failed: bool) {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.calls.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_us.fetch_add(us, Ordering::Relaxed);
        self.last_us.store(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OpMetricsSnapshot {
        OpMetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_us: self.total_us.load(Ordering::Relaxed),
            last_us: self.last_us.load(Ordering::Relaxed),
            max_us: self.max_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`OpMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpMetricsSnapshot {
    pub calls: u64,
    pub errors: u64,
    pub total_us: u64,
    pub last_us: u64,
    pub max_us: u64,
}

impl OpMetricsSnapshot {
    /// Mean call duration in microseconds
    pub fn mean_us(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_us / self.calls
        }
    }
}

// =============================================================================
// Driver Metrics
// =============================================================================

/// Metrics for every driver entry point
#[derive(Debug)]
pub struct DriverMetrics {
    ops: [OpMetrics; OP_COUNT],
}

impl Default for DriverMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self {
            ops: std::array::from_fn(|_| OpMetrics::default()),
        }
    }

    /// Start timing a call
    pub fn start(&self, op: DriverOp) -> OpTimer<'_> {
        OpTimer {
            metrics: &self.ops[op.index()],
            op,
            started: Instant::now(),
        }
    }

    pub fn op(&self, op: DriverOp) -> OpMetricsSnapshot {
        self.ops[op.index()].snapshot()
    }

    /// Snapshot of all entry points
    pub fn snapshot(&self) -> Vec<(DriverOp, OpMetricsSnapshot)> {
        DriverOp::ALL
            .iter()
            .map(|op| (*op, self.op(*op)))
            .collect()
    }
}

/// Times one entry point call
#[must_use = "finish the timer to record the call"]
pub struct OpTimer<'a> {
    metrics: &'a OpMetrics,
    op: DriverOp,
    started: Instant,
}

impl OpTimer<'_> {
    /// Record the call and log its duration
    pub fn finish(self, failed: bool) -> Duration {
        let elapsed = self.started.elapsed();
        self.metrics.record(elapsed, failed);
        debug!(
            operation = self.op.as_str(),
            elapsed_us = elapsed.as_micros() as u64,
            failed,
            "Burst buffer call finished"
        );
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_metrics_cache_line_alignment() {
        assert_eq!(std::mem::align_of::<OpMetrics>(), CACHE_LINE_SIZE);
        assert!(std::mem::size_of::<OpMetrics>() <= CACHE_LINE_SIZE);
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = DriverMetrics::new();
        metrics.ops[DriverOp::LoadState.index()].record(Duration::from_micros(100), false);
        metrics.ops[DriverOp::LoadState.index()].record(Duration::from_micros(300), true);

        let snap = metrics.op(DriverOp::LoadState);
        assert_eq!(snap.calls, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.total_us, 400);
        assert_eq!(snap.last_us, 300);
        assert_eq!(snap.max_us, 300);
        assert_eq!(snap.mean_us(), 200);

        assert_eq!(metrics.op(DriverOp::Reconfig), OpMetricsSnapshot::default());
    }

    #[test]
    fn test_timer_records_call() {
        let metrics = DriverMetrics::new();
        metrics.start(DriverOp::TestStageIn).finish(false);
        assert_eq!(metrics.op(DriverOp::TestStageIn).calls, 1);
        assert_eq!(metrics.snapshot().len(), DriverOp::ALL.len());
    }
}
