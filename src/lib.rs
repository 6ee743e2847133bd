//! Burst Buffer Driver
//!
//! Scheduler-side dispatch layer for burst buffer staging backends. The
//! driver loads the configured backends, fans every scheduler call out to
//! them and reduces their answers to one.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                            Batch Scheduler                                  │
//! │      job table (read lock held across job_try_stage_in)                     │
//! └──────────────────────────────────┬──────────────────────────────────────────┘
//!                                    │
//! ┌──────────────────────────────────┴──────────────────────────────────────────┐
//! │                          BurstBufferDriver                                  │
//! │  ┌───────────────┐ ┌───────────────┐ ┌───────────────┐ ┌─────────────────┐  │
//! │  │    State      │ │     Job       │ │   Stage-In    │ │    Stage        │  │
//! │  │  Coordinator  │ │   Validator   │ │   Scheduler   │ │    Progress     │  │
//! │  └───────┬───────┘ └───────┬───────┘ └───────┬───────┘ └────────┬────────┘  │
//! │          └─────────────────┴────────┬────────┴──────────────────┘           │
//! │                         ┌───────────┴───────────┐                           │
//! │                         │    Plugin Registry    │                           │
//! │                         │   (one mutex, lazy)   │                           │
//! │                         └───────────┬───────────┘                           │
//! ├─────────────────────────────────────┼───────────────────────────────────────┤
//! │                          Backend Catalog                                    │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │ burst_buffer/   │  │ burst_buffer/   │  │          ...                │  │
//! │  │    generic      │  │    <custom>     │  │                             │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`driver`]: the driver context, plugin registry and entry points
//! - [`backends`]: backend catalog and the built-in generic backend
//! - [`info`]: snapshot records, size encoding and rendering
//! - [`pack`]: big-endian pack/unpack codec for snapshots
//! - [`domain`]: job views and the backend trait
//! - [`config`]: YAML configuration
//! - [`simulation`]: scheduler cycle simulator used by the binary
//! - [`exporter`]: Prometheus exposition of driver metrics
//! - [`error`]: Error types and handling

pub mod backends;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod exporter;
pub mod info;
pub mod pack;
pub mod simulation;

// Re-export commonly used types
pub use backends::{BackendCatalog, GenericBackend, GenericBackendConfig};

pub use config::DriverConfig;

pub use domain::{
    BoxedPlugin, BurstBufferPlugin, JobDescriptor, JobRecord, JobState, StageStatus,
};

pub use driver::{
    build_stage_queue, BurstBufferDriver, DriverMetrics, DriverOp, PluginRegistry, StageQueue,
};

pub use error::{Error, ErrorAction, Result};

pub use exporter::MetricsExporter;

pub use info::{
    format_size, parse_size, render_msg, render_record, BurstBufferInfo, BurstBufferInfoMsg,
    PROTOCOL_VERSION,
};

pub use pack::{PackBuffer, Unpacker};

pub use simulation::{CycleSummary, Simulation};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
