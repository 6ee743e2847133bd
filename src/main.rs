//! Burst Buffer Driver
//!
//! Runs the burst buffer driver against a job table, cycle by cycle, the way
//! a batch scheduler would, and serves health and Prometheus metrics while it
//! does.
//!
//! ```text
//! ┌──────────────┐   tick   ┌──────────────────────┐   fan-out   ┌─────────────┐
//! │  Job table   │ ───────▶ │  BurstBufferDriver   │ ──────────▶ │  Backends   │
//! │  (JSON file) │ ◀─────── │  (Simulation cycle)  │ ◀────────── │ (catalog)   │
//! └──────────────┘  states  └──────────┬───────────┘   worst/min └─────────────┘
//!                                      │
//!                         /healthz /readyz   /metrics
//! ```

use chrono::Utc;
use clap::Parser;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use burst_buffer_driver::simulation::load_jobs;
use burst_buffer_driver::{
    render_msg, BurstBufferDriver, DriverConfig, Error, MetricsExporter, Result, Simulation,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Burst Buffer Driver - stage job data through pluggable burst buffer backends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Driver configuration file (YAML)
    #[arg(long, env = "BB_CONFIG")]
    config: Option<PathBuf>,

    /// Backend list, overrides `burst_buffer_type` from the config file
    #[arg(long, env = "BB_TYPE")]
    burst_buffer_type: Option<String>,

    /// Job table (JSON array of jobs)
    #[arg(long, env = "BB_JOBS")]
    jobs: Option<PathBuf>,

    /// Treat job start times as seconds from now
    #[arg(long)]
    relative_start: bool,

    /// Scheduling cycles to run, 0 runs until Ctrl-C
    #[arg(long, default_value = "0")]
    ticks: u64,

    /// Milliseconds between scheduling cycles
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Cycles a job runs before it finishes and stages out
    #[arg(long, default_value = "2")]
    run_ticks: u32,

    /// Print the burst buffer snapshot on exit
    #[arg(long)]
    show: bool,

    /// Print each snapshot record on one line
    #[arg(long)]
    one_liner: bool,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Burst Buffer Driver");
    info!("  Version: {}", burst_buffer_driver::VERSION);

    let mut config = match &args.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };
    if let Some(list) = &args.burst_buffer_type {
        config.burst_buffer_type = list.clone();
    }
    config.validate()?;
    info!("  Backends: {:?}", config.burst_buffer_type);
    info!(
        "  Stage-in horizon: {}s",
        config.stage_in_horizon_secs
    );

    let driver = BurstBufferDriver::new(config);
    driver.init()?;
    info!("Loaded backends: {:?}", driver.plugin_names());

    let mut jobs = match &args.jobs {
        Some(path) => load_jobs(path)?,
        None => Vec::new(),
    };
    if args.relative_start {
        let now = Utc::now().timestamp();
        for job in jobs.iter_mut().filter(|job| job.start_time_known()) {
            job.start_time += now;
        }
    }
    info!("Job table: {} jobs", jobs.len());

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_driver = driver.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_driver).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let exporter = Arc::new(MetricsExporter::new()?);
    let metrics_addr = args.metrics_addr.clone();
    let metrics_driver = driver.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_driver, exporter).await {
            error!("Metrics server error: {}", e);
        }
    });

    let mut simulation = Simulation::new(driver.clone(), jobs, args.run_ticks);
    let rejected = simulation.validate_jobs();
    if rejected > 0 {
        warn!("{} jobs rejected at submission", rejected);
    }

    let result = run_cycles(&args, &mut simulation).await;

    if args.show {
        match simulation.snapshot() {
            Ok(msg) => print!("{}", render_msg(&msg, args.one_liner)),
            Err(e) => error!("Cannot decode burst buffer snapshot: {}", e),
        }
    }

    if let Err(e) = driver.fini() {
        warn!("Backend teardown reported an error: {}", e);
    }

    info!("Driver shutdown complete");
    result
}

/// Run scheduling cycles until the tick budget is spent or Ctrl-C
async fn run_cycles(args: &Args, simulation: &mut Simulation) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                simulation.run_cycle(Utc::now())?;
                if args.ticks != 0 && simulation.cycle() >= args.ticks {
                    info!("Ran {} cycles", simulation.cycle());
                    return Ok(());
                }
                if simulation.is_finished() && args.ticks == 0 {
                    info!("All jobs finished after {} cycles", simulation.cycle());
                    return Ok(());
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                return Ok(());
            }
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tokio=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

fn respond(status: hyper::StatusCode, body: impl Into<hyper::Body>) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, driver: Arc<BurstBufferDriver>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let driver = driver.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let ready = driver.is_initialized();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => respond(StatusCode::OK, "ok"),
                        "/readyz" if ready => respond(StatusCode::OK, "ok"),
                        "/readyz" => respond(StatusCode::SERVICE_UNAVAILABLE, "backends not loaded"),
                        _ => respond(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    driver: Arc<BurstBufferDriver>,
    exporter: Arc<MetricsExporter>,
) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let driver = driver.clone();
        let exporter = exporter.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let driver = driver.clone();
                let exporter = exporter.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match exporter.encode(&driver) {
                            Ok(buffer) => {
                                let mut response = respond(StatusCode::OK, buffer);
                                response.headers_mut().insert(
                                    CONTENT_TYPE,
                                    HeaderValue::from_static(exporter.content_type()),
                                );
                                response
                            }
                            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                        },
                        _ => respond(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
