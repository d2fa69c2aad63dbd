//! airflow-exporter: Prometheus exporter for Airflow task-runner processes.
//!
//! Samples `/proc` on a fixed interval, recognises Airflow task runners by
//! their command line and serves per-task resource gauges over HTTP.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod background;
mod handlers;
mod state;

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use airflow_exporter_core::collector::{Collector, SmapsAggregation};
use airflow_exporter_core::labels::ConstLabels;
use airflow_exporter_core::{MetricSet, MetricsError, SamplingCycle};

use state::AppState;

#[derive(Parser)]
#[command(name = "airflow-exporter")]
#[command(about = "Prometheus exporter for Airflow task-runner processes")]
#[command(version = airflow_exporter_core::VERSION)]
struct Args {
    /// Address to listen on; ":port" binds all interfaces.
    #[arg(
        long = "web.listen-address",
        default_value = ":8080",
        env = "AIRFLOW_EXPORTER_LISTEN",
        value_parser = parse_listen_addr
    )]
    listen_address: SocketAddr,

    /// Path under which metrics are exposed.
    #[arg(
        long = "web.telemetry-path",
        default_value = "/metrics",
        env = "AIRFLOW_EXPORTER_TELEMETRY_PATH",
        value_parser = parse_telemetry_path
    )]
    telemetry_path: String,

    /// Sampling interval in seconds.
    #[arg(
        long,
        default_value = "10",
        env = "AIRFLOW_EXPORTER_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Increase verbosity (-v debug, -vv trace). Ignored when RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors. Ignored when RUST_LOG is set.
    #[arg(short, long)]
    quiet: bool,

    /// Comma separated constant labels, each set to "true".
    #[arg(long, env = "AIRFLOW_EXPORTER_LABELS", value_delimiter = ',')]
    labels: Vec<String>,

    /// File whose content becomes the `host_hostname` label.
    #[arg(long, env = "AIRFLOW_EXPORTER_HOSTNAME_PATH")]
    hostname_path: Option<PathBuf>,

    /// Root of the proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// How smaps regions are folded into uss/pss/swap.
    #[arg(long, value_enum, default_value_t = SmapsPolicy::FirstRegion)]
    smaps_aggregation: SmapsPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SmapsPolicy {
    FirstRegion,
    Sum,
}

impl From<SmapsPolicy> for SmapsAggregation {
    fn from(policy: SmapsPolicy) -> Self {
        match policy {
            SmapsPolicy::FirstRegion => SmapsAggregation::FirstRegion,
            SmapsPolicy::Sum => SmapsAggregation::Sum,
        }
    }
}

#[derive(Debug)]
enum ListenAddrError {
    Empty,
    Unresolved(String),
}

impl fmt::Display for ListenAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddrError::Empty => write!(f, "listen address is empty"),
            ListenAddrError::Unresolved(addr) => {
                write!(f, "cannot resolve listen address '{}'", addr)
            }
        }
    }
}

impl std::error::Error for ListenAddrError {}

/// Parses `host:port`; a bare `:port` listens on all interfaces.
fn parse_listen_addr(s: &str) -> Result<SocketAddr, ListenAddrError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ListenAddrError::Empty);
    }
    let candidate = if s.starts_with(':') {
        format!("0.0.0.0{}", s)
    } else {
        s.to_string()
    };
    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Ok(addr);
    }
    candidate
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ListenAddrError::Unresolved(s.to_string()))
}

fn parse_telemetry_path(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("telemetry path must start with '/': {}", s));
    }
    if s == "/" || s == "/health" {
        return Err(format!("telemetry path '{}' is reserved", s));
    }
    // Route syntax: `{x}` captures, `:x` and `*x` are rejected by the router.
    if s.contains(['{', '}'])
        || s.split('/').any(|seg| seg.starts_with(':') || seg.starts_with('*'))
    {
        return Err(format!("telemetry path must be a literal path: {}", s));
    }
    Ok(s.to_string())
}

#[derive(Debug)]
enum StartupError {
    Metrics(MetricsError),
    Bind(SocketAddr, io::Error),
    Serve(io::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Metrics(e) => write!(f, "metric registration failed: {}", e),
            StartupError::Bind(addr, e) => write!(f, "failed to bind {}: {}", addr, e),
            StartupError::Serve(e) => write!(f, "server error: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<MetricsError> for StartupError {
    fn from(e: MetricsError) -> Self {
        StartupError::Metrics(e)
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                process::exit(1);
            }
        },
    };
    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        error!(error = %e, "exporter stopped");
        process::exit(1);
    }
}

async fn async_main(args: Args) -> Result<(), StartupError> {
    let hostname = get_hostname();
    let const_labels =
        ConstLabels::from_sources(&hostname, args.hostname_path.as_deref(), &args.labels);
    info!(
        hostname = %hostname,
        const_labels = const_labels.len(),
        "starting airflow-exporter v{}",
        airflow_exporter_core::VERSION
    );

    let metrics = Arc::new(MetricSet::new(const_labels)?);
    let interval = Duration::from_secs(args.interval);
    let shutdown = CancellationToken::new();

    let sampler = spawn_sampler(&args, Arc::clone(&metrics), interval, shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let app = handlers::router(AppState {
        metrics,
        telemetry_path: Arc::from(args.telemetry_path.as_str()),
    });

    let listener = match tokio::net::TcpListener::bind(args.listen_address).await {
        Ok(listener) => listener,
        Err(e) => {
            shutdown.cancel();
            return Err(StartupError::Bind(args.listen_address, e));
        }
    };
    info!(
        addr = %args.listen_address,
        telemetry_path = %args.telemetry_path,
        interval_s = args.interval,
        "listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    if let Err(e) = sampler.await {
        error!(error = %e, "sampling task failed");
    }
    served.map_err(StartupError::Serve)
}

#[cfg(target_os = "linux")]
fn spawn_sampler(
    args: &Args,
    metrics: Arc<MetricSet>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    use airflow_exporter_core::collector::RealFs;

    let collector = Collector::new(RealFs::new(), args.proc_path.clone())
        .with_smaps_aggregation(args.smaps_aggregation.into());
    let cycle = Arc::new(Mutex::new(SamplingCycle::new(collector, metrics)));
    tokio::spawn(background::tick_loop(cycle, interval, shutdown))
}

#[cfg(not(target_os = "linux"))]
fn spawn_sampler(
    args: &Args,
    metrics: Arc<MetricSet>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    use airflow_exporter_core::collector::MockFs;

    tracing::warn!("not running on Linux, sampling an empty mock /proc");
    let collector = Collector::new(MockFs::idle_host(), args.proc_path.clone())
        .with_smaps_aggregation(args.smaps_aggregation.into());
    let cycle = Arc::new(Mutex::new(SamplingCycle::new(collector, metrics)));
    tokio::spawn(background::tick_loop(cycle, interval, shutdown))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(level, rust_log.as_deref()))
        .with_target(false)
        .init();
}

/// A non-empty `RUST_LOG` is used as-is; otherwise the crate targets log at
/// `level` and everything else at error.
fn log_filter(level: Level, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|s| !s.trim().is_empty()) {
        return EnvFilter::new(directives);
    }

    let mut filter = EnvFilter::default();
    for target in ["airflow_exporter", "airflow_exporter_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Get machine hostname via the `hostname` command.
fn get_hostname() -> String {
    process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|out| {
            if out.status.success() {
                String::from_utf8(out.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_bare_port_binds_all_interfaces() {
        let addr = parse_listen_addr(":8080").unwrap();
        assert_eq!(addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn listen_addr_explicit_host() {
        let addr = parse_listen_addr("127.0.0.1:9112").unwrap();
        assert_eq!(addr.port(), 9112);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn listen_addr_invalid() {
        assert!(matches!(parse_listen_addr(""), Err(ListenAddrError::Empty)));
        assert!(matches!(
            parse_listen_addr("not an address"),
            Err(ListenAddrError::Unresolved(_))
        ));
        assert!(parse_listen_addr(":notaport").is_err());
    }

    #[test]
    fn telemetry_path_validation() {
        assert_eq!(parse_telemetry_path("/metrics").unwrap(), "/metrics");
        assert!(parse_telemetry_path("metrics").is_err());
        assert!(parse_telemetry_path("/").is_err());
        assert!(parse_telemetry_path("/health").is_err());
        assert_eq!(parse_telemetry_path("/a/b:c").unwrap(), "/a/b:c");
    }

    #[test]
    fn telemetry_path_rejects_route_syntax() {
        for path in ["/{x}", "/metrics/{*rest}", "/:x", "/a/:b", "/*all", "/m}"] {
            assert!(parse_telemetry_path(path).is_err(), "{}", path);
        }
    }

    #[test]
    fn log_filter_uses_verbosity_without_rust_log() {
        let filter = log_filter(Level::DEBUG, None).to_string().to_lowercase();
        assert!(filter.contains("airflow_exporter=debug"));
        assert!(filter.contains("airflow_exporter_core=debug"));

        let filter = log_filter(Level::DEBUG, Some("  ")).to_string().to_lowercase();
        assert!(filter.contains("airflow_exporter_core=debug"));
    }

    #[test]
    fn log_filter_honours_rust_log() {
        let filter = log_filter(Level::DEBUG, Some("airflow_exporter_core=trace,warn"))
            .to_string()
            .to_lowercase();
        assert!(filter.contains("airflow_exporter_core=trace"));
        assert!(!filter.contains("airflow_exporter_core=debug"));
        assert!(!filter.contains("airflow_exporter=debug"));
    }

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["airflow-exporter"]).unwrap();
        assert_eq!(args.listen_address.port(), 8080);
        assert_eq!(args.telemetry_path, "/metrics");
        assert_eq!(args.interval, 10);
        assert_eq!(args.proc_path, "/proc");
        assert_eq!(args.smaps_aggregation, SmapsPolicy::FirstRegion);
        assert!(args.labels.is_empty());
        assert!(args.hostname_path.is_none());
    }

    #[test]
    fn args_flags() {
        let args = Args::try_parse_from([
            "airflow-exporter",
            "--web.listen-address",
            "127.0.0.1:9000",
            "--web.telemetry-path",
            "/custom",
            "--interval",
            "3",
            "-vv",
            "--labels",
            "team_a,prod",
            "--smaps-aggregation",
            "sum",
        ])
        .unwrap();
        assert_eq!(args.listen_address.port(), 9000);
        assert_eq!(args.telemetry_path, "/custom");
        assert_eq!(args.interval, 3);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.labels, vec!["team_a", "prod"]);
        assert_eq!(
            SmapsAggregation::from(args.smaps_aggregation),
            SmapsAggregation::Sum
        );
    }

    #[test]
    fn args_reject_zero_interval() {
        assert!(Args::try_parse_from(["airflow-exporter", "--interval", "0"]).is_err());
    }
}
