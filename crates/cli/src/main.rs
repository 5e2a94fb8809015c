use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kstate_collectors::{describe_scrape_metrics, FacadeStats, Kind, RegisterOptions};
use kstate_exposition::{describe_process_metrics, serve, AppState, Registry};
use kstate_kubehub::Supervisor;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const UPKEEP_EVERY: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "kstate", version, about = "Kubernetes object state as Prometheus metrics")]
struct Cli {
    /// Address the metrics endpoint listens on
    #[arg(long, env = "KSTATE_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Only watch this namespace (default: all namespaces)
    #[arg(long, env = "KSTATE_NAMESPACE")]
    namespace: Option<String>,

    /// Collectors to enable, comma separated
    #[arg(
        long,
        env = "KSTATE_COLLECTORS",
        value_delimiter = ',',
        default_value = "limitranges,componentstatuses"
    )]
    collectors: Vec<Kind>,

    /// Explicit kubeconfig path (default: inferred)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Watcher -> ingest channel capacity per collector
    #[arg(long, env = "KSTATE_QUEUE_CAP", default_value_t = 2048)]
    queue_cap: usize,

    /// Seconds to wait for background tasks on shutdown
    #[arg(long, default_value_t = 5)]
    shutdown_grace_secs: u64,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat { Text, Json }

fn init_tracing(format: LogFormat) {
    let env = std::env::var("KSTATE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => fmt.init(),
        LogFormat::Json => fmt.json().init(),
    }
}

fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_scrape_metrics();
    describe_process_metrics();
    kstate_kubehub::describe_watch_metrics();
    kstate_store::describe_ingest_metrics();
}

/// Keep the requested order, drop repeats.
fn dedup_kinds(kinds: &[Kind]) -> Vec<Kind> {
    let mut out: Vec<Kind> = Vec::with_capacity(kinds.len());
    for k in kinds {
        if out.contains(k) {
            warn!(kind = %k, "collector listed more than once");
        } else {
            out.push(*k);
        }
    }
    out
}

async fn upkeep(handle: PrometheusHandle, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(UPKEEP_EVERY);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => handle.run_upkeep(),
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let term = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r {
                warn!(error = %e, "ctrl-c handler failed");
            }
            info!("interrupt received");
        }
        _ = term => info!("terminate received"),
        _ = cancel.cancelled() => return,
    }
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    let handle = init_metrics()?;

    let client = kstate_kubehub::connect(cli.kubeconfig.as_deref()).await?;
    let registry = Arc::new(Registry::new());
    let mut supervisor = Supervisor::new(Duration::from_secs(cli.shutdown_grace_secs));
    let opts = RegisterOptions { queue_cap: cli.queue_cap, stats: Arc::new(FacadeStats) };

    for kind in dedup_kinds(&cli.collectors) {
        kind.register(&registry, client.clone(), cli.namespace.as_deref(), &mut supervisor, &opts)
            .with_context(|| format!("registering {} collector", kind))?;
    }
    supervisor.spawn("metrics-upkeep", upkeep(handle.clone(), supervisor.token()));
    info!(collectors = ?registry.kinds(), tasks = supervisor.len(), "collectors started");

    let cancel = supervisor.token();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let state = AppState { registry, process: Some(handle) };
    let served = serve(cli.listen, state, cancel.clone().cancelled_owned()).await;
    cancel.cancel();
    supervisor.shutdown().await;
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use kstate_collectors::ScrapeStats;

    #[test]
    fn defaults_enable_every_collector() {
        let cli = Cli::try_parse_from(["kstate"]).unwrap();
        assert_eq!(cli.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.collectors, Kind::ALL.to_vec());
        assert_eq!(cli.queue_cap, 2048);
        assert_eq!(cli.shutdown_grace_secs, 5);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.namespace.is_none());
    }

    #[test]
    fn collectors_parse_as_comma_list() {
        let cli = Cli::try_parse_from(["kstate", "--collectors", "componentstatuses,limitranges", "--namespace", "kube-system"]).unwrap();
        assert_eq!(cli.collectors, vec![Kind::ComponentStatuses, Kind::LimitRanges]);
        assert_eq!(cli.namespace.as_deref(), Some("kube-system"));
    }

    #[test]
    fn unknown_collector_is_rejected_with_known_names() {
        let err = Cli::try_parse_from(["kstate", "--collectors", "pods"]).unwrap_err().to_string();
        assert!(err.contains("limitranges,componentstatuses"), "{err}");
    }

    #[test]
    fn every_process_metric_has_help() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            metrics::counter!(kstate_kubehub::WATCH_EVENTS, "resource" => "limitrange", "event" => "applied").increment(1);
            metrics::counter!(kstate_kubehub::WATCH_ERRORS, "resource" => "limitrange").increment(1);
            metrics::counter!(kstate_store::INGEST_BATCHES, "resource" => "limitrange").increment(1);
            metrics::gauge!(kstate_store::MIRROR_OBJECTS, "resource" => "limitrange").set(3.0);
            metrics::histogram!(kstate_exposition::server::SCRAPE_DURATION).record(0.01);
            metrics::counter!(kstate_exposition::server::DROPPED_SAMPLES, "resource" => "limitrange").increment(1);
            metrics::counter!(kstate_exposition::server::COLLECTOR_PANICS, "resource" => "limitrange").increment(1);
            FacadeStats.record_error("limitrange");
            FacadeStats.record_count("limitrange", 3);
        });
        let text = handle.render();
        for name in [
            "kstate_watch_events_total",
            "kstate_watch_errors_total",
            "kstate_ingest_batches_total",
            "kstate_mirror_objects",
            "kstate_scrape_duration_seconds",
            "kstate_dropped_samples_total",
            "kstate_collector_panics_total",
            "ksm_scrape_error_total",
            "ksm_resources_per_scrape",
        ] {
            assert!(text.contains(&format!("# HELP {name} ")), "no help for {name}:\n{text}");
        }
    }

    #[test]
    fn repeated_collectors_collapse() {
        let kinds = [Kind::LimitRanges, Kind::ComponentStatuses, Kind::LimitRanges];
        assert_eq!(dedup_kinds(&kinds), vec![Kind::LimitRanges, Kind::ComponentStatuses]);
    }
}
