//! HTTP endpoint serving the registry (plus facade metrics) to scrapers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::Registry;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub const SCRAPE_DURATION: &str = "kstate_scrape_duration_seconds";
pub const DROPPED_SAMPLES: &str = "kstate_dropped_samples_total";
pub const COLLECTOR_PANICS: &str = "kstate_collector_panics_total";

/// Help text for the exposition metrics. Call once after installing a recorder.
pub fn describe_process_metrics() {
    metrics::describe_histogram!(SCRAPE_DURATION, "Time spent answering a /metrics request");
    metrics::describe_counter!(DROPPED_SAMPLES, "Samples dropped for an undeclared family or wrong label arity");
    metrics::describe_counter!(COLLECTOR_PANICS, "Scrapes in which a collector panicked");
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    /// Renders process metrics recorded through the `metrics` facade (scrape stats,
    /// watcher and ingest counters). `None` when no recorder was installed.
    pub process: Option<PrometheusHandle>,
}

const LANDING: &str = "kstate\n\n/metrics  cluster object metrics\n/healthz  liveness\n";

async fn landing() -> &'static str { LANDING }

async fn healthz() -> &'static str { "ok" }

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let registry = Arc::clone(&state.registry);
    // A failed gather still answers 200 with whatever else is available.
    let mut body = match tokio::task::spawn_blocking(move || registry.gather()).await {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "gather task failed");
            String::new()
        }
    };
    if let Some(handle) = &state.process {
        body.push_str(&handle.render());
    }
    metrics::histogram!(SCRAPE_DURATION).record(started.elapsed().as_secs_f64());
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "serving metrics");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("metrics server")?;
    info!("metrics server stopped");
    Ok(())
}
