//! kstate kubehub: client setup and typed list+watch wiring into the watch cache.

#![forbid(unsafe_code)]

use std::fmt::Debug;
use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use kstate_store::Delta;
use kube::{
    api::Api,
    config::{KubeConfigOptions, Kubeconfig},
    runtime::{
        watcher::{self, Event},
        WatchStreamExt,
    },
    Client, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod supervisor;

pub use supervisor::Supervisor;

pub const WATCH_EVENTS: &str = "kstate_watch_events_total";
pub const WATCH_ERRORS: &str = "kstate_watch_errors_total";

/// Help text for the watcher metrics. Call once after installing a recorder.
pub fn describe_watch_metrics() {
    metrics::describe_counter!(WATCH_EVENTS, "Watch events received, by resource and event type");
    metrics::describe_counter!(WATCH_ERRORS, "Watch stream errors, by resource");
}

/// Build a client from an explicit kubeconfig, or infer one (in-cluster or
/// `$KUBECONFIG`), then probe the API server so a misconfiguration fails at startup.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    let client = match kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path)
                .with_context(|| format!("reading kubeconfig {}", path.display()))?;
            let cfg = kube::Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                .await
                .context("building client config from kubeconfig")?;
            Client::try_from(cfg).context("constructing kube client")?
        }
        None => Client::try_default().await.context("inferring kube client config")?,
    };
    let info = client.apiserver_version().await.context("probing API server version")?;
    info!(version = %info.git_version, platform = %info.platform, "connected to API server");
    Ok(client)
}

fn strip_managed_fields<K: Resource>(obj: &mut K) {
    obj.managed_fields_mut().clear();
}

fn event_name<K>(ev: &Event<K>) -> &'static str {
    match ev {
        Event::Applied(_) => "applied",
        Event::Deleted(_) => "deleted",
        Event::Restarted(_) => "restarted",
    }
}

/// Translate one watcher item into an ingest delta, dropping managed fields.
pub fn delta_from<K: Resource>(res: watcher::Result<Event<K>>) -> Delta<K> {
    match res {
        Ok(Event::Applied(mut o)) => {
            strip_managed_fields(&mut o);
            Delta::Applied(o)
        }
        Ok(Event::Deleted(o)) => Delta::Deleted(o),
        Ok(Event::Restarted(mut list)) => {
            list.iter_mut().for_each(strip_managed_fields);
            Delta::Restarted(list)
        }
        Err(e) => Delta::Fault(e.to_string()),
    }
}

/// Run list+watch for one kind until cancelled, forwarding deltas to the ingest loop.
/// Transport errors are forwarded as faults; the stream backs off and relists on its
/// own.
pub async fn run_watcher<K>(kind: &'static str, api: Api<K>, tx: mpsc::Sender<Delta<K>>, cancel: CancellationToken)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    futures::pin_mut!(stream);
    info!(kind, "watcher started");
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(kind, "watcher cancelled");
                break;
            }
            next = stream.next() => next,
        };
        let Some(res) = next else {
            warn!(kind, "watcher stream ended");
            break;
        };
        match &res {
            Ok(ev) => {
                metrics::counter!(WATCH_EVENTS, "resource" => kind, "event" => event_name(ev)).increment(1);
                if let Event::Restarted(list) = ev {
                    debug!(kind, count = list.len(), "watch restart");
                }
            }
            Err(e) => {
                warn!(kind, error = %e, "watch error; backing off");
                metrics::counter!(WATCH_ERRORS, "resource" => kind).increment(1);
            }
        }
        let delta = delta_from(res);
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(delta) => {
                if sent.is_err() {
                    debug!(kind, "ingest loop gone; stopping watcher");
                    break;
                }
            }
        }
    }
    info!(kind, "watcher stopped");
}
