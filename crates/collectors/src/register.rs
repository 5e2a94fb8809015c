//! Registration entrypoints: watch cache + collector + supervised background tasks.

use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{ComponentStatus, LimitRange};
use kstate_exposition::{Registry, RegistryError};
use kstate_kubehub::{run_watcher, Supervisor};
use kstate_store::spawn_ingest;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::collector::{KindCollector, KindMetrics};
use crate::componentstatus::ComponentStatusMetrics;
use crate::limitrange::LimitRangeMetrics;
use crate::stats::ScrapeStats;

pub struct RegisterOptions {
    /// Capacity of the watcher -> ingest delta channel.
    pub queue_cap: usize,
    pub stats: Arc<dyn ScrapeStats>,
}

/// Build the watch cache for `M`, register its collector, and start the watcher and
/// ingest tasks under `supervisor`. A kind already present in the registry is
/// rejected before anything is started.
pub fn register_kind<M>(
    registry: &Registry,
    api: Api<M::Object>,
    supervisor: &mut Supervisor,
    opts: &RegisterOptions,
) -> Result<(), RegistryError>
where
    M: KindMetrics,
    M::Object: Resource + Clone + DeserializeOwned + Debug,
{
    if registry.contains(M::KIND) {
        return Err(RegistryError::DuplicateCollector(M::KIND));
    }
    // On a registry error `tx` drops here and the ingest loop exits by itself.
    let (tx, cache, ingest) = spawn_ingest::<M::Object>(M::KIND, opts.queue_cap);
    registry.register(Arc::new(KindCollector::<M>::new(Arc::new(cache), Arc::clone(&opts.stats))))?;
    opts.stats.prime(M::KIND);

    supervisor.adopt(format!("{}-ingest", M::KIND), ingest);
    let token = supervisor.token();
    supervisor.spawn(format!("{}-watch", M::KIND), run_watcher(M::KIND, api, tx, token));
    info!(kind = M::KIND, "collector registered");
    Ok(())
}

pub fn register_limit_range_collector(
    registry: &Registry,
    client: Client,
    namespace: Option<&str>,
    supervisor: &mut Supervisor,
    opts: &RegisterOptions,
) -> Result<(), RegistryError> {
    let api: Api<LimitRange> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    info!(namespace = namespace.unwrap_or("<all>"), "collect limitranges");
    register_kind::<LimitRangeMetrics>(registry, api, supervisor, opts)
}

/// ComponentStatus is cluster-scoped; the namespace filter does not apply.
pub fn register_component_status_collector(
    registry: &Registry,
    client: Client,
    _namespace: Option<&str>,
    supervisor: &mut Supervisor,
    opts: &RegisterOptions,
) -> Result<(), RegistryError> {
    info!("collect componentstatuses");
    register_kind::<ComponentStatusMetrics>(registry, Api::all(client), supervisor, opts)
}

/// Collectors selectable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    LimitRanges,
    ComponentStatuses,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::LimitRanges, Kind::ComponentStatuses];

    pub fn name(self) -> &'static str {
        match self {
            Kind::LimitRanges => "limitranges",
            Kind::ComponentStatuses => "componentstatuses",
        }
    }

    pub fn register(
        self,
        registry: &Registry,
        client: Client,
        namespace: Option<&str>,
        supervisor: &mut Supervisor,
        opts: &RegisterOptions,
    ) -> Result<(), RegistryError> {
        match self {
            Kind::LimitRanges => register_limit_range_collector(registry, client, namespace, supervisor, opts),
            Kind::ComponentStatuses => register_component_status_collector(registry, client, namespace, supervisor, opts),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collector {name:?} (known: {known})")]
pub struct UnknownKind {
    pub name: String,
    pub known: String,
}

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Kind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| UnknownKind {
                name: wanted.to_string(),
                known: Kind::ALL.map(Kind::name).join(","),
            })
    }
}
