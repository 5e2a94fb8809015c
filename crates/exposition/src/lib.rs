//! kstate exposition: the collector registry and its Prometheus text rendering.
//!
//! Collectors are registered once (families checked for clashes up front) and
//! encoded through `prometheus_client` on every scrape. Scrapes share a read lock;
//! registration takes the write lock.

#![forbid(unsafe_code)]

use std::sync::Arc;

use kstate_core::Collector;
use parking_lot::RwLock;
use prometheus_client::encoding::text::encode_registry;
use prometheus_client::registry::Registry as PromRegistry;
use tracing::{debug, error};

mod encode;
pub mod server;

pub use encode::FamilySink;
pub use server::{describe_process_metrics, router, serve, AppState, CONTENT_TYPE};

use encode::Exported;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("collector for {0} already registered")]
    DuplicateCollector(&'static str),
    #[error("metric family {0} declared by more than one collector")]
    DuplicateFamily(&'static str),
}

#[derive(Default)]
struct Inner {
    prom: PromRegistry,
    collectors: Vec<Arc<dyn Collector>>,
}

#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    /// Register a collector. Fails, leaving the registry unchanged, if its kind is
    /// already present or one of its families clashes with one already declared.
    pub fn register(&self, collector: Arc<dyn Collector>) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let kind = collector.kind();
        if inner.collectors.iter().any(|c| c.kind() == kind) {
            return Err(RegistryError::DuplicateCollector(kind));
        }
        let declared = collector.describe();
        for (i, desc) in declared.iter().enumerate() {
            let clash_within = declared[..i].iter().any(|d| d.name == desc.name);
            let clash_across = inner.collectors.iter().flat_map(|c| c.describe().iter()).any(|d| d.name == desc.name);
            if clash_within || clash_across {
                return Err(RegistryError::DuplicateFamily(desc.name));
            }
        }
        inner.prom.register_collector(Box::new(Exported(Arc::clone(&collector))));
        inner.collectors.push(collector);
        debug!(kind, families = declared.len(), "collector registered");
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.inner.read().collectors.iter().any(|c| c.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.inner.read().collectors.iter().map(|c| c.kind()).collect()
    }

    /// Run every collector once and render the combined text exposition.
    pub fn gather(&self) -> String {
        let mut out = String::with_capacity(4096);
        if let Err(e) = encode_registry(&mut out, &self.inner.read().prom) {
            error!(error = %e, "encoding registry failed");
        }
        out
    }
}

