//! Generic per-kind collector: one list per scrape, one conversion per object.

use std::sync::Arc;

use kstate_core::{Collector, MetricDescriptor, MetricSink, ResourceLister};
use tracing::{debug, error};

use crate::stats::ScrapeStats;

/// Mapping from one object kind to its metric families.
pub trait KindMetrics: Send + Sync + 'static {
    type Object: Send + Sync + 'static;

    /// Value of the `resource` label on scrape stats.
    const KIND: &'static str;

    /// Every family `convert` may emit into.
    fn descriptors() -> &'static [&'static MetricDescriptor];

    /// Pure and infallible: missing fields mean fewer samples, never an error.
    fn convert(obj: &Self::Object, sink: &mut dyn MetricSink);
}

pub struct KindCollector<M: KindMetrics> {
    lister: Arc<dyn ResourceLister<M::Object>>,
    stats: Arc<dyn ScrapeStats>,
}

impl<M: KindMetrics> KindCollector<M> {
    pub fn new(lister: Arc<dyn ResourceLister<M::Object>>, stats: Arc<dyn ScrapeStats>) -> Self {
        Self { lister, stats }
    }
}

impl<M: KindMetrics> Collector for KindCollector<M> {
    fn kind(&self) -> &'static str { M::KIND }

    fn describe(&self) -> &'static [&'static MetricDescriptor] { M::descriptors() }

    fn collect(&self, sink: &mut dyn MetricSink) {
        let snapshot = match self.lister.list() {
            Ok(s) => s,
            Err(e) => {
                self.stats.record_error(M::KIND);
                error!(kind = M::KIND, error = %e, "listing failed");
                return;
            }
        };
        self.stats.record_count(M::KIND, snapshot.len());
        for obj in snapshot.iter() {
            M::convert(obj, sink);
        }
        debug!(kind = M::KIND, count = snapshot.len(), epoch = snapshot.epoch, "collected");
    }
}
