//! kstate core types: metric descriptors and samples, plus the two seams every
//! resource kind plugs into (`ResourceLister` for reads, `Collector` for scrapes).

#![forbid(unsafe_code)]

use std::sync::Arc;

use smallvec::SmallVec;

pub mod emit;
pub mod quantity;

pub use emit::ObjectEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Gauge,
    Counter,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Gauge => "gauge",
            ValueKind::Counter => "counter",
        }
    }
}

/// Static identity of one metric family. Declared once as a `static` per family and
/// shared by reference with every scrape.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    pub kind: ValueKind,
}

impl MetricDescriptor {
    pub const fn gauge(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels, kind: ValueKind::Gauge }
    }

    pub const fn counter(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels, kind: ValueKind::Counter }
    }
}

/// Positional label values; object name/namespace first by convention.
pub type LabelValues = SmallVec<[String; 6]>;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub desc: &'static MetricDescriptor,
    pub labels: LabelValues,
    pub value: f64,
    pub kind: ValueKind,
}

impl MetricSample {
    pub fn new(desc: &'static MetricDescriptor, labels: LabelValues, value: f64) -> Self {
        Self { desc, labels, value, kind: desc.kind }
    }

    /// Label-value count matches the descriptor's label names.
    pub fn arity_ok(&self) -> bool {
        self.labels.len() == self.desc.labels.len()
    }
}

/// Receives samples as a collector produces them.
pub trait MetricSink {
    fn emit(&mut self, sample: MetricSample);
}

impl MetricSink for Vec<MetricSample> {
    fn emit(&mut self, sample: MetricSample) {
        self.push(sample);
    }
}

/// One collector per resource kind. `describe` is fixed for the collector's lifetime;
/// `collect` runs once per scrape and never fails.
pub trait Collector: Send + Sync {
    fn kind(&self) -> &'static str;
    fn describe(&self) -> &'static [&'static MetricDescriptor];
    fn collect(&self, sink: &mut dyn MetricSink);
}

/// Ordered, immutable contents of a watch cache as of one ingest epoch.
#[derive(Debug)]
pub struct ObjectSnapshot<K> {
    pub epoch: u64,
    pub items: Vec<Arc<K>>,
}

impl<K> ObjectSnapshot<K> {
    pub fn new(epoch: u64, items: Vec<Arc<K>>) -> Self {
        Self { epoch, items }
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.items.iter().map(|o| o.as_ref())
    }
}

impl<K> Default for ObjectSnapshot<K> {
    fn default() -> Self {
        Self { epoch: 0, items: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("{kind}: watch cache not yet synchronized")]
    NotSynced { kind: &'static str },
    #[error("{kind}: watch faulted: {reason}")]
    Faulted { kind: &'static str, reason: String },
}

/// Read side of a watch cache. Implementations must not touch the network and must
/// return either a complete snapshot or an error.
pub trait ResourceLister<K>: Send + Sync {
    fn list(&self) -> Result<Arc<ObjectSnapshot<K>>, ListError>;
}

impl<K, L> ResourceLister<K> for Arc<L>
where
    L: ResourceLister<K> + ?Sized,
{
    fn list(&self) -> Result<Arc<ObjectSnapshot<K>>, ListError> {
        (**self).list()
    }
}

pub fn bool_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

pub mod prelude {
    pub use super::{
        bool_f64, Collector, LabelValues, ListError, MetricDescriptor, MetricSample, MetricSink,
        ObjectEmitter, ObjectSnapshot, ResourceLister, ValueKind,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    static DESC: MetricDescriptor = MetricDescriptor::gauge("kube_thing", "A thing.", &["thing", "namespace"]);

    #[test]
    fn sample_takes_kind_from_descriptor() {
        let s = MetricSample::new(&DESC, LabelValues::from_vec(vec!["a".into(), "ns".into()]), 2.0);
        assert_eq!(s.kind, ValueKind::Gauge);
        assert!(s.arity_ok());
    }

    #[test]
    fn arity_mismatch_is_detected() {
        let s = MetricSample::new(&DESC, LabelValues::from_vec(vec!["a".into()]), 2.0);
        assert!(!s.arity_ok());
    }

    #[test]
    fn arc_lister_delegates() {
        struct Fixed;
        impl ResourceLister<u32> for Fixed {
            fn list(&self) -> Result<Arc<ObjectSnapshot<u32>>, ListError> {
                Ok(Arc::new(ObjectSnapshot::new(3, vec![Arc::new(7)])))
            }
        }
        let l: Arc<dyn ResourceLister<u32>> = Arc::new(Fixed);
        let snap = l.list().unwrap();
        assert_eq!(snap.epoch, 3);
        assert_eq!(snap.iter().copied().collect::<Vec<_>>(), vec![7]);
    }
}
