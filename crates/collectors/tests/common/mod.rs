#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kstate_core::{ListError, MetricSample, ObjectSnapshot, ResourceLister};

/// Serves the same snapshot on every call and counts calls.
pub struct FixedLister<K> {
    snapshot: Arc<ObjectSnapshot<K>>,
    pub calls: AtomicUsize,
}

impl<K> FixedLister<K> {
    pub fn new(items: Vec<K>) -> Self {
        let items = items.into_iter().map(Arc::new).collect();
        Self { snapshot: Arc::new(ObjectSnapshot::new(1, items)), calls: AtomicUsize::new(0) }
    }
}

impl<K: Send + Sync> ResourceLister<K> for FixedLister<K> {
    fn list(&self) -> Result<Arc<ObjectSnapshot<K>>, ListError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.snapshot))
    }
}

/// Always reports an unsynchronized cache.
pub struct UnsyncedLister(pub &'static str);

impl<K> ResourceLister<K> for UnsyncedLister {
    fn list(&self) -> Result<Arc<ObjectSnapshot<K>>, ListError> {
        Err(ListError::NotSynced { kind: self.0 })
    }
}

pub fn from_json<K: serde::de::DeserializeOwned>(v: serde_json::Value) -> K {
    serde_json::from_value(v).expect("fixture must deserialize")
}

/// (family, labels, value) triples, in emission order.
pub fn flatten(samples: &[MetricSample]) -> Vec<(&'static str, Vec<String>, f64)> {
    samples.iter().map(|s| (s.desc.name, s.labels.to_vec(), s.value)).collect()
}

/// Value of the series whose exposition line starts with `series` (name plus labels).
pub fn value_of(body: &str, series: &str) -> Option<f64> {
    body.lines()
        .find_map(|l| l.strip_prefix(series)?.strip_prefix(' '))
        .and_then(|v| v.trim().parse().ok())
}
