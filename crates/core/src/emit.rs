//! Per-object emission helper used by conversion routines.

use smallvec::SmallVec;

use crate::{LabelValues, MetricDescriptor, MetricSample, MetricSink};

/// Condition states, in emission order.
pub const CONDITION_STATES: [&str; 3] = ["True", "False", "Unknown"];

/// Wraps a sink with the object's identifying label values (name, namespace, ...),
/// which are prepended to every sample emitted through it.
pub struct ObjectEmitter<'s> {
    sink: &'s mut dyn MetricSink,
    prefix: SmallVec<[String; 2]>,
}

impl<'s> ObjectEmitter<'s> {
    pub fn new<I>(sink: &'s mut dyn MetricSink, prefix: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self { sink, prefix: prefix.into_iter().collect() }
    }

    pub fn gauge(&mut self, desc: &'static MetricDescriptor, value: f64, extra: &[&str]) {
        let mut labels = LabelValues::with_capacity(self.prefix.len() + extra.len());
        labels.extend(self.prefix.iter().cloned());
        labels.extend(extra.iter().map(|s| (*s).to_string()));
        self.sink.emit(MetricSample::new(desc, labels, value));
    }

    /// Expands a tri-state condition status into one sample per state, with the state
    /// as the last label. Exactly one sample is 1 when `status` is a known state.
    pub fn tri_state(&mut self, desc: &'static MetricDescriptor, status: &str, extra: &[&str]) {
        for state in CONDITION_STATES {
            let mut lv: SmallVec<[&str; 4]> = extra.iter().copied().collect();
            lv.push(state);
            self.gauge(desc, crate::bool_f64(status == state), &lv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static COND: MetricDescriptor = MetricDescriptor::gauge("kube_x_ready", "Ready.", &["x", "status"]);
    static INFO: MetricDescriptor = MetricDescriptor::gauge("kube_x_info", "Info.", &["x", "namespace", "kind"]);

    #[test]
    fn prefix_comes_first() {
        let mut out: Vec<MetricSample> = Vec::new();
        let mut em = ObjectEmitter::new(&mut out, ["a".to_string(), "ns".to_string()]);
        em.gauge(&INFO, 1.0, &["pod"]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].labels.as_slice(), &["a", "ns", "pod"]);
        assert!(out[0].arity_ok());
    }

    #[test]
    fn tri_state_unknown_status() {
        let mut out: Vec<MetricSample> = Vec::new();
        ObjectEmitter::new(&mut out, ["c".to_string()]).tri_state(&COND, "Bogus", &[]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|s| s.value == 0.0));
    }
}
