//! Bridge from kstate collectors to `prometheus_client`'s descriptor encoder.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use kstate_core::{Collector, LabelValues, MetricDescriptor, MetricSample, MetricSink, ValueKind};
use prometheus_client::collector::Collector as EncodeCollector;
use prometheus_client::encoding::{DescriptorEncoder, EncodeMetric, MetricEncoder};
use prometheus_client::metrics::counter::ConstCounter;
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::metrics::MetricType;
use tracing::{debug, error, warn};

use crate::server::{COLLECTOR_PANICS, DROPPED_SAMPLES};

/// Sink for one collector's scrape. Samples are grouped per declared family so the
/// encoder sees each family once, headers first. Samples for undeclared families,
/// with the wrong label arity, or with a value kind that disagrees with the
/// descriptor are dropped.
pub struct FamilySink {
    kind: &'static str,
    families: Vec<(&'static MetricDescriptor, Vec<(LabelValues, f64)>)>,
    accepted: usize,
    dropped: usize,
}

impl FamilySink {
    pub fn new(kind: &'static str, declared: &[&'static MetricDescriptor]) -> Self {
        Self {
            kind,
            families: declared.iter().map(|d| (*d, Vec::new())).collect(),
            accepted: 0,
            dropped: 0,
        }
    }

    pub fn accepted(&self) -> usize { self.accepted }
    pub fn dropped(&self) -> usize { self.dropped }

    /// Forget every accepted sample; declared families still encode their headers.
    pub fn clear(&mut self) {
        for (_, rows) in &mut self.families {
            rows.clear();
        }
        self.accepted = 0;
    }

    /// Every declared family in declaration order: descriptor, then its samples.
    pub fn encode(&self, encoder: &mut DescriptorEncoder) -> Result<(), fmt::Error> {
        for (desc, rows) in &self.families {
            let mut family = encoder.encode_descriptor(desc.name, desc.help, None, metric_type(desc.kind))?;
            if desc.labels.is_empty() {
                // An unlabeled family is a single series.
                if let Some((_, v)) = rows.last() {
                    encode_value(desc.kind, *v, family)?;
                }
                continue;
            }
            for (values, v) in rows {
                let labels: Vec<(&str, &str)> =
                    desc.labels.iter().copied().zip(values.iter().map(String::as_str)).collect();
                encode_value(desc.kind, *v, family.encode_family(&labels)?)?;
            }
        }
        Ok(())
    }
}

impl MetricSink for FamilySink {
    fn emit(&mut self, sample: MetricSample) {
        let Some((desc, rows)) = self.families.iter_mut().find(|(d, _)| d.name == sample.desc.name) else {
            debug!(kind = self.kind, family = sample.desc.name, "sample for undeclared family");
            self.dropped += 1;
            return;
        };
        if !sample.arity_ok() || sample.kind != desc.kind {
            debug!(kind = self.kind, family = desc.name, labels = sample.labels.len(), "malformed sample");
            self.dropped += 1;
            return;
        }
        rows.push((sample.labels, sample.value));
        self.accepted += 1;
    }
}

fn metric_type(kind: ValueKind) -> MetricType {
    match kind {
        ValueKind::Gauge => MetricType::Gauge,
        ValueKind::Counter => MetricType::Counter,
    }
}

fn encode_value(kind: ValueKind, v: f64, series: MetricEncoder<'_>) -> Result<(), fmt::Error> {
    match kind {
        ValueKind::Gauge => ConstGauge::new(v).encode(series),
        ValueKind::Counter => ConstCounter::new(v).encode(series),
    }
}

/// A kstate collector as seen by the `prometheus_client` registry. A panicking
/// collector loses only its own samples for that scrape.
pub(crate) struct Exported(pub(crate) Arc<dyn Collector>);

impl fmt::Debug for Exported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Exported").field(&self.0.kind()).finish()
    }
}

impl EncodeCollector for Exported {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), fmt::Error> {
        let c = &self.0;
        let mut sink = FamilySink::new(c.kind(), c.describe());
        let run = panic::catch_unwind(AssertUnwindSafe(|| c.collect(&mut sink)));
        if run.is_err() {
            error!(kind = c.kind(), "collector panicked; its samples are omitted from this scrape");
            metrics::counter!(COLLECTOR_PANICS, "resource" => c.kind()).increment(1);
            sink.clear();
        } else if sink.dropped() > 0 {
            warn!(kind = c.kind(), dropped = sink.dropped(), "collector emitted invalid samples");
            metrics::counter!(DROPPED_SAMPLES, "resource" => c.kind()).increment(sink.dropped() as u64);
        }
        sink.encode(&mut encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode_registry;
    use prometheus_client::registry::Registry as PromRegistry;

    static INFO: MetricDescriptor = MetricDescriptor::gauge("kube_thing", "Thing info.", &["thing", "namespace"]);
    static BARE: MetricDescriptor = MetricDescriptor::counter("kube_bare", "Bare.", &[]);

    fn lv(v: &[&str]) -> LabelValues {
        v.iter().map(|s| s.to_string()).collect()
    }

    struct Fixed(Vec<MetricSample>);

    impl Collector for Fixed {
        fn kind(&self) -> &'static str { "thing" }
        fn describe(&self) -> &'static [&'static MetricDescriptor] {
            static DECLARED: [&MetricDescriptor; 2] = [&INFO, &BARE];
            &DECLARED
        }
        fn collect(&self, sink: &mut dyn MetricSink) {
            for s in &self.0 {
                sink.emit(s.clone());
            }
        }
    }

    fn render(samples: Vec<MetricSample>) -> String {
        let mut reg = PromRegistry::default();
        reg.register_collector(Box::new(Exported(Arc::new(Fixed(samples)))));
        let mut out = String::new();
        encode_registry(&mut out, &reg).unwrap();
        out
    }

    #[test]
    fn sink_groups_by_family_and_drops_bad_samples() {
        let mut sink = FamilySink::new("thing", &[&INFO, &BARE]);
        sink.emit(MetricSample::new(&BARE, LabelValues::new(), 1.0));
        sink.emit(MetricSample::new(&INFO, lv(&["a", "ns"]), 1.0));
        sink.emit(MetricSample::new(&INFO, lv(&["only-one"]), 1.0));
        sink.emit(MetricSample::new(&BARE, LabelValues::new(), 2.0));
        assert_eq!(sink.accepted(), 3);
        assert_eq!(sink.dropped(), 1);
        sink.clear();
        assert_eq!(sink.accepted(), 0);
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn families_follow_declaration_order() {
        let out = render(vec![
            MetricSample::new(&BARE, LabelValues::new(), 2.0),
            MetricSample::new(&INFO, lv(&["a", "ns"]), 1.5),
        ]);
        let info_at = out.find("# HELP kube_thing Thing info.").unwrap();
        let bare_at = out.find("# HELP kube_bare Bare.").unwrap();
        assert!(info_at < bare_at);
        assert!(out.contains("# TYPE kube_thing gauge\n"));
        assert!(out.contains("# TYPE kube_bare counter\n"));
        assert!(out.contains("kube_thing{thing=\"a\",namespace=\"ns\"} 1.5\n"));
        assert!(out.lines().any(|l| l.starts_with("kube_bare_total ")));
    }

    #[test]
    fn empty_families_still_get_headers() {
        let out = render(Vec::new());
        assert!(out.contains("# HELP kube_thing Thing info.\n# TYPE kube_thing gauge\n"));
        assert!(out.contains("# TYPE kube_bare counter\n"));
        assert!(!out.contains("kube_thing{"));
    }
}
