//! LimitRange metrics.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::LimitRange;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kstate_core::{quantity, MetricDescriptor, MetricSink, ObjectEmitter};

use crate::collector::KindMetrics;

pub static LIMIT_RANGE: MetricDescriptor = MetricDescriptor::gauge(
    "kube_limitrange",
    "Information about limit range.",
    &["limitrange", "namespace", "resource", "type", "constraint"],
);

pub static LIMIT_RANGE_CREATED: MetricDescriptor = MetricDescriptor::gauge(
    "kube_limitrange_created",
    "Unix creation timestamp",
    &["limitrange", "namespace"],
);

static DESCRIPTORS: [&MetricDescriptor; 2] = [&LIMIT_RANGE, &LIMIT_RANGE_CREATED];

pub struct LimitRangeMetrics;

impl KindMetrics for LimitRangeMetrics {
    type Object = LimitRange;
    const KIND: &'static str = "limitrange";

    fn descriptors() -> &'static [&'static MetricDescriptor] { &DESCRIPTORS }

    fn convert(lr: &LimitRange, sink: &mut dyn MetricSink) {
        let name = lr.metadata.name.clone().unwrap_or_default();
        let namespace = lr.metadata.namespace.clone().unwrap_or_default();
        let mut out = ObjectEmitter::new(sink, [name, namespace]);

        if let Some(ts) = &lr.metadata.creation_timestamp {
            out.gauge(&LIMIT_RANGE_CREATED, ts.0.timestamp() as f64, &[]);
        }

        let Some(spec) = &lr.spec else { return };
        for item in &spec.limits {
            let constraints: [(&str, &Option<BTreeMap<String, Quantity>>); 5] = [
                ("min", &item.min),
                ("max", &item.max),
                ("default", &item.default),
                ("defaultRequest", &item.default_request),
                ("maxLimitRequestRatio", &item.max_limit_request_ratio),
            ];
            for (constraint, values) in constraints {
                for (resource, q) in values.iter().flatten() {
                    if let Some(v) = quantity::units(&q.0) {
                        out.gauge(&LIMIT_RANGE, v, &[resource.as_str(), item.type_.as_str(), constraint]);
                    }
                }
            }
        }
    }
}
