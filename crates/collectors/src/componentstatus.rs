//! ComponentStatus metrics.

use k8s_openapi::api::core::v1::ComponentStatus;
use kstate_core::{MetricDescriptor, MetricSink, ObjectEmitter};

use crate::collector::KindMetrics;

pub static COMPONENT_STATUS_HEALTHY: MetricDescriptor = MetricDescriptor::gauge(
    "kube_componentstatus_status_healthy",
    "kube component status healthy status.",
    &["name", "status"],
);

static DESCRIPTORS: [&MetricDescriptor; 1] = [&COMPONENT_STATUS_HEALTHY];

const HEALTHY: &str = "Healthy";

pub struct ComponentStatusMetrics;

impl KindMetrics for ComponentStatusMetrics {
    type Object = ComponentStatus;
    const KIND: &'static str = "componentstatus";

    fn descriptors() -> &'static [&'static MetricDescriptor] { &DESCRIPTORS }

    fn convert(cs: &ComponentStatus, sink: &mut dyn MetricSink) {
        let name = cs.metadata.name.clone().unwrap_or_default();
        // first Healthy condition wins
        let Some(cond) = cs.conditions.iter().flatten().find(|c| c.type_ == HEALTHY) else { return };
        ObjectEmitter::new(sink, [name]).tri_state(&COMPONENT_STATUS_HEALTHY, &cond.status, &[]);
    }
}
