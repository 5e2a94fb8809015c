#![forbid(unsafe_code)]

mod common;

use k8s_openapi::api::core::v1::ComponentStatus;
use kstate_collectors::{ComponentStatusMetrics, KindMetrics};
use kstate_core::MetricSample;
use serde_json::json;

use common::{flatten, from_json};

fn convert(cs: &ComponentStatus) -> Vec<MetricSample> {
    let mut out = Vec::new();
    ComponentStatusMetrics::convert(cs, &mut out);
    out
}

fn status_values(cs: &ComponentStatus) -> Vec<(String, f64)> {
    convert(cs).iter().map(|s| (s.labels[1].clone(), s.value)).collect()
}

fn component(status: &str) -> ComponentStatus {
    from_json(json!({
        "metadata": { "name": "etcd-0" },
        "conditions": [{ "type": "Healthy", "status": status }]
    }))
}

#[test]
fn every_status_expands_to_exactly_one_hot_sample() {
    for status in ["True", "False", "Unknown"] {
        let got = status_values(&component(status));
        assert_eq!(got.len(), 3, "status {status}");
        assert_eq!(got.iter().filter(|(_, v)| *v == 1.0).count(), 1, "status {status}");
        assert_eq!(got.iter().filter(|(_, v)| *v == 0.0).count(), 2, "status {status}");
        assert!(got.contains(&(status.to_string(), 1.0)), "status {status}");
    }
}

#[test]
fn unknown_status_sample_layout() {
    let got = flatten(&convert(&component("Unknown")));
    let name = "kube_componentstatus_status_healthy";
    assert_eq!(
        got,
        vec![
            (name, vec!["etcd-0".to_string(), "True".to_string()], 0.0),
            (name, vec!["etcd-0".to_string(), "False".to_string()], 0.0),
            (name, vec!["etcd-0".to_string(), "Unknown".to_string()], 1.0),
        ]
    );
}

#[test]
fn first_healthy_condition_wins() {
    let cs: ComponentStatus = from_json(json!({
        "metadata": { "name": "scheduler" },
        "conditions": [
            { "type": "Other", "status": "False" },
            { "type": "Healthy", "status": "True" },
            { "type": "Healthy", "status": "False" }
        ]
    }));
    let got = status_values(&cs);
    assert_eq!(got.len(), 3);
    assert!(got.contains(&("True".to_string(), 1.0)));
}

#[test]
fn no_conditions_means_no_samples() {
    let cs: ComponentStatus = from_json(json!({ "metadata": { "name": "controller-manager" } }));
    assert!(convert(&cs).is_empty());
    let other: ComponentStatus = from_json(json!({
        "metadata": { "name": "x" },
        "conditions": [{ "type": "Ready", "status": "True" }]
    }));
    assert!(convert(&other).is_empty());
}

#[test]
fn samples_match_declared_arity() {
    let samples = convert(&component("True"));
    assert!(samples.iter().all(|s| s.arity_ok()));
    assert!(samples.iter().all(|s| ComponentStatusMetrics::descriptors().iter().any(|d| std::ptr::eq(*d, s.desc))));
}
