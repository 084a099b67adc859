//! Helper functions for building test objects

use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde::Serialize;

/// Convert a typed object into the untyped form event sources deal in
pub fn to_dynamic<K: Serialize>(object: &K) -> DynamicObject {
    let value = serde_json::to_value(object).unwrap();
    serde_json::from_value(value).unwrap()
}

/// Helper to create a Pod in the given phase
pub fn pod(namespace: &str, name: &str, phase: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}

/// Helper to create a Pod with a `Ready` condition
pub fn pod_with_conditions(namespace: &str, name: &str, phase: &str, ready: bool) -> Pod {
    let mut pod = pod(namespace, name, phase);
    if let Some(status) = pod.status.as_mut() {
        status.conditions = Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            ..Default::default()
        }]);
    }
    pod
}
