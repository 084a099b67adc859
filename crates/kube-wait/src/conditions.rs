//! Ready-made predicates for common waits

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;

/// Pod has reached the given phase ("Pending", "Running", "Succeeded", ...)
pub fn pod_in_phase(phase: impl Into<String>) -> impl Fn(&Pod) -> bool + Send + Sync + 'static {
    let phase = phase.into();
    move |pod: &Pod| {
        pod.status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            == Some(phase.as_str())
    }
}

/// Pod reports the `Ready` condition as `True`
pub fn pod_ready() -> impl Fn(&Pod) -> bool + Send + Sync + 'static {
    |pod: &Pod| {
        pod.status
            .as_ref()
            .and_then(|status| status.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            })
    }
}

/// Deployment reports the `Available` condition as `True`
pub fn deployment_available() -> impl Fn(&Deployment) -> bool + Send + Sync + 'static {
    |deployment: &Deployment| {
        deployment
            .status
            .as_ref()
            .and_then(|status| status.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Available" && c.status == "True")
            })
    }
}
