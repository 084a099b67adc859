//! Runs the requested wait and renders the outcome.

use crate::condition::{FieldCheck, all_match};
use crate::config::{Args, Command};
use crate::error::CliError;
use k8s_openapi::api::core::v1::Pod;
use kube::core::GroupVersionKind;
use kube_wait::conditions::{pod_in_phase, pod_ready};
use kube_wait::metadata::namespace_and_name;
use kube_wait::{EventSource, ResourceWaiter, TypeDiscovery, WatchEvent};
use serde_json::Value;
use tracing::info;

type PodPredicate = Box<dyn Fn(&Pod) -> bool + Send + Sync>;

fn pod_condition(phase: Option<&str>, ready: bool) -> PodPredicate {
    if ready {
        Box::new(pod_ready())
    } else {
        Box::new(pod_in_phase(phase.unwrap_or("Running")))
    }
}

/// Run the wait described by `args`; returns the line to print on success
pub async fn run<D, S>(waiter: &ResourceWaiter<D, S>, args: &Args) -> Result<String, CliError>
where
    D: TypeDiscovery,
    S: EventSource,
{
    let selector = args.selector()?;
    let namespace = args.namespace();

    match &args.command {
        Command::Pod { phase, ready } => {
            let gvk = GroupVersionKind::gvk("", "v1", "Pod");
            info!("Waiting for pods ({})", if *ready { "Ready" } else { phase.as_deref().unwrap_or("Running") });
            let event = waiter
                .wait_resource_event::<Pod, _>(
                    namespace,
                    &gvk,
                    &selector,
                    pod_condition(phase.as_deref(), *ready),
                    args.timeout,
                )
                .await?;
            report("pods", event)
        }
        Command::Resource { group, api_version, kind, fields } => {
            let checks = fields
                .iter()
                .map(|field| field.parse())
                .collect::<Result<Vec<FieldCheck>, _>>()?;
            let gvk = GroupVersionKind::gvk(group, api_version, kind);
            info!("Waiting for {} ({} field checks)", kind, fields.len());
            let event = waiter
                .wait_resource_event::<Value, _>(
                    namespace,
                    &gvk,
                    &selector,
                    all_match(checks),
                    args.timeout,
                )
                .await?;
            report(kind, event)
        }
    }
}

fn report<K: serde::Serialize>(what: &str, event: Option<WatchEvent<K>>) -> Result<String, CliError> {
    let Some(event) = event else {
        return Ok(format!("All matching {what} already satisfy the condition"));
    };
    let Some(object) = event.object() else {
        return Ok(format!("Condition met for {what}"));
    };

    let (namespace, name) = namespace_and_name(object)?;
    let target = if namespace.is_empty() {
        name
    } else {
        format!("{namespace}/{name}")
    };
    Ok(format!("Condition met for {what} {target} ({})", event.type_name()))
}
