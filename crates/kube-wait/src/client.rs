//! Kubernetes-backed event source
//!
//! Lists and watches objects through `Api<DynamicObject>`, addressed by the
//! resolved descriptor, so any registered kind (including CRDs) works without
//! a compile-time type.

use crate::error::WaitError;
use crate::models::{ObjectSnapshot, ResourceDescriptor, Selector, WatchEvent};
use crate::source::{EventSource, EventStream};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kube::api::{Api, WatchEvent as KubeWatchEvent, WatchParams};
use kube::core::DynamicObject;
use kube::Client;
use kube::core::ErrorResponse;
use std::fmt;
use tracing::debug;

type RawFeed = BoxStream<'static, kube::Result<KubeWatchEvent<DynamicObject>>>;

/// Event source that talks to the Kubernetes API server
#[derive(Clone)]
pub struct KubeEventSource {
    client: Client,
}

impl fmt::Debug for KubeEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventSource")
            .field("default_namespace", &self.client.default_namespace())
            .finish_non_exhaustive()
    }
}

impl KubeEventSource {
    /// Creates an event source for the given client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: Option<&str>, descriptor: &ResourceDescriptor) -> Api<DynamicObject> {
        let resource = descriptor.api_resource();
        match namespace {
            Some(ns) if descriptor.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait::async_trait]
impl EventSource for KubeEventSource {
    async fn list(
        &self,
        namespace: Option<&str>,
        descriptor: &ResourceDescriptor,
        selector: &Selector,
    ) -> Result<ObjectSnapshot, WaitError> {
        debug!(
            "Listing {} in {}",
            descriptor.plural,
            namespace.unwrap_or("all namespaces")
        );
        let list = self
            .api(namespace, descriptor)
            .list(&selector.list_params())
            .await?;
        Ok(ObjectSnapshot {
            resource_version: list.metadata.resource_version.unwrap_or_default(),
            items: list.items,
        })
    }

    async fn watch(
        &self,
        namespace: Option<&str>,
        descriptor: &ResourceDescriptor,
        selector: &Selector,
        resource_version: &str,
    ) -> Result<EventStream, WaitError> {
        let api = self.api(namespace, descriptor);
        let params = selector.watch_params();
        debug!(
            "Watching {} from resourceVersion {}",
            descriptor.plural, resource_version
        );
        let first = api.watch(&params, resource_version).await?.boxed();

        let feed = Feed {
            api,
            params,
            resource_version: resource_version.to_string(),
            inner: Some(first),
        };
        Ok(stream::unfold(feed, next_event).boxed())
    }
}

/// Watch connection plus what is needed to re-open it where it left off
struct Feed {
    api: Api<DynamicObject>,
    params: WatchParams,
    resource_version: String,
    inner: Option<RawFeed>,
}

/// Pull the next event, re-opening the watch from the last seen
/// resourceVersion when the server closes it cleanly. Errors are yielded,
/// never retried.
async fn next_event(
    mut feed: Feed,
) -> Option<(Result<WatchEvent<DynamicObject>, WaitError>, Feed)> {
    loop {
        if feed.inner.is_none() {
            debug!("Watch closed by server, resuming from {}", feed.resource_version);
            match feed.api.watch(&feed.params, &feed.resource_version).await {
                Ok(raw) => feed.inner = Some(raw.boxed()),
                Err(e) => return Some((Err(WaitError::Kube(e)), feed)),
            }
        }
        let Some(inner) = feed.inner.as_mut() else {
            continue;
        };

        match inner.next().await {
            Some(Ok(event)) => {
                if let Some(version) = resource_version_of(&event) {
                    feed.resource_version = version;
                }
                return Some((Ok(convert(event)), feed));
            }
            Some(Err(e)) => return Some((Err(WaitError::Kube(e)), feed)),
            None => feed.inner = None,
        }
    }
}

fn resource_version_of(event: &KubeWatchEvent<DynamicObject>) -> Option<String> {
    match event {
        KubeWatchEvent::Added(obj) | KubeWatchEvent::Modified(obj) | KubeWatchEvent::Deleted(obj) => {
            obj.metadata.resource_version.clone()
        }
        KubeWatchEvent::Bookmark(bookmark) => Some(bookmark.metadata.resource_version.clone()),
        KubeWatchEvent::Error(_) => None,
    }
}

fn convert(event: KubeWatchEvent<DynamicObject>) -> WatchEvent<DynamicObject> {
    match event {
        KubeWatchEvent::Added(obj) => WatchEvent::Added(obj),
        KubeWatchEvent::Modified(obj) => WatchEvent::Modified(obj),
        KubeWatchEvent::Deleted(obj) => WatchEvent::Deleted(obj),
        KubeWatchEvent::Bookmark(bookmark) => WatchEvent::Bookmark {
            resource_version: bookmark.metadata.resource_version,
        },
        KubeWatchEvent::Error(response) => WatchEvent::Error(error_message(&response)),
    }
}

/// Server error as "<code> <reason>: <message>", omitting empty parts
fn error_message(response: &ErrorResponse) -> String {
    match (response.reason.is_empty(), response.message.is_empty()) {
        (false, false) => format!("{} {}: {}", response.code, response.reason, response.message),
        (false, true) => format!("{} {}", response.code, response.reason),
        (true, false) => format!("{}: {}", response.code, response.message),
        (true, true) => format!("{} {}", response.code, response.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: u16, reason: &str, message: &str) -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: reason.to_string(),
            code,
        }
    }

    #[test]
    fn test_error_event_carries_server_message() {
        let event = convert(KubeWatchEvent::Error(response(
            410,
            "Expired",
            "too old resource version: 4711 (5000)",
        )));
        assert_eq!(
            event,
            WatchEvent::Error("410 Expired: too old resource version: 4711 (5000)".to_string())
        );
    }

    #[test]
    fn test_error_message_with_missing_parts() {
        assert_eq!(error_message(&response(500, "", "etcd unavailable")), "500: etcd unavailable");
        assert_eq!(error_message(&response(403, "Forbidden", "")), "403 Forbidden");
        assert_eq!(error_message(&response(500, "", "")), "500 Failure");
    }
}
