//! Caller-facing wait API
//!
//! `ResourceWaiter` pairs a type resolver with an event source. Each call
//! resolves the kind first; a resolution failure returns before any list or
//! watch request is made. The call's deadline is fixed before resolution and
//! bounds it together with the list and the watch.

use crate::client::KubeEventSource;
use crate::discovery::{KubeDiscovery, gvk_display};
use crate::error::WaitError;
use crate::models::{Selector, WatchEvent};
use crate::source::{EventSource, TypeDiscovery};
use crate::watcher::{WaitSession, deadline_after};
use k8s_openapi::api::core::v1::Pod;
use kube::core::GroupVersionKind;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout_at;
use tracing::info;

/// Blocks until resources satisfy a condition
pub struct ResourceWaiter<D, S> {
    discovery: D,
    source: S,
}

impl<D, S> fmt::Debug for ResourceWaiter<D, S>
where
    D: fmt::Debug,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceWaiter")
            .field("discovery", &self.discovery)
            .field("source", &self.source)
            .finish()
    }
}

impl ResourceWaiter<KubeDiscovery, KubeEventSource> {
    /// Waiter backed by the cluster the client points at
    pub fn from_client(client: Client) -> Self {
        Self::new(KubeDiscovery::new(client.clone()), KubeEventSource::new(client))
    }
}

impl<D, S> ResourceWaiter<D, S>
where
    D: TypeDiscovery,
    S: EventSource,
{
    /// Creates a waiter from explicit collaborators.
    pub fn new(discovery: D, source: S) -> Self {
        Self { discovery, source }
    }

    /// Type resolver used by every call
    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Event source used by every call
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Wait for objects of kind `gvk` in `namespace` (all namespaces if `None`)
    ///
    /// `predicate` sees each object as `K`; it must match the kind being watched.
    /// Returns `Ok(())` once the condition is met.
    pub async fn wait_resource<K, P>(
        &self,
        namespace: Option<&str>,
        gvk: &GroupVersionKind,
        selector: &Selector,
        predicate: P,
        timeout: Duration,
    ) -> Result<(), WaitError>
    where
        K: DeserializeOwned + Clone + Send,
        P: Fn(&K) -> bool,
    {
        self.wait_resource_event(namespace, gvk, selector, predicate, timeout)
            .await
            .map(|_| ())
    }

    /// Like [`wait_resource`](Self::wait_resource), but hands back the event
    /// that satisfied the condition (`None` if the initial list already did)
    pub async fn wait_resource_event<K, P>(
        &self,
        namespace: Option<&str>,
        gvk: &GroupVersionKind,
        selector: &Selector,
        predicate: P,
        timeout: Duration,
    ) -> Result<Option<WatchEvent<K>>, WaitError>
    where
        K: DeserializeOwned + Clone + Send,
        P: Fn(&K) -> bool,
    {
        let deadline = deadline_after(timeout);

        let descriptor = match timeout_at(deadline, self.discovery.resolve(gvk)).await {
            Ok(descriptor) => descriptor?,
            Err(_) => {
                info!("Timed out resolving {}", gvk_display(gvk));
                return Err(WaitError::Timeout {
                    resource: gvk_display(gvk),
                    timeout,
                    last_event: None,
                });
            }
        };

        let session = WaitSession::with_deadline(
            &self.source,
            namespace,
            &descriptor,
            selector,
            predicate,
            timeout,
            deadline,
        );
        match session.run().await {
            Ok(event) => Ok(event),
            Err(e) => {
                info!("Wait for {} failed: {}", descriptor.plural, e);
                Err(e)
            }
        }
    }

    /// Wait for a statically typed resource; the kind comes from `K` itself
    pub async fn wait_for<K, P>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
        predicate: P,
        timeout: Duration,
    ) -> Result<(), WaitError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Clone + Send,
        P: Fn(&K) -> bool,
    {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.wait_resource(namespace, &gvk, selector, predicate, timeout)
            .await
    }

    /// Wait for pods in `namespace`
    pub async fn wait_pod<P>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
        predicate: P,
        timeout: Duration,
    ) -> Result<(), WaitError>
    where
        P: Fn(&Pod) -> bool,
    {
        self.wait_for::<Pod, P>(namespace, selector, predicate, timeout)
            .await
    }
}
