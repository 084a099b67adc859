//! Collaborator traits
//!
//! The watcher depends on two narrow capabilities instead of a concrete client:
//! resolving a kind to a resource type, and listing/watching objects of that type.
//! The Kubernetes-backed implementations live in `client` and `discovery`;
//! tests use the in-memory fakes from `mock`.

use crate::error::WaitError;
use crate::models::{ObjectSnapshot, ResourceDescriptor, Selector, WatchEvent};
use futures::stream::BoxStream;
use kube::core::{DynamicObject, GroupVersionKind};

/// Incremental change feed. Dropping it tears down the subscription.
pub type EventStream = BoxStream<'static, Result<WatchEvent<DynamicObject>, WaitError>>;

/// Resolves an abstract kind to a concrete resource type
#[async_trait::async_trait]
pub trait TypeDiscovery: Send + Sync {
    /// Map group/version/kind to a descriptor, or fail with `WaitError::Resolution`
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceDescriptor, WaitError>;
}

/// List-then-watch event source
///
/// `namespace` of `None` means all namespaces; it is ignored for cluster-scoped types.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Point-in-time snapshot of matching objects
    async fn list(
        &self,
        namespace: Option<&str>,
        descriptor: &ResourceDescriptor,
        selector: &Selector,
    ) -> Result<ObjectSnapshot, WaitError>;

    /// Ordered change feed starting right after `resource_version`
    async fn watch(
        &self,
        namespace: Option<&str>,
        descriptor: &ResourceDescriptor,
        selector: &Selector,
        resource_version: &str,
    ) -> Result<EventStream, WaitError>;
}
