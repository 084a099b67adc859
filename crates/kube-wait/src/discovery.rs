//! Type resolution
//!
//! Maps an abstract group/version/kind to the concrete resource type
//! (plural name and scope) using a snapshot of the cluster's API groups.
//! The snapshot is built either from the live discovery API or from the
//! compiled-in k8s-openapi types.

use crate::error::WaitError;
use crate::models::ResourceDescriptor;
use crate::source::TypeDiscovery;
use kube::Client;
use kube::core::GroupVersionKind;
use kube::discovery::Discovery;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Render a GVK the way error messages show it ("v1/Pod", "apps/v1/Deployment")
pub fn gvk_display(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}

/// Point-in-time view of the resource types a cluster serves
///
/// Resolution is a pure lookup; kind names match exactly, as the API server does.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySnapshot {
    by_gvk: HashMap<(String, String, String), ResourceDescriptor>,
}

impl DiscoverySnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from explicit descriptors
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        let mut snapshot = Self::new();
        for descriptor in descriptors {
            snapshot.add(descriptor);
        }
        snapshot
    }

    /// Register a resource type; a later registration of the same GVK wins
    pub fn add(&mut self, descriptor: ResourceDescriptor) {
        let key = (
            descriptor.group.clone(),
            descriptor.version.clone(),
            descriptor.kind.clone(),
        );
        self.by_gvk.insert(key, descriptor);
    }

    /// Number of registered resource types
    pub fn len(&self) -> usize {
        self.by_gvk.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.by_gvk.is_empty()
    }

    /// Look up the resource type for a kind
    pub fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceDescriptor, WaitError> {
        let key = (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone());
        self.by_gvk
            .get(&key)
            .cloned()
            .ok_or_else(|| WaitError::Resolution {
                kind: gvk_display(gvk),
                reason: "no matching resource type is registered".to_string(),
            })
    }

    /// Build a snapshot from a completed discovery run
    ///
    /// Every served version of every group is registered, not just the
    /// preferred one, since callers pin the version they ask for.
    pub fn from_discovery(discovery: &Discovery) -> Self {
        let mut snapshot = Self::new();
        for group in discovery.groups() {
            for version in group.versions() {
                for (resource, capabilities) in group.versioned_resources(version) {
                    // Skip subresources (e.g., pods/log, pods/exec)
                    if resource.plural.contains('/') {
                        continue;
                    }
                    snapshot.add(ResourceDescriptor::from_discovery(&resource, &capabilities));
                }
            }
        }
        snapshot
    }

    /// Run discovery against a cluster and snapshot the result
    pub async fn fetch(client: &Client) -> Result<Self, kube::Error> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self::from_discovery(&discovery))
    }

    /// Snapshot of the core resource types compiled into k8s-openapi (no cluster round trip)
    pub fn builtin() -> Self {
        use k8s_openapi::api::{
            apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
            batch::v1::{CronJob, Job},
            core::v1::{ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service},
        };
        use kube::Resource;

        let mut snapshot = Self::new();

        macro_rules! add_resource {
            ($type:ty, namespaced) => {
                add_resource!(@inner $type, true)
            };
            ($type:ty, cluster) => {
                add_resource!(@inner $type, false)
            };
            (@inner $type:ty, $namespaced:expr) => {
                snapshot.add(ResourceDescriptor::new(
                    <$type>::group(&()),
                    <$type>::version(&()),
                    <$type>::kind(&()),
                    <$type>::plural(&()),
                    $namespaced,
                ))
            };
        }

        add_resource!(Pod, namespaced);
        add_resource!(Service, namespaced);
        add_resource!(ConfigMap, namespaced);
        add_resource!(Secret, namespaced);
        add_resource!(PersistentVolumeClaim, namespaced);
        add_resource!(Node, cluster);
        add_resource!(Namespace, cluster);
        add_resource!(PersistentVolume, cluster);
        add_resource!(Deployment, namespaced);
        add_resource!(StatefulSet, namespaced);
        add_resource!(DaemonSet, namespaced);
        add_resource!(ReplicaSet, namespaced);
        add_resource!(Job, namespaced);
        add_resource!(CronJob, namespaced);

        snapshot
    }
}

#[async_trait::async_trait]
impl TypeDiscovery for DiscoverySnapshot {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceDescriptor, WaitError> {
        DiscoverySnapshot::resolve(self, gvk)
    }
}

/// Type discovery backed by the cluster's discovery API
///
/// The snapshot is fetched on first use and kept until `refresh`. A miss
/// against a cached snapshot triggers one refresh, so kinds installed after
/// the first lookup (new CRDs) still resolve.
pub struct KubeDiscovery {
    client: Client,
    snapshot: RwLock<Option<Arc<DiscoverySnapshot>>>,
}

impl fmt::Debug for KubeDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .snapshot
            .try_read()
            .ok()
            .and_then(|snapshot| snapshot.as_ref().map(|s| s.len()));
        f.debug_struct("KubeDiscovery")
            .field("cached_types", &cached)
            .finish_non_exhaustive()
    }
}

impl KubeDiscovery {
    /// Creates a discovery service for the given client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            snapshot: RwLock::new(None),
        }
    }

    /// Re-run discovery and replace the cached snapshot
    pub async fn refresh(&self) -> Result<Arc<DiscoverySnapshot>, kube::Error> {
        let fresh = Arc::new(DiscoverySnapshot::fetch(&self.client).await?);
        info!("Discovered {} resource types", fresh.len());
        *self.snapshot.write().await = Some(Arc::clone(&fresh));
        Ok(fresh)
    }
}

#[async_trait::async_trait]
impl TypeDiscovery for KubeDiscovery {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceDescriptor, WaitError> {
        let unavailable = |e: kube::Error| WaitError::Resolution {
            kind: gvk_display(gvk),
            reason: format!("discovery failed: {e}"),
        };

        let cached = self.snapshot.read().await.clone();
        let Some(snapshot) = cached else {
            let snapshot = self.refresh().await.map_err(unavailable)?;
            return snapshot.resolve(gvk);
        };

        match snapshot.resolve(gvk) {
            Ok(descriptor) => Ok(descriptor),
            Err(_) => {
                debug!("{} not in cached discovery snapshot, refreshing", gvk_display(gvk));
                let snapshot = self.refresh().await.map_err(unavailable)?;
                snapshot.resolve(gvk)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DiscoverySnapshot {
        DiscoverySnapshot::from_descriptors([
            ResourceDescriptor::new("", "v1", "Pod", "pods", true),
            ResourceDescriptor::new("apps", "v1", "Deployment", "deployments", true),
            ResourceDescriptor::new("", "v1", "Node", "nodes", false),
        ])
    }

    #[test]
    fn test_resolve_registered_kind() {
        let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
        let descriptor = snapshot().resolve(&gvk).unwrap();
        assert_eq!(descriptor.plural, "deployments");
        assert!(descriptor.namespaced);
    }

    #[test]
    fn test_resolve_unknown_kind_fails() {
        let gvk = GroupVersionKind::gvk("example.com", "v1", "Widget");
        let err = snapshot().resolve(&gvk).unwrap_err();
        assert!(err.is_resolution());
        assert!(err.to_string().contains("example.com/v1/Widget"));
    }

    #[test]
    fn test_resolve_requires_matching_version() {
        let gvk = GroupVersionKind::gvk("apps", "v1beta1", "Deployment");
        assert!(snapshot().resolve(&gvk).is_err());
    }

    #[test]
    fn test_resolve_kind_is_case_sensitive() {
        let gvk = GroupVersionKind::gvk("", "v1", "pod");
        assert!(snapshot().resolve(&gvk).is_err());
    }

    #[test]
    fn test_cluster_scoped_kind() {
        let gvk = GroupVersionKind::gvk("", "v1", "Node");
        assert!(!snapshot().resolve(&gvk).unwrap().namespaced);
    }

    #[test]
    fn test_builtin_snapshot_has_core_types() {
        let builtin = DiscoverySnapshot::builtin();
        let pod = builtin.resolve(&GroupVersionKind::gvk("", "v1", "Pod")).unwrap();
        assert_eq!(pod.plural, "pods");
        let job = builtin.resolve(&GroupVersionKind::gvk("batch", "v1", "Job")).unwrap();
        assert_eq!(job.plural, "jobs");
        let namespace = builtin.resolve(&GroupVersionKind::gvk("", "v1", "Namespace")).unwrap();
        assert!(!namespace.namespaced);
    }

    #[tokio::test]
    async fn test_snapshot_as_type_discovery() {
        let discovery: &dyn TypeDiscovery = &snapshot();
        let descriptor = discovery
            .resolve(&GroupVersionKind::gvk("", "v1", "Pod"))
            .await
            .unwrap();
        assert_eq!(descriptor.kind, "Pod");
    }
}
