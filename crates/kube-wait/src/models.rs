//! Data types shared by the resolver, the watcher and the event sources

use kube::api::{ListParams, WatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::{ApiCapabilities, Scope};

/// Concrete, addressable resource type a kind resolves to
///
/// Resolved once per wait call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    /// API group (empty string for core v1)
    pub group: String,
    /// API version within the group (e.g. "v1")
    pub version: String,
    /// Kind as the API serves it (e.g. "Deployment")
    pub kind: String,
    /// Plural resource name used in request paths (e.g. "pods")
    pub plural: String,
    /// Whether the resource lives inside a namespace
    pub namespaced: bool,
}

impl ResourceDescriptor {
    /// Build a descriptor from explicit parts
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
            namespaced,
        }
    }

    /// Build a descriptor from a discovery result
    pub fn from_discovery(resource: &ApiResource, capabilities: &ApiCapabilities) -> Self {
        Self {
            group: resource.group.clone(),
            version: resource.version.clone(),
            kind: resource.kind.clone(),
            plural: resource.plural.clone(),
            namespaced: capabilities.scope == Scope::Namespaced,
        }
    }

    /// The group/version/kind this descriptor was resolved from
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// Full `apiVersion` string ("v1" for core, "group/version" otherwise)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// The kube `ApiResource` used to address list and watch requests
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.gvk(), &self.plural)
    }
}

/// Label and field selectors passed through to the event source unmodified
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    /// Label selector, e.g. "app=web"
    pub label_selector: Option<String>,
    /// Field selector, e.g. "metadata.name=web-0"
    pub field_selector: Option<String>,
}

impl Selector {
    /// Selector that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label selector (e.g. "app=web,tier!=cache")
    #[must_use]
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    /// Set the field selector (e.g. "metadata.name=web-0")
    #[must_use]
    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    /// List parameters carrying both selectors
    pub fn list_params(&self) -> ListParams {
        let mut params = ListParams::default();
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        params
    }

    /// Watch parameters carrying both selectors
    pub fn watch_params(&self) -> WatchParams {
        let mut params = WatchParams::default();
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        params
    }
}

/// One change notification from the event source
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    /// Object appeared
    Added(K),
    /// Object changed
    Modified(K),
    /// Object was removed; carries its last state
    Deleted(K),
    /// Progress marker; carries no object
    Bookmark { resource_version: String },
    /// Error reported by the event source
    Error(String),
}

impl<K> WatchEvent<K> {
    /// The object carried by the event, if any
    pub fn object(&self) -> Option<&K> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => Some(obj),
            WatchEvent::Bookmark { .. } | WatchEvent::Error(_) => None,
        }
    }

    /// Event type as reported by the API server
    pub fn type_name(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "Added",
            WatchEvent::Modified(_) => "Modified",
            WatchEvent::Deleted(_) => "Deleted",
            WatchEvent::Bookmark { .. } => "Bookmark",
            WatchEvent::Error(_) => "Error",
        }
    }

    /// Convert the carried object, keeping the event type
    pub fn try_map<T, E>(self, f: impl FnOnce(K) -> Result<T, E>) -> Result<WatchEvent<T>, E> {
        Ok(match self {
            WatchEvent::Added(obj) => WatchEvent::Added(f(obj)?),
            WatchEvent::Modified(obj) => WatchEvent::Modified(f(obj)?),
            WatchEvent::Deleted(obj) => WatchEvent::Deleted(f(obj)?),
            WatchEvent::Bookmark { resource_version } => WatchEvent::Bookmark { resource_version },
            WatchEvent::Error(message) => WatchEvent::Error(message),
        })
    }
}

/// Result of a list call: matching objects plus the version to resume a watch from
#[derive(Debug, Clone, Default)]
pub struct ObjectSnapshot {
    /// Matching objects at list time
    pub items: Vec<DynamicObject>,
    /// Version to start the watch from
    pub resource_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_descriptor_api_version() {
        let pods = ResourceDescriptor::new("", "v1", "Pod", "pods", true);
        assert_eq!(pods.api_version(), "v1");
        assert_eq!(pods.api_resource().plural, "pods");
        assert_eq!(pods.api_resource().api_version, "v1");
    }

    #[test]
    fn test_grouped_descriptor_api_version() {
        let deployments = ResourceDescriptor::new("apps", "v1", "Deployment", "deployments", true);
        assert_eq!(deployments.api_version(), "apps/v1");
        assert_eq!(deployments.gvk().kind, "Deployment");
    }

    #[test]
    fn test_selector_passes_values_through() {
        let selector = Selector::new().labels("app=web").fields("status.phase!=Failed");

        let list = selector.list_params();
        assert_eq!(list.label_selector.as_deref(), Some("app=web"));
        assert_eq!(list.field_selector.as_deref(), Some("status.phase!=Failed"));

        let watch = selector.watch_params();
        assert_eq!(watch.label_selector.as_deref(), Some("app=web"));
        assert_eq!(watch.field_selector.as_deref(), Some("status.phase!=Failed"));
    }

    #[test]
    fn test_empty_selector_sets_nothing() {
        let list = Selector::new().list_params();
        assert!(list.label_selector.is_none());
        assert!(list.field_selector.is_none());
    }

    #[test]
    fn test_event_try_map_keeps_type() {
        let event: WatchEvent<u32> = WatchEvent::Modified(2);
        let mapped = event.try_map(|n| Ok::<_, ()>(n * 10)).unwrap();
        assert_eq!(mapped, WatchEvent::Modified(20));
        assert_eq!(mapped.type_name(), "Modified");

        let bookmark: WatchEvent<u32> = WatchEvent::Bookmark { resource_version: "7".to_string() };
        assert!(bookmark.object().is_none());
    }
}
