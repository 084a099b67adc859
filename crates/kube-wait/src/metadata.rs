//! Metadata extraction
//!
//! Pulls `apiVersion`, `kind` and `metadata` out of any serializable object
//! through a JSON round trip. Field names match case-sensitively, so
//! `Metadata` is not mistaken for `metadata`.

use crate::error::WaitError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Type and object metadata of an arbitrary resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataOnly {
    /// `apiVersion`, if the object carries one
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// `kind`, if the object carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Object metadata (empty if absent)
    #[serde(default)]
    pub metadata: ObjectMeta,
}

/// Extract type and object metadata from `object`
pub fn object_meta<T: Serialize>(object: &T) -> Result<MetadataOnly, WaitError> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| WaitError::Decode(format!("metadata: {e}")))
}

/// Namespace (empty for cluster-scoped objects) and name of `object`
pub fn namespace_and_name<T: Serialize>(object: &T) -> Result<(String, String), WaitError> {
    let meta = object_meta(object)?.metadata;
    Ok((
        meta.namespace.unwrap_or_default(),
        meta.name.unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::pod;
    use serde_json::json;

    #[test]
    fn test_typed_object_metadata() {
        let meta = object_meta(&pod("ns1", "web-0", "Running")).unwrap();
        assert_eq!(meta.api_version.as_deref(), Some("v1"));
        assert_eq!(meta.kind.as_deref(), Some("Pod"));
        assert_eq!(meta.metadata.name.as_deref(), Some("web-0"));
    }

    #[test]
    fn test_namespace_and_name() {
        let (namespace, name) = namespace_and_name(&pod("ns1", "web-0", "Running")).unwrap();
        assert_eq!(namespace, "ns1");
        assert_eq!(name, "web-0");

        let node = json!({ "kind": "Node", "metadata": { "name": "node-1" } });
        assert_eq!(
            namespace_and_name(&node).unwrap(),
            (String::new(), "node-1".to_string())
        );
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let object = json!({ "Kind": "Pod", "Metadata": { "name": "web-0" } });
        let meta = object_meta(&object).unwrap();
        assert!(meta.kind.is_none());
        assert!(meta.metadata.name.is_none());
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(object_meta(&"just a string").is_err());
    }
}
