//! krb core types: resource identities, recycle records, policy matching.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub mod error;
pub mod item;
pub mod labels;
pub mod matcher;
pub mod policy;
pub mod tuning;

pub use error::{KrbError, KrbResult, ResolveError, StoreError};
pub use item::{RecycleItem, RecycledObject};
pub use labels::LabelSet;
pub use policy::{RecyclePolicy, Target, NAMESPACE_ALL};
pub use tuning::Tuning;

/// API group of the recycle records.
pub const GROUP: &str = "krb.ketches.cn";
/// Served version of the recycle records.
pub const VERSION: &str = "v1alpha1";
/// `apiVersion` written into every record.
pub const API_VERSION: &str = "krb.ketches.cn/v1alpha1";

pub mod prelude {
    pub use super::{
        GroupResource, Gvk, Gvr, KrbError, LabelSet, Record, RecycleItem, RecyclePolicy,
        RecycledObject, ResolveError, StoreError, Target,
    };
}

/// Kind-form identity: the `(group, version, kind)` an object carries in its own body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Gvk {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// `apiVersion` as written in object bodies (`v1` for the core group).
    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Collection-form identity: the `(group, version, resource)` used to address a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Gvr {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Gvr {
    pub fn new(group: impl Into<String>, version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), resource: resource.into() }
    }

    pub fn group_resource(&self) -> GroupResource {
        GroupResource { group: self.group.clone(), resource: self.resource.clone() }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

impl fmt::Display for Gvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Version-less collection identity, the unit policies are declared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct GroupResource {
    #[serde(default)]
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self { group: group.into(), resource: resource.into() }
    }
}

/// Renders `deployments.apps`, or just `configmaps` for the core group.
impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() { f.write_str(&self.resource) } else { write!(f, "{}.{}", self.resource, self.group) }
    }
}

/// A cluster-scoped record persisted in the object store.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;
    const PLURAL: &'static str;

    fn metadata(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    fn metadata_mut(&mut self) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn labels(&self) -> Option<&LabelSet> {
        self.metadata().labels.as_ref()
    }

    fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }

    /// Record creation time as unix seconds (0 when the store has not stamped it).
    fn created_at(&self) -> i64 {
        self.metadata().creation_timestamp.as_ref().map(|t| t.0.timestamp()).unwrap_or(0)
    }
}

const SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Random lowercase suffix drawn from the alphabet the API server uses for generated names.
pub fn random_suffix(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..len).map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_resource_renders_core_without_dot() {
        assert_eq!(GroupResource::new("", "configmaps").to_string(), "configmaps");
        assert_eq!(GroupResource::new("apps", "deployments").to_string(), "deployments.apps");
    }

    #[test]
    fn api_version_handles_core_group() {
        assert_eq!(Gvk::new("", "v1", "ConfigMap").api_version(), "v1");
        assert_eq!(Gvk::new("apps", "v1", "Deployment").to_string(), "apps/v1/Deployment");
        assert_eq!(Gvr::new("apps", "v1", "deployments").group_resource(), GroupResource::new("apps", "deployments"));
    }

    #[test]
    fn suffix_uses_generated_name_alphabet() {
        let s = random_suffix(8);
        assert_eq!(s.len(), 8);
        assert!(s.bytes().all(|b| SUFFIX_ALPHABET.contains(&b)));
    }
}
