//! `RecyclePolicy`: operator-declared scope of recycling.

use std::sync::OnceLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KrbError;
use crate::{random_suffix, GroupResource, Gvr, Record, API_VERSION};

/// Namespace entry meaning "every namespace, and cluster-scoped objects".
pub const NAMESPACE_ALL: &str = "";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecyclePolicy {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_policy_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub target: Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Target {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,
    /// `[""]` selects all namespaces; an empty list selects none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_policy_kind() -> String {
    RecyclePolicy::KIND.to_string()
}

fn dns_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").expect("static regex"))
}

impl RecyclePolicy {
    /// Policy for `gvr`; no namespaces means all namespaces.
    pub fn new(gvr: &Gvr, namespaces: &[String]) -> Result<Self, KrbError> {
        let namespaces = if namespaces.is_empty() { vec![NAMESPACE_ALL.to_string()] } else { namespaces.to_vec() };
        let policy = Self {
            api_version: default_api_version(),
            kind: default_policy_kind(),
            metadata: ObjectMeta { name: Some(Self::generate_name(&gvr.resource)), ..Default::default() },
            target: Target { group: gvr.group.clone(), resource: gvr.resource.clone(), namespaces },
        };
        policy.validate()?;
        Ok(policy)
    }

    fn generate_name(resource: &str) -> String {
        format!("recycle-{}-{}", resource, random_suffix(8))
    }

    pub fn rename(&mut self) {
        self.metadata.name = Some(Self::generate_name(&self.target.resource));
    }

    /// Reject unbounded targets and malformed namespace names.
    pub fn validate(&self) -> Result<(), KrbError> {
        if self.target.resource.is_empty() {
            return Err(KrbError::InvalidPolicy(format!(
                "policy {:?} has no target resource; recycling every resource type is not supported",
                self.name()
            )));
        }
        for ns in &self.target.namespaces {
            if ns != NAMESPACE_ALL && !dns_label().is_match(ns) {
                return Err(KrbError::InvalidPolicy(format!("invalid namespace {:?} in policy {:?}", ns, self.name())));
            }
        }
        Ok(())
    }

    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(&self.target.group, &self.target.resource)
    }

    pub fn all_namespaces(&self) -> bool {
        self.target.namespaces.iter().any(|n| n == NAMESPACE_ALL)
    }

    /// Whether the namespace scope admits `namespace` (`None` for cluster-scoped objects).
    pub fn covers_namespace(&self, namespace: Option<&str>) -> bool {
        if self.all_namespaces() {
            return true;
        }
        match namespace {
            Some(ns) => self.target.namespaces.iter().any(|n| n == ns),
            None => false,
        }
    }
}

impl Record for RecyclePolicy {
    const KIND: &'static str = "RecyclePolicy";
    const PLURAL: &'static str = "recyclepolicies";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gvr() -> Gvr {
        Gvr::new("apps", "v1", "deployments")
    }

    #[test]
    fn empty_namespaces_become_all_sentinel() {
        let p = RecyclePolicy::new(&gvr(), &[]).unwrap();
        assert_eq!(p.target.namespaces, vec![NAMESPACE_ALL.to_string()]);
        assert!(p.all_namespaces());
        assert!(p.covers_namespace(Some("anything")));
        assert!(p.covers_namespace(None));
        assert!(p.name().starts_with("recycle-deployments-"));
    }

    #[test]
    fn explicit_empty_list_covers_nothing() {
        let mut p = RecyclePolicy::new(&gvr(), &[]).unwrap();
        p.target.namespaces.clear();
        assert!(!p.covers_namespace(Some("dev")));
        assert!(!p.covers_namespace(None));
    }

    #[test]
    fn unbounded_target_is_rejected() {
        let err = RecyclePolicy::new(&Gvr::new("", "v1", ""), &[]).unwrap_err();
        assert!(matches!(err, KrbError::InvalidPolicy(_)));
    }

    #[test]
    fn bad_namespace_is_rejected() {
        let err = RecyclePolicy::new(&gvr(), &["Dev_Team".to_string()]).unwrap_err();
        assert!(matches!(err, KrbError::InvalidPolicy(_)));
    }

    #[test]
    fn wire_layout_keeps_all_sentinel() {
        let p = RecyclePolicy::new(&gvr(), &[]).unwrap();
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["target"]["namespaces"], serde_json::json!([""]));
        assert_eq!(v["kind"], "RecyclePolicy");
    }
}
