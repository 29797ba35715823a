//! `RecycleItem`: a deleted object frozen at deletion time.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::KrbError;
use crate::labels::{self, LabelSet};
use crate::{random_suffix, GroupResource, Gvk, Gvr, Record, API_VERSION};

const NAME_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecycleItem {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_item_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub object: RecycledObject,
}

/// Identity and verbatim body of the deleted object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecycledObject {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    pub version: String,
    pub kind: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
    /// Last observed serialized body, base64 on the wire.
    #[serde(default)]
    pub raw: ByteString,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_item_kind() -> String {
    RecycleItem::KIND.to_string()
}

impl RecycleItem {
    /// Build a new item with a randomized record name and the label index filled in.
    pub fn new(object: RecycledObject, recycled_at: DateTime<Utc>) -> Self {
        let mut index = LabelSet::new();
        index.insert(labels::OBJECT_NAME.to_string(), object.name.clone());
        index.insert(labels::OBJECT_GR.to_string(), object.group_resource().to_string());
        index.insert(labels::RECYCLED_AT.to_string(), recycled_at.timestamp().to_string());
        if !object.namespace.is_empty() {
            index.insert(labels::OBJECT_NAMESPACE.to_string(), object.namespace.clone());
        }
        let metadata = ObjectMeta {
            name: Some(format!("{}-{}", object.name, random_suffix(NAME_SUFFIX_LEN))),
            labels: Some(index),
            ..Default::default()
        };
        Self { api_version: default_api_version(), kind: default_item_kind(), metadata, object }
    }

    /// Draw a new random record name, keeping everything else.
    pub fn rename(&mut self) {
        self.metadata.name = Some(format!("{}-{}", self.object.name, random_suffix(NAME_SUFFIX_LEN)));
    }

    /// Unix seconds recorded in the label index, if present and parseable.
    pub fn recycled_at(&self) -> Option<i64> {
        self.labels().and_then(|l| l.get(labels::RECYCLED_AT)).and_then(|v| v.parse().ok())
    }
}

impl Record for RecycleItem {
    const KIND: &'static str = "RecycleItem";
    const PLURAL: &'static str = "recycleitems";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl RecycledObject {
    pub fn new(gvk: &Gvk, resource: impl Into<String>, namespace: Option<&str>, name: impl Into<String>, raw: Vec<u8>) -> Self {
        Self {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
            resource: resource.into(),
            namespace: namespace.unwrap_or_default().to_string(),
            name: name.into(),
            raw: ByteString(raw),
        }
    }

    pub fn gvk(&self) -> Gvk {
        Gvk::new(&self.group, &self.version, &self.kind)
    }

    pub fn gvr(&self) -> Gvr {
        Gvr::new(&self.group, &self.version, &self.resource)
    }

    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(&self.group, &self.resource)
    }

    pub fn namespace(&self) -> Option<&str> {
        if self.namespace.is_empty() { None } else { Some(&self.namespace) }
    }

    /// `namespace/name`, or just `name` for cluster-scoped objects.
    pub fn namespaced_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Parse the stored body as-is.
    pub fn body(&self) -> Result<Json, KrbError> {
        let v: Json = serde_json::from_slice(&self.raw.0)?;
        if !v.is_object() {
            return Err(KrbError::MalformedPayload(format!("stored body of {} is not an object", self.namespaced_name())));
        }
        Ok(v)
    }

    /// Body ready for re-creation: `metadata.resourceVersion` removed, nothing else touched.
    pub fn sanitized_body(&self) -> Result<Json, KrbError> {
        let mut v = self.body()?;
        strip_resource_version(&mut v);
        Ok(v)
    }

    pub fn json(&self) -> String {
        String::from_utf8_lossy(&self.raw.0).into_owned()
    }

    pub fn indented_json(&self) -> Result<String, KrbError> {
        Ok(serde_json::to_string_pretty(&self.body()?)?)
    }

    pub fn yaml(&self) -> Result<String, KrbError> {
        serde_yaml::to_string(&self.body()?).map_err(|e| KrbError::MalformedPayload(e.to_string()))
    }
}

/// Remove the server-assigned `metadata.resourceVersion`, which would make a create fail.
pub fn strip_resource_version(v: &mut Json) {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.shift_remove("resourceVersion");
    }
}

/// Selector for items written with the older per-field label layout.
///
/// The version key is left out: items of one kind may have been recycled under
/// different served versions.
pub fn legacy_selector(group: &str, kind: &str) -> LabelSet {
    let mut sel = LabelSet::new();
    sel.insert(labels::LEGACY_OBJECT_GROUP.to_string(), group.to_string());
    sel.insert(labels::LEGACY_OBJECT_KIND.to_string(), kind.to_string());
    sel
}
