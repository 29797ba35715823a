#![allow(dead_code)]

use std::sync::Arc;

use krb_core::{Gvk, Gvr, RecycleItem, RecyclePolicy, Tuning};
use krb_ops::{DeleteNotification, Inventory, Recycler, Restorer};
use krb_schema::{Catalog, CatalogEntry, CatalogSource, SchemaResolver, StaticSource};
use krb_store::{MemoryObjects, MemoryStore, RecordStore};
use serde_json::{json, Value};

pub struct Harness {
    pub source: Arc<StaticSource>,
    pub resolver: Arc<SchemaResolver>,
    pub items: Arc<MemoryStore<RecycleItem>>,
    pub policies: Arc<MemoryStore<RecyclePolicy>>,
    pub objects: Arc<MemoryObjects>,
    pub tuning: Tuning,
}

pub fn entry(group: &str, version: &str, kind: &str, resource: &str, shorts: &[&str], namespaced: bool) -> CatalogEntry {
    CatalogEntry {
        group: group.into(),
        version: version.into(),
        kind: kind.into(),
        resource: resource.into(),
        singular: kind.to_ascii_lowercase(),
        short_names: shorts.iter().map(|s| s.to_string()).collect(),
        namespaced,
        preferred: true,
    }
}

pub fn catalog() -> Catalog {
    Catalog::new(
        vec![
            entry("", "v1", "ConfigMap", "configmaps", &["cm"], true),
            entry("", "v1", "Namespace", "namespaces", &["ns"], false),
            entry("apps", "v1", "Deployment", "deployments", &["deploy"], true),
        ],
        vec!["".into(), "apps".into()],
    )
}

impl Harness {
    pub fn new() -> Self {
        Self::with_tuning(Tuning::immediate())
    }

    pub fn with_tuning(tuning: Tuning) -> Self {
        let source = Arc::new(StaticSource::new(catalog()));
        let dyn_source: Arc<dyn CatalogSource> = source.clone();
        Self {
            resolver: Arc::new(SchemaResolver::new(dyn_source, tuning.clone())),
            source,
            items: Arc::new(MemoryStore::new()),
            policies: Arc::new(MemoryStore::new()),
            objects: Arc::new(MemoryObjects::new()),
            tuning,
        }
    }

    pub fn recycler(&self) -> Recycler {
        Recycler::new(self.resolver.clone(), self.policies.clone(), self.items.clone(), self.tuning.clone())
    }

    pub fn restorer(&self) -> Restorer {
        Restorer::new(self.resolver.clone(), self.items.clone(), self.objects.clone(), self.tuning.clone())
    }

    pub fn inventory(&self) -> Inventory {
        Inventory::new(self.resolver.clone(), self.items.clone(), self.policies.clone(), self.tuning.clone())
    }

    pub async fn policy(&self, group: &str, resource: &str, namespaces: &[&str]) -> RecyclePolicy {
        let ns: Vec<String> = namespaces.iter().map(|s| s.to_string()).collect();
        let p = RecyclePolicy::new(&Gvr::new(group, "v1", resource), &ns).unwrap();
        self.policies.create(&p).await.unwrap()
    }
}

pub fn deployment_body(name: &str, ns: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": ns,
            "resourceVersion": "4711",
            "uid": "0b0e6c1a-0000-4000-8000-000000000001",
            "labels": {"app": name},
            "annotations": {"owner": "platform"}
        },
        "spec": {"replicas": 3, "template": {"spec": {"containers": [{"name": "c", "image": "nginx:1.27"}]}}}
    })
}

pub fn delete_deployment(name: &str, ns: &str) -> DeleteNotification {
    DeleteNotification {
        kind: Gvk::new("apps", "v1", "Deployment"),
        resource: Some(Gvr::new("apps", "v1", "deployments")),
        namespace: Some(ns.to_string()),
        name: name.to_string(),
        old_object: serde_json::to_vec(&deployment_body(name, ns)).unwrap(),
    }
}

pub fn delete_configmap(name: &str, ns: &str) -> DeleteNotification {
    let body = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": name, "namespace": ns}, "data": {"k": "v"}});
    DeleteNotification {
        kind: Gvk::new("", "v1", "ConfigMap"),
        resource: None,
        namespace: Some(ns.to_string()),
        name: name.to_string(),
        old_object: serde_json::to_vec(&body).unwrap(),
    }
}
