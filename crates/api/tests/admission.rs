use std::sync::Arc;

use krb_api::{InProcApi, ItemFilter, KrbApi};
use krb_core::{Gvr, RecycleItem, RecyclePolicy, Tuning};
use krb_schema::{Catalog, CatalogEntry, StaticSource};
use krb_store::{MemoryObjects, MemoryStore, RecordStore};
use serde_json::{json, Value};

struct Fixture {
    api: InProcApi,
    items: Arc<MemoryStore<RecycleItem>>,
    policies: Arc<MemoryStore<RecyclePolicy>>,
}

fn fixture() -> Fixture {
    let catalog = Catalog::new(
        vec![CatalogEntry {
            group: "".into(),
            version: "v1".into(),
            kind: "ConfigMap".into(),
            resource: "configmaps".into(),
            singular: "configmap".into(),
            short_names: ["cm".to_string()].into_iter().collect(),
            namespaced: true,
            preferred: true,
        }],
        vec!["".into()],
    );
    let items = Arc::new(MemoryStore::new());
    let policies = Arc::new(MemoryStore::new());
    let api = InProcApi::from_parts(
        Arc::new(StaticSource::new(catalog)),
        items.clone(),
        policies.clone(),
        Arc::new(MemoryObjects::new()),
        Tuning::immediate(),
    );
    Fixture { api, items, policies }
}

fn review(operation: &str, dry_run: bool) -> Vec<u8> {
    let cm = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "settings", "namespace": "team-a", "resourceVersion": "12"},
        "data": {"mode": "strict"}
    });
    let body = json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "6f1a7c2e-1111-4222-8333-444455556666",
            "kind": {"group": "", "version": "v1", "kind": "ConfigMap"},
            "resource": {"group": "", "version": "v1", "resource": "configmaps"},
            "name": "settings",
            "namespace": "team-a",
            "operation": operation,
            "userInfo": {"username": "alice"},
            "oldObject": cm,
            "dryRun": dry_run
        }
    });
    serde_json::to_vec(&body).unwrap()
}

fn response(bytes: &[u8]) -> Value {
    let v: Value = serde_json::from_slice(bytes).unwrap();
    v["response"].clone()
}

async fn with_policy(f: &Fixture) {
    let p = RecyclePolicy::new(&Gvr::new("", "v1", "configmaps"), &["team-a".to_string()]).unwrap();
    f.policies.create(&p).await.unwrap();
}

#[tokio::test]
async fn delete_review_is_recycled_and_allowed() {
    let f = fixture();
    with_policy(&f).await;

    let out = response(&f.api.review(&review("DELETE", false)).await);
    assert_eq!(out["allowed"], json!(true));
    assert_eq!(out["uid"], json!("6f1a7c2e-1111-4222-8333-444455556666"));

    let items = f.items.records();
    assert_eq!(items.len(), 1);
    let body = items[0].object.body().unwrap();
    assert_eq!(body["data"]["mode"], json!("strict"));
    assert_eq!(items[0].object.namespace(), Some("team-a"));

    let listed = f.api.list_items(&ItemFilter { object_resource: Some("cm".into()), object_namespace: None }).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn other_operations_pass_through() {
    let f = fixture();
    with_policy(&f).await;

    let out = response(&f.api.review(&review("UPDATE", false)).await);
    assert_eq!(out["allowed"], json!(true));
    assert!(f.items.is_empty());
}

#[tokio::test]
async fn dry_run_deletions_are_not_recycled() {
    let f = fixture();
    with_policy(&f).await;

    let out = response(&f.api.review(&review("DELETE", true)).await);
    assert_eq!(out["allowed"], json!(true));
    assert!(f.items.is_empty());
}

#[tokio::test]
async fn deletes_without_policy_are_allowed_untouched() {
    let f = fixture();
    let out = response(&f.api.review(&review("DELETE", false)).await);
    assert_eq!(out["allowed"], json!(true));
    assert!(f.items.is_empty());
}

#[tokio::test]
async fn garbage_gets_an_invalid_answer() {
    let f = fixture();
    let out = response(&f.api.review(b"{not json").await);
    assert_eq!(out["allowed"], json!(false));
    assert!(f.items.is_empty());
}

#[tokio::test]
async fn store_failure_never_denies() {
    let f = fixture();
    with_policy(&f).await;
    f.items.fail(krb_store::Op::Create, krb_core::StoreError::Transport("connection reset".into()), 1);

    let out = response(&f.api.review(&review("DELETE", false)).await);
    assert_eq!(out["allowed"], json!(true));
    assert!(f.items.is_empty());
}

#[tokio::test]
async fn resources_lists_collections() {
    let f = fixture();
    assert_eq!(f.api.resources().await, vec!["configmaps".to_string()]);
}

#[tokio::test]
async fn old_object_bytes_are_kept_verbatim() {
    let f = fixture();
    with_policy(&f).await;

    let old = r#"{"apiVersion":"v1", "kind": "ConfigMap","metadata":{"name":"settings","namespace":"team-a","resourceVersion":"12"},"data":{"ratio":"1.50"},"extra":1.50e0}"#;
    let body = format!(
        r#"{{"apiVersion":"admission.k8s.io/v1","kind":"AdmissionReview","request":{{"uid":"0c9d1e2f-aaaa-4bbb-8ccc-dddd00000001","kind":{{"group":"","version":"v1","kind":"ConfigMap"}},"resource":{{"group":"","version":"v1","resource":"configmaps"}},"name":"settings","namespace":"team-a","operation":"DELETE","userInfo":{{}},"oldObject":{old}}}}}"#
    );

    let out = response(&f.api.review(body.as_bytes()).await);
    assert_eq!(out["allowed"], json!(true));
    let items = f.items.records();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].object.raw.0, old.as_bytes());
}
