mod common;

use chrono::Utc;
use common::*;
use krb_core::labels;
use krb_core::{Gvk, KrbError, Record, RecycleItem, RecycledObject, NAMESPACE_ALL};
use krb_ops::{ItemFilter, PolicyFilter, RecycleOutcome};
use krb_store::RecordStore;

async fn seed(h: &Harness) {
    h.policy("apps", "deployments", &[]).await;
    h.policy("", "configmaps", &[]).await;
    let r = h.recycler();
    for n in [delete_deployment("web", "dev"), delete_deployment("api", "prod"), delete_configmap("cfg", "dev")] {
        assert!(matches!(r.handle(&n).await, RecycleOutcome::Persisted { .. }));
    }
}

#[tokio::test]
async fn items_filter_by_resource_alias_and_namespace() {
    let h = Harness::new();
    seed(&h).await;
    let inv = h.inventory();

    let all = inv.list_items(&ItemFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let deploys = inv.list_items(&ItemFilter { object_resource: Some("deploy".into()), object_namespace: None }).await.unwrap();
    assert_eq!(deploys.len(), 2);
    assert!(deploys.iter().all(|i| i.object.resource == "deployments"));

    let dev = ItemFilter { object_resource: Some("deployments.apps".into()), object_namespace: Some("dev".into()) };
    let dev = inv.list_items(&dev).await.unwrap();
    assert_eq!(dev.len(), 1);
    assert_eq!(dev[0].object.name, "web");
}

#[tokio::test]
async fn unknown_resource_filter_is_not_found() {
    let h = Harness::new();
    let err = h.inventory().list_items(&ItemFilter { object_resource: Some("deploymens".into()), object_namespace: None }).await.unwrap_err();
    match err {
        KrbError::NotFound(msg) => assert!(msg.contains("deployments.apps")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn legacy_labelled_items_are_merged() {
    let h = Harness::new();
    seed(&h).await;
    let obj = RecycledObject::new(&Gvk::new("apps", "v1", "Deployment"), "deployments", Some("dev"), "old", b"{}".to_vec());
    let mut legacy = RecycleItem::new(obj, Utc::now());
    let index = legacy.metadata.labels.get_or_insert_with(Default::default);
    index.remove(labels::OBJECT_GR);
    index.insert(labels::LEGACY_OBJECT_GROUP.into(), "apps".into());
    index.insert(labels::LEGACY_OBJECT_VERSION.into(), "v1beta2".into());
    index.insert(labels::LEGACY_OBJECT_KIND.into(), "Deployment".into());
    h.items.create(&legacy).await.unwrap();

    let found = h.inventory().list_items(&ItemFilter { object_resource: Some("deploy".into()), object_namespace: Some("dev".into()) }).await.unwrap();
    let mut names: Vec<&str> = found.iter().map(|i| i.object.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["old", "web"]);
}

#[tokio::test]
async fn named_lookups_skip_missing() {
    let h = Harness::new();
    seed(&h).await;
    let existing = h.items.records()[0].name().to_string();
    let batch = h.inventory().get_items(&["nope".to_string(), existing.clone()]).await;
    assert_eq!(batch.done.len(), 1);
    assert_eq!(batch.done[0].name(), existing);
    assert_eq!(batch.failed.len(), 1);
    assert!(matches!(batch.failed[0].1, KrbError::NotFound(_)));
}

#[tokio::test]
async fn policy_filters() {
    let h = Harness::new();
    h.policy("apps", "deployments", &["dev"]).await;
    h.policy("apps", "deployments", &[]).await;
    h.policy("", "configmaps", &["prod"]).await;
    let inv = h.inventory();

    let apps = inv.list_policies(&PolicyFilter { group: Some("apps".into()), ..Default::default() }).await.unwrap();
    assert_eq!(apps.len(), 2);
    let dev = inv.list_policies(&PolicyFilter { namespace: Some("dev".into()), ..Default::default() }).await.unwrap();
    assert_eq!(dev.len(), 2);
    assert!(dev.iter().all(|p| p.target.resource == "deployments"));
    let cms = inv.list_policies(&PolicyFilter { resource: Some("ConfigMaps".into()), ..Default::default() }).await.unwrap();
    assert_eq!(cms.len(), 1);
    assert_eq!(inv.list_policies(&PolicyFilter::default()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn create_policy_resolves_alias() {
    let h = Harness::new();
    let inv = h.inventory();
    let p = inv.create_policy("deploy", &[]).await.unwrap();
    assert_eq!(p.target.group, "apps");
    assert_eq!(p.target.resource, "deployments");
    assert_eq!(p.target.namespaces, vec![NAMESPACE_ALL.to_string()]);
    assert!(p.name().starts_with("recycle-deployments-"));

    let scoped = inv.create_policy("cm", &["dev".to_string(), "prod".to_string()]).await.unwrap();
    assert_eq!(scoped.target.namespaces, vec!["dev".to_string(), "prod".to_string()]);
    assert!(matches!(inv.create_policy("cm", &["Not Valid".to_string()]).await, Err(KrbError::InvalidPolicy(_))));
    assert_eq!(h.policies.len(), 2);
}

#[tokio::test]
async fn deletes_are_batch_isolated() {
    let h = Harness::new();
    seed(&h).await;
    let names: Vec<String> = h.items.records().iter().map(|i| i.name().to_string()).collect();
    let mut targets = vec!["ghost".to_string()];
    targets.extend(names.iter().cloned());

    let batch = h.inventory().delete_items(&targets).await;
    assert_eq!(batch.done, names);
    assert_eq!(batch.failed.len(), 1);
    assert!(h.items.is_empty());

    let policy = h.policies.records()[0].name().to_string();
    let batch = h.inventory().delete_policies(&[policy]).await;
    assert!(batch.failed.is_empty());
    assert_eq!(h.policies.len(), 1);
}
