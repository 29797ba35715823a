//! `RecordStore` and `ObjectCreator` over the API server, via `DynamicObject`.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use krb_core::labels::selector_string;
use krb_core::{Gvr, LabelSet, Record, StoreError, API_VERSION, GROUP, VERSION};
use krb_store::{ObjectCreator, RecordStore};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::Client;
use serde_json::Value as Json;
use tracing::{debug, warn};

/// Classify a kube error at the store boundary.
pub fn store_error(kind: &str, name: &str, e: kube::Error) -> StoreError {
    match e {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound { kind: kind.to_string(), name: name.to_string() },
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists { kind: kind.to_string(), name: name.to_string() }
        }
        kube::Error::Api(resp) if resp.code == 409 => {
            StoreError::Conflict { kind: kind.to_string(), name: name.to_string(), reason: resp.message }
        }
        kube::Error::SerdeError(e) => StoreError::Malformed(e.to_string()),
        other => StoreError::Transport(other.to_string()),
    }
}

async fn bounded<T, F>(timeout: Duration, kind: &str, name: &str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, kube::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(r) => r.map_err(|e| store_error(kind, name, e)),
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

fn record_resource<R: Record>() -> ApiResource {
    ApiResource {
        group: GROUP.to_string(),
        version: VERSION.to_string(),
        api_version: API_VERSION.to_string(),
        kind: R::KIND.to_string(),
        plural: R::PLURAL.to_string(),
    }
}

/// Cluster-scoped `krb.ketches.cn` records.
pub struct KubeStore<R> {
    api: Api<DynamicObject>,
    timeout: Duration,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> KubeStore<R> {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { api: Api::all_with(client, &record_resource::<R>()), timeout, _record: PhantomData }
    }

    fn encode(record: &R) -> Result<DynamicObject, StoreError> {
        let v = serde_json::to_value(record).map_err(|e| StoreError::Malformed(e.to_string()))?;
        serde_json::from_value(v).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn decode(obj: DynamicObject) -> Result<R, StoreError> {
        let v = serde_json::to_value(obj).map_err(|e| StoreError::Malformed(e.to_string()))?;
        serde_json::from_value(v).map_err(|e| StoreError::Malformed(format!("{}: {}", R::KIND, e)))
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for KubeStore<R> {
    async fn create(&self, record: &R) -> Result<R, StoreError> {
        let obj = Self::encode(record)?;
        let created = bounded(self.timeout, R::KIND, record.name(), self.api.create(&PostParams::default(), &obj)).await?;
        Self::decode(created)
    }

    async fn get(&self, name: &str) -> Result<R, StoreError> {
        Self::decode(bounded(self.timeout, R::KIND, name, self.api.get(name)).await?)
    }

    async fn list(&self, selector: &LabelSet) -> Result<Vec<R>, StoreError> {
        let mut lp = ListParams::default();
        if !selector.is_empty() {
            lp = lp.labels(&selector_string(selector));
        }
        let list = bounded(self.timeout, R::KIND, "", self.api.list(&lp)).await?;
        let mut out = Vec::with_capacity(list.items.len());
        for obj in list.items {
            let name = obj.metadata.name.clone().unwrap_or_default();
            match Self::decode(obj) {
                Ok(r) => out.push(r),
                Err(e) => warn!(kind = R::KIND, name = %name, error = %e, "skipping undecodable record"),
            }
        }
        debug!(kind = R::KIND, selector = %selector_string(selector), count = out.len(), "listed records");
        Ok(out)
    }

    async fn update(&self, record: &R) -> Result<R, StoreError> {
        let obj = Self::encode(record)?;
        let name = record.name();
        Self::decode(bounded(self.timeout, R::KIND, name, self.api.replace(name, &PostParams::default(), &obj)).await?)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        bounded(self.timeout, R::KIND, name, self.api.delete(name, &DeleteParams::default())).await?;
        Ok(())
    }
}

/// Blind creation of arbitrary objects, used by restore.
#[derive(Clone)]
pub struct KubeObjectCreator {
    client: Client,
    timeout: Duration,
}

impl KubeObjectCreator {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ObjectCreator for KubeObjectCreator {
    async fn create(&self, gvr: &Gvr, namespace: Option<&str>, body: &Json) -> Result<(), StoreError> {
        let obj: DynamicObject = serde_json::from_value(body.clone()).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let name = obj.metadata.name.clone().unwrap_or_default();
        let ar = ApiResource {
            group: gvr.group.clone(),
            version: gvr.version.clone(),
            api_version: gvr.api_version(),
            kind: kind.clone(),
            plural: gvr.resource.clone(),
        };
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        bounded(self.timeout, &kind, &name, api.create(&PostParams::default(), &obj)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse { status: "Failure".into(), message: "msg".into(), reason: reason.into(), code })
    }

    #[test]
    fn conflicts_are_split_by_reason() {
        assert!(store_error("RecycleItem", "a", api_err(409, "AlreadyExists")).is_already_exists());
        assert!(matches!(store_error("RecycleItem", "a", api_err(409, "Conflict")), StoreError::Conflict { .. }));
        assert!(store_error("RecycleItem", "a", api_err(404, "NotFound")).is_not_found());
        assert!(matches!(store_error("RecycleItem", "a", api_err(500, "InternalError")), StoreError::Transport(_)));
    }

    #[test]
    fn records_address_the_krb_group() {
        let ar = record_resource::<krb_core::RecycleItem>();
        assert_eq!(ar.api_version, "krb.ketches.cn/v1alpha1");
        assert_eq!(ar.plural, "recycleitems");
    }
}
