//! krb public API façade (in-process).
//!
//! Frontends (the CLI, the webhook server) depend on the `KrbApi` trait; `InProcApi`
//! implements it directly over a resolver, the two record stores and an object creator.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use krb_core::{KrbResult, RecycleItem, RecyclePolicy, Tuning};
use krb_kubehub::{KubeDiscovery, KubeObjectCreator, KubeStore};
use krb_ops::{Inventory, Recycler, Restorer};
use krb_schema::{CatalogSource, SchemaResolver};
use krb_store::{ObjectCreator, RecordStore};
use tracing::info;

pub mod admission;

pub use krb_ops::{Batch, ItemFilter, PolicyFilter, RestoreReport, RestoreStage};

#[async_trait]
pub trait KrbApi: Send + Sync {
    async fn get_items(&self, names: &[String]) -> Batch<RecycleItem>;
    async fn list_items(&self, filter: &ItemFilter) -> KrbResult<Vec<RecycleItem>>;
    async fn get_policies(&self, names: &[String], filter: &PolicyFilter) -> Batch<RecyclePolicy>;
    async fn list_policies(&self, filter: &PolicyFilter) -> KrbResult<Vec<RecyclePolicy>>;
    async fn create_policy(&self, resource: &str, namespaces: &[String]) -> KrbResult<RecyclePolicy>;
    async fn restore(&self, names: &[String]) -> Vec<RestoreReport>;
    async fn delete_items(&self, names: &[String]) -> Batch<String>;
    async fn delete_policies(&self, names: &[String]) -> Batch<String>;
    /// Every known collection as `resource.group`, for completion.
    async fn resources(&self) -> Vec<String>;
    /// Answer a serialized admission review (always allowing the request).
    async fn review(&self, body: &[u8]) -> Vec<u8>;
}

pub struct InProcApi {
    resolver: Arc<SchemaResolver>,
    recycler: Recycler,
    restorer: Restorer,
    inventory: Inventory,
}

impl InProcApi {
    pub fn from_parts(
        source: Arc<dyn CatalogSource>,
        items: Arc<dyn RecordStore<RecycleItem>>,
        policies: Arc<dyn RecordStore<RecyclePolicy>>,
        objects: Arc<dyn ObjectCreator>,
        tuning: Tuning,
    ) -> Self {
        let resolver = Arc::new(SchemaResolver::new(source, tuning.clone()));
        Self {
            recycler: Recycler::new(resolver.clone(), policies.clone(), items.clone(), tuning.clone()),
            restorer: Restorer::new(resolver.clone(), items.clone(), objects, tuning.clone()),
            inventory: Inventory::new(resolver.clone(), items, policies, tuning),
            resolver,
        }
    }

    /// Wire everything to the cluster the ambient kubeconfig points at.
    pub async fn connect(tuning: Tuning) -> Result<Self> {
        let client = krb_kubehub::connect(tuning.request_timeout).await?;
        let timeout = tuning.request_timeout;
        info!(restore_concurrency = tuning.restore_concurrency, create_attempts = tuning.create_attempts, "krb api connected");
        Ok(Self::from_parts(
            Arc::new(KubeDiscovery::new(client.clone())),
            Arc::new(KubeStore::<RecycleItem>::new(client.clone(), timeout)),
            Arc::new(KubeStore::<RecyclePolicy>::new(client.clone(), timeout)),
            Arc::new(KubeObjectCreator::new(client, timeout)),
            tuning,
        ))
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    pub fn recycler(&self) -> &Recycler {
        &self.recycler
    }
}

#[async_trait]
impl KrbApi for InProcApi {
    async fn get_items(&self, names: &[String]) -> Batch<RecycleItem> {
        self.inventory.get_items(names).await
    }

    async fn list_items(&self, filter: &ItemFilter) -> KrbResult<Vec<RecycleItem>> {
        self.inventory.list_items(filter).await
    }

    async fn get_policies(&self, names: &[String], filter: &PolicyFilter) -> Batch<RecyclePolicy> {
        self.inventory.get_policies(names, filter).await
    }

    async fn list_policies(&self, filter: &PolicyFilter) -> KrbResult<Vec<RecyclePolicy>> {
        self.inventory.list_policies(filter).await
    }

    async fn create_policy(&self, resource: &str, namespaces: &[String]) -> KrbResult<RecyclePolicy> {
        self.inventory.create_policy(resource, namespaces).await
    }

    async fn restore(&self, names: &[String]) -> Vec<RestoreReport> {
        self.restorer.restore(names).await
    }

    async fn delete_items(&self, names: &[String]) -> Batch<String> {
        self.inventory.delete_items(names).await
    }

    async fn delete_policies(&self, names: &[String]) -> Batch<String> {
        self.inventory.delete_policies(names).await
    }

    async fn resources(&self) -> Vec<String> {
        self.resolver.list_all_collection_names().await
    }

    async fn review(&self, body: &[u8]) -> Vec<u8> {
        admission::handle_review(&self.recycler, body).await
    }
}
