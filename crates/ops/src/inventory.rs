//! Operator-facing reads and writes of recycle items and policies.

use std::collections::BTreeMap;
use std::sync::Arc;

use krb_core::item::legacy_selector;
use krb_core::labels;
use krb_core::{KrbError, KrbResult, LabelSet, Record, RecycleItem, RecyclePolicy, Tuning};
use krb_schema::SchemaResolver;
use krb_store::RecordStore;
use tracing::{info, warn};

use crate::retry::{bounded, create_with_retry};

/// Filters for listing items; names, when given, bypass the label query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Fuzzy resource name, resolved to its preferred collection.
    pub object_resource: Option<String>,
    pub object_namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFilter {
    pub group: Option<String>,
    pub resource: Option<String>,
    /// Keep policies that admit this namespace. `None` keeps all.
    pub namespace: Option<String>,
}

impl PolicyFilter {
    fn keeps(&self, p: &RecyclePolicy) -> bool {
        self.group.as_ref().map(|g| &p.target.group == g).unwrap_or(true)
            && self.resource.as_ref().map(|r| p.target.resource.eq_ignore_ascii_case(r)).unwrap_or(true)
            && self.namespace.as_deref().map(|ns| p.covers_namespace(Some(ns))).unwrap_or(true)
    }
}

/// Per-name results of a batch call. Failures never stop the rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub done: Vec<T>,
    pub failed: Vec<(String, KrbError)>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self { done: Vec::new(), failed: Vec::new() }
    }
}

impl<T> Batch<T> {
    fn record(&mut self, name: &str, r: KrbResult<T>) {
        match r {
            Ok(v) => self.done.push(v),
            Err(e) => {
                warn!(name = %name, error = %e, "skipping");
                self.failed.push((name.to_string(), e));
            }
        }
    }
}

pub struct Inventory {
    resolver: Arc<SchemaResolver>,
    items: Arc<dyn RecordStore<RecycleItem>>,
    policies: Arc<dyn RecordStore<RecyclePolicy>>,
    tuning: Tuning,
}

impl Inventory {
    pub fn new(
        resolver: Arc<SchemaResolver>,
        items: Arc<dyn RecordStore<RecycleItem>>,
        policies: Arc<dyn RecordStore<RecyclePolicy>>,
        tuning: Tuning,
    ) -> Self {
        Self { resolver, items, policies, tuning }
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    pub async fn get_items(&self, names: &[String]) -> Batch<RecycleItem> {
        let mut out = Batch::default();
        for name in names {
            let r = bounded(self.tuning.request_timeout, self.items.get(name)).await.map_err(KrbError::from);
            out.record(name, r);
        }
        out
    }

    /// Items matching the filter, oldest first. Items written with the older label
    /// layout are included when filtering by resource.
    pub async fn list_items(&self, filter: &ItemFilter) -> KrbResult<Vec<RecycleItem>> {
        let mut base = LabelSet::new();
        if let Some(ns) = &filter.object_namespace {
            base.insert(labels::OBJECT_NAMESPACE.to_string(), ns.clone());
        }
        let Some(resource) = &filter.object_resource else {
            return self.list_by(&base).await;
        };

        let gvr = self.resolver.resolve_preferred(resource).await?;
        let mut current = base.clone();
        current.insert(labels::OBJECT_GR.to_string(), gvr.group_resource().to_string());
        let mut merged: BTreeMap<String, RecycleItem> = BTreeMap::new();
        for item in self.list_by(&current).await? {
            merged.insert(item.name().to_string(), item);
        }

        let kinds = self.resolver.resolve_kind_forms(&gvr.group_resource().to_string()).await.unwrap_or_default();
        let mut seen_kinds: Vec<&str> = Vec::new();
        for gvk in kinds.iter().filter(|k| k.group == gvr.group) {
            if seen_kinds.contains(&gvk.kind.as_str()) {
                continue;
            }
            seen_kinds.push(&gvk.kind);
            let mut legacy = legacy_selector(&gvk.group, &gvk.kind);
            legacy.extend(base.clone());
            for item in self.list_by(&legacy).await? {
                merged.entry(item.name().to_string()).or_insert(item);
            }
        }
        Ok(sorted(merged.into_values().collect()))
    }

    async fn list_by(&self, selector: &LabelSet) -> KrbResult<Vec<RecycleItem>> {
        let items = bounded(self.tuning.request_timeout, self.items.list(selector)).await?;
        Ok(sorted(items))
    }

    pub async fn get_policies(&self, names: &[String], filter: &PolicyFilter) -> Batch<RecyclePolicy> {
        let mut out = Batch::default();
        for name in names {
            let r = bounded(self.tuning.request_timeout, self.policies.get(name)).await.map_err(KrbError::from);
            out.record(name, r);
        }
        out.done.retain(|p| filter.keeps(p));
        out
    }

    pub async fn list_policies(&self, filter: &PolicyFilter) -> KrbResult<Vec<RecyclePolicy>> {
        let all = bounded(self.tuning.request_timeout, self.policies.list(&LabelSet::new())).await?;
        Ok(all.into_iter().filter(|p| filter.keeps(p)).collect())
    }

    /// Create a policy for the preferred collection of `resource`. No namespaces means all.
    pub async fn create_policy(&self, resource: &str, namespaces: &[String]) -> KrbResult<RecyclePolicy> {
        let gvr = self.resolver.resolve_preferred(resource).await?;
        let policy = RecyclePolicy::new(&gvr, namespaces)?;
        let created = create_with_retry(self.policies.as_ref(), policy, RecyclePolicy::rename, &self.tuning).await?;
        info!(policy = %created.name(), gr = %created.group_resource(), namespaces = ?created.target.namespaces, "policy created");
        Ok(created)
    }

    pub async fn delete_items(&self, names: &[String]) -> Batch<String> {
        let mut out = Batch::default();
        for name in names {
            let r = bounded(self.tuning.request_timeout, self.items.delete(name)).await.map(|_| name.clone()).map_err(KrbError::from);
            out.record(name, r);
        }
        out
    }

    pub async fn delete_policies(&self, names: &[String]) -> Batch<String> {
        let mut out = Batch::default();
        for name in names {
            let r = bounded(self.tuning.request_timeout, self.policies.delete(name)).await.map(|_| name.clone()).map_err(KrbError::from);
            out.record(name, r);
        }
        out
    }
}

fn sorted(mut items: Vec<RecycleItem>) -> Vec<RecycleItem> {
    items.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.name().cmp(b.name())));
    items
}
