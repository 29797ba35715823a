//! Recycle on delete: decide whether a deletion is covered by a policy and, if so,
//! persist the object's last body as a `RecycleItem`.
//!
//! Outcomes never flow back into the admission decision; callers allow the delete
//! whatever `handle` returns.

use std::sync::Arc;

use chrono::Utc;
use krb_core::matcher::{any_in_group, first_match};
use krb_core::{Gvk, Gvr, KrbError, LabelSet, Record, RecycleItem, RecyclePolicy, RecycledObject, Tuning};
use krb_schema::SchemaResolver;
use krb_store::RecordStore;
use metrics::counter;
use tracing::{debug, error, info};

use crate::retry::{bounded, create_with_retry};

/// What the admission layer hands over for one DELETE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNotification {
    /// Kind-form identity of the object being deleted.
    pub kind: Gvk,
    /// Collection the request addressed, when the caller already knows it.
    pub resource: Option<Gvr>,
    pub namespace: Option<String>,
    pub name: String,
    /// Last observed serialized body.
    pub old_object: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecycleOutcome {
    Persisted { item: String, policy: String },
    Skipped,
    Failed(KrbError),
}

pub struct Recycler {
    resolver: Arc<SchemaResolver>,
    policies: Arc<dyn RecordStore<RecyclePolicy>>,
    items: Arc<dyn RecordStore<RecycleItem>>,
    tuning: Tuning,
}

impl Recycler {
    pub fn new(
        resolver: Arc<SchemaResolver>,
        policies: Arc<dyn RecordStore<RecyclePolicy>>,
        items: Arc<dyn RecordStore<RecycleItem>>,
        tuning: Tuning,
    ) -> Self {
        Self { resolver, policies, items, tuning }
    }

    /// Run one deletion through RECEIVED -> POLICY_CHECKED -> terminal state. Never panics, never blocks
    /// past the configured timeouts; emits exactly one log event.
    pub async fn handle(&self, n: &DeleteNotification) -> RecycleOutcome {
        let outcome = match self.run(n).await {
            Ok(Some((item, policy))) => RecycleOutcome::Persisted { item, policy },
            Ok(None) => RecycleOutcome::Skipped,
            Err(e) => RecycleOutcome::Failed(e),
        };
        let ns = n.namespace.as_deref().unwrap_or_default();
        match &outcome {
            RecycleOutcome::Persisted { item, policy } => {
                counter!("recycle_persisted", 1u64);
                info!(kind = %n.kind, ns, name = %n.name, item = %item, policy = %policy, "object recycled");
            }
            RecycleOutcome::Skipped => {
                counter!("recycle_skipped", 1u64);
                debug!(kind = %n.kind, ns, name = %n.name, "no matching policy");
            }
            RecycleOutcome::Failed(e) => {
                counter!("recycle_failed", 1u64);
                error!(kind = %n.kind, ns, name = %n.name, error = %e, "recycle failed; deletion proceeds");
            }
        }
        outcome
    }

    async fn run(&self, n: &DeleteNotification) -> Result<Option<(String, String)>, KrbError> {
        let policies = bounded(self.tuning.request_timeout, self.policies.list(&LabelSet::new())).await?;
        // cheap exit before any discovery work
        if !any_in_group(&n.kind.group, &policies) {
            return Ok(None);
        }
        let gvr = match &n.resource {
            Some(gvr) => gvr.clone(),
            None => self.resolver.resolve_collection_form(&n.kind).await?,
        };
        let Some(policy) = first_match(&gvr.group_resource(), n.namespace.as_deref(), &policies) else {
            return Ok(None);
        };
        if n.old_object.is_empty() {
            return Err(KrbError::MalformedPayload(format!("deletion of {} carried no object body", n.name)));
        }

        let object = RecycledObject::new(&n.kind, gvr.resource, n.namespace.as_deref(), &n.name, n.old_object.clone());
        let item = RecycleItem::new(object, Utc::now());
        let created = create_with_retry(self.items.as_ref(), item, RecycleItem::rename, &self.tuning).await?;
        Ok(Some((created.name().to_string(), policy.name().to_string())))
    }
}
