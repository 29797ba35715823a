//! Restore: re-create recycled objects, then drop the consumed items.
//!
//! Each name is handled on its own; a failure is reported and the batch moves on.
//! The item is only deleted after the object exists again, and a failed cleanup
//! never rolls the restore back.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use krb_core::{KrbError, RecycleItem, Tuning};
use krb_schema::SchemaResolver;
use krb_store::{ObjectCreator, RecordStore};
use metrics::counter;
use tracing::{info, warn};

use crate::retry::bounded;

/// Where a restore stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    Fetch,
    Decode,
    Resolve,
    Create,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestoreStage::Fetch => "fetch",
            RestoreStage::Decode => "decode",
            RestoreStage::Resolve => "resolve",
            RestoreStage::Create => "create",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreReport {
    /// Object re-created and item removed.
    Restored { item: String, object: String },
    /// Object re-created, but the item could not be removed.
    Lingering { item: String, object: String, cleanup: KrbError },
    /// Nothing was created; the item, if any, is untouched.
    Failed { item: String, object: Option<String>, stage: RestoreStage, error: KrbError },
}

impl RestoreReport {
    pub fn item(&self) -> &str {
        match self {
            RestoreReport::Restored { item, .. } | RestoreReport::Lingering { item, .. } | RestoreReport::Failed { item, .. } => item,
        }
    }

    /// The object exists again, whether or not cleanup succeeded.
    pub fn object_restored(&self) -> bool {
        !matches!(self, RestoreReport::Failed { .. })
    }
}

pub struct Restorer {
    resolver: Arc<SchemaResolver>,
    items: Arc<dyn RecordStore<RecycleItem>>,
    objects: Arc<dyn ObjectCreator>,
    tuning: Tuning,
}

impl Restorer {
    pub fn new(
        resolver: Arc<SchemaResolver>,
        items: Arc<dyn RecordStore<RecycleItem>>,
        objects: Arc<dyn ObjectCreator>,
        tuning: Tuning,
    ) -> Self {
        Self { resolver, items, objects, tuning }
    }

    /// Restore every named item. Reports come back in input order even when
    /// items are processed concurrently.
    pub async fn restore(&self, names: &[String]) -> Vec<RestoreReport> {
        let width = self.tuning.restore_concurrency.max(1);
        let pending: Vec<_> = names.iter().map(|n| self.restore_one(n)).collect();
        stream::iter(pending).buffered(width).collect().await
    }

    pub async fn restore_one(&self, name: &str) -> RestoreReport {
        let report = self.attempt(name).await;
        match &report {
            RestoreReport::Restored { item, object } => {
                counter!("restore_ok", 1u64);
                info!(item = %item, object = %object, "restored; recycle item removed");
            }
            RestoreReport::Lingering { item, object, cleanup } => {
                counter!("restore_partial", 1u64);
                warn!(item = %item, object = %object, error = %cleanup, "restored, but the recycle item could not be removed");
            }
            RestoreReport::Failed { item, object, stage, error } => {
                counter!("restore_failed", 1u64);
                warn!(item = %item, object = ?object, stage = %stage, error = %error, "restore failed; recycle item kept");
            }
        }
        report
    }

    async fn attempt(&self, name: &str) -> RestoreReport {
        let fail = |object: Option<String>, stage, error: KrbError| RestoreReport::Failed { item: name.to_string(), object, stage, error };
        let timeout = self.tuning.request_timeout;

        let item = match bounded(timeout, self.items.get(name)).await {
            Ok(item) => item,
            Err(e) => return fail(None, RestoreStage::Fetch, e.into()),
        };
        let obj = &item.object;
        let object = format!("{} {}", obj.kind, obj.namespaced_name());

        let body = match obj.sanitized_body() {
            Ok(b) => b,
            Err(e) => return fail(Some(object), RestoreStage::Decode, e),
        };
        // re-resolved from the stored kind: the collection may have moved since recycling
        let gvr = match self.resolver.resolve_collection_form(&obj.gvk()).await {
            Ok(gvr) => gvr,
            Err(e) => return fail(Some(object), RestoreStage::Resolve, e.into()),
        };
        if let Err(e) = bounded(timeout, self.objects.create(&gvr, obj.namespace(), &body)).await {
            return fail(Some(object), RestoreStage::Create, e.into());
        }

        match bounded(timeout, self.items.delete(name)).await {
            Ok(()) => RestoreReport::Restored { item: name.to_string(), object },
            Err(e) => RestoreReport::Lingering { item: name.to_string(), object, cleanup: e.into() },
        }
    }
}
