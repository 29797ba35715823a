//! krb store: the object-store boundary the orchestrators are written against.
//!
//! Two capabilities: typed records (`RecycleItem`, `RecyclePolicy`) keyed by name with
//! optimistic concurrency, and blind creation of arbitrary objects for restore.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use krb_core::{Gvr, LabelSet, Record, StoreError};
use serde_json::Value as Json;

mod memory;
mod objects;

pub use memory::MemoryStore;
pub use objects::MemoryObjects;

/// Create/Get/List/Update/Delete over one cluster-scoped record kind.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Insert a new record; `AlreadyExists` when the name is taken.
    async fn create(&self, record: &R) -> Result<R, StoreError>;
    async fn get(&self, name: &str) -> Result<R, StoreError>;
    /// Records whose labels contain every `selector` pair.
    async fn list(&self, selector: &LabelSet) -> Result<Vec<R>, StoreError>;
    /// Replace a record; `Conflict` when its resource version is stale.
    async fn update(&self, record: &R) -> Result<R, StoreError>;
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Creates an arbitrary object at a collection address.
#[async_trait]
pub trait ObjectCreator: Send + Sync {
    async fn create(&self, gvr: &Gvr, namespace: Option<&str>, body: &Json) -> Result<(), StoreError>;
}

/// Store operation, for fault injection and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Get,
    List,
    Update,
    Delete,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub creates: usize,
    pub gets: usize,
    pub lists: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OperationCounts {
    fn bump(&mut self, op: Op) {
        match op {
            Op::Create => self.creates += 1,
            Op::Get => self.gets += 1,
            Op::List => self.lists += 1,
            Op::Update => self.updates += 1,
            Op::Delete => self.deletes += 1,
        }
    }
}

/// Scripted failures and latency shared by the in-memory backends.
#[derive(Default)]
pub(crate) struct Faults {
    queue: Mutex<VecDeque<(Op, StoreError)>>,
    counts: Mutex<OperationCounts>,
    delay: Mutex<Option<Duration>>,
}

impl Faults {
    pub(crate) fn push(&self, op: Op, err: StoreError, times: usize) {
        let mut q = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        for _ in 0..times {
            q.push_back((op, err.clone()));
        }
    }

    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    pub(crate) fn counts(&self) -> OperationCounts {
        self.counts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Count the call, sleep if configured, then pop the first queued failure for `op`.
    pub(crate) async fn enter(&self, op: Op) -> Result<(), StoreError> {
        self.counts.lock().unwrap_or_else(|p| p.into_inner()).bump(op);
        let delay = *self.delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let mut q = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        let scripted = q.iter().position(|(o, _)| *o == op).and_then(|i| q.remove(i));
        match scripted {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }
}
