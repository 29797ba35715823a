//! In-memory `RecordStore`.
//!
//! The table is an immutable map behind `ArcSwap`: readers load the current map,
//! writers build the next one with `rcu` and swap it in.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use krb_core::labels::matches_selector;
use krb_core::{LabelSet, Record, StoreError};
use tracing::debug;

use crate::{Faults, Op, OperationCounts, RecordStore};

type Table<R> = BTreeMap<String, R>;

pub struct MemoryStore<R: Record> {
    table: ArcSwap<Table<R>>,
    next_rv: AtomicU64,
    faults: Faults,
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self { table: ArcSwap::from_pointee(Table::new()), next_rv: AtomicU64::new(1), faults: Faults::default() }
    }

    /// Fail the next `times` calls of `op` with `err`.
    pub fn fail(&self, op: Op, err: StoreError, times: usize) {
        self.faults.push(op, err, times);
    }

    /// Delay every call, to exercise timeouts.
    pub fn set_latency(&self, delay: Option<Duration>) {
        self.faults.set_delay(delay);
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.faults.counts()
    }

    /// Snapshot of every stored record, ordered by name.
    pub fn records(&self) -> Vec<R> {
        self.table.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.load().contains_key(name)
    }

    fn stamp(&self, record: &mut R, created: bool) {
        let rv = self.next_rv.fetch_add(1, Ordering::Relaxed);
        let meta = record.metadata_mut();
        meta.resource_version = Some(rv.to_string());
        if created {
            meta.creation_timestamp = Some(Time(chrono::Utc::now()));
        }
    }

    fn not_found(name: &str) -> StoreError {
        StoreError::NotFound { kind: R::KIND.to_string(), name: name.to_string() }
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn create(&self, record: &R) -> Result<R, StoreError> {
        self.faults.enter(Op::Create).await?;
        let name = record.name().to_string();
        if name.is_empty() {
            return Err(StoreError::Malformed(format!("{} without a name", R::KIND)));
        }
        let mut stored = record.clone();
        self.stamp(&mut stored, true);
        let mut outcome = Ok(());
        self.table.rcu(|t| {
            if t.contains_key(&name) {
                outcome = Err(StoreError::AlreadyExists { kind: R::KIND.to_string(), name: name.clone() });
                return Arc::clone(t);
            }
            outcome = Ok(());
            let mut next = Table::clone(t);
            next.insert(name.clone(), stored.clone());
            Arc::new(next)
        });
        outcome?;
        debug!(kind = R::KIND, name = %name, "record created");
        Ok(stored)
    }

    async fn get(&self, name: &str) -> Result<R, StoreError> {
        self.faults.enter(Op::Get).await?;
        self.table.load().get(name).cloned().ok_or_else(|| Self::not_found(name))
    }

    async fn list(&self, selector: &LabelSet) -> Result<Vec<R>, StoreError> {
        self.faults.enter(Op::List).await?;
        Ok(self.table.load().values().filter(|r| matches_selector(r.labels(), selector)).cloned().collect())
    }

    async fn update(&self, record: &R) -> Result<R, StoreError> {
        self.faults.enter(Op::Update).await?;
        let name = record.name().to_string();
        let mut stored = record.clone();
        self.stamp(&mut stored, false);
        let mut outcome = Ok(());
        self.table.rcu(|t| {
            let Some(current) = t.get(&name) else {
                outcome = Err(Self::not_found(&name));
                return Arc::clone(t);
            };
            if let Some(expected) = record.resource_version() {
                if current.resource_version() != Some(expected) {
                    outcome = Err(StoreError::Conflict {
                        kind: R::KIND.to_string(),
                        name: name.clone(),
                        reason: "the object has been modified".into(),
                    });
                    return Arc::clone(t);
                }
            }
            outcome = Ok(());
            stored.metadata_mut().creation_timestamp = current.metadata().creation_timestamp.clone();
            let mut next = Table::clone(t);
            next.insert(name.clone(), stored.clone());
            Arc::new(next)
        });
        outcome?;
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.faults.enter(Op::Delete).await?;
        let mut outcome = Ok(());
        self.table.rcu(|t| {
            if !t.contains_key(name) {
                outcome = Err(Self::not_found(name));
                return Arc::clone(t);
            }
            outcome = Ok(());
            let mut next = Table::clone(t);
            next.remove(name);
            Arc::new(next)
        });
        outcome
    }
}
