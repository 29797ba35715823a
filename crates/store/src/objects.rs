//! In-memory `ObjectCreator`: records what restore re-created.

use std::sync::Mutex;

use async_trait::async_trait;
use krb_core::{Gvr, StoreError};
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use tracing::debug;

use crate::{Faults, ObjectCreator, Op, OperationCounts};

type Key = (Gvr, String, String);

#[derive(Default)]
pub struct MemoryObjects {
    objects: Mutex<FxHashMap<Key, Json>>,
    faults: Faults,
}

fn key(gvr: &Gvr, namespace: Option<&str>, name: &str) -> Key {
    (gvr.clone(), namespace.unwrap_or_default().to_string(), name.to_string())
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, as if it had been recreated by someone else.
    pub fn insert(&self, gvr: &Gvr, namespace: Option<&str>, name: &str, body: Json) {
        self.objects.lock().unwrap_or_else(|p| p.into_inner()).insert(key(gvr, namespace, name), body);
    }

    pub fn get(&self, gvr: &Gvr, namespace: Option<&str>, name: &str) -> Option<Json> {
        self.objects.lock().unwrap_or_else(|p| p.into_inner()).get(&key(gvr, namespace, name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail(&self, err: StoreError, times: usize) {
        self.faults.push(Op::Create, err, times);
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.faults.counts()
    }
}

#[async_trait]
impl ObjectCreator for MemoryObjects {
    async fn create(&self, gvr: &Gvr, namespace: Option<&str>, body: &Json) -> Result<(), StoreError> {
        self.faults.enter(Op::Create).await?;
        let name = body
            .pointer("/metadata/name")
            .and_then(Json::as_str)
            .ok_or_else(|| StoreError::Malformed(format!("{} object without metadata.name", gvr.group_resource())))?;
        if body.pointer("/metadata/resourceVersion").is_some() {
            return Err(StoreError::Malformed("resourceVersion should not be set on objects to be created".into()));
        }
        let k = key(gvr, namespace, name);
        let mut objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        if objects.contains_key(&k) {
            let kind = body.get("kind").and_then(Json::as_str).unwrap_or(gvr.resource.as_str()).to_string();
            return Err(StoreError::AlreadyExists { kind, name: name.to_string() });
        }
        objects.insert(k, body.clone());
        debug!(gr = %gvr.group_resource(), ns = ?namespace, name, "object created");
        Ok(())
    }
}
