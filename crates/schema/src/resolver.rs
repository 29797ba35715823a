//! Cached resolver over a discovery source.
//!
//! The catalog lives behind an `ArcSwapOption`; refreshes build a new snapshot and
//! swap it in whole, so readers see either the old catalog or the new one. Fetches
//! are single-flight: concurrent callers that find the snapshot stale queue on one
//! mutex and reuse whatever the first of them loaded. A failed refresh keeps the
//! previous catalog and holds off further fetches for `discovery_min_refresh`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use krb_core::{Gvk, Gvr, ResolveError, Tuning};
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Resolution};

/// Where catalogs come from. Implemented over the cluster discovery API in `krb-kubehub`.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Catalog, ResolveError>;
}

/// Fixed, swappable catalog. Counts fetches so tests can observe caching, and can
/// be scripted to fail or stall.
pub struct StaticSource {
    catalog: ArcSwap<Catalog>,
    fetches: AtomicU64,
    faults: Mutex<VecDeque<ResolveError>>,
    latency: Mutex<Option<Duration>>,
}

impl StaticSource {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: ArcSwap::from_pointee(catalog),
            fetches: AtomicU64::new(0),
            faults: Mutex::new(VecDeque::new()),
            latency: Mutex::new(None),
        }
    }

    /// The next `times` fetches fail with `err`.
    pub fn fail(&self, err: ResolveError, times: usize) {
        let mut q = self.faults.lock().unwrap_or_else(|p| p.into_inner());
        q.extend(std::iter::repeat(err).take(times));
    }

    /// Delay every fetch by `delay`.
    pub fn set_latency(&self, delay: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    /// Replace what the next fetch returns (e.g. a CRD got registered).
    pub fn set(&self, catalog: Catalog) {
        self.catalog.store(Arc::new(catalog));
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CatalogSource for StaticSource {
    async fn fetch(&self) -> Result<Catalog, ResolveError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let delay = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(e) = self.faults.lock().unwrap_or_else(|p| p.into_inner()).pop_front() {
            return Err(e);
        }
        Ok(self.catalog.load().as_ref().clone())
    }
}

struct Snapshot {
    catalog: Arc<Catalog>,
    fetched_at: Instant,
    /// Successful fetches so far.
    epoch: u64,
    /// Fetch attempts so far, failed ones included.
    attempt: u64,
    /// Set after a failed refresh: no new fetch before this instant.
    retry_after: Option<Instant>,
}

impl Snapshot {
    fn backing_off(&self) -> bool {
        self.retry_after.map(|t| Instant::now() < t).unwrap_or(false)
    }
}

pub struct SchemaResolver {
    source: Arc<dyn CatalogSource>,
    current: ArcSwapOption<Snapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
    tuning: Tuning,
}

impl SchemaResolver {
    pub fn new(source: Arc<dyn CatalogSource>, tuning: Tuning) -> Self {
        Self { source, current: ArcSwapOption::empty(), refresh_lock: tokio::sync::Mutex::new(()), tuning }
    }

    /// Number of snapshots installed so far; 0 before the first fetch.
    pub fn epoch(&self) -> u64 {
        self.current.load().as_ref().map(|s| s.epoch).unwrap_or(0)
    }

    /// Drop the cached snapshot; the next lookup fetches.
    pub fn invalidate(&self) {
        self.current.store(None);
    }

    /// Current catalog, fetching when missing or older than the TTL.
    pub async fn catalog(&self) -> Result<Arc<Catalog>, ResolveError> {
        Ok(self.snapshot().await?.catalog.clone())
    }

    /// Force a fetch regardless of age.
    pub async fn refresh(&self) -> Result<Arc<Catalog>, ResolveError> {
        let seen = self.current.load().as_ref().map(|s| s.attempt).unwrap_or(0);
        Ok(self.load(Some(seen)).await?.catalog.clone())
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>, ResolveError> {
        if let Some(s) = self.current.load_full() {
            if s.fetched_at.elapsed() < self.tuning.discovery_ttl || s.backing_off() {
                return Ok(s);
            }
        }
        self.load(None).await
    }

    /// `force_after`: refetch unless someone already attempted a fetch after this one.
    async fn load(&self, force_after: Option<u64>) -> Result<Arc<Snapshot>, ResolveError> {
        let _guard = self.refresh_lock.lock().await;
        let cached = self.current.load_full();
        if let Some(s) = &cached {
            let done = match force_after {
                Some(seen) => s.attempt > seen,
                None => s.fetched_at.elapsed() < self.tuning.discovery_ttl || s.backing_off(),
            };
            if done {
                return Ok(s.clone());
            }
        }

        let started = Instant::now();
        let fetched = match tokio::time::timeout(self.tuning.request_timeout, self.source.fetch()).await {
            Ok(r) => r,
            Err(_) => Err(ResolveError::Timeout(self.tuning.request_timeout)),
        };
        histogram!("discovery_refresh_ms", started.elapsed().as_secs_f64() * 1000.0);
        let attempt = cached.as_ref().map(|s| s.attempt).unwrap_or(0) + 1;
        match fetched {
            Ok(catalog) => {
                let epoch = cached.as_ref().map(|s| s.epoch).unwrap_or(0) + 1;
                counter!("discovery_refreshes", 1u64);
                info!(epoch, entries = catalog.len(), took_ms = %started.elapsed().as_millis(), "discovery catalog refreshed");
                let next = Arc::new(Snapshot { catalog: Arc::new(catalog), fetched_at: Instant::now(), epoch, attempt, retry_after: None });
                self.current.store(Some(next.clone()));
                Ok(next)
            }
            Err(e) => match cached {
                Some(stale) => {
                    counter!("discovery_refresh_failures", 1u64);
                    warn!(error = %e, epoch = stale.epoch, retry_in = ?self.tuning.discovery_min_refresh, "discovery refresh failed; serving previous catalog");
                    let kept = Arc::new(Snapshot {
                        catalog: stale.catalog.clone(),
                        fetched_at: stale.fetched_at,
                        epoch: stale.epoch,
                        attempt,
                        retry_after: Some(Instant::now() + self.tuning.discovery_min_refresh),
                    });
                    self.current.store(Some(kept.clone()));
                    Ok(kept)
                }
                None => Err(e),
            },
        }
    }

    /// After a miss, fetch again if the snapshot is old enough. Returns the newer snapshot, if any.
    async fn refresh_on_miss(&self, snap: &Snapshot) -> Option<Arc<Snapshot>> {
        if snap.fetched_at.elapsed() < self.tuning.discovery_min_refresh || snap.backing_off() {
            return None;
        }
        debug!(epoch = snap.epoch, "lookup miss; refreshing discovery");
        match self.load(Some(snap.attempt)).await {
            Ok(next) if next.epoch > snap.epoch => Some(next),
            _ => None,
        }
    }

    /// Exact kind-form to collection-form lookup.
    pub async fn resolve_collection_form(&self, gvk: &Gvk) -> Result<Gvr, ResolveError> {
        let snap = self.snapshot().await?;
        if let Some(e) = snap.catalog.lookup(gvk) {
            return Ok(e.gvr());
        }
        if let Some(next) = self.refresh_on_miss(&snap).await {
            if let Some(e) = next.catalog.lookup(gvk) {
                return Ok(e.gvr());
            }
        }
        Err(ResolveError::NotFound { name: gvk.to_string(), suggestion: None })
    }

    /// Every kind-form a fuzzy name could denote, across groups. May be empty.
    pub async fn resolve_kind_forms(&self, name: &str) -> Result<Vec<Gvk>, ResolveError> {
        let snap = self.snapshot().await?;
        let found = kind_forms(&snap.catalog, name);
        if !found.is_empty() {
            return Ok(found);
        }
        match self.refresh_on_miss(&snap).await {
            Some(next) => Ok(kind_forms(&next.catalog, name)),
            None => Ok(found),
        }
    }

    /// Collapse a fuzzy name to one collection-form, without turning ambiguity into an error.
    pub async fn resolve(&self, name: &str) -> Result<Resolution, ResolveError> {
        let snap = self.snapshot().await?;
        let r = snap.catalog.resolve(name);
        if r != Resolution::NotFound {
            return Ok(r);
        }
        match self.refresh_on_miss(&snap).await {
            Some(next) => Ok(next.catalog.resolve(name)),
            None => Ok(r),
        }
    }

    /// One preferred collection-form, or a typed error carrying candidates or a suggestion.
    pub async fn resolve_preferred(&self, name: &str) -> Result<Gvr, ResolveError> {
        match self.resolve(name).await? {
            Resolution::Unique(gvr) => Ok(gvr),
            Resolution::Ambiguous(candidates) => Err(ResolveError::Ambiguous { name: name.to_string(), candidates }),
            Resolution::NotFound => {
                let suggestion = self.current.load().as_ref().and_then(|s| s.catalog.suggest(name));
                Err(ResolveError::NotFound { name: name.to_string(), suggestion })
            }
        }
    }

    /// `resource.group` for every known collection; empty when discovery is unavailable.
    pub async fn list_all_collection_names(&self) -> Vec<String> {
        match self.catalog().await {
            Ok(c) => c.collection_names(),
            Err(e) => {
                warn!(error = %e, "listing collection names without a catalog");
                Vec::new()
            }
        }
    }
}

fn kind_forms(catalog: &Catalog, name: &str) -> Vec<Gvk> {
    let parsed = catalog.parse_name(name);
    let mut out: Vec<Gvk> = Vec::new();
    for e in catalog.candidates(&parsed) {
        let gvk = e.gvk();
        if !out.contains(&gvk) {
            out.push(gvk);
        }
    }
    out
}
