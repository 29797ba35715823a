//! Create-with-fresh-name retry loop shared by items and policies.

use std::future::Future;
use std::time::Duration;

use krb_core::{KrbError, Record, StoreError, Tuning};
use krb_store::RecordStore;
use metrics::counter;
use rand::Rng;
use tracing::debug;

/// Bound a store call by `timeout`.
pub(crate) async fn bounded<T>(timeout: Duration, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(r) => r,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

/// Base delay plus up to `jitter * base` extra.
pub(crate) fn jittered(base: Duration, jitter: f64) -> Duration {
    if base.is_zero() || jitter <= 0.0 {
        return base;
    }
    let extra: f64 = rand::rng().random_range(0.0..jitter);
    base + base.mul_f64(extra)
}

/// Insert `record`, drawing a new random name after every 409 until `create_attempts` is spent.
///
/// Any other failure is returned at once. Running out of attempts yields `ExhaustedRetries`,
/// distinct from the `Conflict` a caller would see from a single store call.
pub async fn create_with_retry<R: Record>(
    store: &dyn RecordStore<R>,
    mut record: R,
    rename: fn(&mut R),
    tuning: &Tuning,
) -> Result<R, KrbError> {
    let attempts = tuning.create_attempts.max(1);
    for attempt in 1..=attempts {
        match bounded(tuning.request_timeout, store.create(&record)).await {
            Ok(created) => return Ok(created),
            Err(e) if e.is_conflict() => {
                counter!("recycle_conflict_retries", 1u64, "kind" => R::KIND);
                debug!(kind = R::KIND, name = record.name(), attempt, "name taken");
                if attempt < attempts {
                    tokio::time::sleep(jittered(tuning.create_backoff, tuning.create_jitter)).await;
                    rename(&mut record);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(KrbError::ExhaustedRetries { name: record.name().to_string(), attempts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_factor() {
        let base = Duration::from_millis(10);
        for _ in 0..100 {
            let d = jittered(base, 0.1);
            assert!(d >= base && d <= Duration::from_millis(11));
        }
        assert_eq!(jittered(Duration::ZERO, 0.1), Duration::ZERO);
        assert_eq!(jittered(base, 0.0), base);
    }
}
