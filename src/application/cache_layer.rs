// Time-boxed memo over source fetches, keyed by descriptor identity
use crate::domain::error::DashboardResult;
use crate::domain::source::SourceDescriptor;
use crate::domain::table::RawTable;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<RawTable>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    /// Live for a caller only while younger than both the stored and the caller's TTL
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) <= self.ttl.min(ttl)
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<CacheEntry>>>;

/// Process-wide fetch cache, shared with card bindings through an `Arc`.
///
/// Loads are single-flight per key: concurrent callers for an expired key
/// wait on the slot lock and then see the entry the first caller stored.
#[derive(Default)]
pub struct CacheLayer {
    slots: Mutex<HashMap<String, Slot>>,
}

impl CacheLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live entry for `descriptor`, or run `loader` and store its result.
    ///
    /// A zero `ttl` bypasses the cache entirely. Failed loads are not stored.
    pub async fn get<F, Fut>(
        &self,
        descriptor: &SourceDescriptor,
        ttl: Duration,
        loader: F,
    ) -> DashboardResult<Arc<RawTable>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DashboardResult<RawTable>>,
    {
        if ttl.is_zero() {
            return loader().await.map(Arc::new);
        }

        let key = descriptor.cache_key();
        let slot = self.slots.lock().entry(key.clone()).or_default().clone();
        let mut entry = slot.lock().await;

        if let Some(live) = entry.as_ref().filter(|e| e.is_live(Instant::now(), ttl)) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(live.value.clone());
        }

        tracing::debug!(key = %key, expired = entry.is_some(), "cache miss");
        let value = Arc::new(loader().await?);
        *entry = Some(CacheEntry {
            value: value.clone(),
            fetched_at: Instant::now(),
            ttl,
        });
        Ok(value)
    }

    /// Number of keys currently holding a value, live or expired
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.try_lock().map(|e| e.is_some()).unwrap_or(true))
            .count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose age exceeds its TTL.
    ///
    /// Slots another caller still holds a handle to are kept, so a caller
    /// about to lock a slot never races a fresh slot for the same key.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(entry) => entry.as_ref().is_some_and(|e| e.is_live(now, e.ttl)),
                Err(_) => true,
            }
        });
        before - slots.len()
    }
}
