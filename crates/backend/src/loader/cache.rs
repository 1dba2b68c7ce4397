use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use contracts::cache::CacheStats;
use contracts::domain::{SalesRecord, SkuRecord};
use contracts::queries::{AggregatedSales, SalesFilters};

/// Time source for TTL checks, injected so expiry is testable without
/// sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// What a cache entry can hold; one variant per load operation family.
#[derive(Debug, Clone)]
pub enum CachedPayload {
    Sales(Vec<SalesRecord>),
    Sku(Vec<SkuRecord>),
    Aggregate(AggregatedSales),
}

struct CacheEntry {
    payload: CachedPayload,
    stored_at: Instant,
}

/// Time-boxed in-memory query cache. Entries expire a fixed TTL after being
/// populated; a periodic sweep removes expired entries to bound memory
/// growth. This approximates eviction, it is not an LRU.
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Deterministic cache key for a filter combination. Missing fields and the
/// "all" sentinels collapse to the same `all` token, so `brand: None` and
/// `brand: "All Brands"` share an entry.
pub fn create_cache_key(prefix: &str, filters: &SalesFilters) -> String {
    let date_token = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "all".to_string())
    };
    let text_token = |v: Option<&str>| v.unwrap_or("all").to_string();
    let group_token = match filters.group_by {
        Some(contracts::queries::Granularity::Day) => "day",
        Some(contracts::queries::Granularity::Week) => "week",
        Some(contracts::queries::Granularity::Month) => "month",
        None => "all",
    };
    format!(
        "{}:{}:{}:{}:{}:{}",
        prefix,
        date_token(filters.start_date),
        date_token(filters.end_date),
        text_token(filters.effective_brand()),
        text_token(filters.effective_channel()),
        group_token,
    )
}

impl QueryCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a live entry. An expired entry counts as a miss and is dropped
    /// on the spot rather than waiting for the next sweep.
    pub fn get(&self, key: &str) -> Option<CachedPayload> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.payload.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, payload: CachedPayload) {
        let entry = CacheEntry {
            payload,
            stored_at: self.clock.now(),
        };
        self.entries.lock().unwrap().insert(key, entry);
    }

    /// Drop one entry, or everything when no key is given.
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.lock().unwrap();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    /// Remove entries older than the TTL. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().unwrap().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Background sweep for the cache's lifetime; the task exits once the
    /// cache itself is dropped.
    pub fn spawn_sweeper(cache: &Arc<QueryCache>, interval: Duration) {
        let weak: Weak<QueryCache> = Arc::downgrade(cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.sweep_expired();
                if removed > 0 {
                    tracing::debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::Clock;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Manually advanced clock for TTL tests.
    pub struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;
    use chrono::NaiveDate;

    const TTL: Duration = Duration::from_secs(300);

    fn filters(brand: Option<&str>) -> SalesFilters {
        SalesFilters {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31),
            brand: brand.map(str::to_string),
            ..Default::default()
        }
    }

    fn payload() -> CachedPayload {
        CachedPayload::Sales(Vec::new())
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = create_cache_key("sales", &filters(Some("Acme")));
        let b = create_cache_key("sales", &filters(Some("Acme")));
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_normalizes_sentinels() {
        let explicit = create_cache_key("sales", &filters(Some("All Brands")));
        let missing = create_cache_key("sales", &filters(None));
        assert_eq!(explicit, missing);
        assert_eq!(explicit, "sales:2025-01-01:2025-12-31:all:all:all");
    }

    #[test]
    fn test_cache_key_differs_when_filters_differ() {
        let acme = create_cache_key("sales", &filters(Some("Acme")));
        let other = create_cache_key("sales", &filters(Some("Globex")));
        assert_ne!(acme, other);

        let mut shifted = filters(Some("Acme"));
        shifted.end_date = NaiveDate::from_ymd_opt(2025, 6, 30);
        assert_ne!(acme, create_cache_key("sales", &shifted));
    }

    #[test]
    fn test_entry_lives_until_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::new(TTL, clock.clone());

        cache.insert("k".to_string(), payload());
        clock.advance(TTL - Duration::from_secs(1));
        assert!(cache.get("k").is_some(), "hit expected just before TTL");

        clock.advance(Duration::from_secs(2));
        assert!(cache.get("k").is_none(), "miss expected just after TTL");
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::new(TTL, clock.clone());

        cache.insert("old".to_string(), payload());
        clock.advance(TTL + Duration::from_secs(1));
        cache.insert("fresh".to_string(), payload());

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.stats().entries, 1);
        assert!(cache.get("fresh").is_some());
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::new(TTL, clock);

        cache.insert("k".to_string(), payload());
        let _ = cache.get("k");
        let _ = cache.get("absent");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
