//! Regional flight cache keyed by quantized viewport center.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use heli_core::{BoundingBox, FlightRecord, RegionKey, RegionQuantizer};
use heli_upstream::{UpstreamAdapter, UpstreamError};

/// Anything stored with a monotonic insertion time.
pub trait Aged {
    fn stored_at(&self) -> Instant;
}

/// Drop entries older than `max_age`, then the oldest until at most `max_entries` remain.
pub fn prune_aged<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration)
where
    K: Clone + Eq + Hash,
    V: Aged,
{
    let now = Instant::now();
    let mut entries: Vec<(K, Instant)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().stored_at()))
        .collect();

    for (key, stored_at) in &entries {
        if now.duration_since(*stored_at) > max_age {
            cache.remove(key);
        }
    }

    if cache.len() <= max_entries {
        return;
    }

    entries.sort_by_key(|(_, stored_at)| *stored_at);
    for (key, _) in entries {
        if cache.len() <= max_entries {
            break;
        }
        cache.remove(&key);
    }
}

/// One upstream snapshot for a quantization cell. Replaced whole on refresh.
#[derive(Debug)]
pub struct CacheEntry {
    pub region_key: RegionKey,
    /// Area that was actually requested from the provider
    pub cell: BoundingBox,
    pub fetched_at: DateTime<Utc>,
    stored_at: Instant,
    pub records: Vec<FlightRecord>,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

impl Aged for Arc<CacheEntry> {
    fn stored_at(&self) -> Instant {
        self.stored_at
    }
}

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub entry: Arc<CacheEntry>,
    /// Served without an upstream call
    pub hit: bool,
}

pub struct RegionalCache {
    adapter: Arc<dyn UpstreamAdapter>,
    quantizer: RegionQuantizer,
    ttl: Duration,
    entries: DashMap<RegionKey, Arc<CacheEntry>>,
    in_flight: DashMap<RegionKey, Arc<Mutex<()>>>,
    upstream_calls: AtomicU64,
}

impl RegionalCache {
    pub fn new(adapter: Arc<dyn UpstreamAdapter>, quantizer: RegionQuantizer, ttl: Duration) -> Self {
        Self {
            adapter,
            quantizer,
            ttl,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            upstream_calls: AtomicU64::new(0),
        }
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key_for(&self, region: &BoundingBox) -> RegionKey {
        self.quantizer.key(region)
    }

    /// Fresh entry for `key`, if any. Never touches the network.
    pub fn peek(&self, key: &RegionKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Fresh entry for `key` whose fetched cell covers all of `region`.
    fn peek_covering(&self, key: &RegionKey, region: &BoundingBox) -> Option<Arc<CacheEntry>> {
        self.peek(key).filter(|entry| entry.cell.contains_box(region))
    }

    /// Serve the cell covering `region`, fetching it from upstream when missing, stale
    /// or too small for the viewport.
    ///
    /// Concurrent misses on the same key wait for a single fetch and share its result.
    /// A failed fetch leaves any previous entry in place.
    pub async fn get(&self, region: &BoundingBox) -> Result<CacheLookup, UpstreamError> {
        let key = self.key_for(region);
        if let Some(entry) = self.peek_covering(&key, region) {
            return Ok(CacheLookup { entry, hit: true });
        }

        let guard = self
            .in_flight
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _permit = guard.lock().await;

        // Another caller may have filled it while we waited.
        if let Some(entry) = self.peek_covering(&key, region) {
            return Ok(CacheLookup { entry, hit: true });
        }

        let cell = self.quantizer.cell_covering(&key, region);
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Cache miss for region {}, fetching cell {} from {}",
            key,
            cell,
            self.adapter.name()
        );

        let snapshot = self.adapter.fetch(&cell).await.map_err(|err| {
            tracing::warn!("Upstream fetch for region {} failed: {}", key, err);
            err
        })?;

        let entry = Arc::new(CacheEntry {
            region_key: key,
            cell,
            fetched_at: snapshot.fetched_at,
            stored_at: Instant::now(),
            records: snapshot.records,
        });
        self.entries.insert(key, Arc::clone(&entry));
        Ok(CacheLookup { entry, hit: false })
    }

    /// Evict old entries and release fetch guards nobody holds.
    pub fn prune(&self, max_entries: usize, max_age: Duration) {
        prune_aged(&self.entries, max_entries, max_age);
        self.in_flight
            .retain(|key, guard| self.entries.contains_key(key) || Arc::strong_count(guard) > 1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upstream fetches issued since startup.
    pub fn upstream_calls(&self) -> u64 {
        self.upstream_calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use heli_core::{ClassifierPolicy, FlightStatus};
    use heli_upstream::{QueryCapability, QueryShape, Snapshot};
    use std::sync::atomic::AtomicUsize;

    struct CountingAdapter {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingAdapter {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl UpstreamAdapter for CountingAdapter {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn capability(&self) -> QueryCapability {
            QueryCapability::BoundingBox
        }

        fn policy(&self) -> ClassifierPolicy {
            ClassifierPolicy::full()
        }

        fn fetch_shape(&self, shape: QueryShape) -> BoxFuture<'_, Result<Snapshot, UpstreamError>> {
            Box::pin(async move {
                let region = shape.bounding_box();
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                if self.fail {
                    return Err(UpstreamError::Transient {
                        status: Some(503),
                        detail: "unavailable".to_string(),
                    });
                }
                let (lat, lon) = region.center();
                Ok(Snapshot {
                    fetched_at: Utc::now(),
                    records: vec![FlightRecord {
                        callsign: format!("CALL{call}"),
                        aircraft_type: "EC45".to_string(),
                        latitude: lat,
                        longitude: lon,
                        altitude_feet: Some(1500),
                        ground_speed_knots: Some(110),
                        heading_degrees: Some(90),
                        status: FlightStatus::Active,
                        operator_label: None,
                        last_seen_timestamp: Utc::now(),
                        icao_address: "c0ffee".to_string(),
                        likely_rotorcraft: true,
                    }],
                })
            })
        }
    }

    fn calgary() -> BoundingBox {
        BoundingBox::new(50.70, 51.30, -114.40, -113.70).unwrap()
    }

    fn cache_with(adapter: Arc<CountingAdapter>, ttl: Duration) -> RegionalCache {
        RegionalCache::new(adapter, RegionQuantizer::new(1, 100.0), ttl)
    }

    #[tokio::test]
    async fn fresh_entry_is_served_without_upstream_call() {
        let adapter = Arc::new(CountingAdapter::new());
        let cache = cache_with(adapter.clone(), Duration::from_secs(30));

        let first = cache.get(&calgary()).await.unwrap();
        assert!(!first.hit);

        // Different extents, same center.
        let narrower = BoundingBox::new(50.90, 51.10, -114.20, -113.90).unwrap();
        let second = cache.get(&narrower).await.unwrap();
        assert!(second.hit);
        assert!(Arc::ptr_eq(&first.entry, &second.entry));
        assert_eq!(first.entry.records, second.entry.records);
        assert_eq!(adapter.calls(), 1);
        assert_eq!(cache.upstream_calls(), 1);
    }

    #[tokio::test]
    async fn fetches_the_cell_not_the_request() {
        let adapter = Arc::new(CountingAdapter::new());
        let cache = cache_with(adapter, Duration::from_secs(30));

        let lookup = cache.get(&calgary()).await.unwrap();
        assert!(lookup.entry.cell.contains_box(&calgary()));
        assert_eq!(lookup.entry.region_key, cache.key_for(&calgary()));
    }

    #[tokio::test]
    async fn wider_viewport_than_cached_cell_refetches() {
        let adapter = Arc::new(CountingAdapter::new());
        let cache = cache_with(adapter.clone(), Duration::from_secs(30));

        let narrow = BoundingBox::new(50.90, 51.10, -114.10, -113.90).unwrap();
        let wide = BoundingBox::new(49.0, 53.0, -117.0, -111.0).unwrap();
        assert_eq!(cache.key_for(&narrow), cache.key_for(&wide));

        let first = cache.get(&narrow).await.unwrap();
        assert!(!first.entry.cell.contains_box(&wide));

        let second = cache.get(&wide).await.unwrap();
        assert!(!second.hit);
        assert!(second.entry.cell.contains_box(&wide));
        assert_eq!(adapter.calls(), 2);

        // The grown cell now serves the narrow viewport too.
        let third = cache.get(&narrow).await.unwrap();
        assert!(third.hit);
        assert!(Arc::ptr_eq(&second.entry, &third.entry));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn zero_ttl_always_refetches() {
        let adapter = Arc::new(CountingAdapter::new());
        let cache = cache_with(adapter.clone(), Duration::ZERO);

        let first = cache.get(&calgary()).await.unwrap();
        let second = cache.get(&calgary()).await.unwrap();
        assert!(!second.hit);
        assert_eq!(adapter.calls(), 2);
        assert_ne!(first.entry.records[0].callsign, second.entry.records[0].callsign);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn distinct_regions_fetch_separately() {
        let adapter = Arc::new(CountingAdapter::new());
        let cache = cache_with(adapter.clone(), Duration::from_secs(30));

        cache.get(&calgary()).await.unwrap();
        let toronto = BoundingBox::new(43.50, 43.90, -79.60, -79.10).unwrap();
        cache.get(&toronto).await.unwrap();
        assert_eq!(adapter.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let adapter = Arc::new(CountingAdapter {
            delay: Duration::from_millis(50),
            ..CountingAdapter::new()
        });
        let cache = Arc::new(cache_with(adapter.clone(), Duration::from_secs(30)));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(&calgary()).await })
            })
            .collect();
        let lookups: Vec<CacheLookup> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(adapter.calls(), 1);
        assert_eq!(lookups.iter().filter(|lookup| !lookup.hit).count(), 1);
        assert!(lookups
            .iter()
            .all(|lookup| Arc::ptr_eq(&lookup.entry, &lookups[0].entry)));
    }

    #[tokio::test]
    async fn failed_fetch_stores_nothing() {
        let adapter = Arc::new(CountingAdapter {
            fail: true,
            ..CountingAdapter::new()
        });
        let cache = cache_with(adapter.clone(), Duration::from_secs(30));

        let err = cache.get(&calgary()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(cache.is_empty());

        cache.get(&calgary()).await.unwrap_err();
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn prune_drops_old_and_excess_entries() {
        let adapter = Arc::new(CountingAdapter::new());
        let cache = cache_with(adapter, Duration::from_secs(30));

        cache.get(&calgary()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let toronto = BoundingBox::new(43.50, 43.90, -79.60, -79.10).unwrap();
        cache.get(&toronto).await.unwrap();

        cache.prune(1, Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert!(cache.peek(&cache.key_for(&toronto)).is_some());
        assert_eq!(cache.in_flight.len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.prune(10, Duration::ZERO);
        assert!(cache.is_empty());
        assert!(cache.in_flight.is_empty());
    }
}
