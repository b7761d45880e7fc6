use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

/// Entrada con fecha de creación
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Cache concurrente con TTL fijo y capacidad máxima.
///
/// Al llenarse se descarta la entrada más antigua. Clonar comparte los datos.
#[derive(Debug)]
pub struct TtlCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    capacity: usize,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            ttl,
            capacity: capacity.max(1),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_oldest();
        }
        self.data
            .insert(key, CacheEntry::new(value))
            .map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let value = match self.data.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.value.clone()),
            Some(entry) => {
                drop(entry);
                self.data.remove(key);
                None
            }
            None => None,
        };

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }
        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
        }
    }
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            ttl: self.ttl,
            capacity: self.capacity,
            hits: self.hits.clone(),
            misses: self.misses.clone(),
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = TtlCache::new(10, Duration::from_secs(60));
        assert_eq!(cache.insert("a".to_string(), 1), None);
        assert_eq!(cache.insert("a".to_string(), 2), Some(1));

        assert_eq!(cache.get(&"a".to_string()), Some(2));
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.metrics(), CacheMetrics { hits: 1, misses: 1 });
        assert_eq!(cache.metrics().hit_rate(), 0.5);
    }

    #[test]
    fn test_expired_entries_are_misses() {
        let cache = TtlCache::new(10, Duration::ZERO);
        cache.insert(1u32, "x");

        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = TtlCache::new(10, Duration::ZERO);
        cache.insert(1u32, "x");
        cache.insert(2u32, "y");

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1u32, "a");
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(2u32, "b");
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(3u32, "c");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&3), Some("c"));

        // Reemplazar una clave existente no desaloja nada
        cache.insert(3u32, "c2");
        assert_eq!(cache.get(&2), Some("b"));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = TtlCache::new(10, Duration::from_secs(60));
        let other = cache.clone();
        cache.insert("k", 7);
        assert_eq!(other.get(&"k"), Some(7));
    }
}
