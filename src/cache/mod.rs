//! # Cache Module
//!
//! In-memory memoization of resolved tracks.
//!
//! Resolving a query spawns an external extractor or calls a remote API and
//! can take seconds, so successful results are kept for a while keyed by the
//! normalized query text. Failures are never cached.
//!
//! ## Configuration
//!
//! ```env
//! RESOLVE_CACHE_TTL=1h        # Time-to-live of a resolved track
//! ```

pub mod ttl_cache;

use tracing::info;

use crate::sources::Track;
use ttl_cache::TtlCache;

/// Máximo de consultas memorizadas a la vez.
pub const RESOLVE_CACHE_CAPACITY: usize = 1000;

/// Cache de resoluciones: consulta normalizada → track.
pub type ResolveCache = TtlCache<String, Track>;

impl ResolveCache {
    /// Mantenimiento periódico; se llama desde una tarea de fondo.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            let metrics = self.metrics();
            info!(
                "🧹 Cache: {} entradas expiradas eliminadas (hit rate {:.0}%)",
                removed,
                metrics.hit_rate() * 100.0
            );
        }
    }
}
