//! Engine-owned cache of EMC lookup tables, keyed by commodity type.
//!
//! Entries expire after a TTL; callers that edit a table should also call
//! [`LookupTableCache::invalidate`]. Misses are never cached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use cellwatch_core::LookupTableData;

struct CachedTable {
    table: Arc<LookupTableData>,
    loaded_at: Instant,
}

pub struct LookupTableCache {
    /// `None` keeps entries until invalidated.
    ttl: Option<Duration>,
    entries: RwLock<HashMap<String, CachedTable>>,
}

impl LookupTableCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Build from a TTL in seconds, where 0 disables expiry.
    pub fn with_ttl_secs(secs: u64) -> Self {
        Self::new((secs > 0).then(|| Duration::from_secs(secs)))
    }

    pub fn get(&self, commodity_type_id: &str) -> Option<Arc<LookupTableData>> {
        self.get_at(commodity_type_id, Instant::now())
    }

    fn get_at(&self, commodity_type_id: &str, now: Instant) -> Option<Arc<LookupTableData>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let cached = entries.get(commodity_type_id)?;
        if let Some(ttl) = self.ttl {
            if now.saturating_duration_since(cached.loaded_at) >= ttl {
                return None;
            }
        }
        Some(cached.table.clone())
    }

    pub fn insert(&self, commodity_type_id: &str, table: LookupTableData) -> Arc<LookupTableData> {
        self.insert_at(commodity_type_id, table, Instant::now())
    }

    fn insert_at(
        &self,
        commodity_type_id: &str,
        table: LookupTableData,
        now: Instant,
    ) -> Arc<LookupTableData> {
        let table = Arc::new(table);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            commodity_type_id.to_string(),
            CachedTable {
                table: table.clone(),
                loaded_at: now,
            },
        );
        table
    }

    /// Drop one commodity type's table, e.g. after it was edited.
    pub fn invalidate(&self, commodity_type_id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(commodity_type_id).is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(v: f64) -> LookupTableData {
        LookupTableData {
            temp_ranges: vec![0.0],
            humidity_ranges: vec![0.0],
            values: vec![vec![v]],
        }
    }

    #[test]
    fn insert_then_get() {
        let cache = LookupTableCache::with_ttl_secs(0);
        assert!(cache.get("wheat").is_none());
        cache.insert("wheat", table(12.0));
        assert_eq!(cache.get("wheat").unwrap().values[0][0], 12.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = LookupTableCache::new(Some(Duration::from_secs(60)));
        let start = Instant::now();
        cache.insert_at("wheat", table(12.0), start);
        assert!(cache.get_at("wheat", start + Duration::from_secs(59)).is_some());
        assert!(cache.get_at("wheat", start + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = LookupTableCache::with_ttl_secs(300);
        cache.insert("wheat", table(1.0));
        cache.insert("corn", table(2.0));
        assert!(cache.invalidate("wheat"));
        assert!(!cache.invalidate("wheat"));
        assert!(cache.get("wheat").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
