//! Process-wide cache of species and fertilizer reference records.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{
    error::ReferenceError,
    species::{FertilizerType, SpeciesProfile},
    store::ReferenceSource,
};

struct Entry<T> {
    value: Arc<T>,
    loaded_at: Instant,
}

struct Table<K, T> {
    entries: RwLock<HashMap<K, Entry<T>>>,
}

impl<K: Eq + Hash + Clone, T> Table<K, T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn fresh(&self, key: &K, ttl: Duration) -> Option<Arc<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.loaded_at.elapsed() < ttl)
            .map(|entry| entry.value.clone())
    }

    fn stale(&self, key: &K) -> Option<Arc<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(|entry| entry.value.clone())
    }

    fn store(&self, key: K, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            Entry {
                value: value.clone(),
                loaded_at: Instant::now(),
            },
        );
        value
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Loads reference records on first use and reloads them once they are older
/// than the refresh period. When a reload fails the previous copy is served.
pub struct ReferenceCache {
    source: Arc<dyn ReferenceSource>,
    ttl: Duration,
    species: Table<String, SpeciesProfile>,
    fertilizers: Table<String, FertilizerType>,
}

impl ReferenceCache {
    pub fn new(source: Arc<dyn ReferenceSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            species: Table::new(),
            fertilizers: Table::new(),
        }
    }

    pub fn species(&self, name: &str) -> Result<Arc<SpeciesProfile>, ReferenceError> {
        let key = name.to_string();
        if let Some(hit) = self.species.fresh(&key, self.ttl) {
            return Ok(hit);
        }
        match self.source.load_species(name) {
            Ok(profile) => {
                debug!(species = name, "species profile loaded");
                Ok(self.species.store(key, profile))
            }
            Err(err) => match self.species.stale(&key) {
                Some(stale) => {
                    warn!(species = name, error = %err, "species reload failed; keeping cached copy");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    pub fn fertilizer(&self, name: &str) -> Result<Arc<FertilizerType>, ReferenceError> {
        let key = name.to_string();
        if let Some(hit) = self.fertilizers.fresh(&key, self.ttl) {
            return Ok(hit);
        }
        match self.source.load_fertilizer(name) {
            Ok(fertilizer) => Ok(self.fertilizers.store(key, fertilizer)),
            Err(err) => match self.fertilizers.stale(&key) {
                Some(stale) => {
                    warn!(fertilizer = name, error = %err, "fertilizer reload failed; keeping cached copy");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    pub fn cached_species(&self) -> usize {
        self.species.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::{fixtures, ReferenceCatalog};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingSource {
        catalog: ReferenceCatalog,
        loads: AtomicUsize,
        broken: AtomicBool,
    }

    impl ReferenceSource for CountingSource {
        fn load_species(&self, name: &str) -> Result<SpeciesProfile, ReferenceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(ReferenceError::Source("offline".into()));
            }
            self.catalog.load_species(name)
        }

        fn load_fertilizer(&self, name: &str) -> Result<FertilizerType, ReferenceError> {
            self.catalog.load_fertilizer(name)
        }
    }

    fn source() -> Arc<CountingSource> {
        Arc::new(CountingSource {
            catalog: ReferenceCatalog {
                species: vec![fixtures::fern()],
                fertilizers: vec![fixtures::nitrogen_feed()],
            },
            loads: AtomicUsize::new(0),
            broken: AtomicBool::new(false),
        })
    }

    #[test]
    fn loads_once_within_ttl() {
        let src = source();
        let cache = ReferenceCache::new(src.clone(), Duration::from_secs(60));
        cache.species("fern").unwrap();
        cache.species("fern").unwrap();
        assert_eq!(src.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_species(), 1);
    }

    #[test]
    fn expired_entry_survives_failed_reload() {
        let src = source();
        let cache = ReferenceCache::new(src.clone(), Duration::ZERO);
        cache.species("fern").unwrap();
        src.broken.store(true, Ordering::SeqCst);
        let stale = cache.species("fern").unwrap();
        assert_eq!(stale.name, "fern");
        assert_eq!(src.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_names_are_errors() {
        let cache = ReferenceCache::new(source(), Duration::from_secs(60));
        assert!(matches!(
            cache.species("orchid"),
            Err(ReferenceError::UnknownSpecies(_))
        ));
        assert!(matches!(
            cache.fertilizer("mystery"),
            Err(ReferenceError::UnknownFertilizer(_))
        ));
        assert!(cache.fertilizer("green_grow").is_ok());
    }
}
