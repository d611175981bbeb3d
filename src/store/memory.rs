use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use crate::{
    error::StoreError,
    plant::PlantRecord,
    store::{PlantPatch, PlantStore, UserActivity, UserDirectory, WeatherStore},
    weather::WeatherSeries,
};

#[derive(Default)]
struct Inner {
    plants: HashMap<String, BTreeMap<String, PlantRecord>>,
    users: BTreeMap<String, UserActivity>,
    weather: HashMap<String, WeatherSeries>,
    rejected_plants: HashSet<String>,
}

/// In-process store. Can be told to reject any batch containing a given
/// plant id, which is how the partial-failure paths get exercised.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    upsert_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_plant(&self, record: PlantRecord) {
        self.lock()
            .plants
            .entry(record.owner.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }

    pub fn reject_upserts_for(&self, plant_id: impl Into<String>) {
        self.lock().rejected_plants.insert(plant_id.into());
    }

    pub fn accept_all_upserts(&self) {
        self.lock().rejected_plants.clear();
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn plant(&self, user: &str, plant_id: &str) -> Option<PlantRecord> {
        self.lock()
            .plants
            .get(user)
            .and_then(|plants| plants.get(plant_id))
            .cloned()
    }
}

impl PlantStore for MemoryStore {
    fn plants_for_user(&self, user: &str) -> Result<Vec<PlantRecord>, StoreError> {
        Ok(self
            .lock()
            .plants
            .get(user)
            .map(|plants| plants.values().cloned().collect())
            .unwrap_or_default())
    }

    fn upsert_batch(&self, user: &str, records: &[PlantRecord]) -> Result<(), StoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if let Some(bad) = records
            .iter()
            .find(|r| inner.rejected_plants.contains(&r.id))
        {
            return Err(StoreError::Rejected(format!("plant {}", bad.id)));
        }
        let plants = inner.plants.entry(user.to_string()).or_default();
        for record in records {
            plants.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn update_plant(
        &self,
        user: &str,
        plant_id: &str,
        patch: &PlantPatch,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let plant = inner
            .plants
            .get_mut(user)
            .and_then(|plants| plants.get_mut(plant_id))
            .ok_or_else(|| StoreError::NotFound(format!("plant {plant_id} of {user}")))?;
        patch.apply(plant);
        Ok(())
    }

    fn remove_plant(&self, user: &str, plant_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .plants
            .get_mut(user)
            .map(|plants| plants.remove(plant_id).is_some())
            .unwrap_or(false))
    }
}

impl UserDirectory for MemoryStore {
    fn users(&self) -> Result<Vec<UserActivity>, StoreError> {
        Ok(self.lock().users.values().cloned().collect())
    }

    fn user(&self, user: &str) -> Result<Option<UserActivity>, StoreError> {
        Ok(self.lock().users.get(user).cloned())
    }

    fn upsert_user(&self, activity: UserActivity) -> Result<(), StoreError> {
        self.lock()
            .users
            .insert(activity.user_id.clone(), activity);
        Ok(())
    }
}

impl WeatherStore for MemoryStore {
    fn series_for_user(&self, user: &str) -> Result<Option<WeatherSeries>, StoreError> {
        Ok(self.lock().weather.get(user).cloned())
    }

    fn put_series(&self, user: &str, series: WeatherSeries) -> Result<(), StoreError> {
        self.lock().weather.insert(user.to_string(), series);
        Ok(())
    }
}
