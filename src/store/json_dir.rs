use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    error::StoreError,
    plant::PlantRecord,
    store::{PlantPatch, PlantStore, UserActivity, UserDirectory, WeatherStore},
    weather::WeatherSeries,
};

/// One JSON document per user and collection under a data directory:
///
/// ```text
/// data/
///   users.json
///   plants/<user>.json
///   weather/<user>.json
/// ```
///
/// Writes go to a sibling temp file and are renamed into place.
pub struct JsonDirStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDirStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("plants"))?;
        fs::create_dir_all(root.join("weather"))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn plants_path(&self, user: &str) -> PathBuf {
        self.root
            .join("plants")
            .join(format!("{}.json", file_key(user)))
    }

    fn weather_path(&self, user: &str) -> PathBuf {
        self.root
            .join("weather")
            .join(format!("{}.json", file_key(user)))
    }

    fn users_path(&self) -> PathBuf {
        self.root.join("users.json")
    }

    fn read_plants(&self, user: &str) -> Result<BTreeMap<String, PlantRecord>, StoreError> {
        let records: Vec<PlantRecord> = read_json(&self.plants_path(user))?.unwrap_or_default();
        Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
    }

    fn write_plants(
        &self,
        user: &str,
        plants: &BTreeMap<String, PlantRecord>,
    ) -> Result<(), StoreError> {
        let records: Vec<&PlantRecord> = plants.values().collect();
        write_json(&self.plants_path(user), &records)
    }

    fn read_users(&self) -> Result<BTreeMap<String, UserActivity>, StoreError> {
        let users: Vec<UserActivity> = read_json(&self.users_path())?.unwrap_or_default();
        Ok(users.into_iter().map(|u| (u.user_id.clone(), u)).collect())
    }
}

impl PlantStore for JsonDirStore {
    fn plants_for_user(&self, user: &str) -> Result<Vec<PlantRecord>, StoreError> {
        Ok(self.read_plants(user)?.into_values().collect())
    }

    fn upsert_batch(&self, user: &str, records: &[PlantRecord]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut plants = self.read_plants(user)?;
        for record in records {
            plants.insert(record.id.clone(), record.clone());
        }
        self.write_plants(user, &plants)?;
        debug!(user, count = records.len(), "plant batch written");
        Ok(())
    }

    fn update_plant(
        &self,
        user: &str,
        plant_id: &str,
        patch: &PlantPatch,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut plants = self.read_plants(user)?;
        let plant = plants
            .get_mut(plant_id)
            .ok_or_else(|| StoreError::NotFound(format!("plant {plant_id} of {user}")))?;
        patch.apply(plant);
        self.write_plants(user, &plants)
    }

    fn remove_plant(&self, user: &str, plant_id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut plants = self.read_plants(user)?;
        if plants.remove(plant_id).is_none() {
            return Ok(false);
        }
        self.write_plants(user, &plants)?;
        Ok(true)
    }
}

impl UserDirectory for JsonDirStore {
    fn users(&self) -> Result<Vec<UserActivity>, StoreError> {
        Ok(self.read_users()?.into_values().collect())
    }

    fn user(&self, user: &str) -> Result<Option<UserActivity>, StoreError> {
        Ok(self.read_users()?.remove(user))
    }

    fn upsert_user(&self, activity: UserActivity) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut users = self.read_users()?;
        users.insert(activity.user_id.clone(), activity);
        let list: Vec<&UserActivity> = users.values().collect();
        write_json(&self.users_path(), &list)
    }
}

impl WeatherStore for JsonDirStore {
    fn series_for_user(&self, user: &str) -> Result<Option<WeatherSeries>, StoreError> {
        read_json(&self.weather_path(user))
    }

    fn put_series(&self, user: &str, series: WeatherSeries) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        write_json(&self.weather_path(user), &series)
    }
}

/// File name for a user id. ASCII letters, digits and `-` pass through;
/// every other byte, `_` included, becomes `_` plus two hex digits, so
/// distinct ids never share a file.
fn file_key(user: &str) -> String {
    let mut key = String::with_capacity(user.len());
    for byte in user.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            key.push(char::from(byte));
        } else {
            let _ = write!(key, "_{byte:02x}");
        }
    }
    key
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let payload = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
