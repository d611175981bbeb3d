//! Live sessions
//!
//! While a user is playing, their plants are owned by an [`ActiveSession`]
//! and ticked with the live weather hour on a fixed interval. The registry
//! hands ownership back to the catch-up scheduler when a session goes idle,
//! flushing the records and clearing the user's activity flag.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    actions::{self, ActionOutcome, PlantAction, PlantReadout},
    config::{CatchUpMode, SessionConfig},
    engine::StepReport,
    error::{ActionError, StoreError},
    plant::{LocationCategory, PlantRecord, Position},
    scheduler::Services,
    weather::WeatherSeries,
};

/// One user's plants while they are playing.
pub struct ActiveSession {
    user_id: String,
    plants: Vec<PlantRecord>,
    series: Option<WeatherSeries>,
    last_heartbeat: DateTime<Utc>,
}

impl ActiveSession {
    pub fn new(
        user_id: impl Into<String>,
        plants: Vec<PlantRecord>,
        series: Option<WeatherSeries>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            plants,
            series: series.filter(|s| !s.is_empty()),
            last_heartbeat: now,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn plants(&self) -> &[PlantRecord] {
        &self.plants
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = self.last_heartbeat.max(now);
    }

    pub fn is_idle(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        (now - self.last_heartbeat).num_seconds() > threshold_secs
    }

    /// Advances every plant to `now`. Each plant is sampled at the hour its
    /// own interval starts in, which keeps a session tick that straddles an
    /// hour boundary in step with an hourly catch-up. Plants whose species
    /// cannot be resolved are left alone.
    pub fn tick(&mut self, services: &Services, now: DateTime<Utc>) -> Vec<StepReport> {
        let Some(series) = self.series.as_ref() else {
            return Vec::new();
        };
        let mut reports = Vec::with_capacity(self.plants.len());
        for plant in &mut self.plants {
            let species = match services.cache.species(&plant.species) {
                Ok(species) => species,
                Err(err) => {
                    debug!(user = %self.user_id, plant = %plant.id, error = %err, "tick skipped");
                    continue;
                }
            };
            let start = plant.last_growth_update.unwrap_or(now).min(now);
            if let Some(hour) = series.hour_at(start) {
                reports.push(services.simulator.advance(plant, &species, &hour.ambient(), now));
            }
        }
        reports
    }

    fn plant_mut(&mut self, plant_id: &str) -> Result<&mut PlantRecord, ActionError> {
        let user = self.user_id.clone();
        self.plants
            .iter_mut()
            .find(|p| p.id == plant_id)
            .ok_or_else(|| ActionError::NoSuchPlant {
                user,
                plant: plant_id.to_string(),
            })
    }
}

/// Owns every open session.
pub struct SessionRegistry {
    services: Services,
    config: SessionConfig,
    idle_threshold_secs: i64,
    batch_size: usize,
    sessions: Mutex<HashMap<String, ActiveSession>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(
        services: Services,
        config: SessionConfig,
        idle_threshold_secs: i64,
        batch_size: usize,
    ) -> Self {
        Self {
            services,
            config,
            idle_threshold_secs,
            batch_size: batch_size.max(1),
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self, user: &str) -> bool {
        self.lock().contains_key(user)
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().len()
    }

    /// Marks the user active and makes sure a session is open for them.
    /// Returns the number of plants the session holds.
    ///
    /// Loading and catching up a new session happens outside the registry
    /// lock. If another heartbeat opened the same user meanwhile, its session
    /// wins and the freshly loaded one is dropped.
    pub fn heartbeat(&self, user: &str, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.services.users.mark_active(user, now)?;
        if let Some(session) = self.lock().get_mut(user) {
            session.touch(now);
            return Ok(session.plants.len());
        }
        let opened = self.open(user, now)?;
        let mut sessions = self.lock();
        let session = sessions.entry(user.to_string()).or_insert(opened);
        session.touch(now);
        Ok(session.plants.len())
    }

    /// Loads the user's records and catches them up to `now`, so the session
    /// starts from where the scheduler left off.
    fn open(&self, user: &str, now: DateTime<Utc>) -> Result<ActiveSession, StoreError> {
        let mut plants = self.services.plants.plants_for_user(user)?;
        let offset = self
            .services
            .users
            .user(user)?
            .map(|u| u.utc_offset_minutes)
            .unwrap_or(0);
        let series = self.services.weather.series_for_user(user)?.map(|mut s| {
            s.utc_offset_minutes = offset;
            s
        });
        if series.as_ref().map_or(true, WeatherSeries::is_empty) {
            warn!(user, "no cached weather; session plants will not advance");
        }

        let mut session = ActiveSession::new(user, Vec::new(), series, now);
        if let Some(series) = session.series.as_ref() {
            for plant in &mut plants {
                if let Ok(species) = self.services.cache.species(&plant.species) {
                    self.services.simulator.catch_up(
                        plant,
                        &species,
                        series,
                        now,
                        CatchUpMode::SingleSample,
                    );
                }
            }
        }
        session.plants = plants;
        info!(user, plants = session.plants.len(), "session opened");
        Ok(session)
    }

    pub fn perform(
        &self,
        user: &str,
        plant_id: &str,
        action: &PlantAction,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        self.heartbeat(user, now)?;
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(user)
            .ok_or_else(|| ActionError::NoSuchPlant {
                user: user.to_string(),
                plant: plant_id.to_string(),
            })?;
        let plant = session.plant_mut(plant_id)?;
        let outcome = actions::perform(
            plant,
            action,
            &self.services.cache,
            self.services.simulator.tuning(),
            now,
        )?;
        self.services
            .plants
            .upsert_batch(user, std::slice::from_ref(&*plant))?;
        debug!(user, plant = plant_id, ?outcome, "action applied");
        Ok(outcome)
    }

    /// Plants a new seed for `user`.
    pub fn plant(
        &self,
        user: &str,
        species_name: &str,
        location: LocationCategory,
        position: Position,
        now: DateTime<Utc>,
    ) -> Result<PlantRecord, ActionError> {
        let species = self.services.cache.species(species_name)?;
        self.heartbeat(user, now)?;
        let id = format!(
            "{}-{}",
            now.timestamp_millis(),
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );
        let record = actions::plant_created(id, user, &species, location, position, now);
        self.services
            .plants
            .upsert_batch(user, std::slice::from_ref(&record))?;
        if let Some(session) = self.lock().get_mut(user) {
            session.plants.push(record.clone());
        }
        Ok(record)
    }

    pub fn remove(&self, user: &str, plant_id: &str, now: DateTime<Utc>) -> Result<bool, ActionError> {
        self.heartbeat(user, now)?;
        if let Some(session) = self.lock().get_mut(user) {
            session.plants.retain(|p| p.id != plant_id);
        }
        let removed = self.services.plants.remove_plant(user, plant_id)?;
        if removed {
            info!(user, plant = plant_id, "plant removed");
        }
        Ok(removed)
    }

    /// Display readouts, from the open session when there is one.
    pub fn readouts(&self, user: &str) -> Result<Vec<PlantReadout>, StoreError> {
        let plants = match self.lock().get(user) {
            Some(session) => session.plants.clone(),
            None => self.services.plants.plants_for_user(user)?,
        };
        Ok(plants
            .iter()
            .map(|plant| {
                let species = self.services.cache.species(&plant.species).ok();
                actions::readout(plant, species.as_deref())
            })
            .collect())
    }

    /// Ticks every open session. Returns how many plants advanced.
    pub fn tick_all(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        sessions
            .values_mut()
            .map(|session| session.tick(&self.services, now).len())
            .sum()
    }

    /// Flushes and closes sessions that have gone quiet. Returns the users
    /// whose sessions were closed.
    pub fn close_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let idle: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, s)| s.is_idle(now, self.idle_threshold_secs))
            .map(|(user, _)| user.clone())
            .collect();
        idle.into_iter()
            .filter(|user| match self.close(user) {
                Ok(closed) => closed,
                Err(err) => {
                    error!(user = %user, error = %err, "failed to close session");
                    false
                }
            })
            .collect()
    }

    /// Writes the session's records back and clears the activity flag.
    /// Returns false when no session was open.
    pub fn close(&self, user: &str) -> Result<bool, StoreError> {
        let Some(session) = self.lock().remove(user) else {
            return Ok(false);
        };
        for chunk in session.plants.chunks(self.batch_size) {
            if let Err(err) = self.services.plants.upsert_batch(user, chunk) {
                // the scheduler recomputes from the stored timestamps
                error!(user, batch = chunk.len(), error = %err, "session flush failed");
            }
        }
        self.services.users.mark_inactive(user)?;
        info!(user, "session closed");
        Ok(true)
    }

    pub fn close_all(&self) {
        let users: Vec<String> = self.lock().keys().cloned().collect();
        for user in users {
            if let Err(err) = self.close(&user) {
                error!(user = %user, error = %err, "failed to close session");
            }
        }
    }

    /// Ticks sessions and reaps idle ones until `shutdown` resolves, then
    /// closes everything that is still open.
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let registry = self.clone();
                    tokio::task::spawn_blocking(move || {
                        let now = Utc::now();
                        let advanced = registry.tick_all(now);
                        let closed = registry.close_idle(now);
                        debug!(
                            sessions = registry.open_sessions(),
                            advanced,
                            closed = closed.len(),
                            "sessions ticked"
                        );
                    })
                    .await
                    .context("session tick task failed")?;
                }
            }
        }
        let registry = self.clone();
        tokio::task::spawn_blocking(move || registry.close_all())
            .await
            .context("session shutdown task failed")?;
        Ok(())
    }
}
