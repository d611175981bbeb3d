//! Catch-up scheduler
//!
//! On a fixed interval, finds every user who is not in an active session,
//! replays elapsed time for each of their plants against the user's cached
//! weather series, and writes the results back in bounded sub-batches. Users
//! are processed concurrently on blocking worker tasks, bounded by a
//! semaphore; a user's plants are processed sequentially.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, Semaphore},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{
    cache::ReferenceCache,
    config::SchedulerConfig,
    engine::Simulator,
    plant::PlantRecord,
    store::{PlantStore, UserActivity, UserDirectory, WeatherStore},
};

/// Summary of one catch-up pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: Option<DateTime<Utc>>,
    pub users_considered: usize,
    pub users_processed: usize,
    pub users_flipped_inactive: usize,
    pub plants_updated: usize,
    pub plants_skipped: usize,
    pub failed_batches: usize,
    pub duration_ms: f64,
}

/// Stores and shared services used by both the scheduler and live sessions.
#[derive(Clone)]
pub struct Services {
    pub plants: Arc<dyn PlantStore>,
    pub users: Arc<dyn UserDirectory>,
    pub weather: Arc<dyn WeatherStore>,
    pub cache: Arc<ReferenceCache>,
    pub simulator: Arc<Simulator>,
}

#[derive(Debug, Default)]
struct UserOutcome {
    plants_updated: usize,
    plants_skipped: usize,
    failed_batches: usize,
}

pub struct CatchUpScheduler {
    deps: Services,
    config: SchedulerConfig,
    history: Mutex<VecDeque<PassReport>>,
    reports: broadcast::Sender<PassReport>,
}

impl CatchUpScheduler {
    pub fn new(deps: Services, config: SchedulerConfig) -> Self {
        let (reports, _) = broadcast::channel(64);
        Self {
            deps,
            config,
            history: Mutex::new(VecDeque::new()),
            reports,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PassReport> {
        self.reports.subscribe()
    }

    pub fn recent_reports(&self) -> Vec<PassReport> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn latest_report(&self) -> Option<PassReport> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Runs until `shutdown` resolves. A failed pass is logged and the next
    /// one runs on schedule.
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(interval_secs = self.config.interval_secs, "catch-up scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.run_pass(Utc::now()).await {
                        error!(error = %format!("{err:#}"), "catch-up pass failed");
                    }
                }
            }
        }
        info!("catch-up scheduler stopped");
    }

    /// One pass over every user, evaluated at `now`.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let started = Instant::now();
        let directory = self.deps.users.clone();
        let users = tokio::task::spawn_blocking(move || directory.users())
            .await
            .context("user listing task failed")?
            .context("Failed to list users")?;

        let mut report = PassReport {
            started_at: Some(now),
            users_considered: users.len(),
            ..PassReport::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_users.max(1)));
        let mut tasks = JoinSet::new();
        for user in users {
            if user.is_playing {
                if !user.is_idle(now, self.config.idle_threshold_secs) {
                    debug!(user = %user.user_id, "user in active session; skipped");
                    continue;
                }
                if let Err(err) = self.deps.users.mark_inactive(&user.user_id) {
                    warn!(user = %user.user_id, error = %err, "failed to flip idle user");
                    continue;
                }
                info!(user = %user.user_id, "idle user flipped to inactive");
                report.users_flipped_inactive += 1;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            let deps = self.deps.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let user_id = user.user_id.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || process_user(&deps, &config, &user, now))
                        .await;
                (user_id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    report.users_processed += 1;
                    report.plants_updated += outcome.plants_updated;
                    report.plants_skipped += outcome.plants_skipped;
                    report.failed_batches += outcome.failed_batches;
                }
                Ok((user, Err(err))) => {
                    error!(user = %user, error = %err, "user catch-up task panicked");
                }
                Err(err) => error!(error = %err, "user catch-up task failed"),
            }
        }

        report.duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
        info!(
            users = report.users_considered,
            processed = report.users_processed,
            flipped = report.users_flipped_inactive,
            updated = report.plants_updated,
            skipped = report.plants_skipped,
            failed_batches = report.failed_batches,
            duration_ms = report.duration_ms,
            "catch-up pass finished"
        );
        self.record(report.clone());
        Ok(report)
    }

    fn record(&self, report: PassReport) {
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push_back(report.clone());
            while history.len() > self.config.stats_history.max(1) {
                history.pop_front();
            }
        }
        // no subscribers is fine
        let _ = self.reports.send(report);
    }
}

fn process_user(
    deps: &Services,
    config: &SchedulerConfig,
    user: &UserActivity,
    now: DateTime<Utc>,
) -> UserOutcome {
    let mut outcome = UserOutcome::default();
    let user_id = user.user_id.as_str();

    let plants = match deps.plants.plants_for_user(user_id) {
        Ok(plants) => plants,
        Err(err) => {
            error!(user = user_id, error = %err, "failed to load plants");
            return outcome;
        }
    };
    if plants.is_empty() {
        return outcome;
    }

    let series = match deps.weather.series_for_user(user_id) {
        Ok(Some(mut series)) if !series.is_empty() => {
            series.utc_offset_minutes = user.utc_offset_minutes;
            series
        }
        Ok(_) => {
            warn!(user = user_id, plants = plants.len(), "no cached weather; plants skipped");
            outcome.plants_skipped = plants.len();
            return outcome;
        }
        Err(err) => {
            error!(user = user_id, error = %err, "failed to load weather");
            outcome.plants_skipped = plants.len();
            return outcome;
        }
    };

    let mut updated: Vec<PlantRecord> = Vec::with_capacity(plants.len());
    for mut plant in plants {
        let species = match deps.cache.species(&plant.species) {
            Ok(species) => species,
            Err(err) => {
                warn!(user = user_id, plant = %plant.id, error = %err, "plant skipped");
                outcome.plants_skipped += 1;
                continue;
            }
        };
        match deps
            .simulator
            .catch_up(&mut plant, &species, &series, now, config.mode)
        {
            Some(step) => {
                if step.first_observation {
                    info!(user = user_id, plant = %plant.id, "first observation; timestamp initialised");
                }
                updated.push(plant);
            }
            None => outcome.plants_skipped += 1,
        }
    }

    for chunk in updated.chunks(config.batch_size.max(1)) {
        if reclaimed_by_session(deps, user_id) {
            debug!(user = user_id, "user became active mid-pass; remaining writes dropped");
            break;
        }
        match deps.plants.upsert_batch(user_id, chunk) {
            Ok(()) => outcome.plants_updated += chunk.len(),
            Err(err) => {
                error!(
                    user = user_id,
                    batch = chunk.len(),
                    error = %err,
                    "plant batch write failed; retried next pass"
                );
                outcome.failed_batches += 1;
            }
        }
    }
    outcome
}

/// A session that opened after the pass started owns the records now.
fn reclaimed_by_session(deps: &Services, user_id: &str) -> bool {
    matches!(deps.users.user(user_id), Ok(Some(activity)) if activity.is_playing)
}
