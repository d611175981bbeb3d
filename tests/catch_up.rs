use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use verdance::{
    actions,
    cache::ReferenceCache,
    config::SchedulerConfig,
    engine::Simulator,
    plant::{LocationCategory, PlantRecord, Position},
    rng::FixedRoll,
    scheduler::{CatchUpScheduler, Services},
    species::CatalogFile,
    store::{MemoryStore, PlantStore, UserActivity, UserDirectory, WeatherStore},
    weather::{WeatherHour, WeatherSeries},
    ModelTuning,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap()
}

fn series() -> WeatherSeries {
    let day = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
    let hours = (0..48)
        .map(|h| WeatherHour {
            time: day.and_hms_opt(0, 0, 0).unwrap() + Duration::hours(h),
            temperature: 22.0,
            humidity: 60.0,
            precipitation: 0.0,
            weather_code: 1,
            direct_radiation: 300.0,
            diffuse_radiation: 100.0,
        })
        .collect();
    WeatherSeries::new(0, hours)
}

fn services(store: Arc<MemoryStore>) -> Services {
    let cache = ReferenceCache::new(
        Arc::new(CatalogFile::new(
            env!("CARGO_MANIFEST_DIR"),
            "catalog/species.yaml",
        )),
        StdDuration::from_secs(300),
    );
    Services {
        plants: store.clone(),
        users: store.clone(),
        weather: store,
        cache: Arc::new(cache),
        simulator: Arc::new(Simulator::standard(
            ModelTuning::default(),
            Arc::new(FixedRoll(1.0)),
        )),
    }
}

fn seed_user(store: &MemoryStore, user: &str, playing: bool, last_active: DateTime<Utc>) {
    store
        .upsert_user(UserActivity {
            user_id: user.to_string(),
            is_playing: playing,
            last_active: Some(last_active),
            utc_offset_minutes: 0,
        })
        .unwrap();
    store.put_series(user, series()).unwrap();
}

fn plant(id: &str, user: &str, species: &str) -> PlantRecord {
    PlantRecord::new(
        id,
        user,
        species,
        LocationCategory::Ground,
        Position::default(),
        0.1,
        start(),
    )
}

#[tokio::test]
async fn offline_plants_are_caught_up_and_active_users_left_alone() {
    let store = Arc::new(MemoryStore::new());
    let now = start() + Duration::hours(6);
    seed_user(&store, "offline", false, start());
    seed_user(&store, "playing", true, now - Duration::seconds(30));
    store.insert_plant(plant("a", "offline", "tomato"));
    store.insert_plant(plant("b", "playing", "tomato"));

    let scheduler = CatchUpScheduler::new(services(store.clone()), SchedulerConfig::default());
    let report = scheduler.run_pass(now).await.unwrap();

    assert_eq!(report.users_considered, 2);
    assert_eq!(report.users_processed, 1);
    assert_eq!(report.plants_updated, 1);
    let caught_up = store.plant("offline", "a").unwrap();
    assert_eq!(caught_up.last_growth_update, Some(now));
    assert!(caught_up.scale > 0.1);
    let untouched = store.plant("playing", "b").unwrap();
    assert_eq!(untouched.last_growth_update, Some(start()));
}

#[tokio::test]
async fn idle_players_are_flipped_and_processed() {
    let store = Arc::new(MemoryStore::new());
    let now = start() + Duration::hours(2);
    seed_user(&store, "sleepy", true, now - Duration::minutes(10));
    store.insert_plant(plant("a", "sleepy", "fern"));

    let scheduler = CatchUpScheduler::new(services(store.clone()), SchedulerConfig::default());
    let report = scheduler.run_pass(now).await.unwrap();

    assert_eq!(report.users_flipped_inactive, 1);
    assert_eq!(report.plants_updated, 1);
    assert!(!store.user("sleepy").unwrap().unwrap().is_playing);
}

#[tokio::test]
async fn missing_reference_data_skips_only_that_plant() {
    let store = Arc::new(MemoryStore::new());
    let now = start() + Duration::hours(3);
    seed_user(&store, "u1", false, start());
    store.insert_plant(plant("good", "u1", "basil"));
    store.insert_plant(plant("odd", "u1", "moonflower"));

    let scheduler = CatchUpScheduler::new(services(store.clone()), SchedulerConfig::default());
    let report = scheduler.run_pass(now).await.unwrap();

    assert_eq!(report.plants_updated, 1);
    assert_eq!(report.plants_skipped, 1);
    assert_eq!(
        store.plant("u1", "odd").unwrap().last_growth_update,
        Some(start())
    );
}

#[tokio::test]
async fn users_without_weather_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_user(UserActivity::new("nowhere", 0))
        .unwrap();
    store.insert_plant(plant("a", "nowhere", "cactus"));

    let scheduler = CatchUpScheduler::new(services(store.clone()), SchedulerConfig::default());
    let report = scheduler
        .run_pass(start() + Duration::hours(4))
        .await
        .unwrap();
    assert_eq!(report.plants_updated, 0);
    assert_eq!(report.plants_skipped, 1);
}

#[tokio::test]
async fn failed_sub_batch_does_not_block_the_rest() {
    let store = Arc::new(MemoryStore::new());
    let now = start() + Duration::hours(5);
    seed_user(&store, "u1", false, start());
    for id in ["p1", "p2", "p3", "p4"] {
        store.insert_plant(plant(id, "u1", "tomato"));
    }
    store.reject_upserts_for("p3");

    let config = SchedulerConfig {
        batch_size: 2,
        ..SchedulerConfig::default()
    };
    let scheduler = CatchUpScheduler::new(services(store.clone()), config);
    let report = scheduler.run_pass(now).await.unwrap();

    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.plants_updated, 2);
    assert_eq!(store.plant("u1", "p1").unwrap().last_growth_update, Some(now));
    assert_eq!(
        store.plant("u1", "p3").unwrap().last_growth_update,
        Some(start())
    );

    // the next pass re-derives the failed records from their stored timestamps
    store.accept_all_upserts();
    let later = now + Duration::hours(1);
    let retry = scheduler.run_pass(later).await.unwrap();
    assert_eq!(retry.failed_batches, 0);
    let p1 = store.plant("u1", "p1").unwrap();
    let p3 = store.plant("u1", "p3").unwrap();
    assert_eq!(p3.last_growth_update, Some(later));
    assert!((p1.scale - p3.scale).abs() < 1e-9);
    assert!((p1.moisture - p3.moisture).abs() < 1e-9);
}

#[tokio::test]
async fn first_observation_only_stamps_the_record() {
    let store = Arc::new(MemoryStore::new());
    let now = start() + Duration::hours(12);
    seed_user(&store, "u1", false, start());
    let mut fresh = plant("p1", "u1", "fern");
    fresh.last_growth_update = None;
    fresh.last_disease_check = None;
    store.insert_plant(fresh);

    let scheduler = CatchUpScheduler::new(services(store.clone()), SchedulerConfig::default());
    scheduler.run_pass(now).await.unwrap();

    let stored = store.plant("u1", "p1").unwrap();
    assert_eq!(stored.last_growth_update, Some(now));
    assert_eq!(stored.last_disease_check, Some(now));
    assert_eq!(stored.scale, 0.1);
    assert_eq!(stored.moisture, 50.0);
}

#[tokio::test]
async fn passes_are_broadcast_to_subscribers() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "u1", false, start());
    store.insert_plant(actions::plant_created(
        "p1",
        "u1",
        &verdance::species::CatalogLoader::new(env!("CARGO_MANIFEST_DIR"))
            .load("catalog/species.yaml")
            .unwrap()
            .species("basil")
            .cloned()
            .unwrap(),
        LocationCategory::Indoor,
        Position::default(),
        start(),
    ));

    let scheduler = CatchUpScheduler::new(services(store.clone()), SchedulerConfig::default());
    let mut rx = scheduler.subscribe();
    let report = scheduler
        .run_pass(start() + Duration::hours(1))
        .await
        .unwrap();
    let received = rx.recv().await.unwrap();
    assert_eq!(received, report);
    assert_eq!(scheduler.latest_report(), Some(report));
    assert_eq!(store.plants_for_user("u1").unwrap().len(), 1);
}
