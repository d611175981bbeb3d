use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use verdance::{
    actions,
    diseases::{DiseaseKind, BROAD_SPECTRUM_SPRAY},
    engine::Simulator,
    plant::{LocationCategory, PlantRecord, Position},
    rng::{FixedRoll, SeededRolls},
    species::{CatalogLoader, ReferenceCatalog, SpeciesProfile},
    systems::{fertilizer, CureOutcome},
    weather::AmbientSample,
    ModelTuning,
};

fn catalog() -> ReferenceCatalog {
    CatalogLoader::new(env!("CARGO_MANIFEST_DIR"))
        .load("catalog/species.yaml")
        .unwrap()
}

fn species(name: &str) -> SpeciesProfile {
    catalog().species(name).cloned().unwrap()
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 10, 8, 0, 0).unwrap()
}

fn planted(species: &SpeciesProfile, location: LocationCategory) -> PlantRecord {
    actions::plant_created("p1", "u1", species, location, Position::default(), start())
}

#[test]
fn root_rot_onset_when_soggy() {
    let mut tomato = species("tomato");
    tomato
        .disease_thresholds
        .insert("rootRotMoistureThreshold".into(), 70.0);
    let sim = Simulator::standard(ModelTuning::default(), Arc::new(FixedRoll(0.0)));
    let mut plant = planted(&tomato, LocationCategory::Ground);
    plant.moisture = 85.0;
    // at the species humidity minimum: no evaporation and no humidity bonus
    let ambient = AmbientSample {
        temperature: 22.0,
        humidity: 45.0,
        light: 400.0,
        precipitation: 0.0,
    };

    let report = sim.advance(&mut plant, &tomato, &ambient, start() + Duration::hours(1));
    assert_eq!(report.disease_checks, 1);
    assert_eq!(report.onset, Some(DiseaseKind::RootRot));
    assert_eq!(plant.disease, Some(DiseaseKind::RootRot));
    assert_eq!(plant.disease_progress, 0.0);
    assert_eq!(plant.disease_slowing, 1.0);
}

#[test]
fn each_disease_check_reads_moisture_at_its_own_hour() {
    let tomato = species("tomato");
    let sim = Simulator::standard(ModelTuning::default(), Arc::new(FixedRoll(0.0)));
    let mut base = planted(&tomato, LocationCategory::Ground);
    base.moisture = 90.0;
    // bone dry air: the soil is soggy at the first check and dry by the end
    let ambient = AmbientSample {
        temperature: 22.0,
        humidity: 0.0,
        light: 400.0,
        precipitation: 0.0,
    };
    let end = start() + Duration::hours(8);

    let mut once = base.clone();
    let report = sim.advance(&mut once, &tomato, &ambient, end);
    assert_eq!(report.disease_checks, 8);
    assert!(once.moisture < 80.0);

    let mut hourly = base.clone();
    for hour in 1..=8 {
        sim.advance(&mut hourly, &tomato, &ambient, start() + Duration::hours(hour));
    }

    assert_eq!(once.disease, Some(DiseaseKind::RootRot));
    assert_eq!(hourly.disease, once.disease);
    assert!((once.disease_progress - hourly.disease_progress).abs() < 1e-12);
    assert_eq!(once.last_disease_check, hourly.last_disease_check);
    assert_eq!(once.last_disease_check, Some(end));
}

#[test]
fn fertilizer_mismatch_penalty() {
    let catalog = catalog();
    let tuning = ModelTuning::default();
    let tomato = catalog.species("tomato").unwrap();
    let green_grow = catalog.fertilizer("green_grow").unwrap();
    let bloom_boost = catalog.fertilizer("bloom_boost").unwrap();

    let mut matched = planted(tomato, LocationCategory::Ground);
    actions::apply_fertilizer(&mut matched, tomato, bloom_boost, &tuning);
    assert_eq!(fertilizer::get_fertilizer_boost(&matched), tomato.fertilizer_boost);

    let mut mismatched = planted(tomato, LocationCategory::Ground);
    actions::apply_fertilizer(&mut mismatched, tomato, green_grow, &tuning);
    assert!(
        (fertilizer::get_fertilizer_boost(&mismatched) - tomato.fertilizer_boost * 0.8).abs()
            < 1e-12
    );
    assert_eq!(mismatched.nutrient, 40.0);
    assert_eq!(mismatched.fertilizer_remaining_secs, 36.0 * 3_600.0);
}

#[test]
fn mismatched_fertilizer_can_slow_growth() {
    let catalog = catalog();
    let tuning = ModelTuning::default();
    let cactus = catalog.species("cactus").unwrap();
    let all_purpose = catalog.fertilizer("all_purpose").unwrap();

    let mut plant = planted(cactus, LocationCategory::Ground);
    actions::apply_fertilizer(&mut plant, cactus, all_purpose, &tuning);
    let boost = fertilizer::get_fertilizer_boost(&plant);
    assert!((boost - 0.96).abs() < 1e-12);

    // the penalized boost drags growth below the unfertilized rate
    let sim = Simulator::standard(tuning, Arc::new(FixedRoll(1.0)));
    let ambient = AmbientSample {
        temperature: 30.0,
        humidity: 25.0,
        light: 700.0,
        precipitation: 0.0,
    };
    let mut bare = planted(cactus, LocationCategory::Ground);
    bare.moisture = plant.moisture;
    sim.advance(&mut plant, cactus, &ambient, start() + Duration::hours(6));
    sim.advance(&mut bare, cactus, &ambient, start() + Duration::hours(6));
    assert!(plant.scale < bare.scale);
}

#[test]
fn nutrient_exhaustion_clears_fertilizer() {
    let tomato = species("tomato");
    let sim = Simulator::standard(ModelTuning::default(), Arc::new(FixedRoll(1.0)));
    let mut plant = planted(&tomato, LocationCategory::Ground);
    plant.nutrient = 1.0;
    plant.fertilizer_remaining_secs = 1.0;
    plant.fertilizer = Some("bloom_boost".into());
    plant.fertilizer_boost = 1.4;

    let ambient = AmbientSample {
        temperature: 22.0,
        humidity: 50.0,
        light: 400.0,
        precipitation: 0.0,
    };
    sim.advance(&mut plant, &tomato, &ambient, start() + Duration::seconds(2));
    assert_eq!(plant.nutrient, 0.0);
    assert_eq!(plant.fertilizer_remaining_secs, 0.0);
    assert_eq!(plant.fertilizer, None);
    assert_eq!(fertilizer::get_fertilizer_boost(&plant), 1.0);
}

#[test]
fn shade_cures_a_ground_plant_after_two_hours() {
    let fern = species("fern");
    let sim = Simulator::standard(ModelTuning::default(), Arc::new(FixedRoll(1.0)));
    let mut plant = planted(&fern, LocationCategory::Ground);
    plant.disease = Some(DiseaseKind::Sunscald);
    plant.disease_progress = 0.4;
    plant.disease_slowing = DiseaseKind::Sunscald.rule().slowing_at(0.4);
    assert!(actions::set_shade(&mut plant, true));

    let ambient = AmbientSample {
        temperature: 20.0,
        humidity: 70.0,
        light: 200.0,
        precipitation: 0.0,
    };
    let first = sim.advance(&mut plant, &fern, &ambient, start() + Duration::minutes(90));
    assert!(!first.shade_cured);
    assert!(plant.is_diseased());
    let second = sim.advance(&mut plant, &fern, &ambient, start() + Duration::minutes(120));
    assert!(second.shade_cured);
    assert_eq!(plant.disease, None);
    assert_eq!(plant.shade_secs, 0.0);
}

#[test]
fn broad_spectrum_spray_needs_repeat_applications() {
    let tuning = ModelTuning::default();
    let basil = species("basil");
    let mut plant = planted(&basil, LocationCategory::Indoor);
    plant.disease = Some(DiseaseKind::Aphids);
    plant.disease_progress = 0.6;

    let first = actions::apply_cure(&mut plant, BROAD_SPECTRUM_SPRAY, &tuning);
    assert!(matches!(first, CureOutcome::Reduced { .. }));
    let second = actions::apply_cure(&mut plant, BROAD_SPECTRUM_SPRAY, &tuning);
    assert!(matches!(second, CureOutcome::Reduced { .. }));
    let third = actions::apply_cure(&mut plant, BROAD_SPECTRUM_SPRAY, &tuning);
    assert_eq!(third, CureOutcome::Cured);
    assert_eq!(plant.disease, None);
}

#[test]
fn seeded_rolls_agree_across_drivers() {
    let tomato = species("tomato");
    let soggy = AmbientSample {
        temperature: 24.0,
        humidity: 60.0,
        light: 500.0,
        precipitation: 0.0,
    };
    let sim = Simulator::standard(ModelTuning::default(), Arc::new(SeededRolls::new(11)));

    let mut base = planted(&tomato, LocationCategory::Ground);
    base.moisture = 95.0;

    // one catch-up call over a day versus a check every hour
    let mut batched = base.clone();
    sim.advance(&mut batched, &tomato, &soggy, start() + Duration::hours(24));
    let mut stepped = base.clone();
    for hour in 1..=24 {
        sim.advance(&mut stepped, &tomato, &soggy, start() + Duration::hours(hour));
    }
    assert_eq!(batched.disease, stepped.disease);
    assert_eq!(batched.disease_progress, stepped.disease_progress);
    assert_eq!(batched.last_disease_check, stepped.last_disease_check);
}

#[test]
fn unknown_location_behaves_as_open_ground() {
    let fern = species("fern");
    let sim = Simulator::standard(ModelTuning::default(), Arc::new(FixedRoll(1.0)));
    let ambient = AmbientSample {
        temperature: 19.0,
        humidity: 72.0,
        light: 180.0,
        precipitation: 0.0,
    };
    let mut ground = planted(&fern, LocationCategory::Ground);
    let mut unknown = planted(&fern, LocationCategory::Unknown);
    let to = start() + Duration::hours(5);
    sim.advance(&mut ground, &fern, &ambient, to);
    sim.advance(&mut unknown, &fern, &ambient, to);
    assert_eq!(ground.scale, unknown.scale);
    assert_eq!(ground.moisture, unknown.moisture);
}
