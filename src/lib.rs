pub mod actions;
pub mod cache;
pub mod config;
pub mod diseases;
pub mod engine;
pub mod error;
pub mod plant;
pub mod rng;
pub mod scheduler;
pub mod session;
pub mod species;
pub mod store;
pub mod systems;
pub mod weather;
pub mod web;

pub use config::{AppConfig, CatchUpMode, ModelTuning};
pub use engine::{Simulator, SimulatorBuilder, StepReport};
pub use plant::{LocationCategory, PlantRecord};
pub use scheduler::{CatchUpScheduler, PassReport, Services};
