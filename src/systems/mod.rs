pub mod disease;
pub mod environment;
pub mod fertilizer;
pub mod growth;
pub mod moisture;
pub mod shade;

pub use disease::{CureOutcome, DiseaseSystem};
pub use environment::EnvironmentSample;
pub use fertilizer::FertilizerSystem;
pub use growth::GrowthSystem;
pub use moisture::MoistureSystem;
pub use shade::ShadeSystem;
