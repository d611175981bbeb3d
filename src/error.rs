use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no record for {0}")]
    NotFound(String),
    #[error("write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("unknown species '{0}'")]
    UnknownSpecies(String),
    #[error("unknown fertilizer '{0}'")]
    UnknownFertilizer(String),
    #[error("reference source failed: {0}")]
    Source(String),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("user '{user}' has no plant '{plant}'")]
    NoSuchPlant { user: String, plant: String },
}
