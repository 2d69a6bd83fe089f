use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),
}

impl Error {
    /// True when the failure means the bearer token is missing
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
