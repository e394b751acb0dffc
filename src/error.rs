use std::sync::PoisonError;

use thiserror::Error;

use crate::datatype::Id;

#[derive(Error, Debug)]
pub enum CofferError {
    #[error("Object not found: {0}")]
    NotFound(Id),
    #[error("Stale object: {0}")]
    StaleObject(String),
    #[error("Illegal operation: {0}")]
    IllegalOperation(String),
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CofferError {
    /// True for lookup misses, which multi-resource resolution swallows.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::DataCorruption {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CofferError>;

// Helper conversions
impl From<rusqlite::Error> for CofferError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<serde_json::Error> for CofferError {
    fn from(e: serde_json::Error) -> Self {
        Self::corrupt(e.to_string())
    }
}
impl From<reqwest::Error> for CofferError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
impl From<config::ConfigError> for CofferError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl<T> From<PoisonError<T>> for CofferError {
    fn from(e: PoisonError<T>) -> Self {
        Self::Lock(e.to_string())
    }
}
