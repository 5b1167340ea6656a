use roster_data::{StoreError, ValidationErrors};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Storage error: {0}")]
    Storage(StoreError),
    #[error("DataFrame error: {0}")]
    DataFrame(#[from] polars::prelude::PolarsError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RosterError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Field errors when this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

// Validation failures keep their own variant so callers never have to dig
// through `Storage` to tell bad input from a storage fault.
impl From<StoreError> for RosterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(errors) => Self::Validation(errors),
            StoreError::RiderNotFound(id) => Self::not_found("Rider", id),
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RosterError>;
