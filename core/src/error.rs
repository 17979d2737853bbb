use crate::types::EntityId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Customer {id} not found")]
    CustomerNotFound { id: EntityId },

    #[error("Invalid relation reference '{value}' (expected '<kind>:<id>')")]
    InvalidReference { value: String },

    #[error("Invalid {field}: '{value}'")]
    InvalidEnum { field: &'static str, value: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrmError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// True for errors caused by caller input rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference { .. } | Self::InvalidEnum { .. } | Self::Validation { .. }
        )
    }
}

pub type CrmResult<T> = Result<T, CrmError>;
