use thiserror::Error;
use yamdb_core::Denial;

use crate::DatabaseError;

pub type CollabResult<T> = Result<T, CollabError>;

/// Errors from the catalog, review, and user operations
#[derive(Debug, Error)]
pub enum CollabError {
    /// The input is malformed or violates a rule
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error(transparent)]
    Denied(#[from] Denial),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl CollabError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}
