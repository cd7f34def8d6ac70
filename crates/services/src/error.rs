//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use yle_core::grading::GradingError;
use yle_core::model::{AssessmentId, SessionStateError};

/// Errors emitted by `SessionManager` and the session persistence layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no active session")]
    NoActiveSession,
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Grading(#[from] GradingError),
}

/// Errors emitted while assembling an assessment catalog.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("duplicate assessment id: {0}")]
    DuplicateAssessment(AssessmentId),
    #[error(transparent)]
    Invalid(#[from] yle_core::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
