//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AttemptError, AttemptStatus};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `DashboardService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DashboardError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `TestSessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestSessionError {
    #[error("test attempt not found")]
    NotFound,
    #[error("test attempt belongs to another user")]
    Forbidden,
    #[error("cannot {action} a test that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: AttemptStatus,
    },
    #[error("no questions available for this test")]
    NoQuestions,
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `HistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("test result not found")]
    NotFound,
    #[error("test result belongs to another user")]
    Forbidden,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
