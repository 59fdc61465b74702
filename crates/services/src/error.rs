//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use exam_core::model::{Phase, QuestionError, SessionError, SettingsError};
use storage::repository::StorageError;

/// Errors emitted by `ExamController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamError {
    #[error("operation needs the {expected} phase, exam is {actual}")]
    WrongPhase { expected: Phase, actual: Phase },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors emitted by report writers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors emitted while loading an exam file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamFileError {
    #[error("could not read exam file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid exam file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Errors emitted by `HistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
