//! Scheduler error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while placing payloads or launching jobs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("payload not found: {0}")]
    PayloadMissing(PathBuf),

    #[error("invalid node id: {0:?}")]
    InvalidNode(String),

    #[error("launcher command is empty")]
    EmptyLauncher,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that end a single cycle iteration.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("state store error: {0}")]
    State(#[from] harvestgrid_state::StateError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl SchedulerError {
    /// Whether this error means an input file is absent or unreadable,
    /// as opposed to an I/O fault.
    pub fn is_missing_input(&self) -> bool {
        match self {
            SchedulerError::State(e) => e.is_missing_input(),
            SchedulerError::Dispatch(_) => false,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
