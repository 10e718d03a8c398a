//! Migration-specific error types

use crate::executor::DbError;
use std::num::ParseIntError;
use thiserror::Error;

/// Error type returned by step bodies
///
/// Any `std::error::Error + Send + Sync` converts into it with `?`, including
/// [`DbError`].
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Adding a step to a [`Collection`](super::Collection) failed
#[derive(Debug, Error)]
#[error("failed to register migration {filename:?}: {kind}")]
pub struct RegistrationError {
    pub filename: String,
    #[source]
    pub kind: RegistrationErrorKind,
}

#[derive(Debug, Error)]
pub enum RegistrationErrorKind {
    #[error("missing '_' separator between version and description")]
    MissingSeparator,
    #[error("cannot parse version prefix: {0}")]
    InvalidVersion(#[source] ParseIntError),
    #[error("version {0} is not greater than zero")]
    NotPositive(i64),
    #[error("version {0} is already registered")]
    Duplicate(i64),
}

impl RegistrationError {
    pub(crate) fn new(filename: &str, kind: RegistrationErrorKind) -> Self {
        Self {
            filename: filename.to_string(),
            kind,
        }
    }
}

/// Errors returned by [`Provider`](super::Provider) operations
///
/// `Apply` is the only variant that means "a migration's own logic failed";
/// everything else is infrastructure (lock, session, version table) and carries
/// the operation that failed.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("failed to acquire migration lock")]
    Lock(#[source] DbError),

    #[error("failed to release migration lock{}", after_error(.cause))]
    Unlock {
        #[source]
        source: DbError,
        /// The error that was already being returned when unlocking failed
        cause: Option<Box<MigrateError>>,
    },

    #[error("failed to configure migration session")]
    SessionSetup(#[source] DbError),

    #[error("failed to reset migration session{}", after_error(.cause))]
    SessionReset {
        #[source]
        source: DbError,
        /// The error that was already being returned when the reset failed
        cause: Option<Box<MigrateError>>,
    },

    #[error("failed to initialize version table {table}")]
    InitVersionTable {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("failed to read current version from {table}")]
    ReadVersion {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("failed to record version {version} in {table}")]
    UpdateVersion {
        version: i64,
        table: String,
        #[source]
        source: DbError,
    },

    #[error("migration {version} failed")]
    Apply {
        version: i64,
        #[source]
        source: StepError,
    },
}

fn after_error(cause: &Option<Box<MigrateError>>) -> String {
    match cause {
        Some(cause) => format!(" after error: {cause}"),
        None => String::new(),
    }
}

impl MigrateError {
    /// Version of the step that failed, for `Apply` errors
    pub fn failed_version(&self) -> Option<i64> {
        match self {
            MigrateError::Apply { version, .. } => Some(*version),
            MigrateError::Unlock { cause: Some(cause), .. }
            | MigrateError::SessionReset { cause: Some(cause), .. } => cause.failed_version(),
            _ => None,
        }
    }

    /// Fold a failed session `RESET` into the outcome of the work it wrapped
    pub(crate) fn join_session_reset<T, R>(
        outcome: Result<T, MigrateError>,
        reset: Result<R, DbError>,
    ) -> Result<T, MigrateError> {
        match (outcome, reset) {
            (outcome, Ok(_)) => outcome,
            (Ok(_), Err(source)) => Err(MigrateError::SessionReset { source, cause: None }),
            (Err(primary), Err(source)) => Err(MigrateError::SessionReset {
                source,
                cause: Some(Box::new(primary)),
            }),
        }
    }

    /// Fold a lock-release failure into the outcome of the locked section
    ///
    /// The primary error is never replaced: it travels inside `Unlock::cause`.
    pub(crate) fn join_unlock<T>(
        outcome: Result<T, MigrateError>,
        unlock: Result<(), DbError>,
    ) -> Result<T, MigrateError> {
        match (outcome, unlock) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(source)) => Err(MigrateError::Unlock { source, cause: None }),
            (Err(primary), Err(source)) => Err(MigrateError::Unlock {
                source,
                cause: Some(Box::new(primary)),
            }),
        }
    }
}
