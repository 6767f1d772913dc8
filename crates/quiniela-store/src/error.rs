use quiniela_shared::{EntityKind, OutcomeError};
use thiserror::Error;

/// Errors produced by the store layer.
///
/// Everything above `Sqlite` is an expected, user-facing condition; the
/// remaining variants are infrastructure failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(EntityKind),

    /// A record with the same natural key already exists.
    #[error("{0} already exists")]
    AlreadyExists(EntityKind),

    #[error("Not enough tickets to participate")]
    InsufficientTickets,

    #[error("User has already joined this event")]
    AlreadyParticipated,

    #[error("Predictions for this event were already submitted")]
    AlreadySubmitted,

    #[error("User has not joined this event")]
    NotParticipating,

    #[error("Event is not the current event")]
    EventNotCurrent,

    #[error("Match {0} does not belong to this event")]
    MatchNotInEvent(i64),

    #[error("Invalid outcome for match {match_id}: {source}")]
    InvalidOutcome {
        match_id: i64,
        #[source]
        source: OutcomeError,
    },

    /// The organizer has not published this view yet.
    #[error("{0} is currently hidden")]
    Hidden(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat classification of [`StoreError`] that callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InsufficientTickets,
    AlreadyParticipated,
    AlreadySubmitted,
    NotParticipating,
    EventNotCurrent,
    MatchNotInEvent,
    InvalidOutcome,
    Hidden,
    InvalidInput,
    Unexpected,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::InsufficientTickets => ErrorKind::InsufficientTickets,
            StoreError::AlreadyParticipated => ErrorKind::AlreadyParticipated,
            StoreError::AlreadySubmitted => ErrorKind::AlreadySubmitted,
            StoreError::NotParticipating => ErrorKind::NotParticipating,
            StoreError::EventNotCurrent => ErrorKind::EventNotCurrent,
            StoreError::MatchNotInEvent(_) => ErrorKind::MatchNotInEvent,
            StoreError::InvalidOutcome { .. } => ErrorKind::InvalidOutcome,
            StoreError::Hidden(_) => ErrorKind::Hidden,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::Sqlite(_) | StoreError::Migration(_) | StoreError::Io(_) => {
                ErrorKind::Unexpected
            }
        }
    }

    /// Map "no rows" from a single-row query to `NotFound(entity)`.
    pub(crate) fn not_found_as(entity: EntityKind) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(entity),
            other => StoreError::Sqlite(other),
        }
    }
}

/// Whether `err` is a UNIQUE / PRIMARY KEY constraint failure.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
