//! Error types for the scheduling engine and its stores.

use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures raised by an assignment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store did not answer within the configured bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A query reached the database and failed.
    #[error("{operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row holds a value the model cannot represent.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Failures raised while producing or editing a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Both parties are unavailable on this day.
    #[error("no party can be assigned on {date} ({weekday}): both are unavailable", weekday = .date.format("%A"))]
    Unsatisfiable { date: NaiveDate },

    /// The store failed while the given day was being scheduled.
    #[error("storage failure while scheduling {date}: {source}")]
    Storage {
        date: NaiveDate,
        #[source]
        source: StoreError,
    },

    /// The store failed outside of day-by-day scheduling.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScheduleError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ScheduleError::Storage { source, .. } | ScheduleError::Store(source) => {
                source.is_timeout()
            }
            ScheduleError::Unsatisfiable { .. } => false,
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
