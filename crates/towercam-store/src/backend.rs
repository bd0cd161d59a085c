//! Freshness store trait and error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::{FreshnessRecord, Observation, Source};

/// Errors that can occur while reading or writing the freshness record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database rejected the operation.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The singleton row is gone.
    #[error("Freshness record row is missing")]
    MissingRow,

    /// An observation was committed against the wrong source.
    #[error("Observation for {got} committed as an attempt on {expected}")]
    SourceMismatch { expected: Source, got: Source },

    /// A stored timestamp is outside the representable range.
    #[error("Invalid stored timestamp in column {column}: {value}")]
    InvalidTimestamp { column: &'static str, value: i64 },
}

/// Result type for freshness store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract for the freshness record.
///
/// Every write is atomic and idempotent under retry: replaying an attempt
/// stamp or a merge leaves the record as it was after the first call.
pub trait FreshnessStore: Send + Sync {
    /// Read the whole record in one consistent snapshot.
    fn get_record(&self) -> StoreResult<FreshnessRecord>;

    /// Stamp an attempt on `source`.
    ///
    /// The stored stamp never moves backwards: an older `now` is ignored.
    fn update_attempt(&self, source: Source, now: DateTime<Utc>) -> StoreResult<()>;

    /// Merge a successful observation if it is strictly newer than the stored
    /// success for its source.
    ///
    /// Returns `true` if the record changed.
    fn merge_success(&self, observation: &Observation) -> StoreResult<bool>;

    /// Record that a composite reflecting `generation` has been written.
    ///
    /// Like attempt stamps, the built generation never moves backwards.
    fn mark_composite_built(&self, generation: i64) -> StoreResult<()>;

    /// Stamp an attempt and merge its result (if any) as one unit.
    ///
    /// Returns `true` if the observation was merged. The default runs the two
    /// writes back to back; stores with transactions should override it.
    fn commit_attempt(
        &self,
        source: Source,
        now: DateTime<Utc>,
        observation: Option<&Observation>,
    ) -> StoreResult<bool> {
        check_source(source, observation)?;
        self.update_attempt(source, now)?;
        match observation {
            Some(obs) => self.merge_success(obs),
            None => Ok(false),
        }
    }
}

pub(crate) fn check_source(source: Source, observation: Option<&Observation>) -> StoreResult<()> {
    match observation {
        Some(obs) if obs.source() != source => Err(StoreError::SourceMismatch {
            expected: source,
            got: obs.source(),
        }),
        _ => Ok(()),
    }
}
