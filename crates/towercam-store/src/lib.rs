//! Durable freshness record for the weather and webcam sources.
//!
//! Provides the [`FreshnessStore`] trait and its SQLite implementation.

pub mod backend;
pub mod record;
pub mod sqlite;

pub use backend::{FreshnessStore, StoreError, StoreResult};
pub use record::{FreshnessRecord, Observation, Source, SourceValue};
pub use sqlite::SqliteFreshnessStore;
