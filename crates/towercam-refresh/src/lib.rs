//! Freshness-driven refresh scheduling for Towercam
//!
//! One pass per request: decide per source whether an attempt is due, run the
//! due fetches, fold the results into the freshness store with the newer-wins
//! rule, then decide whether the composite must be rebuilt.

pub mod artifacts;
pub mod cadence;
pub mod error;
pub mod gate;
pub mod scheduler;

pub use artifacts::ArtifactPaths;
pub use cadence::{CadencePredictor, MinuteCadence};
pub use error::RefreshError;
pub use gate::{Composite, CompositeGate};
pub use scheduler::{
    decide, poll_hint, CycleReport, RefreshDecision, RefreshScheduler, SchedulerConfig,
    SourcePolicy, SourceReport,
};
