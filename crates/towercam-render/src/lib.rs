//! Composite image rendering for Towercam
//!
//! Overlays the cached weather values on the last stored webcam frame.

pub mod composite;

use thiserror::Error;
use towercam_store::FreshnessRecord;

pub use composite::AnnotatedFrameBuilder;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to decode frame: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode composite: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Failed to load overlay font: {0}")]
    Font(#[source] ab_glyph::InvalidFont),
}

/// Turns the current record and the stored raw frame into the served image.
///
/// Implementations must be pure: the same record and frame give the same bytes.
pub trait CompositeBuilder: Send + Sync {
    fn build(&self, record: &FreshnessRecord, frame: &[u8]) -> Result<Vec<u8>, RenderError>;
}
