//! Refresh cycle error types.

use std::path::PathBuf;

use thiserror::Error;
use towercam_render::RenderError;
use towercam_store::StoreError;

/// Failures that end a refresh cycle or composite lookup.
///
/// Fetch failures are not here: they are recorded as attempts and the cycle
/// carries on.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// A cached artifact is gone although nothing marked it stale.
    #[error("Cached artifact missing but not marked stale: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// No frame has ever been stored, so there is nothing to compose.
    #[error("No tower frame has been stored yet")]
    NoFrameYet,

    #[error("Composite render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Artifact I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RefreshError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// Whether a previously built composite may be served in place of a fresh one.
    pub fn allows_degraded(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Render(_) | Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_missing_artifact_names_path() {
        let err = RefreshError::ArtifactMissing(PathBuf::from("/var/lib/towercam/tower.png"));
        assert!(err.to_string().contains("/var/lib/towercam/tower.png"));
        assert!(!err.allows_degraded());
    }

    #[test]
    fn test_degraded_serving_policy() {
        assert!(RefreshError::Persistence(StoreError::MissingRow).allows_degraded());
        assert!(!RefreshError::NoFrameYet.allows_degraded());

        let io = RefreshError::io("/tmp/x")(std::io::Error::other("disk full"));
        assert!(io.allows_degraded());
        assert!(io.to_string().contains("disk full"));
    }
}
