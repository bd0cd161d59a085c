//! Composite rebuild gate.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use towercam_render::CompositeBuilder;
use towercam_store::FreshnessStore;

use crate::artifacts::ArtifactPaths;
use crate::error::RefreshError;
use crate::scheduler::CycleReport;

/// The composite to serve for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    pub png: Vec<u8>,
    /// Built during this pass rather than read back from disk.
    pub rebuilt: bool,
}

/// Reuses the cached composite unless the record moved past it.
///
/// The record's generations make the rebuild durable: a merge whose rebuild
/// failed, or never ran, is rebuilt by the next pass that gets here.
pub struct CompositeGate {
    paths: ArtifactPaths,
    builder: Arc<dyn CompositeBuilder>,
    store: Arc<dyn FreshnessStore>,
}

impl CompositeGate {
    pub fn new(
        paths: ArtifactPaths,
        builder: Arc<dyn CompositeBuilder>,
        store: Arc<dyn FreshnessStore>,
    ) -> Self {
        Self {
            paths,
            builder,
            store,
        }
    }

    /// Produce the composite for `report`.
    ///
    /// A missing composite when nothing changed is reported as
    /// [`RefreshError::ArtifactMissing`], never rebuilt behind the caller's back.
    pub fn resolve(&self, report: &CycleReport) -> Result<Composite, RefreshError> {
        if !report.record.has_image() {
            return Err(RefreshError::NoFrameYet);
        }

        if report.needs_rebuild() || report.record.composite_outdated() {
            return self.rebuild(report);
        }

        let path = self.paths.composite();
        match self.paths.read_composite().map_err(RefreshError::io(path))? {
            Some(png) => {
                debug!(bytes = png.len(), "Reusing cached composite");
                Ok(Composite {
                    png,
                    rebuilt: false,
                })
            }
            None => {
                error!(path = %path.display(), "Composite missing but not marked stale");
                Err(RefreshError::ArtifactMissing(path.to_path_buf()))
            }
        }
    }

    /// The last composite written to disk, for degraded responses.
    pub fn last_built(&self) -> Option<Vec<u8>> {
        self.paths.read_composite().ok().flatten()
    }

    fn rebuild(&self, report: &CycleReport) -> Result<Composite, RefreshError> {
        let raw_path = self.paths.raw_frame();
        let frame = self
            .paths
            .read_raw_frame()
            .map_err(RefreshError::io(raw_path))?
            .ok_or_else(|| RefreshError::ArtifactMissing(raw_path.to_path_buf()))?;

        let png = self.builder.build(&report.record, &frame)?;
        self.paths
            .write_composite(&png)
            .map_err(RefreshError::io(self.paths.composite()))?;

        // the composite on disk is already correct; a failed mark only costs a rebuild
        let generation = report.record.merge_generation;
        if let Err(e) = self.store.mark_composite_built(generation) {
            warn!(error = %e, generation, "Could not record built composite");
        }

        info!(
            weather_changed = report.weather.merged,
            image_changed = report.image.merged,
            generation,
            bytes = png.len(),
            "Rebuilt composite"
        );
        Ok(Composite { png, rebuilt: true })
    }
}
