//! Maps refresh errors to towercam_core::AppError for consistent responses.

use towercam_core::{AppError, ArtifactError, DatabaseError, RusqliteErrorExt};
use towercam_refresh::RefreshError;
use towercam_store::StoreError;
use warp::http::StatusCode;

pub fn app_error(e: RefreshError) -> AppError {
    match e {
        RefreshError::Persistence(e) => AppError::Database(database_error(e)),
        RefreshError::ArtifactMissing(path) => {
            AppError::Artifact(ArtifactError::Missing(path.display().to_string()))
        }
        RefreshError::NoFrameYet => AppError::Artifact(ArtifactError::NoFrameYet),
        RefreshError::Render(e) => AppError::Artifact(ArtifactError::RenderFailed(e.to_string())),
        RefreshError::Io { source, .. } => AppError::Io(source),
    }
}

fn database_error(e: StoreError) -> DatabaseError {
    match e {
        StoreError::Sqlite(e) => e.into_database_error(),
        StoreError::MissingRow | StoreError::InvalidTimestamp { .. } => {
            DatabaseError::Corruption(e.to_string())
        }
        StoreError::SourceMismatch { .. } => DatabaseError::QueryFailed(e.to_string()),
    }
}

/// HTTP status for a request that could not be served normally.
pub fn status_for(e: &AppError) -> StatusCode {
    match e {
        AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Artifact(ArtifactError::NoFrameYet) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Artifact(_) | AppError::Io(_) | AppError::Config(_) | AppError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_artifact_is_server_error() {
        let e = app_error(RefreshError::ArtifactMissing(PathBuf::from("/data/tower.png")));
        assert!(matches!(e, AppError::Artifact(ArtifactError::Missing(ref p)) if p == "/data/tower.png"));
        assert_eq!(status_for(&e), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_no_frame_yet_is_unavailable() {
        let e = app_error(RefreshError::NoFrameYet);
        assert_eq!(status_for(&e), StatusCode::SERVICE_UNAVAILABLE);
        assert!(e.is_transient());
    }

    #[test]
    fn test_store_errors_map_to_database() {
        let e = app_error(RefreshError::Persistence(StoreError::MissingRow));
        assert!(matches!(e, AppError::Database(DatabaseError::Corruption(_))));
        assert_eq!(status_for(&e), StatusCode::SERVICE_UNAVAILABLE);

        let sqlite = rusqlite::Error::QueryReturnedNoRows;
        let e = app_error(RefreshError::Persistence(StoreError::Sqlite(sqlite)));
        assert!(matches!(e, AppError::Database(DatabaseError::QueryFailed(_))));
        assert!(e.is_transient());
    }
}
