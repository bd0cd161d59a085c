//! Centralized error types for Towercam.
//!
//! Each library crate keeps its own error enum; the front end maps them into
//! [`AppError`] so every failure has one status-friendly message.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a message safe to show to a visitor.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short message suitable for an HTTP error body.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Artifact(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }

    /// Whether a visitor retrying later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(e) => !matches!(e, DatabaseError::Corruption(_)),
            AppError::Artifact(e) => matches!(e, ArtifactError::NoFrameYet),
            AppError::Config(_) | AppError::Io(_) | AppError::Other(_) => false,
        }
    }
}

/// Database/storage errors (SQLite).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "The freshness store is unavailable.",
            DatabaseError::QueryFailed(_) => "Updating the freshness store failed.",
            DatabaseError::Corruption(_) => "The freshness store may be corrupted.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
        }
    }
}

/// Cached image artifact problems.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Sources are fresh but the artifact we should reuse is gone.
    #[error("Sources are up to date but the cached artifact is missing: {0}")]
    Missing(String),

    /// No webcam frame has ever been stored.
    #[error("No webcam frame has been downloaded yet")]
    NoFrameYet,

    #[error("Rendering failed: {0}")]
    RenderFailed(String),
}

impl ArtifactError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ArtifactError::Missing(_) => "The cached image is missing. An operator has been notified.",
            ArtifactError::NoFrameYet => "No webcam image is available yet. Please try again shortly.",
            ArtifactError::RenderFailed(_) => "The image could not be rendered.",
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corruption(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                DatabaseError::ConnectionFailed(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}
