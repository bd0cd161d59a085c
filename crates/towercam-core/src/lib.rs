pub mod config;
pub mod error;

pub use config::{
    CadenceConfig, Config, DisplayConfig, FetchConfig, ServerConfig, StorageConfig, TowerConfig,
    ValidationResult, WeatherConfig,
};
pub use error::{AppError, ArtifactError, ConfigError, DatabaseError, RusqliteErrorExt};

use anyhow::Result;

/// Initialize logging for the process
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Towercam core initialized");
    Ok(())
}
