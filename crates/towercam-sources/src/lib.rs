//! Upstream sources for Towercam
//!
//! Scrapes the Met Office observation page and downloads the tower webcam
//! frame. Both sit behind small async traits so the refresh scheduler can be
//! driven by fakes.

pub mod met;
pub mod tower;
pub mod types;
pub mod weather;

use async_trait::async_trait;

pub use met::{parse_observation, MetObservation};
pub use tower::TowerCamFetcher;
pub use types::*;
pub use weather::MetOfficeFetcher;

/// Something that can produce the latest weather reading.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch_weather(&self) -> Result<WeatherReading, FetchError>;
}

/// Something that can produce the latest webcam frame.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self) -> Result<TowerFrame, FetchError>;
}
