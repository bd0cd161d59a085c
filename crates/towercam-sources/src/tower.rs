//! Webcam frame downloader.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::types::{FetchError, TowerFrame};
use crate::ImageFetcher;

/// Downloads the current tower webcam JPEG.
///
/// The frame is stamped with the time the download finished; the scheduler
/// backdates it to the camera's capture boundary.
#[derive(Debug, Clone)]
pub struct TowerCamFetcher {
    client: Arc<Client>,
    image_url: String,
}

impl TowerCamFetcher {
    pub fn new(image_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client: Arc::new(client),
            image_url: image_url.to_string(),
        })
    }
}

#[async_trait]
impl ImageFetcher for TowerCamFetcher {
    #[instrument(skip(self), fields(url = %self.image_url), level = "info")]
    async fn fetch_image(&self) -> Result<TowerFrame, FetchError> {
        let response = self.client.get(&self.image_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        debug!(len = bytes.len(), "Downloaded tower frame");
        Ok(TowerFrame {
            bytes: bytes.to_vec(),
            observed_at: Utc::now(),
        })
    }
}
