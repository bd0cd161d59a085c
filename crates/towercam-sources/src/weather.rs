//! Met Office observation page fetcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::met::parse_observation;
use crate::types::{FetchError, WeatherReading};
use crate::WeatherFetcher;

/// Scrapes the latest reading from a Met Office observation page.
#[derive(Debug, Clone)]
pub struct MetOfficeFetcher {
    client: Arc<Client>,
    page_url: String,
    tz: Tz,
}

impl MetOfficeFetcher {
    pub fn new(page_url: &str, tz: Tz, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client: Arc::new(client),
            page_url: page_url.to_string(),
            tz,
        })
    }
}

#[async_trait]
impl WeatherFetcher for MetOfficeFetcher {
    #[instrument(skip(self), fields(url = %self.page_url), level = "info")]
    async fn fetch_weather(&self) -> Result<WeatherReading, FetchError> {
        let response = self.client.get(&self.page_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let html = response.text().await?;
        if html.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let obs = parse_observation(&html, self.tz)?;
        debug!(
            temperature = obs.temperature,
            wind_speed = obs.wind_speed,
            observed_at = %obs.observed_at,
            "Parsed observation page"
        );

        Ok(WeatherReading {
            temperature: obs.temperature,
            wind_speed: obs.wind_speed,
            observed_at: obs.observed_at,
        })
    }
}
