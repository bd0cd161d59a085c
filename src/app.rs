use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use towercam_core::Config;
use towercam_refresh::{
    ArtifactPaths, CompositeGate, CycleReport, MinuteCadence, RefreshError, RefreshScheduler,
    SchedulerConfig, SourcePolicy,
};
use towercam_render::AnnotatedFrameBuilder;
use towercam_sources::{MetOfficeFetcher, TowerCamFetcher};
use towercam_store::SqliteFreshnessStore;

/// Everything a request handler needs, built once from config
pub struct App {
    scheduler: RefreshScheduler,
    gate: CompositeGate,
    tz: Tz,
}

impl App {
    /// Wire the store, fetchers, scheduler and composite gate from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = &config.storage;
        std::fs::create_dir_all(&storage.data_dir).with_context(|| {
            format!("Failed to create data directory {}", storage.data_dir.display())
        })?;

        let store = Arc::new(
            SqliteFreshnessStore::new(storage.database_path())
                .context("Failed to open freshness store")?,
        );

        let tz = config.weather.tz()?;
        let timeout = config.fetch.timeout();
        let weather = MetOfficeFetcher::new(&config.weather.page_url, tz, timeout)
            .context("Failed to build weather client")?;
        let image = TowerCamFetcher::new(&config.tower.image_url, timeout)
            .context("Failed to build tower image client")?;

        let cadence = MinuteCadence::new(
            config.tower.cadence.period_minutes,
            config.tower.cadence.phase_minute,
        );
        let paths = ArtifactPaths::new(storage.raw_frame_path(), storage.composite_path());

        let scheduler_config = SchedulerConfig {
            weather: SourcePolicy::from_secs(
                config.weather.update_interval_secs,
                config.weather.attempt_interval_secs,
            ),
            image: SourcePolicy::from_secs(
                config.tower.update_interval_secs,
                config.tower.attempt_interval_secs,
            ),
            fetch_timeout: timeout,
            min_poll_secs: i64::try_from(config.display.min_poll_secs).unwrap_or(i64::MAX),
        };

        let builder =
            AnnotatedFrameBuilder::new(&config.display.temperature_unit, &config.display.wind_unit);

        tracing::info!(
            database = %storage.database_path().display(),
            weather_url = %config.weather.page_url,
            image_url = %config.tower.image_url,
            "Towercam wired up"
        );

        Ok(Self {
            scheduler: RefreshScheduler::new(
                store.clone(),
                Arc::new(weather),
                Arc::new(image),
                Arc::new(cadence),
                paths.clone(),
                scheduler_config,
            ),
            gate: CompositeGate::new(paths, Arc::new(builder), store),
            tz,
        })
    }

    /// One refresh pass at the current wall-clock time
    pub async fn refresh(&self) -> Result<CycleReport, RefreshError> {
        self.scheduler.run_cycle(Utc::now()).await
    }

    pub fn gate(&self) -> &CompositeGate {
        &self.gate
    }

    /// Poll hint to hand out when no pass could complete
    pub fn fallback_poll_secs(&self) -> i64 {
        self.scheduler.config().min_poll_secs
    }

    /// Format a stored timestamp in the source's local time
    pub fn local_time(&self, t: Option<DateTime<Utc>>) -> String {
        match t {
            Some(t) => t.with_timezone(&self.tz).format("%H:%M %a %d %b %Y").to_string(),
            None => "never".to_string(),
        }
    }
}
