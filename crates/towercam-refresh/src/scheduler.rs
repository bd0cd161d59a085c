//! Per-request refresh pass.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};

use towercam_sources::{FetchError, ImageFetcher, TowerFrame, WeatherFetcher, WeatherReading};
use towercam_store::{FreshnessRecord, FreshnessStore, Observation, Source, SourceValue};

use crate::artifacts::ArtifactPaths;
use crate::cadence::CadencePredictor;
use crate::error::RefreshError;

/// Staleness window and retry throttle for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePolicy {
    pub update_interval: TimeDelta,
    pub attempt_interval: TimeDelta,
}

impl SourcePolicy {
    pub fn from_secs(update_interval_secs: u64, attempt_interval_secs: u64) -> Self {
        Self {
            update_interval: secs(update_interval_secs),
            attempt_interval: secs(attempt_interval_secs),
        }
    }
}

fn secs(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Everything the scheduler needs to know besides its collaborators.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub weather: SourcePolicy,
    pub image: SourcePolicy,
    pub fetch_timeout: Duration,
    /// Lower bound for the client poll hint.
    pub min_poll_secs: i64,
}

impl SchedulerConfig {
    pub fn policy(&self, source: Source) -> SourcePolicy {
        match source {
            Source::Weather => self.weather,
            Source::Image => self.image,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            weather: SourcePolicy::from_secs(3600, 300),
            image: SourcePolicy::from_secs(300, 60),
            fetch_timeout: Duration::from_secs(10),
            min_poll_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Still within the update interval.
    Skip,
    /// Stale, but the last attempt is too recent to try again.
    SkipThrottled,
    Attempt,
}

impl fmt::Display for RefreshDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::SkipThrottled => "skip-throttled",
            Self::Attempt => "attempt",
        })
    }
}

/// Decide whether a source is due for an attempt at `now`.
///
/// Stale means no success yet, or `last_success + update_interval < now`.
/// A stale source is throttled while `last_attempt + attempt_interval >= now`.
pub fn decide(
    last_success: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    policy: SourcePolicy,
    now: DateTime<Utc>,
) -> RefreshDecision {
    let stale = match last_success {
        None => true,
        Some(t) => t
            .checked_add_signed(policy.update_interval)
            .is_some_and(|fresh_until| fresh_until < now),
    };
    if !stale {
        return RefreshDecision::Skip;
    }

    let throttled = match last_attempt {
        None => false,
        Some(t) => t
            .checked_add_signed(policy.attempt_interval)
            .map_or(true, |retry_after| retry_after >= now),
    };
    if throttled {
        RefreshDecision::SkipThrottled
    } else {
        RefreshDecision::Attempt
    }
}

/// Seconds until a client should poll again.
///
/// The smaller of the time until weather goes stale and the time until the
/// next predicted frame, but never below `min_poll_secs`.
pub fn poll_hint(
    record: &FreshnessRecord,
    now: DateTime<Utc>,
    weather: SourcePolicy,
    cadence: &dyn CadencePredictor,
    min_poll_secs: i64,
) -> i64 {
    let until_weather_stale = match record.last_weather_success {
        Some(t) => t
            .checked_add_signed(weather.update_interval)
            .map_or(i64::MAX, |stale_at| (stale_at - now).num_seconds()),
        None => weather.attempt_interval.num_seconds(),
    };

    until_weather_stale
        .min(cadence.next_poll_hint(now))
        .max(min_poll_secs)
}

/// What happened to one source during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub decision: RefreshDecision,
    /// A strictly newer value was merged into the record.
    pub merged: bool,
    /// Text of the fetch failure, if the attempt failed.
    pub failure: Option<String>,
}

impl SourceReport {
    fn skipped(decision: RefreshDecision) -> Self {
        Self {
            decision,
            merged: false,
            failure: None,
        }
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub now: DateTime<Utc>,
    pub weather: SourceReport,
    pub image: SourceReport,
    /// The record as it stands after this pass.
    pub record: FreshnessRecord,
    pub poll_hint_secs: i64,
}

impl CycleReport {
    /// True iff either source merged a new value this pass.
    pub fn needs_rebuild(&self) -> bool {
        self.weather.merged || self.image.merged
    }

    pub fn source(&self, source: Source) -> &SourceReport {
        match source {
            Source::Weather => &self.weather,
            Source::Image => &self.image,
        }
    }
}

/// Runs the freshness check and any due fetches for both sources.
pub struct RefreshScheduler {
    store: Arc<dyn FreshnessStore>,
    weather: Arc<dyn WeatherFetcher>,
    image: Arc<dyn ImageFetcher>,
    cadence: Arc<dyn CadencePredictor>,
    paths: ArtifactPaths,
    config: SchedulerConfig,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<dyn FreshnessStore>,
        weather: Arc<dyn WeatherFetcher>,
        image: Arc<dyn ImageFetcher>,
        cadence: Arc<dyn CadencePredictor>,
        paths: ArtifactPaths,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            weather,
            image,
            cadence,
            paths,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Client poll hint for `record` at `now`.
    pub fn poll_hint(&self, record: &FreshnessRecord, now: DateTime<Utc>) -> i64 {
        poll_hint(
            record,
            now,
            self.config.weather,
            self.cadence.as_ref(),
            self.config.min_poll_secs,
        )
    }

    /// Run one pass with `now` as the only clock reading.
    ///
    /// `now` is truncated to whole seconds, the resolution the store keeps,
    /// so decisions and stored stamps agree. Fetch failures are recorded and
    /// reported; only store failures and artifact I/O abort the pass.
    #[instrument(skip(self), level = "debug")]
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, RefreshError> {
        let now = now.trunc_subsecs(0);
        let before = self.store.get_record()?;

        let weather_decision = self.decision_for(Source::Weather, &before, now);
        let image_decision = self.decision_for(Source::Image, &before, now);

        let (weather, image) = tokio::join!(
            self.run_weather(weather_decision, now),
            self.run_image(image_decision, &before, now),
        );
        let (weather, image) = (weather?, image?);

        let record = if weather.decision == RefreshDecision::Attempt
            || image.decision == RefreshDecision::Attempt
        {
            self.store.get_record()?
        } else {
            before
        };

        let poll_hint_secs = self.poll_hint(&record, now);
        Ok(CycleReport {
            now,
            weather,
            image,
            record,
            poll_hint_secs,
        })
    }

    fn decision_for(
        &self,
        source: Source,
        record: &FreshnessRecord,
        now: DateTime<Utc>,
    ) -> RefreshDecision {
        let decision = decide(
            record.last_success(source),
            record.last_attempt(source),
            self.config.policy(source),
            now,
        );
        debug!(
            %source,
            %decision,
            last_success = ?record.last_success(source),
            last_attempt = ?record.last_attempt(source),
            "Refresh decision"
        );
        decision
    }

    async fn run_weather(
        &self,
        decision: RefreshDecision,
        now: DateTime<Utc>,
    ) -> Result<SourceReport, RefreshError> {
        if decision != RefreshDecision::Attempt {
            return Ok(SourceReport::skipped(decision));
        }

        let reading = with_timeout(self.config.fetch_timeout, self.weather.fetch_weather()).await;
        match reading {
            Ok(WeatherReading {
                temperature,
                wind_speed,
                observed_at,
            }) => {
                let observation = Observation::new(
                    SourceValue::Weather {
                        temperature,
                        wind_speed,
                    },
                    observed_at,
                );
                let merged =
                    self.store
                        .commit_attempt(Source::Weather, now, Some(&observation))?;
                if merged {
                    info!(temperature, wind_speed, %observed_at, "Merged weather reading");
                } else {
                    debug!(%observed_at, "Weather reading not newer than stored one");
                }
                Ok(SourceReport {
                    decision,
                    merged,
                    failure: None,
                })
            }
            Err(e) => self.record_failure(Source::Weather, now, e),
        }
    }

    async fn run_image(
        &self,
        decision: RefreshDecision,
        before: &FreshnessRecord,
        now: DateTime<Utc>,
    ) -> Result<SourceReport, RefreshError> {
        if decision != RefreshDecision::Attempt {
            return Ok(SourceReport::skipped(decision));
        }

        let frame = match with_timeout(self.config.fetch_timeout, self.image.fetch_image()).await {
            Ok(frame) => frame,
            Err(e) => return self.record_failure(Source::Image, now, e),
        };

        let checksum = frame.checksum();
        if checksum == before.image_checksum {
            debug!(%checksum, "Tower frame unchanged");
            self.store.commit_attempt(Source::Image, now, None)?;
            return Ok(SourceReport {
                decision,
                merged: false,
                failure: None,
            });
        }

        self.merge_frame(frame, checksum, now).map(|merged| SourceReport {
            decision,
            merged,
            failure: None,
        })
    }

    fn merge_frame(
        &self,
        frame: TowerFrame,
        checksum: String,
        now: DateTime<Utc>,
    ) -> Result<bool, RefreshError> {
        let raw_path = self.paths.raw_frame();
        let staged = self
            .paths
            .stage_frame(&frame.bytes)
            .map_err(RefreshError::io(raw_path))?;

        let observed_at = self.cadence.backdate(now);
        let observation = Observation::new(SourceValue::Image { checksum }, observed_at);
        let merged = self
            .store
            .commit_attempt(Source::Image, now, Some(&observation))?;

        if merged {
            staged.commit().map_err(RefreshError::io(raw_path))?;
            info!(%observed_at, fetched_at = %frame.observed_at, "Merged new tower frame");
        } else {
            debug!(%observed_at, "Tower frame not newer than stored one");
        }
        Ok(merged)
    }

    fn record_failure(
        &self,
        source: Source,
        now: DateTime<Utc>,
        error: FetchError,
    ) -> Result<SourceReport, RefreshError> {
        warn!(%source, error = %error, "Fetch failed");
        self.store.commit_attempt(source, now, None)?;
        Ok(SourceReport {
            decision: RefreshDecision::Attempt,
            merged: false,
            failure: Some(error.to_string()),
        })
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fetch: impl std::future::Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::time::timeout(limit, fetch)
        .await
        .unwrap_or(Err(FetchError::Timeout))
}
