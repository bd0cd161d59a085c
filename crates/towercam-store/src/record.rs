use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two independently refreshed upstream sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Weather,
    Image,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Weather, Source::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The singleton row describing what we last knew about both sources.
///
/// Attempt stamps only ever move forward. Values only change together with
/// a strictly newer success stamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FreshnessRecord {
    pub last_weather_success: Option<DateTime<Utc>>,
    pub last_weather_attempt: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub wind_speed: i64,
    pub last_image_success: Option<DateTime<Utc>>,
    pub last_image_attempt: Option<DateTime<Utc>>,
    /// md5 hex of the last merged frame, empty until the first one
    pub image_checksum: String,
    /// Bumped by every merge of either source.
    pub merge_generation: i64,
    /// `merge_generation` of the record the current composite was built from.
    pub composite_generation: i64,
}

impl FreshnessRecord {
    pub fn last_success(&self, source: Source) -> Option<DateTime<Utc>> {
        match source {
            Source::Weather => self.last_weather_success,
            Source::Image => self.last_image_success,
        }
    }

    pub fn last_attempt(&self, source: Source) -> Option<DateTime<Utc>> {
        match source {
            Source::Weather => self.last_weather_attempt,
            Source::Image => self.last_image_attempt,
        }
    }

    /// Whether a frame has ever been merged.
    pub fn has_image(&self) -> bool {
        self.last_image_success.is_some()
    }

    /// A merge landed that no written composite reflects yet.
    pub fn composite_outdated(&self) -> bool {
        self.merge_generation > self.composite_generation
    }
}

/// A fetched value, without its timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SourceValue {
    Weather { temperature: f64, wind_speed: i64 },
    Image { checksum: String },
}

impl SourceValue {
    pub fn source(&self) -> Source {
        match self {
            Self::Weather { .. } => Source::Weather,
            Self::Image { .. } => Source::Image,
        }
    }
}

/// A value together with the instant it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: SourceValue,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(value: SourceValue, observed_at: DateTime<Utc>) -> Self {
        Self { value, observed_at }
    }

    pub fn source(&self) -> Source {
        self.value.source()
    }

    /// Newer-wins check against what the record holds for this source.
    pub fn is_newer_than(&self, record: &FreshnessRecord) -> bool {
        match record.last_success(self.source()) {
            None => true,
            Some(stored) => self.observed_at > stored,
        }
    }
}
