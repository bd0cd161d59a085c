use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed weather observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub temperature: f64,
    pub wind_speed: i64,
    pub observed_at: DateTime<Utc>,
}

/// A downloaded webcam frame
#[derive(Clone, PartialEq)]
pub struct TowerFrame {
    pub bytes: Vec<u8>,
    pub observed_at: DateTime<Utc>,
}

impl TowerFrame {
    /// md5 of the frame contents, lowercase hex
    pub fn checksum(&self) -> String {
        hex::encode(Md5::digest(&self.bytes))
    }
}

impl fmt::Debug for TowerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TowerFrame")
            .field("len", &self.bytes.len())
            .field("observed_at", &self.observed_at)
            .finish()
    }
}

/// Why a field could not be pulled out of the observation page
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("observation table not found")]
    TableNotFound,
    #[error("expected at least {0} rows")]
    TooFewRows(usize),
    #[error("no cell at column {0}")]
    MissingCell(usize),
    #[error("not a number: {0:?}")]
    NotANumber(String),
    #[error("unrecognised timestamp: {0:?}")]
    BadTimestamp(String),
    #[error("local time does not exist in source timezone: {0:?}")]
    NonexistentLocalTime(String),
}

/// Parse failure for one field of the observation page
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to read {field}: {kind}")]
pub struct ParseError {
    pub field: &'static str,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(field: &'static str, kind: ParseErrorKind) -> Self {
        Self { field, kind }
    }
}

/// Fetch failures. All of them are recovered by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Fetch timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(reqwest::Error),
    #[error("Upstream returned HTTP {0}")]
    Status(u16),
    #[error("Upstream returned an empty body")]
    EmptyBody,
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(e)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_checksum_is_md5_hex() {
        let frame = TowerFrame {
            bytes: Vec::new(),
            observed_at: Utc::now(),
        };
        assert_eq!(frame.checksum(), "d41d8cd98f00b204e9800998ecf8427e");

        let frame = TowerFrame {
            bytes: b"tower".to_vec(),
            observed_at: Utc::now(),
        };
        assert_eq!(frame.checksum().len(), 32);
        assert_ne!(frame.checksum(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("temperature", ParseErrorKind::NotANumber("n/a".into()));
        assert_eq!(err.to_string(), "failed to read temperature: not a number: \"n/a\"");
    }

    #[test]
    fn test_frame_debug_hides_bytes() {
        let frame = TowerFrame {
            bytes: vec![0xff; 4096],
            observed_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        let s = format!("{:?}", frame);
        assert!(s.contains("len: 4096"));
        assert!(!s.contains("255"));
    }
}
