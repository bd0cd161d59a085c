//! Wall-clock cadence prediction for the webcam source.
//!
//! The camera publishes on fixed minutes of the hour. Knowing that, a
//! detection can be backdated to the boundary it belongs to, and clients can
//! be told when the next frame is due.

use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};

/// Predicts where `now` sits relative to a source's publish boundaries.
pub trait CadencePredictor: Send + Sync {
    /// Length of one publish cycle in seconds.
    fn period_secs(&self) -> i64;

    /// Seconds elapsed since the most recent boundary at or before `now`.
    fn seconds_since_boundary(&self, now: DateTime<Utc>) -> i64;

    /// Seconds until the next predicted boundary.
    fn next_poll_hint(&self, now: DateTime<Utc>) -> i64 {
        self.period_secs() - self.seconds_since_boundary(now)
    }

    /// Time to record for a frame first seen at `now`.
    fn backdate(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let since = TimeDelta::try_seconds(self.seconds_since_boundary(now)).unwrap_or_default();
        floor_minute(now - since)
    }
}

/// Publishes on minutes `m` where `m % period_minutes == phase_minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteCadence {
    period_minutes: u32,
    phase_minute: u32,
}

impl MinuteCadence {
    pub fn new(period_minutes: u32, phase_minute: u32) -> Self {
        let period_minutes = period_minutes.max(1);
        Self {
            period_minutes,
            phase_minute: phase_minute % period_minutes,
        }
    }

    /// Whole minutes back from `minute` to the nearest boundary minute.
    fn steps_back(&self, minute: u32) -> u32 {
        (minute + self.period_minutes - self.phase_minute % self.period_minutes)
            % self.period_minutes
    }
}

impl Default for MinuteCadence {
    fn default() -> Self {
        Self::new(5, 1)
    }
}

impl CadencePredictor for MinuteCadence {
    fn period_secs(&self) -> i64 {
        i64::from(self.period_minutes) * 60
    }

    fn seconds_since_boundary(&self, now: DateTime<Utc>) -> i64 {
        i64::from(self.steps_back(now.minute())) * 60
    }
}

fn floor_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(TimeDelta::minutes(1)).unwrap_or(t)
}
