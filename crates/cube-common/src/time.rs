//! Time handling utilities: query ranges and time grouping.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// Parse an ISO 8601 timestamp, date or datetime, assuming UTC when no
/// offset is given.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Try date only
    if let Ok(ndt) = NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// An inclusive time range for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Parse "start/end" or a single instant.
    ///
    /// A bare date as the end of a range covers that whole day.
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        match s.split_once('/') {
            Some((start, end)) => {
                let start = parse_datetime(start.trim())?;
                let end_text = end.trim();
                let mut end = parse_datetime(end_text)?;
                if !end_text.contains('T') {
                    end = end + Duration::days(1) - Duration::nanoseconds(1);
                }
                if end < start {
                    return Err(TimeParseError::Inverted(s.to_string()));
                }
                Ok(Self::new(start, end))
            }
            None => {
                let instant = parse_datetime(s.trim())?;
                Ok(Self::new(instant, instant))
            }
        }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Rule deciding which datasets share one output time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGrouping {
    /// One time step per distinct acquisition time.
    #[default]
    Time,
    /// One time step per UTC calendar day.
    Day,
    /// One time step per local solar day at the footprint centre.
    SolarDay,
}

impl TimeGrouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGrouping::Time => "time",
            TimeGrouping::Day => "day",
            TimeGrouping::SolarDay => "solar_day",
        }
    }

    /// Output time step for a dataset acquired at `time` over `footprint`.
    pub fn bucket(&self, time: DateTime<Utc>, footprint: &BoundingBox) -> DateTime<Utc> {
        match self {
            TimeGrouping::Time => time,
            TimeGrouping::Day => start_of_day(time),
            TimeGrouping::SolarDay => {
                let (longitude, _) = footprint.center();
                let offset = Duration::seconds((longitude / 15.0 * 3600.0).round() as i64);
                start_of_day(time + offset)
            }
        }
    }
}

fn start_of_day(time: DateTime<Utc>) -> DateTime<Utc> {
    time.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(time)
}

impl fmt::Display for TimeGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeGrouping {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "time" => Ok(TimeGrouping::Time),
            "day" => Ok(TimeGrouping::Day),
            "solar_day" => Ok(TimeGrouping::SolarDay),
            other => Err(TimeParseError::UnknownGrouping(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Time range ends before it starts: {0}")]
    Inverted(String),

    #[error("Unknown time grouping: {0}")]
    UnknownGrouping(String),
}
