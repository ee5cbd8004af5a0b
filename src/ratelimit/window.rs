//! Bucketed sliding window.
//!
//! A window is a fixed number of tumbling buckets, each `width` units of
//! `unit` long. `buckets[0]` always holds the bucket containing the anchor
//! (`updated`), and older buckets follow in order of age.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat,
    TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::timestamp::{normalize, parse_iso, TimestampInput};
use crate::config::{default_width, WindowConfig};
use crate::error::ValidationError;

/// Time granularity of a single bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// All supported units, finest first.
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
        TimeUnit::Week,
        TimeUnit::Month,
        TimeUnit::Year,
    ];

    /// The lowercase wire name of this unit.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }

    /// Length of one unit in seconds, for the units with a fixed length.
    ///
    /// Months and years are calendar units and return `None`.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            TimeUnit::Second => Some(1),
            TimeUnit::Minute => Some(60),
            TimeUnit::Hour => Some(3_600),
            TimeUnit::Day => Some(86_400),
            TimeUnit::Week => Some(604_800),
            TimeUnit::Month | TimeUnit::Year => None,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeUnit::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidUnit(s.to_string()))
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable state of a [`Window`], used for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Bucket values, newest first.
    pub buckets: Vec<f64>,
    /// ISO-8601 anchor timestamp, including offset.
    pub updated: String,
    /// Wire name of the bucket unit.
    pub unit: String,
    /// Number of units per bucket.
    #[serde(default = "default_width")]
    pub width: u32,
}

/// A fixed-length sequence of tumbling buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    buckets: Vec<f64>,
    updated: DateTime<FixedOffset>,
    unit: TimeUnit,
    width: u32,
}

impl Window {
    /// Build an all-zero window anchored at the current time.
    pub fn from_config(config: &WindowConfig) -> Result<Self, ValidationError> {
        Self::from_config_at(config, Utc::now().into())
    }

    /// Build an all-zero window anchored at `anchor`.
    pub fn from_config_at(
        config: &WindowConfig,
        anchor: DateTime<FixedOffset>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;

        Ok(Self {
            buckets: vec![0.0; config.size],
            updated: anchor,
            unit: config.unit,
            width: config.width,
        })
    }

    /// Rebuild a window from a persisted snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, ValidationError> {
        let unit = snapshot.unit.parse::<TimeUnit>()?;
        if snapshot.width == 0 {
            return Err(ValidationError::InvalidWidth);
        }
        if snapshot.buckets.is_empty() {
            return Err(ValidationError::EmptyBuckets);
        }
        if let Some((index, &value)) = snapshot
            .buckets
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(ValidationError::InvalidBucket { index, value });
        }
        let updated = parse_iso(&snapshot.updated)
            .ok_or_else(|| ValidationError::InvalidUpdated(snapshot.updated.clone()))?;

        Ok(Self {
            buckets: snapshot.buckets,
            updated,
            unit,
            width: snapshot.width,
        })
    }

    /// Add `value` at `timestamp`, rotating the buckets forward first.
    pub fn update(
        &mut self,
        value: f64,
        timestamp: impl Into<TimestampInput>,
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotANumber);
        }
        if value < 0.0 {
            return Err(ValidationError::NegativeValue(value));
        }
        let timestamp = normalize(timestamp)?;

        self.advance_to(timestamp);
        self.buckets[0] += value;
        Ok(())
    }

    /// Rotate the buckets to `timestamp` without adding anything.
    ///
    /// Returns the number of buckets that were shifted out.
    pub fn advance(&mut self, timestamp: impl Into<TimestampInput>) -> Result<usize, ValidationError> {
        let timestamp = normalize(timestamp)?;
        Ok(self.advance_to(timestamp))
    }

    fn advance_to(&mut self, timestamp: DateTime<FixedOffset>) -> usize {
        let shifted = self.recalculate(timestamp);
        if timestamp > self.updated {
            self.updated = timestamp;
        } else if timestamp < self.updated {
            debug!(
                timestamp = %timestamp,
                anchor = %self.updated,
                "Late timestamp absorbed into current bucket"
            );
        }
        shifted
    }

    /// Shift the buckets by the number of bucket widths elapsed between the
    /// aligned window start and `timestamp`.
    ///
    /// Timestamps before the anchor never rotate. A shift of at least the
    /// window length clears every bucket.
    pub fn recalculate(&mut self, timestamp: DateTime<FixedOffset>) -> usize {
        let elapsed = self.elapsed_buckets(timestamp, self.start());
        if elapsed == 0 {
            return 0;
        }

        let shift = elapsed.min(self.buckets.len());
        self.buckets.rotate_right(shift);
        self.buckets[..shift].fill(0.0);

        trace!(
            elapsed = elapsed,
            shift = shift,
            unit = %self.unit,
            width = self.width,
            "Rotated window buckets"
        );
        shift
    }

    /// Whole bucket widths between `start` and `now`; zero when `now` is
    /// less than one width past `start`.
    pub fn elapsed_buckets(&self, now: DateTime<FixedOffset>, start: DateTime<FixedOffset>) -> usize {
        let whole = whole_units(self.unit, start, now);
        let width = i64::from(self.width);
        if whole < width {
            return 0;
        }
        usize::try_from(whole / width).unwrap_or(usize::MAX)
    }

    /// The anchor aligned down to its tumbling bucket boundary.
    pub fn start(&self) -> DateTime<FixedOffset> {
        let anchor = self.updated;
        aligned_local(anchor.naive_local(), self.unit, i64::from(self.width))
            .and_then(|naive| anchor.offset().from_local_datetime(&naive).single())
            .unwrap_or(anchor)
    }

    /// Sum of all buckets.
    pub fn value_of(&self) -> f64 {
        self.buckets.iter().sum()
    }

    /// Copy the state into its persisted form.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            buckets: self.buckets.clone(),
            updated: self.updated.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            unit: self.unit.as_str().to_string(),
            width: self.width,
        }
    }

    /// Bucket values, newest first.
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// `true` if there are no buckets, which validated windows never are.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Unit of time covered by one bucket.
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Units per bucket.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The anchor: the latest instant the window was advanced to.
    pub fn updated(&self) -> DateTime<FixedOffset> {
        self.updated
    }
}

impl TryFrom<Snapshot> for Window {
    type Error = ValidationError;

    fn try_from(snapshot: Snapshot) -> Result<Self, Self::Error> {
        Window::from_snapshot(snapshot)
    }
}

impl From<&Window> for Snapshot {
    fn from(window: &Window) -> Self {
        window.to_snapshot()
    }
}

/// Truncate `time` to the start of its unit, then down to a multiple of
/// `width` within the enclosing unit.
///
/// Day of month, ISO week and month are 1-based, so they are aligned on
/// their zero-based ordinal to keep boundaries inside the enclosing period.
fn aligned_local(time: NaiveDateTime, unit: TimeUnit, width: i64) -> Option<NaiveDateTime> {
    let date = time.date();
    let down = |v: u32| v - (i64::from(v) % width) as u32;

    match unit {
        TimeUnit::Second => date.and_hms_opt(time.hour(), time.minute(), down(time.second())),
        TimeUnit::Minute => date.and_hms_opt(time.hour(), down(time.minute()), 0),
        TimeUnit::Hour => date.and_hms_opt(down(time.hour()), 0, 0),
        TimeUnit::Day => date
            .with_day0(down(date.day0()))
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        TimeUnit::Week => {
            let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            let weeks_back = i64::from(date.iso_week().week0()) % width;
            (monday - Duration::weeks(weeks_back)).and_hms_opt(0, 0, 0)
        }
        TimeUnit::Month => NaiveDate::from_ymd_opt(date.year(), down(date.month0()) + 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        TimeUnit::Year => {
            let year = i64::from(date.year());
            let year = i32::try_from(year - year.rem_euclid(width)).ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    }
}

/// Whole units elapsed from `start` to `now`, negative when `now` is earlier.
///
/// `start` is expected to sit on a unit boundary, which makes the calendar
/// difference for months and years exact.
fn whole_units(unit: TimeUnit, start: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> i64 {
    match unit.fixed_seconds() {
        Some(secs) => (now - start).num_seconds().div_euclid(secs),
        None => {
            let now = now.with_timezone(start.offset());
            let months = (i64::from(now.year()) - i64::from(start.year())) * 12
                + i64::from(now.month0())
                - i64::from(start.month0());
            match unit {
                TimeUnit::Year => months.div_euclid(12),
                _ => months,
            }
        }
    }
}
