//! Common types for stemsplice
//!
//! Identifiers, time ranges and colors shared by the timeline model, the
//! planner and the reconciler. All times are timeline seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance used when comparing timeline positions (in seconds)
///
/// Two positions closer than this are treated as the same point, e.g. a
/// split requested exactly at an item's edge is skipped.
pub const TIME_EPSILON: f64 = 1e-9;

/// Stable identifier of a track in the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Stable identifier of a media item in the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// A half-open interval `[start, end)` on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Create a range, returning `None` unless `start < end`
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if start.is_finite() && end.is_finite() && start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Length of the range in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// True if `[start, end)` shares a non-empty interval with this range
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        start < self.end - TIME_EPSILON && end > self.start + TIME_EPSILON
    }

    /// True if `[start, end)` lies completely inside this range
    pub fn contains(&self, start: f64, end: f64) -> bool {
        start >= self.start - TIME_EPSILON && end <= self.end + TIME_EPSILON
    }

    /// Intersection with `[start, end)`, if non-empty
    pub fn intersect(&self, start: f64, end: f64) -> Option<TimeRange> {
        TimeRange::new(self.start.max(start), self.end.min(end))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s-{:.3}s", self.start, self.end)
    }
}

/// Error returned when parsing a `START:END` range string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid time range '{0}' (expected START:END in seconds with START < END)")]
pub struct ParseRangeError(pub String);

impl FromStr for TimeRange {
    type Err = ParseRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once(':')
            .ok_or_else(|| ParseRangeError(s.to_string()))?;
        let start: f64 = start.trim().parse().map_err(|_| ParseRangeError(s.to_string()))?;
        let end: f64 = end.trim().parse().map_err(|_| ParseRangeError(s.to_string()))?;
        TimeRange::new(start, end).ok_or_else(|| ParseRangeError(s.to_string()))
    }
}

/// 24-bit RGB color, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Error returned when parsing a `#RRGGBB` color
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid color '{0}' (expected #RRGGBB)")]
pub struct ParseColorError(pub String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ParseColorError(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ParseColorError(s.to_string()))
        };
        Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Color {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}
