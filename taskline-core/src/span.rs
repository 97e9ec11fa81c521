use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};

use crate::keywords::{DateRole, Priority, TaskProperty};

/// Morning or afternoon half of a 12-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Meridiem {
    #[serde(rename = "AM", alias = "am")]
    Am,
    #[serde(rename = "PM", alias = "pm")]
    Pm,
}

impl Meridiem {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "am" => Some(Meridiem::Am),
            "pm" => Some(Meridiem::Pm),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Meridiem::Am => Meridiem::Pm,
            Meridiem::Pm => Meridiem::Am,
        }
    }

    /// Converts a 12-hour clock hour (1-12) into 0-23.
    pub fn to_24h(self, hour: u32) -> u32 {
        match (self, hour) {
            (Meridiem::Am, 12) => 0,
            (Meridiem::Pm, 12) => 12,
            (Meridiem::Am, h) => h,
            (Meridiem::Pm, h) => h + 12,
        }
    }
}

/// A wall clock time. Seconds are kept only when the source text had them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
    pub second: Option<u32>,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32, second: Option<u32>) -> Option<Self> {
        if hour > 23 || minute > 59 || second.is_some_and(|s| s > 59) {
            return None;
        }
        Some(Self {
            hour,
            minute,
            second,
        })
    }

    /// Parses `HH:MM` or `HH:MM:SS`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(':');
        let hour = parts.next()?.parse().ok()?;
        let minute = parts.next()?.parse().ok()?;
        let second = match parts.next() {
            Some(sec) => Some(sec.parse().ok()?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        Self::new(hour, minute, second)
    }

    pub fn seconds_from_midnight(&self) -> u32 {
        self.hour * 3600 + self.minute * 60 + self.second.unwrap_or(0)
    }

    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, self.second.unwrap_or(0))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)?;
        if let Some(second) = self.second {
            write!(f, ":{second:02}")?;
        }
        Ok(())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// The range ends on the following day (e.g. `23:00-01:00`).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub next_day: bool,
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)?;
        if self.next_day {
            write!(f, " (+1d)")?;
        }
        Ok(())
    }
}

/// A calendar date with an optional time, as written after a date marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue {
    pub date: NaiveDate,
    pub time: Option<TimeOfDay>,
}

impl DateValue {
    pub fn on(date: NaiveDate) -> Self {
        Self { date, time: None }
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))?;
        if let Some(time) = self.time {
            write!(f, " {time}")?;
        }
        Ok(())
    }
}

impl Serialize for DateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "role")]
pub enum SpanKind {
    Tag,
    DataviewField,
    DateMarker(DateRole),
    DateKeyword(DateRole),
    SingleTime,
    TimeRange,
    Priority,
    TaskProperty(TaskProperty),
    BlockReference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum ParsedValue {
    Date(DateValue),
    Time(TimeOfDay),
    Range(TimeRange),
    Priority(Priority),
    Tag(String),
    Text(String),
    Field { key: String, value: String },
}

/// Clock components exactly as written, before any format policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClockReading {
    pub hour: u32,
    pub minute: u32,
    pub second: Option<u32>,
    pub meridiem: Option<Meridiem>,
}

/// Raw components recorded by the extractor for the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum Capture {
    #[default]
    None,
    Text(String),
    Field {
        key: String,
        value: String,
    },
    Date {
        date: String,
        time: Option<String>,
    },
    Clock(ClockReading),
    ClockRange(ClockReading, ClockReading),
}

/// A recognized token: where it sits in the raw line and what it means.
///
/// `start..end` is a half-open byte range into the raw line. For date keywords
/// and times the range includes an absorbed role keyword (`due tomorrow`,
/// `at 2:30 PM`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSpan {
    pub kind: SpanKind,
    pub start: usize,
    pub end: usize,
    pub raw: String,
    /// Role keyword written in front of a time, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<DateRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ParsedValue>,
    #[serde(skip)]
    pub(crate) capture: Capture,
}

impl MetadataSpan {
    pub(crate) fn new(kind: SpanKind, line: &str, start: usize, end: usize) -> Self {
        Self {
            kind,
            start,
            end,
            raw: line[start..end].to_string(),
            context: None,
            value: None,
            capture: Capture::None,
        }
    }

    pub(crate) fn with_capture(mut self, capture: Capture) -> Self {
        self.capture = capture;
        self
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &MetadataSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}
