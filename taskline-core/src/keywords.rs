use chrono::{Months, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter, EnumString};

use crate::config::DateKeywords;

/// What a date means for the task.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    AsRefStr,
    EnumString,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DateRole {
    Start,
    Scheduled,
    Due,
    Completed,
    Cancelled,
    Created,
}

impl<'de> Deserialize<'de> for DateRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown date role '{name}'")))
    }
}

impl DateRole {
    /// Symbol written in front of a date when no configuration overrides it.
    pub fn default_symbol(self) -> &'static str {
        match self {
            DateRole::Start => "🛫",
            DateRole::Scheduled => "⏳",
            DateRole::Due => "📅",
            DateRole::Completed => "✅",
            DateRole::Cancelled => "❌",
            DateRole::Created => "➕",
        }
    }
}

/// Role precedence when several keywords sit in front of a date phrase.
pub(crate) const DATE_ROLE_PRECEDENCE: &[DateRole] =
    &[DateRole::Start, DateRole::Due, DateRole::Scheduled];

/// Role precedence when several keywords sit in front of a time.
pub(crate) const TIME_ROLE_PRECEDENCE: &[DateRole] =
    &[DateRole::Start, DateRole::Scheduled, DateRole::Due];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    AsRefStr,
    EnumString,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Lowest = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    Highest = 5,
}

impl Priority {
    pub fn symbol(self) -> &'static str {
        match self {
            Priority::Highest => "🔺",
            Priority::High => "⏫",
            Priority::Medium => "🔼",
            Priority::Low => "🔽",
            Priority::Lowest => "⏬",
        }
    }

    /// Maps a priority marker (with or without the emoji variation selector).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let symbol = symbol.trim_end_matches('\u{FE0F}');
        Priority::iter().find(|p| p.symbol() == symbol)
    }

    /// Reads the loose labels people put in `[priority:: ...]` fields.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "urgent" | "critical" | "5" => Some(Priority::Highest),
            "important" | "4" => Some(Priority::High),
            "normal" | "moderate" | "3" => Some(Priority::Medium),
            "minor" | "2" => Some(Priority::Low),
            "trivial" | "1" => Some(Priority::Lowest),
            other => other.parse().ok().or_else(|| Self::from_symbol(other)),
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

/// Task relations and recurrence carried by their own markers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    AsRefStr,
    EnumString,
    Serialize,
)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum TaskProperty {
    Id,
    DependsOn,
    OnCompletion,
    Repeat,
}

impl TaskProperty {
    pub fn symbol(self) -> &'static str {
        match self {
            TaskProperty::Id => "🆔",
            TaskProperty::DependsOn => "⛔",
            TaskProperty::OnCompletion => "🏁",
            TaskProperty::Repeat => "🔁",
        }
    }

    /// Regex fragment for the value written after the symbol.
    pub(crate) fn value_pattern(self) -> &'static str {
        match self {
            TaskProperty::Id | TaskProperty::OnCompletion => r"[\w-]+",
            TaskProperty::DependsOn => r"[\w-]+(?:\s*,\s*[\w-]+)*",
            TaskProperty::Repeat => r"[A-Za-z][A-Za-z0-9 ,-]*",
        }
    }

    /// Canonical form of a written value. Dependency lists lose their padding.
    pub fn canonical(self, value: &str) -> Option<String> {
        let value = match self {
            TaskProperty::DependsOn => value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .collect::<Vec<_>>()
                .join(","),
            _ => value.trim().to_string(),
        };
        (!value.is_empty()).then_some(value)
    }
}

/// Languages with a relative date grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Language {
    En,
    Zh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unit {
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    /// Moves `reference` by `count` units. Months clamp to the last day.
    pub fn shift(self, reference: NaiveDate, count: i64) -> Option<NaiveDate> {
        match self {
            Unit::Day => reference.checked_add_signed(chrono::Duration::try_days(count)?),
            Unit::Week => reference.checked_add_signed(chrono::Duration::try_weeks(count)?),
            Unit::Month => add_months(reference, count),
            Unit::Year => add_months(reference, count.checked_mul(12)?),
        }
    }
}

fn add_months(reference: NaiveDate, count: i64) -> Option<NaiveDate> {
    let months = Months::new(u32::try_from(count.unsigned_abs()).ok()?);
    if count >= 0 {
        reference.checked_add_months(months)
    } else {
        reference.checked_sub_months(months)
    }
}

pub(crate) const EN_DAY_OFFSETS: &[(&str, i64)] = &[
    ("day after tomorrow", 2),
    ("day before yesterday", -2),
    ("today", 0),
    ("tonight", 0),
    ("tomorrow", 1),
    ("yesterday", -1),
];

pub(crate) const EN_SHIFTS: &[(&str, i64)] =
    &[("next", 1), ("last", -1), ("this", 0), ("coming", 0)];

pub(crate) const EN_UNITS: &[(&str, Unit)] = &[
    ("days", Unit::Day),
    ("day", Unit::Day),
    ("weeks", Unit::Week),
    ("week", Unit::Week),
    ("months", Unit::Month),
    ("month", Unit::Month),
    ("years", Unit::Year),
    ("year", Unit::Year),
];

pub(crate) const EN_WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

pub(crate) const ZH_DAY_OFFSETS: &[(&str, i64)] = &[
    ("大后天", 3),
    ("后天", 2),
    ("明天", 1),
    ("今天", 0),
    ("昨天", -1),
    ("前天", -2),
];

pub(crate) const ZH_SHIFTS: &[(&str, i64)] = &[("下", 1), ("上", -1), ("这", 0), ("本", 0)];

pub(crate) const ZH_UNITS: &[(&str, Unit)] = &[
    ("天", Unit::Day),
    ("星期", Unit::Week),
    ("礼拜", Unit::Week),
    ("周", Unit::Week),
    ("月", Unit::Month),
    ("年", Unit::Year),
];

pub(crate) const ZH_WEEKDAYS: &[(&str, Weekday)] = &[
    ("一", Weekday::Mon),
    ("二", Weekday::Tue),
    ("三", Weekday::Wed),
    ("四", Weekday::Thu),
    ("五", Weekday::Fri),
    ("六", Weekday::Sat),
    ("日", Weekday::Sun),
    ("天", Weekday::Sun),
];

pub(crate) const ZH_YEARS: &[(&str, i64)] = &[("明年", 1), ("去年", -1), ("今年", 0)];

/// Case-insensitive lookup in one of the grammar tables.
pub(crate) fn lookup<T: Copy>(table: &[(&str, T)], word: &str) -> Option<T> {
    let word = word.trim().to_lowercase();
    table
        .iter()
        .find(|(w, _)| *w == word)
        .map(|&(_, value)| value)
}

/// Words of a grammar table joined as a regex alternation, longest first.
pub(crate) fn alternation<T>(table: &[(&str, T)]) -> String {
    let mut words: Vec<&str> = table.iter().map(|(w, _)| *w).collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    words
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|")
}

/// Role keywords (`due`, `start`, `截止`, ...) that can sit in front of a date or time.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    /// Lowercased keyword and its role, longest first.
    entries: Vec<(String, DateRole)>,
}

impl KeywordTable {
    pub fn new(keywords: &DateKeywords) -> Self {
        let mut entries: Vec<(String, DateRole)> = Vec::new();
        for (role, words) in [
            (DateRole::Start, &keywords.start),
            (DateRole::Scheduled, &keywords.scheduled),
            (DateRole::Due, &keywords.due),
        ] {
            for word in words {
                let word = word.trim().to_lowercase();
                if word.is_empty() || entries.iter().any(|(w, _)| *w == word) {
                    continue;
                }
                entries.push((word, role));
            }
        }
        entries.sort_by_key(|(w, _)| std::cmp::Reverse(w.len()));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the keyword that ends right before byte `start` of `line`.
    ///
    /// Whitespace between keyword and token is skipped. Keywords ending in an
    /// ASCII letter need that whitespace; keywords starting with one need a
    /// non-word character (or `floor`) in front. CJK keywords may touch the token.
    /// Returns the role and the keyword's start offset.
    pub fn keyword_before(&self, line: &str, floor: usize, start: usize) -> Option<(DateRole, usize)> {
        let before = line.get(floor..start)?;
        let trimmed = before.trim_end();
        let gap = before.len() - trimmed.len();

        for (word, role) in &self.entries {
            let Some(at) = trimmed.len().checked_sub(word.len()) else {
                continue;
            };
            if !trimmed.is_char_boundary(at) || trimmed[at..].to_lowercase() != *word {
                continue;
            }
            let ascii_tail = word.chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric());
            if ascii_tail && gap == 0 {
                continue;
            }
            let ascii_head = word.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
            if ascii_head {
                let prev = trimmed[..at].chars().next_back();
                if prev.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '#') {
                    continue;
                }
            }
            return Some((*role, floor + at));
        }
        None
    }

    /// Absorbs a chain of keywords in front of `start` (`due on friday`) and
    /// picks the role by `precedence`. Returns the role and the new start.
    pub fn absorb(
        &self,
        line: &str,
        floor: usize,
        start: usize,
        precedence: &[DateRole],
    ) -> Option<(DateRole, usize)> {
        let mut found = Vec::new();
        let mut cursor = start;
        while let Some((role, at)) = self.keyword_before(line, floor, cursor) {
            found.push(role);
            cursor = at;
        }
        let role = precedence
            .iter()
            .find(|r| found.contains(r))
            .copied()
            .or_else(|| found.first().copied())?;
        Some((role, cursor))
    }
}
