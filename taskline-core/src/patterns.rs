//! Token pattern library.
//!
//! Fixed token shapes are compiled once into statics. Everything that depends on
//! configuration (marker symbols, clock matchers, separators, languages, synonyms)
//! is compiled into a [`PatternSet`] when an engine is built.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use strum::IntoEnumIterator;

use crate::config::{EngineConfig, MatcherSpec, TimePatterns};
use crate::error::ConfigError;
use crate::keywords::{
    DateRole, EN_DAY_OFFSETS, EN_SHIFTS, EN_UNITS, EN_WEEKDAYS, KeywordTable, Language,
    TaskProperty, ZH_DAY_OFFSETS, ZH_SHIFTS, ZH_UNITS, ZH_WEEKDAYS, ZH_YEARS, alternation,
};

/// `- [ ] `, `* [x] `, `1. [/] ` ... Group 1 is the list marker, group 2 the status.
pub static TASK_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s|\t]*([-*+]|\d+\.)\s\[(.)\]\s*").expect("valid regex"));

/// Trailing `^block-id`. Needs whitespace (or line start) in front.
pub static BLOCK_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s+)(\^[\w-]+)\s*$").expect("valid regex"));

pub static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[\w-]+").expect("valid regex"));

/// `[key:: value]`
pub static DATAVIEW_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([a-zA-Z]+)::([^\]]*)\]").expect("valid regex"));

pub static PRIORITY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:🔺|⏫|🔼|🔽|⏬)\x{FE0F}?").expect("valid regex"));

/// `🆔 abc`, `⛔ a, b`, `🏁 delete`, `🔁 every week`, with the value in group `value`.
pub static TASK_PROPERTIES: Lazy<Vec<(TaskProperty, Regex)>> = Lazy::new(|| {
    TaskProperty::iter()
        .map(|property| {
            let pattern = format!(
                r"{}\x{{FE0F}}?\s*(?P<value>{})",
                regex::escape(property.symbol()),
                property.value_pattern()
            );
            (property, Regex::new(&pattern).expect("valid regex"))
        })
        .collect()
});

const MERIDIEM: &str = "AM|PM|am|pm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeridiemRule {
    Absent,
    Optional,
    Required,
}

/// One clock reading as a regex fragment with named groups `{tag}h`, `{tag}m`,
/// `{tag}s` and `{tag}p`.
fn clock(tag: &str, spec: MatcherSpec, meridiem: MeridiemRule) -> String {
    let (hour, seconds) = match spec {
        MatcherSpec::TwentyFourHour { seconds } => (r"[01]?\d|2[0-3]", seconds),
        MatcherSpec::TwelveHour { seconds } => (r"1[0-2]|0?[1-9]", seconds),
    };
    let mut pattern = format!(r"(?P<{tag}h>{hour}):(?P<{tag}m>[0-5]\d)");
    if seconds {
        pattern.push_str(&format!(r"(?::(?P<{tag}s>[0-5]\d))?"));
    }
    match meridiem {
        MeridiemRule::Absent => {}
        MeridiemRule::Optional => pattern.push_str(&format!(r"(?:\s*(?P<{tag}p>{MERIDIEM}))?")),
        MeridiemRule::Required => pattern.push_str(&format!(r"\s*(?P<{tag}p>{MERIDIEM})")),
    }
    pattern
}

fn single_time_pattern(spec: MatcherSpec) -> String {
    match spec {
        MatcherSpec::TwentyFourHour { .. } => clock("", spec, MeridiemRule::Absent),
        MatcherSpec::TwelveHour { .. } => clock("", spec, MeridiemRule::Required),
    }
}

fn time_range_pattern(spec: MatcherSpec, separators: &str) -> String {
    let (first, second) = match spec {
        MatcherSpec::TwentyFourHour { .. } => (MeridiemRule::Absent, MeridiemRule::Absent),
        MatcherSpec::TwelveHour { .. } => (MeridiemRule::Optional, MeridiemRule::Required),
    };
    format!(
        r"{}\s*(?:{separators})\s*{}",
        clock("a", spec, first),
        clock("b", spec, second)
    )
}

/// Separators as an alternation, longest first. Falls back to the defaults when empty.
fn separator_alternation(patterns: &TimePatterns) -> String {
    let mut seps: Vec<&str> = patterns
        .range_separators
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    let defaults = TimePatterns::default();
    if seps.is_empty() {
        warn!("no usable range separators configured, using the defaults");
        seps = defaults.range_separators.iter().map(String::as_str).collect();
    }
    seps.sort_by_key(|s| std::cmp::Reverse(s.len()));
    seps.dedup();
    seps.into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|")
}

fn en_grammar() -> String {
    let units = alternation(EN_UNITS);
    let weekdays = alternation(EN_WEEKDAYS);
    format!(
        r"(?P<offset>{offsets})|(?P<shift>{shifts})\s+(?:(?P<shift_unit>week|month|year)|(?P<shift_day>{weekdays}))|in\s+(?P<in_count>\d{{1,3}})\s+(?P<in_unit>{units})|(?P<later_count>\d{{1,3}})\s+(?P<later_unit>{units})\s+(?:later|from\s+now)|(?P<weekday>{weekdays})",
        offsets = alternation(EN_DAY_OFFSETS),
        shifts = alternation(EN_SHIFTS),
    )
}

fn zh_grammar() -> String {
    let shifts = alternation(ZH_SHIFTS);
    format!(
        r"(?P<zh_shift_day>{shifts})?个?(?:星期|礼拜|周)(?P<zh_weekday>{weekdays})|(?P<zh_count>\d{{1,3}})个?(?P<zh_count_unit>{units})(?:之后|以后|后|内)|(?P<zh_offset>{offsets})|(?P<zh_shift>{shifts})个?(?P<zh_shift_unit>星期|礼拜|周|月)|(?P<zh_year>{years})",
        weekdays = alternation(ZH_WEEKDAYS),
        units = alternation(ZH_UNITS),
        offsets = alternation(ZH_DAY_OFFSETS),
        years = alternation(ZH_YEARS),
    )
}

/// Relative date phrases of one language.
#[derive(Debug, Clone)]
pub struct RelativeGrammar {
    pub language: Language,
    /// Finds phrases inside a line.
    pub(crate) finder: Regex,
    /// Matches a whole phrase, used when resolving.
    pub(crate) exact: Regex,
}

impl RelativeGrammar {
    pub fn compile(language: Language) -> Result<Self, ConfigError> {
        let (body, bounded) = match language {
            Language::En => (en_grammar(), true),
            Language::Zh => (zh_grammar(), false),
        };
        let finder = if bounded {
            format!(r"(?i)\b(?:{body})\b")
        } else {
            format!(r"(?:{body})")
        };
        Ok(Self {
            language,
            finder: compile("relative date", &finder)?,
            exact: compile("relative date", &format!(r"(?i)^(?:{body})$"))?,
        })
    }
}

fn compile(what: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern { what, source })
}

/// Escaped alias with `\b` on the sides that are ASCII word characters.
fn bounded_literal(word: &str) -> String {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::new();
    if word.chars().next().is_some_and(is_word) {
        out.push_str(r"\b");
    }
    out.push_str(&regex::escape(word));
    if word.chars().next_back().is_some_and(is_word) {
        out.push_str(r"\b");
    }
    out
}

/// Patterns compiled from one configuration snapshot.
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub(crate) markers: Vec<(DateRole, Regex)>,
    pub(crate) single_time: Vec<Regex>,
    pub(crate) time_range: Vec<Regex>,
    pub(crate) grammars: Vec<RelativeGrammar>,
    pub(crate) synonym_finder: Option<Regex>,
    /// Lowercased alias -> canonical phrase.
    pub(crate) synonyms: HashMap<String, String>,
    pub(crate) keywords: KeywordTable,
}

impl PatternSet {
    pub fn compile(config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut markers = Vec::new();
        for (role, symbol) in &config.date_markers {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                warn!("empty marker symbol for '{}', ignoring", role.as_ref());
                continue;
            }
            let pattern = format!(
                r"{}\s*(?P<date>\d{{4}}-\d{{2}}-\d{{2}})(?:\s+(?P<time>\d{{2}}:\d{{2}}(?::\d{{2}})?))?",
                regex::escape(symbol)
            );
            markers.push((*role, compile("date marker", &pattern)?));
        }

        let single_time = config
            .time_patterns
            .single_time
            .iter()
            .map(|spec| compile("single time", &single_time_pattern(*spec)))
            .collect::<Result<Vec<_>, _>>()?;

        let separators = separator_alternation(&config.time_patterns);
        let time_range = config
            .time_patterns
            .time_range
            .iter()
            .map(|spec| compile("time range", &time_range_pattern(*spec, &separators)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut grammars = Vec::new();
        for code in &config.supported_languages {
            match code.parse::<Language>() {
                Ok(language) => grammars.push(RelativeGrammar::compile(language)?),
                Err(_) => warn!("no date grammar for language '{code}', ignoring"),
            }
        }

        let mut set = Self {
            markers,
            single_time,
            time_range,
            grammars,
            synonym_finder: None,
            synonyms: HashMap::new(),
            keywords: KeywordTable::new(&config.date_keywords),
        };
        set.load_synonyms(&config.synonyms)?;
        Ok(set)
    }

    /// True when some active grammar reads `phrase` as a whole.
    pub fn is_canonical(&self, phrase: &str) -> bool {
        let phrase = phrase.trim();
        self.grammars.iter().any(|g| g.exact.is_match(phrase))
    }

    /// Canonical phrase for a synonym, or the phrase itself.
    pub(crate) fn canonical<'a>(&'a self, phrase: &'a str) -> &'a str {
        self.synonyms
            .get(&phrase.trim().to_lowercase())
            .map(String::as_str)
            .unwrap_or(phrase)
    }

    /// Keeps aliases that are not canonical themselves and whose target resolves.
    fn load_synonyms(
        &mut self,
        synonyms: &BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        for (alias, target) in synonyms {
            let alias = alias.trim().to_lowercase();
            if alias.is_empty() || self.is_canonical(&alias) {
                warn!("synonym '{alias}' shadows a built-in phrase, ignoring");
                continue;
            }
            if !self.is_canonical(target) {
                warn!("synonym target '{target}' is not a known date phrase, ignoring");
                continue;
            }
            self.synonyms.insert(alias, target.trim().to_string());
        }
        if self.synonyms.is_empty() {
            return Ok(());
        }
        let mut aliases: Vec<&String> = self.synonyms.keys().collect();
        aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
        let body = aliases
            .into_iter()
            .map(|a| bounded_literal(a))
            .collect::<Vec<_>>()
            .join("|");
        self.synonym_finder = Some(compile("synonym", &format!("(?i){body}"))?);
        Ok(())
    }
}
