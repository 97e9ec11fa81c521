use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};
use strum::IntoEnumIterator;

use crate::error::ConfigError;
use crate::keywords::DateRole;
use crate::span::Meridiem;

/// Everything the engine reads. A value, not a handle: an [`crate::Engine`] keeps
/// its own copy, so later edits need a new engine.
///
/// Every section is optional in the TOML file; missing ones take their defaults.
///
/// ```toml
/// remove_original_text = true
/// supported_languages = ["en", "zh"]
///
/// [time_defaults]
/// preferred_format = "12h"
/// default_period = "PM"
/// midnight_crossing = "error"
///
/// [date_markers]
/// due = "📅"
///
/// [synonyms]
/// tmrw = "tomorrow"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When false the engine returns every line untouched.
    pub enabled: bool,
    /// Languages whose relative date grammar is active (`en`, `zh`).
    pub supported_languages: BTreeSet<String>,
    pub date_keywords: DateKeywords,
    /// Excise recognized tokens from the line.
    pub remove_original_text: bool,
    /// Parse every line of a multi-line input, not just the first.
    pub per_line_processing: bool,
    /// Hint for editor hosts: rewrite while typing instead of on demand.
    pub real_time_replacement: bool,
    pub time_patterns: TimePatterns,
    pub time_defaults: TimeDefaults,
    /// Symbol written in front of each kind of date (`📅 2025-01-10`).
    pub date_markers: BTreeMap<DateRole, String>,
    /// Keep date and priority markers in the rewritten line, moved to its end.
    pub relocate_markers: bool,
    /// Extra words for relative dates: alias -> canonical phrase (`tmrw = "tomorrow"`).
    pub synonyms: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            supported_languages: ["en", "zh"].into_iter().map(String::from).collect(),
            date_keywords: DateKeywords::default(),
            remove_original_text: true,
            per_line_processing: true,
            real_time_replacement: false,
            time_patterns: TimePatterns::default(),
            time_defaults: TimeDefaults::default(),
            date_markers: default_markers(),
            relocate_markers: true,
            synonyms: BTreeMap::new(),
        }
    }
}

fn default_markers() -> BTreeMap<DateRole, String> {
    DateRole::iter()
        .map(|role| (role, role.default_symbol().to_string()))
        .collect()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// Words that give a date or time its role when written right before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateKeywords {
    pub start: Vec<String>,
    pub due: Vec<String>,
    pub scheduled: Vec<String>,
}

impl Default for DateKeywords {
    fn default() -> Self {
        Self {
            start: words(&[
                "start", "begin", "from", "starting", "begins", "开始", "从", "起始", "起", "始于",
                "自",
            ]),
            due: words(&[
                "due", "deadline", "by", "until", "before", "expires", "ends", "截止", "到期",
                "之前", "期限", "最晚", "结束", "终止", "完成于",
            ]),
            scheduled: words(&[
                "scheduled", "on", "at", "planned", "set for", "arranged", "安排", "计划", "在",
                "定于", "预定", "约定", "设定",
            ]),
        }
    }
}

/// Description of a clock matcher. Compiled into a regex by the pattern library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MatcherSpec {
    /// `14:30`, `9:05:30`
    TwentyFourHour {
        #[serde(default = "yes")]
        seconds: bool,
    },
    /// `2:30 PM`, `11:00am`
    TwelveHour {
        #[serde(default = "yes")]
        seconds: bool,
    },
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePatterns {
    pub single_time: Vec<MatcherSpec>,
    pub time_range: Vec<MatcherSpec>,
    pub range_separators: Vec<String>,
}

impl Default for TimePatterns {
    fn default() -> Self {
        let both = vec![
            MatcherSpec::TwentyFourHour { seconds: true },
            MatcherSpec::TwelveHour { seconds: true },
        ];
        Self {
            single_time: both.clone(),
            time_range: both,
            range_separators: words(&["-", "~", "～", " - ", " ~ "]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[serde(rename = "24h")]
    TwentyFourHour,
}

/// What to do with a range like `23:00-01:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MidnightCrossing {
    NextDay,
    SameDay,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeDefaults {
    /// With `12h`, a bare `3:00` is read in `default_period`.
    pub preferred_format: ClockFormat,
    pub default_period: Meridiem,
    pub midnight_crossing: MidnightCrossing,
}

impl Default for TimeDefaults {
    fn default() -> Self {
        Self {
            preferred_format: ClockFormat::TwentyFourHour,
            default_period: Meridiem::Am,
            midnight_crossing: MidnightCrossing::NextDay,
        }
    }
}

impl EngineConfig {
    /// Public entrypoint: load config from disk (first XDG path, then native).
    /// Falls back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        for path in Self::config_file_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Reads and parses one specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse_file(&s).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse a TOML string. Missing sections keep their defaults.
    pub fn parse_file(s: &str) -> Result<Self> {
        Ok(toml::from_str::<EngineConfig>(s).map_err(ConfigError::from)?)
    }

    /// Candidate config files, in lookup order:
    /// - `~/.config/taskline/config.toml`
    /// - `{config_dir}/taskline/config.toml` (e.g. `~/Library/Application Support` on macOS)
    pub fn config_file_paths() -> Vec<PathBuf> {
        let mut v = Vec::new();
        if let Some(b) = BaseDirs::new() {
            let xdg = b.home_dir().join(".config").join("taskline").join("config.toml");
            v.push(xdg);
            let native = b.config_dir().join("taskline").join("config.toml");
            v.push(native);
        }
        v
    }

    /// Symbol configured for `role`, if any.
    pub fn marker(&self, role: DateRole) -> Option<&str> {
        self.date_markers
            .get(&role)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::io::Write;

    /// Test helper to create the configuration most tests use.
    ///
    /// This is the single source of truth for test configuration.
    pub(crate) fn mk_config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn candidates_prioritize_xdg_then_native() {
        if let Some(b) = BaseDirs::new() {
            let expected_xdg = b.home_dir().join(".config").join("taskline").join("config.toml");
            let expected_native = b.config_dir().join("taskline").join("config.toml");
            let c = EngineConfig::config_file_paths();
            assert_eq!(c.get(0), Some(&expected_xdg));
            assert_eq!(c.get(1), Some(&expected_native));
        }
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = EngineConfig::parse_file("").unwrap();
        assert_eq!(config, mk_config());
        assert_eq!(config.time_defaults.preferred_format, ClockFormat::TwentyFourHour);
        assert_eq!(config.time_defaults.default_period, Meridiem::Am);
        assert_eq!(config.time_defaults.midnight_crossing, MidnightCrossing::NextDay);
        assert_eq!(config.marker(DateRole::Due), Some("📅"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let toml = r#"
            remove_original_text = false

            [time_defaults]
            midnight_crossing = "error"
        "#;
        let config = EngineConfig::parse_file(toml).unwrap();
        assert!(!config.remove_original_text);
        assert_eq!(config.time_defaults.midnight_crossing, MidnightCrossing::Error);
        assert_eq!(config.time_defaults.preferred_format, ClockFormat::TwentyFourHour);
        assert_eq!(config.date_keywords, DateKeywords::default());
    }

    #[test]
    fn parse_file_accepts_matchers_markers_and_synonyms() {
        let toml = r#"
            supported_languages = ["en"]

            [time_patterns]
            single_time = [{ kind = "twelve-hour", seconds = false }]
            range_separators = ["to"]

            [time_defaults]
            preferred_format = "12h"
            default_period = "PM"

            [date_markers]
            start = "🚀"

            [synonyms]
            tmrw = "tomorrow"
        "#;
        let config = EngineConfig::parse_file(toml).unwrap();
        assert_eq!(
            config.time_patterns.single_time,
            vec![MatcherSpec::TwelveHour { seconds: false }]
        );
        assert_eq!(config.time_patterns.range_separators, vec!["to".to_string()]);
        assert_eq!(config.time_defaults.preferred_format, ClockFormat::TwelveHour);
        assert_eq!(config.time_defaults.default_period, Meridiem::Pm);
        assert_eq!(config.marker(DateRole::Start), Some("🚀"));
        // A table replaces the whole default map.
        assert_eq!(config.marker(DateRole::Due), None);
        assert_eq!(config.synonyms.get("tmrw").map(String::as_str), Some("tomorrow"));
    }

    #[test]
    fn matcher_seconds_default_to_true() {
        let toml = r#"
            [time_patterns]
            time_range = [{ kind = "twenty-four-hour" }]
        "#;
        let config = EngineConfig::parse_file(toml).unwrap();
        assert_eq!(
            config.time_patterns.time_range,
            vec![MatcherSpec::TwentyFourHour { seconds: true }]
        );
    }

    #[test]
    fn unknown_enum_value_is_an_error() {
        let toml = r#"
            [time_defaults]
            midnight_crossing = "wrap"
        "#;
        assert!(EngineConfig::parse_file(toml).is_err());
    }

    #[test]
    fn load_from_reads_file_on_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "enabled = false").unwrap();
        let config = EngineConfig::load_from(file.path()).unwrap();
        assert!(!config.enabled);
        assert!(config.remove_original_text);
    }

    #[test]
    fn load_from_reports_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "enabled = \"maybe\"").unwrap();
        let err = EngineConfig::load_from(file.path()).unwrap_err();
        assert!(format!("{err}").contains("parsing"));
    }
}
