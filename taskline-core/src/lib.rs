pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod keywords;
pub mod normalize;
pub mod patterns;
pub mod resolve;
pub mod rewrite;
pub mod span;

use chrono::NaiveDate;

pub use config::EngineConfig;
pub use engine::{Engine, ParseResult, TaskFields};
pub use error::{ConfigError, ParseError, TimeRangeOrderError};
pub use keywords::{DateRole, Priority};
pub use span::{DateValue, MetadataSpan, TimeOfDay, TimeRange};

/// One-shot convenience: compiles `config` and parses `raw`.
///
/// Prefer building an [`Engine`] once when parsing many lines.
///
/// # Examples
///
/// ```
/// # use chrono::NaiveDate;
/// # use taskline_core::{parse_line, EngineConfig};
/// let today = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
///
/// let result = parse_line("lunch 12:00~13:00", &EngineConfig::default(), today).unwrap();
///
/// assert_eq!(result.cleaned_text, "lunch");
/// assert_eq!(result.fields.time_range.unwrap().to_string(), "12:00-13:00");
/// ```
pub fn parse_line(
    raw: &str,
    config: &EngineConfig,
    reference_date: NaiveDate,
) -> error::Result<ParseResult> {
    let engine = Engine::new(config.clone())?;
    Ok(engine.parse(raw, reference_date)?)
}
