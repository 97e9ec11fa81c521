use thiserror::Error;

use crate::span::TimeOfDay;

/// A time range whose end is not after its start, under `midnight_crossing = "error"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("time range '{raw}' at byte {offset} ends ({end}) before it starts ({start})")]
pub struct TimeRangeOrderError {
    pub raw: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub offset: usize,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {what} pattern: {source}")]
    Pattern {
        what: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Everything [`crate::parse_line`] can fail with.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TimeRangeOrder(#[from] TimeRangeOrderError),
}

pub type Result<T> = std::result::Result<T, ParseError>;
