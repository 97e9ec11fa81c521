use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::debug;
use regex::Captures;

use crate::config::{ClockFormat, MidnightCrossing, TimeDefaults};
use crate::error::TimeRangeOrderError;
use crate::keywords::{
    EN_DAY_OFFSETS, EN_SHIFTS, EN_UNITS, EN_WEEKDAYS, Language, Priority, Unit, ZH_DAY_OFFSETS,
    ZH_SHIFTS, ZH_UNITS, ZH_WEEKDAYS, ZH_YEARS, lookup,
};
use crate::patterns::PatternSet;
use crate::span::{
    Capture, ClockReading, DateValue, MetadataSpan, ParsedValue, SpanKind, TimeOfDay, TimeRange,
};

/// What the normalizer needs besides the span itself.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub patterns: &'a PatternSet,
    pub time_defaults: TimeDefaults,
    /// "Today" for relative dates. Supplied by the caller, never read from the clock.
    pub reference_date: NaiveDate,
}

/// Turns a span's raw capture into a canonical value.
///
/// `Ok(None)` means the span is dropped (e.g. `2025-02-30`, or a backwards
/// range under `same-day`). Only a backwards range under `error` fails.
pub fn normalize(
    span: &MetadataSpan,
    ctx: &NormalizeContext<'_>,
) -> Result<Option<ParsedValue>, TimeRangeOrderError> {
    let value = match &span.capture {
        Capture::Date { date, time } => marker_date(date, time.as_deref()).map(ParsedValue::Date),
        Capture::Clock(reading) => {
            resolve_clock(*reading, &ctx.time_defaults).map(ParsedValue::Time)
        }
        Capture::ClockRange(first, second) => {
            return time_range(span, *first, *second, &ctx.time_defaults)
                .map(|range| range.map(ParsedValue::Range));
        }
        Capture::Text(text) => match span.kind {
            SpanKind::Tag => Some(ParsedValue::Tag(text.clone())),
            SpanKind::Priority => Priority::from_symbol(text).map(ParsedValue::Priority),
            SpanKind::TaskProperty(property) => property.canonical(text).map(ParsedValue::Text),
            SpanKind::DateKeyword(_) => {
                resolve_phrase(ctx.patterns, text, ctx.reference_date)
                    .map(|date| ParsedValue::Date(DateValue::on(date)))
            }
            _ => None,
        },
        Capture::Field { key, value } => Some(ParsedValue::Field {
            key: key.clone(),
            value: value.clone(),
        }),
        Capture::None => None,
    };
    if value.is_none() {
        debug!("dropping '{}': no valid value", span.raw);
    }
    Ok(value)
}

pub(crate) fn marker_date(date: &str, time: Option<&str>) -> Option<DateValue> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = match time {
        Some(t) => Some(TimeOfDay::parse(t)?),
        None => None,
    };
    Some(DateValue { date, time })
}

/// Applies the meridiem, or the default period when the preferred format is 12h.
fn resolve_clock(reading: ClockReading, defaults: &TimeDefaults) -> Option<TimeOfDay> {
    let hour = match reading.meridiem {
        Some(meridiem) => meridiem.to_24h(reading.hour),
        None if defaults.preferred_format == ClockFormat::TwelveHour
            && (1..=12).contains(&reading.hour) =>
        {
            defaults.default_period.to_24h(reading.hour)
        }
        None => reading.hour,
    };
    TimeOfDay::new(hour, reading.minute, reading.second)
}

fn time_range(
    span: &MetadataSpan,
    first: ClockReading,
    second: ClockReading,
    defaults: &TimeDefaults,
) -> Result<Option<TimeRange>, TimeRangeOrderError> {
    let Some(end) = resolve_clock(second, defaults) else {
        return Ok(None);
    };
    let start = match (first.meridiem, second.meridiem) {
        // `9:00-11:30 am`: the start borrows the end's half of the day, unless
        // that puts it after the end (`11:00-1:00 pm`).
        (None, Some(period)) => {
            let same = TimeOfDay::new(period.to_24h(first.hour), first.minute, first.second);
            match same {
                Some(t) if t.seconds_from_midnight() <= end.seconds_from_midnight() => Some(t),
                _ => TimeOfDay::new(
                    period.opposite().to_24h(first.hour),
                    first.minute,
                    first.second,
                ),
            }
        }
        _ => resolve_clock(first, defaults),
    };
    let Some(start) = start else {
        return Ok(None);
    };

    if end.seconds_from_midnight() > start.seconds_from_midnight() {
        return Ok(Some(TimeRange {
            start,
            end,
            next_day: false,
        }));
    }
    match defaults.midnight_crossing {
        MidnightCrossing::NextDay => Ok(Some(TimeRange {
            start,
            end,
            next_day: true,
        })),
        MidnightCrossing::SameDay => {
            debug!("dropping '{}': range ends before it starts", span.raw);
            Ok(None)
        }
        MidnightCrossing::Error => Err(TimeRangeOrderError {
            raw: span.raw.clone(),
            start,
            end,
            offset: span.start,
        }),
    }
}

/// Resolves a relative date phrase (or a configured synonym of one) against
/// `reference`. `None` when no active grammar reads the whole phrase.
pub fn resolve_phrase(patterns: &PatternSet, phrase: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let phrase = patterns.canonical(phrase).trim();
    patterns.grammars.iter().find_map(|grammar| {
        let caps = grammar.exact.captures(phrase)?;
        match grammar.language {
            Language::En => resolve_en(&caps, reference),
            Language::Zh => resolve_zh(&caps, reference),
        }
    })
}

fn count(caps: &Captures<'_>, name: &str) -> Option<i64> {
    caps.name(name)?.as_str().parse().ok()
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name).map(|m| m.as_str())
}

fn resolve_en(caps: &Captures<'_>, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(word) = group(caps, "offset") {
        return Unit::Day.shift(reference, lookup(EN_DAY_OFFSETS, word)?);
    }
    if let Some(shift) = group(caps, "shift") {
        let shift = lookup(EN_SHIFTS, shift)?;
        if let Some(unit) = group(caps, "shift_unit") {
            return lookup(EN_UNITS, unit)?.shift(reference, shift);
        }
        let day = lookup(EN_WEEKDAYS, group(caps, "shift_day")?)?;
        return weekday_after(reference, day, shift);
    }
    if let Some(n) = count(caps, "in_count") {
        return lookup(EN_UNITS, group(caps, "in_unit")?)?.shift(reference, n);
    }
    if let Some(n) = count(caps, "later_count") {
        return lookup(EN_UNITS, group(caps, "later_unit")?)?.shift(reference, n);
    }
    let day = lookup(EN_WEEKDAYS, group(caps, "weekday")?)?;
    weekday_after(reference, day, 0)
}

fn resolve_zh(caps: &Captures<'_>, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(day) = group(caps, "zh_weekday") {
        let day = lookup(ZH_WEEKDAYS, day)?;
        let shift = match group(caps, "zh_shift_day") {
            Some(s) => lookup(ZH_SHIFTS, s)?,
            None => 0,
        };
        return weekday_after(reference, day, shift);
    }
    if let Some(n) = count(caps, "zh_count") {
        return lookup(ZH_UNITS, group(caps, "zh_count_unit")?)?.shift(reference, n);
    }
    if let Some(word) = group(caps, "zh_offset") {
        return Unit::Day.shift(reference, lookup(ZH_DAY_OFFSETS, word)?);
    }
    if let Some(shift) = group(caps, "zh_shift") {
        let shift = lookup(ZH_SHIFTS, shift)?;
        return lookup(ZH_UNITS, group(caps, "zh_shift_unit")?)?.shift(reference, shift);
    }
    Unit::Year.shift(reference, lookup(ZH_YEARS, group(caps, "zh_year")?)?)
}

/// Weekday `target` counted in Sunday-based weeks from `reference`.
///
/// With `week_shift == 0` this is the next occurrence strictly after
/// `reference`; otherwise it is that weekday in the shifted week. `None` past
/// the end of the calendar.
///
/// # Examples
///
/// ```
/// # use chrono::{NaiveDate, Weekday};
/// # use taskline_core::normalize::weekday_after;
/// let saturday = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
///
/// assert_eq!(weekday_after(saturday, Weekday::Fri, 0), NaiveDate::from_ymd_opt(2025, 1, 10));
/// assert_eq!(weekday_after(saturday, Weekday::Mon, 1), NaiveDate::from_ymd_opt(2025, 1, 6));
/// assert_eq!(weekday_after(NaiveDate::MAX, Weekday::Mon, 0), None);
/// ```
pub fn weekday_after(reference: NaiveDate, target: Weekday, week_shift: i64) -> Option<NaiveDate> {
    let current = i64::from(reference.weekday().num_days_from_sunday());
    let target = i64::from(target.num_days_from_sunday());
    let mut days = target - current + week_shift.checked_mul(7)?;
    if week_shift == 0 && days <= 0 {
        days += 7;
    }
    reference.checked_add_signed(Duration::try_days(days)?)
}
