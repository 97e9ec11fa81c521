use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{ConfigError, TimeRangeOrderError};
use crate::extract::{TaskLine, extract};
use crate::keywords::{DateRole, Priority, TaskProperty};
use crate::normalize::{NormalizeContext, marker_date, normalize, resolve_phrase};
use crate::patterns::PatternSet;
use crate::resolve::resolve;
use crate::rewrite::{Rewritten, insert_at, is_relocated, marker_position, rewrite, splice};
use crate::span::{DateValue, MetadataSpan, ParsedValue, SpanKind, TimeOfDay, TimeRange};

/// Structured metadata read from one line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    #[serde(flatten)]
    pub dates: BTreeMap<DateRole, DateValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// `🆔`, `⛔`, `🏁` and `🔁` values.
    #[serde(flatten)]
    pub properties: BTreeMap<TaskProperty, String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dataview: BTreeMap<String, String>,
}

impl TaskFields {
    /// Folds normalized spans into fields. The first value of each kind wins.
    ///
    /// Dataview fields named after a date role (`[due:: 2025-01-10]`, or
    /// `completion` for completed) or a task property fill only the slots no
    /// marker or keyword filled.
    pub fn collect<'a>(spans: impl IntoIterator<Item = &'a MetadataSpan>) -> Self {
        let mut fields = TaskFields::default();
        for span in spans {
            match (&span.kind, &span.value) {
                (SpanKind::DateMarker(role) | SpanKind::DateKeyword(role), Some(ParsedValue::Date(d))) => {
                    fields.dates.entry(*role).or_insert(*d);
                }
                (_, Some(ParsedValue::Time(t))) => {
                    fields.time.get_or_insert(*t);
                }
                (_, Some(ParsedValue::Range(r))) => {
                    fields.time_range.get_or_insert(*r);
                }
                (_, Some(ParsedValue::Priority(p))) => {
                    fields.priority.get_or_insert(*p);
                }
                (_, Some(ParsedValue::Tag(tag))) => {
                    fields.tags.insert(tag.clone());
                }
                (SpanKind::TaskProperty(property), Some(ParsedValue::Text(value))) => {
                    fields
                        .properties
                        .entry(*property)
                        .or_insert_with(|| value.clone());
                }
                (_, Some(ParsedValue::Field { key, value })) => {
                    fields
                        .dataview
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                _ => {}
            }
        }
        for (key, value) in &fields.dataview {
            if let Some((role, date)) = dataview_date(key, value) {
                fields.dates.entry(role).or_insert(date);
            } else if let Some(property) = dataview_property(key) {
                if let Some(value) = property.canonical(value) {
                    fields.properties.entry(property).or_insert(value);
                }
            }
        }
        if fields.priority.is_none() {
            fields.priority = fields
                .dataview
                .get("priority")
                .and_then(|label| Priority::from_label(label));
        }
        fields
    }

    pub fn date(&self, role: DateRole) -> Option<&DateValue> {
        self.dates.get(&role)
    }

    pub fn due(&self) -> Option<&DateValue> {
        self.date(DateRole::Due)
    }

    pub fn start(&self) -> Option<&DateValue> {
        self.date(DateRole::Start)
    }

    pub fn scheduled(&self) -> Option<&DateValue> {
        self.date(DateRole::Scheduled)
    }

    pub fn property(&self, property: TaskProperty) -> Option<&str> {
        self.properties.get(&property).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskFields::default()
    }
}

fn dataview_date(key: &str, value: &str) -> Option<(DateRole, DateValue)> {
    let role = match key.to_ascii_lowercase().as_str() {
        "completion" => DateRole::Completed,
        other => other.parse().ok()?,
    };
    let mut parts = value.split_whitespace();
    let date = marker_date(parts.next()?, parts.next())?;
    if parts.next().is_some() {
        return None;
    }
    Some((role, date))
}

fn dataview_property(key: &str) -> Option<TaskProperty> {
    match key.parse::<TaskProperty>().ok()? {
        TaskProperty::Repeat => None,
        property => Some(property),
    }
}

/// Everything the engine learned about one line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub fields: TaskFields,
    pub cleaned_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reference: Option<String>,
    /// Excised spans, in document order.
    pub removed_spans: Vec<MetadataSpan>,
    /// Markers kept in the line but moved to its end.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relocated_spans: Vec<MetadataSpan>,
}

impl ParseResult {
    fn untouched(raw: &str) -> Self {
        Self {
            cleaned_text: raw.to_string(),
            ..Self::default()
        }
    }
}

/// Upper bound on scans of one line, the first included.
const MAX_PASSES: usize = 8;

/// A compiled, immutable parser for one configuration snapshot.
///
/// `Engine` holds no interior state besides its compiled patterns, so it can
/// be shared across threads and reused for any number of lines.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    patterns: PatternSet,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let patterns = PatternSet::compile(&config)?;
        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Parses one task line.
    ///
    /// Runs extraction, conflict resolution, normalization and rewriting. Relative
    /// dates are resolved against `reference_date`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeRangeOrderError`] for a range that ends before it starts
    /// when `midnight_crossing = "error"`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chrono::NaiveDate;
    /// # use taskline_core::{Engine, EngineConfig};
    /// let engine = Engine::new(EngineConfig::default()).unwrap();
    /// let today = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
    ///
    /// let result = engine.parse("- [ ] call mom tomorrow at 2:30 PM #family ^c1", today).unwrap();
    ///
    /// assert_eq!(result.cleaned_text, "- [ ] call mom ^c1");
    /// assert_eq!(result.fields.due().unwrap().to_string(), "2025-01-05");
    /// assert_eq!(result.fields.time.unwrap().to_string(), "14:30");
    /// assert!(result.fields.tags.contains("family"));
    /// ```
    pub fn parse(&self, raw: &str, reference_date: NaiveDate) -> Result<ParseResult, TimeRangeOrderError> {
        if !self.config.enabled {
            return Ok(ParseResult::untouched(raw));
        }
        let line = TaskLine::scan(raw);
        let ctx = NormalizeContext {
            patterns: &self.patterns,
            time_defaults: self.config.time_defaults,
            reference_date,
        };
        let mut kept = self.accept(&line, &ctx)?;
        let block_reference = line.block_id().map(str::to_string);

        if !self.config.remove_original_text {
            return Ok(ParseResult {
                fields: TaskFields::collect(&kept),
                cleaned_text: raw.to_string(),
                block_reference,
                ..ParseResult::default()
            });
        }

        // A cut can expose a token its neighbour was hiding (`#a#b`), so the
        // cleaned text is scanned again until it no longer changes.
        let mut cleaned = rewrite(&line, &kept, &self.config);
        for _ in 1..MAX_PASSES {
            let next_line = TaskLine::scan(&cleaned.text);
            let found = self.accept(&next_line, &ctx).map_err(|mut err| {
                err.offset = cleaned.origin.get(err.offset).copied().unwrap_or(err.offset);
                err
            })?;
            let next = rewrite(&next_line, &found, &self.config);
            if next.text == cleaned.text {
                break;
            }
            debug!("'{}' changed on a later pass", cleaned.text);
            for span in found {
                let Some(span) = rebase(span, &cleaned) else { continue };
                let known = kept
                    .iter()
                    .any(|s| s.kind == span.kind && s.start == span.start && s.end == span.end);
                if !known {
                    kept.push(span);
                }
            }
            cleaned = next.through(&cleaned.origin);
        }
        kept.sort_by_key(|s| (s.start, Reverse(s.len())));

        let fields = TaskFields::collect(&kept);
        let (relocated_spans, removed_spans): (Vec<_>, Vec<_>) = kept
            .into_iter()
            .partition(|s| is_relocated(s.kind, &self.config));

        Ok(ParseResult {
            fields,
            cleaned_text: cleaned.text,
            block_reference,
            removed_spans: outermost(removed_spans),
            relocated_spans,
        })
    }

    /// Extracts, resolves and normalizes the spans of one line.
    fn accept(
        &self,
        line: &TaskLine,
        ctx: &NormalizeContext<'_>,
    ) -> Result<Vec<MetadataSpan>, TimeRangeOrderError> {
        let resolution = resolve(extract(line, &self.patterns));
        let mut kept = Vec::with_capacity(resolution.accepted.len());
        for mut span in resolution.accepted {
            match normalize(&span, ctx)? {
                Some(value) => {
                    span.value = Some(value);
                    kept.push(span);
                }
                None => debug!("'{}' left in place", span.raw),
            }
        }
        Ok(kept)
    }

    /// Parses a block of text line by line.
    ///
    /// With `per_line_processing` off only the first line is parsed and the
    /// others come back untouched.
    pub fn parse_lines(
        &self,
        text: &str,
        reference_date: NaiveDate,
    ) -> Result<Vec<ParseResult>, TimeRangeOrderError> {
        text.lines()
            .enumerate()
            .map(|(i, line)| {
                if i == 0 || self.config.per_line_processing {
                    self.parse(line, reference_date)
                } else {
                    Ok(ParseResult::untouched(line))
                }
            })
            .collect()
    }

    /// Resolves a relative date phrase (`tomorrow`, `next friday`, `下周三`, a synonym).
    pub fn resolve_date_phrase(&self, phrase: &str, reference_date: NaiveDate) -> Option<NaiveDate> {
        resolve_phrase(&self.patterns, phrase, reference_date)
    }

    /// Adds `<symbol> <date>` for `role` to the line.
    ///
    /// Lines that already carry a marker for `role`, and roles without a
    /// configured symbol, come back unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chrono::NaiveDate;
    /// # use taskline_core::{Engine, EngineConfig, keywords::DateRole, span::DateValue};
    /// let engine = Engine::new(EngineConfig::default()).unwrap();
    /// let done = DateValue::on(NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
    ///
    /// let line = engine.insert_date_marker("- [x] pay rent #bills ^r", DateRole::Completed, done);
    ///
    /// assert_eq!(line, "- [x] pay rent #bills ✅ 2025-01-04 ^r");
    /// ```
    pub fn insert_date_marker(&self, raw: &str, role: DateRole, value: DateValue) -> String {
        let Some(symbol) = self.config.marker(role) else {
            return raw.to_string();
        };
        let line = TaskLine::scan(raw);
        let accepted = resolve(extract(&line, &self.patterns)).accepted;
        if accepted.iter().any(|s| s.kind == SpanKind::DateMarker(role)) {
            return raw.to_string();
        }
        let pos = marker_position(&line, &accepted, role);
        insert_at(&line, pos, &format!("{symbol} {value}"))
    }

    /// Removes every marker of `role`, keeping the rest of the line intact.
    pub fn remove_date_marker(&self, raw: &str, role: DateRole) -> String {
        let line = TaskLine::scan(raw);
        let markers: Vec<MetadataSpan> = resolve(extract(&line, &self.patterns))
            .accepted
            .into_iter()
            .filter(|s| s.kind == SpanKind::DateMarker(role))
            .collect();
        if markers.is_empty() {
            return raw.to_string();
        }
        splice(&line, &markers, &[]).text
    }
}

/// Moves a span found in rewritten text back onto the raw line. A span read
/// across an earlier cut covers the raw range between its first and last byte.
fn rebase(mut span: MetadataSpan, cleaned: &Rewritten) -> Option<MetadataSpan> {
    let (start, end) = cleaned.source_range(span.start, span.end)?;
    if start >= end {
        return None;
    }
    span.start = start;
    span.end = end;
    Some(span)
}

/// Drops removed spans that sit inside a wider one. Expects `(start, longest)` order.
fn outermost(spans: Vec<MetadataSpan>) -> Vec<MetadataSpan> {
    let mut out: Vec<MetadataSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if out.last().is_some_and(|last| span.end <= last.end) {
            continue;
        }
        out.push(span);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::mk_config;
    use crate::config::MidnightCrossing;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 4).unwrap()
    }

    fn engine() -> Engine {
        Engine::new(mk_config()).unwrap()
    }

    fn parse(raw: &str) -> ParseResult {
        engine().parse(raw, reference()).unwrap()
    }

    #[test]
    fn twelve_hour_time() {
        let result = parse("meeting at 2:30 PM");
        assert_eq!(result.fields.time.unwrap().to_string(), "14:30");
        assert_eq!(result.cleaned_text, "meeting");
        assert_eq!(result.removed_spans.len(), 1);
    }

    #[test]
    fn time_range_with_dash() {
        let result = parse("workshop 9:00-17:00");
        let range = result.fields.time_range.unwrap();
        assert_eq!(range.start.to_string(), "09:00");
        assert_eq!(range.end.to_string(), "17:00");
        assert!(!range.next_day);
        assert_eq!(result.cleaned_text, "workshop");
    }

    #[test]
    fn block_reference_survives() {
        let result = parse("- [ ] call scheduled 12:00 ^timer-1");
        assert_eq!(result.fields.time.unwrap().to_string(), "12:00");
        assert_eq!(result.cleaned_text, "- [ ] call ^timer-1");
        assert_eq!(result.block_reference.as_deref(), Some("^timer-1"));
    }

    #[test]
    fn emoji_marker_beats_due_keyword() {
        let result = parse("- [ ] pay rent due tomorrow 📅 2025-01-10");
        assert_eq!(result.fields.due().unwrap().to_string(), "2025-01-10");
        assert_eq!(result.fields.dates.len(), 1);
        assert_eq!(result.cleaned_text, "- [ ] pay rent due tomorrow 📅 2025-01-10");
    }

    #[test]
    fn keyword_of_another_role_is_kept_next_to_marker() {
        let result = parse("- [ ] report start tomorrow 📅 2025-01-10");
        assert_eq!(result.fields.start().unwrap().to_string(), "2025-01-05");
        assert_eq!(result.fields.due().unwrap().to_string(), "2025-01-10");
        assert_eq!(result.cleaned_text, "- [ ] report 📅 2025-01-10");
    }

    #[test]
    fn first_value_wins() {
        let result = parse("sync 10:00 then 11:00 #a #b [k:: 1] [k:: 2]");
        assert_eq!(result.fields.time.unwrap().to_string(), "10:00");
        assert_eq!(result.fields.tags.len(), 2);
        assert_eq!(result.fields.dataview.get("k").map(String::as_str), Some("1"));
    }

    #[test]
    fn priority_from_marker_or_field() {
        assert_eq!(parse("fix 🔺").fields.priority, Some(Priority::Highest));
        assert_eq!(parse("fix [priority:: high]").fields.priority, Some(Priority::High));
    }

    #[test]
    fn disabled_engine_returns_raw() {
        let mut config = mk_config();
        config.enabled = false;
        let result = Engine::new(config)
            .unwrap()
            .parse("meeting at 2:30 PM", reference())
            .unwrap();
        assert_eq!(result.cleaned_text, "meeting at 2:30 PM");
        assert!(result.fields.is_empty());
    }

    #[test]
    fn keep_text_still_reads_fields() {
        let mut config = mk_config();
        config.remove_original_text = false;
        let result = Engine::new(config)
            .unwrap()
            .parse("meeting at 2:30 PM", reference())
            .unwrap();
        assert_eq!(result.cleaned_text, "meeting at 2:30 PM");
        assert_eq!(result.fields.time.unwrap().to_string(), "14:30");
        assert!(result.removed_spans.is_empty());
    }

    #[test]
    fn invalid_marker_date_stays_in_text() {
        let result = parse("pay 📅 2025-02-30");
        assert!(result.fields.is_empty());
        assert_eq!(result.cleaned_text, "pay 📅 2025-02-30");
    }

    #[test]
    fn tokens_exposed_by_a_cut_are_read_too() {
        let result = parse("a #work#urgent");
        assert_eq!(result.cleaned_text, "a");
        assert_eq!(result.fields.tags.len(), 2);
        let removed: Vec<(usize, usize, &str)> = result
            .removed_spans
            .iter()
            .map(|s| (s.start, s.end, s.raw.as_str()))
            .collect();
        assert_eq!(removed, vec![(2, 7, "#work"), (7, 14, "#urgent")]);

        let result = parse("meet 10:00#urgent");
        assert_eq!(result.cleaned_text, "meet");
        assert_eq!(result.fields.time.unwrap().to_string(), "10:00");
        assert!(result.fields.tags.contains("urgent"));
    }

    #[test]
    fn tag_glued_to_a_marker_is_read_after_relocation() {
        let result = parse("a 📅 2025-01-10#x");
        assert_eq!(result.cleaned_text, "a 📅 2025-01-10");
        assert!(result.fields.tags.contains("x"));
        assert_eq!(result.relocated_spans.len(), 1);
        assert_eq!(result.relocated_spans[0].start, 2);
        assert_eq!(result.removed_spans[0].raw, "#x");
    }

    #[test]
    fn marker_inside_a_field_leaves_keyword_in_charge() {
        let result = parse("pay tomorrow [note:: 📅 2025-01-10]");
        assert_eq!(result.fields.due().unwrap().to_string(), "2025-01-05");
        assert_eq!(result.cleaned_text, "pay");
    }

    #[test]
    fn impossible_marker_date_leaves_keyword_in_charge() {
        let result = parse("pay tomorrow 📅 2025-02-30");
        assert_eq!(result.fields.due().unwrap().to_string(), "2025-01-05");
        assert_eq!(result.cleaned_text, "pay 📅 2025-02-30");
    }

    #[test]
    fn dataview_dates_fill_empty_date_slots() {
        let result = parse("- [ ] pay [due:: 2025-01-10] [completion:: 2025-01-04 09:30]");
        assert_eq!(result.fields.due().unwrap().to_string(), "2025-01-10");
        assert_eq!(
            result.fields.date(DateRole::Completed).unwrap().to_string(),
            "2025-01-04 09:30"
        );
        assert_eq!(result.fields.dataview.get("due").map(String::as_str), Some("2025-01-10"));
        assert_eq!(result.cleaned_text, "- [ ] pay");
    }

    #[test]
    fn markers_and_keywords_outrank_dataview_dates() {
        let result = parse("pay tomorrow [due:: 2025-01-10] [start:: 2025-01-02] 🛫 2025-01-03");
        assert_eq!(result.fields.due().unwrap().to_string(), "2025-01-05");
        assert_eq!(result.fields.start().unwrap().to_string(), "2025-01-03");
        assert!(parse("pay [due:: soon]").fields.dates.is_empty());
    }

    #[test]
    fn task_properties_are_read_and_kept() {
        let result = parse("- [ ] ship 🆔 abc-1 ⛔ x1, y2 🔁 every week #work");
        assert_eq!(result.cleaned_text, "- [ ] ship 🆔 abc-1 ⛔ x1, y2 🔁 every week");
        assert_eq!(result.fields.property(TaskProperty::Id), Some("abc-1"));
        assert_eq!(result.fields.property(TaskProperty::DependsOn), Some("x1,y2"));
        assert_eq!(result.fields.property(TaskProperty::Repeat), Some("every week"));
        assert_eq!(result.relocated_spans.len(), 3);

        let json = serde_json::to_value(&result.fields).unwrap();
        assert_eq!(json["dependsOn"], "x1,y2");
        assert_eq!(json["repeat"], "every week");
    }

    #[test]
    fn task_properties_from_dataview_fields() {
        let result = parse("- [ ] ship [id:: t1] [dependsOn:: a, b]");
        assert_eq!(result.fields.property(TaskProperty::Id), Some("t1"));
        assert_eq!(result.fields.property(TaskProperty::DependsOn), Some("a,b"));
    }

    #[test]
    fn midnight_crossing_error_surfaces() {
        let mut config = mk_config();
        config.time_defaults.midnight_crossing = MidnightCrossing::Error;
        let err = Engine::new(config)
            .unwrap()
            .parse("shift 23:00-01:00", reference())
            .unwrap_err();
        assert_eq!(err.raw, "23:00-01:00");
        assert_eq!(err.offset, 6);
    }

    #[test]
    fn midnight_crossing_same_day_drops_range() {
        let mut config = mk_config();
        config.time_defaults.midnight_crossing = MidnightCrossing::SameDay;
        let result = Engine::new(config)
            .unwrap()
            .parse("shift 23:00-01:00", reference())
            .unwrap();
        assert!(result.fields.time_range.is_none());
        assert_eq!(result.cleaned_text, "shift 23:00-01:00");
    }

    #[test]
    fn parse_lines_respects_per_line_processing() {
        let text = "a at 10:00\nb at 11:00";
        let results = engine().parse_lines(text, reference()).unwrap();
        assert_eq!(results[1].cleaned_text, "b");

        let mut config = mk_config();
        config.per_line_processing = false;
        let results = Engine::new(config).unwrap().parse_lines(text, reference()).unwrap();
        assert_eq!(results[0].cleaned_text, "a");
        assert_eq!(results[1].cleaned_text, "b at 11:00");
    }

    #[test]
    fn insert_marker_after_task_text() {
        let engine = engine();
        let due = DateValue::on(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert_eq!(
            engine.insert_date_marker("- [ ] pay rent #bills", DateRole::Due, due),
            "- [ ] pay rent 📅 2025-01-10 #bills"
        );
        let twice = engine.insert_date_marker("- [ ] pay 📅 2025-01-01", DateRole::Due, due);
        assert_eq!(twice, "- [ ] pay 📅 2025-01-01");
    }

    #[test]
    fn remove_marker_keeps_everything_else() {
        let line = engine().remove_date_marker("- [x] pay ✅ 2025-01-04 #bills ^r", DateRole::Completed);
        assert_eq!(line, "- [x] pay #bills ^r");
    }

    #[test]
    fn serializes_like_the_host_expects() {
        let result = parse("workshop 9:00-17:00 📅 2025-01-10");
        let json = serde_json::to_value(&result.fields).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "due": "2025-01-10",
                "timeRange": { "start": "09:00", "end": "17:00" }
            })
        );
    }
}
