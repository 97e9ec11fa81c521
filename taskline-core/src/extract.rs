use std::cmp::Reverse;

use regex::{Captures, Regex};

use crate::keywords::{DATE_ROLE_PRECEDENCE, DateRole, TIME_ROLE_PRECEDENCE, TaskProperty};
use crate::patterns::{
    BLOCK_REFERENCE, DATAVIEW_FIELD, PRIORITY_MARKER, PatternSet, TAG, TASK_PREFIX,
    TASK_PROPERTIES,
};
use crate::span::{Capture, ClockReading, Meridiem, MetadataSpan, SpanKind};

/// One raw task line split into its structural parts.
///
/// `raw[..body_start]` is the list/checkbox prefix and `raw[body_start..body_end]`
/// is where metadata is searched. The block reference, if any, sits after `body_end`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskLine {
    pub raw: String,
    pub block_reference: Option<MetadataSpan>,
    /// Checkbox status character (`' '`, `x`, `-`, ...).
    pub status: Option<char>,
    pub body_start: usize,
    pub body_end: usize,
}

impl TaskLine {
    /// Finds the block reference first, then the checkbox prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// # use taskline_core::extract::TaskLine;
    /// let line = TaskLine::scan("- [x] call mom ^call-1");
    ///
    /// assert_eq!(line.status, Some('x'));
    /// assert_eq!(line.block_id(), Some("^call-1"));
    /// assert_eq!(line.body(), "call mom");
    /// assert_eq!(line.prefix(), "- [x] ");
    /// ```
    pub fn scan(raw: &str) -> Self {
        let (block_reference, search_end) = match BLOCK_REFERENCE.captures(raw) {
            Some(caps) => match (caps.get(0), caps.get(1)) {
                (Some(whole), Some(id)) => (
                    Some(MetadataSpan::new(
                        SpanKind::BlockReference,
                        raw,
                        id.start(),
                        id.end(),
                    )),
                    whole.start(),
                ),
                _ => (None, raw.len()),
            },
            None => (None, raw.len()),
        };
        let body_end = raw[..search_end].trim_end().len();

        let (status, body_start) = match TASK_PREFIX.captures(&raw[..body_end]) {
            Some(caps) => (
                caps.get(2).and_then(|m| m.as_str().chars().next()),
                caps.get(0).map_or(0, |m| m.end()),
            ),
            None => (None, 0),
        };

        Self {
            raw: raw.to_string(),
            block_reference,
            status,
            body_start: body_start.min(body_end),
            body_end,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.raw[..self.body_start]
    }

    pub fn body(&self) -> &str {
        &self.raw[self.body_start..self.body_end]
    }

    pub fn block_id(&self) -> Option<&str> {
        self.block_reference.as_ref().map(|span| span.raw.as_str())
    }

    pub fn is_task(&self) -> bool {
        self.status.is_some()
    }
}

/// Collects every metadata candidate of `line`, overlaps included.
///
/// The result is sorted by start offset, longest first at equal starts, so a
/// time range comes before the single time it begins with.
///
/// # Examples
///
/// ```
/// # use taskline_core::{EngineConfig, extract::{extract, TaskLine}, patterns::PatternSet};
/// # use taskline_core::span::SpanKind;
/// let patterns = PatternSet::compile(&EngineConfig::default()).unwrap();
/// let line = TaskLine::scan("workshop 9:00-17:00 #work");
///
/// let spans = extract(&line, &patterns);
///
/// assert_eq!(spans[0].kind, SpanKind::TimeRange);
/// assert_eq!(spans[0].raw, "9:00-17:00");
/// assert!(spans.iter().any(|s| s.kind == SpanKind::Tag));
/// ```
pub fn extract(line: &TaskLine, patterns: &PatternSet) -> Vec<MetadataSpan> {
    let floor = line.body_start;
    if floor >= line.body_end {
        return Vec::new();
    }
    let raw = line.raw.as_str();
    let text = &raw[..line.body_end];
    let mut spans = Vec::new();

    for (role, re) in &patterns.markers {
        for caps in matches(re, text, floor, |m| !next_is(text, m.end(), |c| c.is_ascii_digit())) {
            let Some(whole) = caps.get(0) else { continue };
            let capture = Capture::Date {
                date: caps["date"].to_string(),
                time: caps.name("time").map(|m| m.as_str().to_string()),
            };
            spans.push(
                MetadataSpan::new(SpanKind::DateMarker(*role), raw, whole.start(), whole.end())
                    .with_capture(capture),
            );
        }
    }

    for caps in matches(&DATAVIEW_FIELD, text, floor, |_| true) {
        let Some(whole) = caps.get(0) else { continue };
        let capture = Capture::Field {
            key: caps[1].to_string(),
            value: caps[2].trim().to_string(),
        };
        spans.push(
            MetadataSpan::new(SpanKind::DataviewField, raw, whole.start(), whole.end())
                .with_capture(capture),
        );
    }

    for caps in matches(&TAG, text, floor, |m| tag_bounded(text, floor, m.start())) {
        let Some(whole) = caps.get(0) else { continue };
        let name = whole.as_str().trim_start_matches('#').to_string();
        spans.push(
            MetadataSpan::new(SpanKind::Tag, raw, whole.start(), whole.end())
                .with_capture(Capture::Text(name)),
        );
    }

    for caps in matches(&PRIORITY_MARKER, text, floor, |_| true) {
        let Some(whole) = caps.get(0) else { continue };
        spans.push(
            MetadataSpan::new(SpanKind::Priority, raw, whole.start(), whole.end())
                .with_capture(Capture::Text(whole.as_str().to_string())),
        );
    }

    for (property, re) in TASK_PROPERTIES.iter() {
        for caps in matches(re, text, floor, |_| true) {
            let (Some(whole), Some(value)) = (caps.get(0), caps.name("value")) else {
                continue;
            };
            let end = match property {
                TaskProperty::Repeat => rule_end(text, value.start(), value.end()),
                _ => value.end(),
            };
            if end <= value.start() {
                continue;
            }
            spans.push(
                MetadataSpan::new(SpanKind::TaskProperty(*property), raw, whole.start(), end)
                    .with_capture(Capture::Text(text[value.start()..end].to_string())),
            );
        }
    }

    for re in &patterns.time_range {
        for caps in matches(re, text, floor, |m| clock_bounded(text, m.start(), m.end())) {
            let Some(whole) = caps.get(0) else { continue };
            let (Some(first), Some(second)) = (reading(&caps, "a"), reading(&caps, "b")) else {
                continue;
            };
            spans.push(time_span(
                SpanKind::TimeRange,
                line,
                patterns,
                whole.start(),
                whole.end(),
                Capture::ClockRange(first, second),
            ));
        }
    }

    for re in &patterns.single_time {
        for caps in matches(re, text, floor, |m| clock_bounded(text, m.start(), m.end())) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(clock) = reading(&caps, "") else { continue };
            spans.push(time_span(
                SpanKind::SingleTime,
                line,
                patterns,
                whole.start(),
                whole.end(),
                Capture::Clock(clock),
            ));
        }
    }

    let finders = patterns
        .grammars
        .iter()
        .map(|g| &g.finder)
        .chain(patterns.synonym_finder.as_ref());
    for re in finders {
        for caps in matches(re, text, floor, |_| true) {
            let Some(whole) = caps.get(0) else { continue };
            let (role, start) = patterns
                .keywords
                .absorb(raw, floor, whole.start(), DATE_ROLE_PRECEDENCE)
                .unwrap_or((DateRole::Due, whole.start()));
            spans.push(
                MetadataSpan::new(SpanKind::DateKeyword(role), raw, start, whole.end())
                    .with_capture(Capture::Text(whole.as_str().to_string())),
            );
        }
    }

    spans.sort_by_key(|s| (s.start, Reverse(s.len())));
    spans
}

/// A time or range span, widened over a role keyword written right before it.
fn time_span(
    kind: SpanKind,
    line: &TaskLine,
    patterns: &PatternSet,
    start: usize,
    end: usize,
    capture: Capture,
) -> MetadataSpan {
    let raw = line.raw.as_str();
    match patterns
        .keywords
        .absorb(raw, line.body_start, start, TIME_ROLE_PRECEDENCE)
    {
        Some((role, at)) => MetadataSpan {
            context: Some(role),
            ..MetadataSpan::new(kind, raw, at, end).with_capture(capture)
        },
        None => MetadataSpan::new(kind, raw, start, end).with_capture(capture),
    }
}

/// A recurrence rule ends at its last word, and never takes the hour of a
/// clock written right after it (`🔁 every week 10:00`).
fn rule_end(text: &str, start: usize, end: usize) -> usize {
    let end = start + text[start..end].trim_end().len();
    if !text[end..].starts_with(':') {
        return end;
    }
    let kept = text[start..end].rfind(' ').unwrap_or(0);
    start + text[start..start + kept].trim_end().len()
}

fn reading(caps: &Captures<'_>, tag: &str) -> Option<ClockReading> {
    let group = |name: &str| caps.name(&format!("{tag}{name}")).map(|m| m.as_str());
    Some(ClockReading {
        hour: group("h")?.parse().ok()?,
        minute: group("m")?.parse().ok()?,
        second: match group("s") {
            Some(s) => Some(s.parse().ok()?),
            None => None,
        },
        meridiem: group("p").and_then(Meridiem::parse),
    })
}

/// Matches of `re` in `text[from..]` that pass `accept`. A rejected match
/// restarts the search one character after its start.
fn matches<'t>(
    re: &Regex,
    text: &'t str,
    from: usize,
    accept: impl Fn(&regex::Match<'t>) -> bool,
) -> Vec<Captures<'t>> {
    let mut found = Vec::new();
    let mut pos = from;
    while pos <= text.len() {
        let Some(caps) = re.captures_at(text, pos) else {
            break;
        };
        let Some(whole) = caps.get(0) else { break };
        if accept(&whole) && !whole.is_empty() {
            pos = whole.end();
            found.push(caps);
        } else {
            pos = next_char(text, whole.start());
        }
    }
    found
}

fn next_char(text: &str, at: usize) -> usize {
    at + text[at..].chars().next().map_or(1, char::len_utf8)
}

fn next_is(text: &str, at: usize, pred: impl Fn(char) -> bool) -> bool {
    text[at..].chars().next().is_some_and(pred)
}

fn is_ascii_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Times may not touch ASCII letters or digits, sit next to `--`, or be
/// followed by `:<digit>`. CJK text around a time is fine (`在12:00开会`).
fn clock_bounded(text: &str, start: usize, end: usize) -> bool {
    let mut before = text[..start].chars().rev();
    let (prev, prev2) = (before.next(), before.next());
    if prev.is_some_and(is_ascii_word) || (prev == Some('-') && prev2 == Some('-')) {
        return false;
    }
    let mut after = text[end..].chars();
    let (next, next2) = (after.next(), after.next());
    if next.is_some_and(is_ascii_word) {
        return false;
    }
    match next {
        Some(':') => !next2.is_some_and(|c| c.is_ascii_digit()),
        Some('-') => next2 != Some('-'),
        _ => true,
    }
}

/// Tags start the body or follow a character that cannot be part of a word,
/// a URL fragment or an HTML entity.
fn tag_bounded(text: &str, floor: usize, start: usize) -> bool {
    if start <= floor {
        return true;
    }
    match text[..start].chars().next_back() {
        Some(c) => !(c.is_alphanumeric() || matches!(c, '_' | '#' | '/' | '&' | '-')),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::mk_config;

    fn spans(raw: &str) -> Vec<MetadataSpan> {
        let patterns = PatternSet::compile(&mk_config()).unwrap();
        extract(&TaskLine::scan(raw), &patterns)
    }

    fn kinds(raw: &str) -> Vec<(SpanKind, String)> {
        spans(raw).into_iter().map(|s| (s.kind, s.raw)).collect()
    }

    #[test]
    fn scan_without_prefix_or_block_reference() {
        let line = TaskLine::scan("meeting at 2:30 PM  ");
        assert_eq!(line.body_start, 0);
        assert_eq!(line.body(), "meeting at 2:30 PM");
        assert!(line.block_reference.is_none());
        assert!(!line.is_task());
    }

    #[test]
    fn scan_block_reference_only_line() {
        let line = TaskLine::scan("- [ ] ^abc");
        assert_eq!(line.block_id(), Some("^abc"));
        assert_eq!(line.body(), "");
        assert_eq!(line.prefix(), "- [ ]");
    }

    #[test]
    fn empty_body_has_no_candidates() {
        assert!(spans("").is_empty());
        assert!(spans("- [ ] ").is_empty());
        assert!(spans("- [ ] ^only-ref").is_empty());
    }

    #[test]
    fn block_reference_text_is_never_scanned() {
        assert!(spans("note ^due-tomorrow").is_empty());
    }

    #[test]
    fn time_absorbs_keyword_before_it() {
        let found = spans("- [ ] call scheduled 12:00 ^timer-1");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, SpanKind::SingleTime);
        assert_eq!(found[0].raw, "scheduled 12:00");
        assert_eq!(found[0].context, Some(DateRole::Scheduled));
    }

    #[test]
    fn range_precedes_single_time_at_same_start() {
        let found = kinds("workshop 9:00-17:00");
        assert_eq!(found[0], (SpanKind::TimeRange, "9:00-17:00".to_string()));
        assert_eq!(found[1], (SpanKind::SingleTime, "9:00".to_string()));
        assert_eq!(found[2], (SpanKind::SingleTime, "17:00".to_string()));
    }

    #[test]
    fn twelve_hour_and_twenty_four_hour_candidates_coexist() {
        let found = kinds("meeting at 2:30 PM");
        assert_eq!(found[0], (SpanKind::SingleTime, "at 2:30 PM".to_string()));
        assert_eq!(found[1], (SpanKind::SingleTime, "at 2:30".to_string()));
    }

    #[test]
    fn times_need_ascii_boundaries() {
        assert!(spans("version v12:30").is_empty());
        assert!(spans("ratio 12:30:45:10").is_empty());
        assert!(spans("flag --10:00").is_empty());
        assert!(spans("id 10:00abc").is_empty());
        let found = kinds("开会在12:00");
        assert_eq!(found, vec![(SpanKind::SingleTime, "在12:00".to_string())]);
    }

    #[test]
    fn relative_dates_take_keyword_role_or_due() {
        let found = kinds("pay rent start next monday");
        assert_eq!(
            found,
            vec![(SpanKind::DateKeyword(DateRole::Start), "start next monday".to_string())]
        );
        let found = kinds("pay rent tomorrow");
        assert_eq!(
            found,
            vec![(SpanKind::DateKeyword(DateRole::Due), "tomorrow".to_string())]
        );
    }

    #[test]
    fn chinese_phrases_absorb_touching_keywords() {
        let found = kinds("提交报告截止下周三");
        assert_eq!(
            found,
            vec![(SpanKind::DateKeyword(DateRole::Due), "截止下周三".to_string())]
        );
    }

    #[test]
    fn markers_tags_fields_and_priority() {
        let found = kinds("- [ ] pay ⏫ #bills [owner:: me] 📅 2025-01-10");
        assert_eq!(
            found,
            vec![
                (SpanKind::Priority, "⏫".to_string()),
                (SpanKind::Tag, "#bills".to_string()),
                (SpanKind::DataviewField, "[owner:: me]".to_string()),
                (SpanKind::DateMarker(DateRole::Due), "📅 2025-01-10".to_string()),
            ]
        );
    }

    #[test]
    fn task_properties_read_their_values() {
        let found = kinds("- [ ] ship 🆔 abc-1 ⛔ x1, y2 🏁 delete 🔁 every week #work");
        assert_eq!(
            found,
            vec![
                (SpanKind::TaskProperty(TaskProperty::Id), "🆔 abc-1".to_string()),
                (SpanKind::TaskProperty(TaskProperty::DependsOn), "⛔ x1, y2".to_string()),
                (SpanKind::TaskProperty(TaskProperty::OnCompletion), "🏁 delete".to_string()),
                (SpanKind::TaskProperty(TaskProperty::Repeat), "🔁 every week".to_string()),
                (SpanKind::Tag, "#work".to_string()),
            ]
        );
    }

    #[test]
    fn recurrence_rule_leaves_a_following_clock_alone() {
        let found = kinds("standup 🔁 every day 10:00");
        assert_eq!(found[0], (SpanKind::TaskProperty(TaskProperty::Repeat), "🔁 every day".to_string()));
        assert!(found.iter().any(|(kind, raw)| *kind == SpanKind::SingleTime && raw == "10:00"));
    }

    #[test]
    fn marker_date_must_end_cleanly() {
        assert!(spans("📅 2025-01-100").is_empty());
    }

    #[test]
    fn tags_skip_urls_and_entities() {
        assert!(spans("see https://x.io/#anchor").is_empty());
        assert!(spans("it&#39;s").is_empty());
        assert_eq!(kinds("#first"), vec![(SpanKind::Tag, "#first".to_string())]);
    }

    #[test]
    fn tag_word_inside_a_date_phrase_is_a_separate_candidate() {
        let found = kinds("#tomorrow");
        assert_eq!(found[0], (SpanKind::Tag, "#tomorrow".to_string()));
        assert_eq!(found[1].0, SpanKind::DateKeyword(DateRole::Due));
    }
}
