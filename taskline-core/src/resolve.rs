use std::cmp::Reverse;
use std::collections::HashSet;

use log::debug;

use crate::keywords::DateRole;
use crate::normalize::marker_date;
use crate::span::{Capture, MetadataSpan, SpanKind};

/// Outcome of conflict resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Non-overlapping spans in document order.
    pub accepted: Vec<MetadataSpan>,
    /// Spans that lost to a marker or to an earlier/longer span.
    pub discarded: Vec<MetadataSpan>,
    /// End offset of the last accepted span (0 when none).
    pub last_end: usize,
}

/// Picks a non-overlapping subset of candidates.
///
/// An emoji marker beats every date keyword of the same role, wherever either
/// sits in the line, as long as the marker itself is accepted and carries a
/// real calendar date. The rest is a left-to-right sweep: the earliest span
/// wins, and at equal starts the longest one does.
///
/// # Examples
///
/// ```
/// # use taskline_core::{EngineConfig, extract::{extract, TaskLine}, patterns::PatternSet};
/// # use taskline_core::resolve::resolve;
/// let patterns = PatternSet::compile(&EngineConfig::default()).unwrap();
/// let line = TaskLine::scan("lunch 12:00~13:00");
///
/// let resolution = resolve(extract(&line, &patterns));
///
/// assert_eq!(resolution.accepted.len(), 1);
/// assert_eq!(resolution.accepted[0].raw, "12:00~13:00");
/// assert_eq!(resolution.discarded.len(), 2);
/// ```
pub fn resolve(mut spans: Vec<MetadataSpan>) -> Resolution {
    spans.sort_by_key(|s| (s.start, Reverse(s.len())));
    let mut marked: HashSet<DateRole> = spans.iter().filter_map(dated_marker).collect();
    loop {
        let resolution = sweep(&spans, &marked);
        let held: HashSet<DateRole> = resolution.accepted.iter().filter_map(dated_marker).collect();
        // Dropping a marker frees its keywords, which may in turn displace another marker.
        let before = marked.len();
        marked.retain(|role| held.contains(role));
        if marked.len() == before {
            return resolution;
        }
        debug!("{} marker(s) lost their place", before - marked.len());
    }
}

/// The role of a date marker whose date exists.
fn dated_marker(span: &MetadataSpan) -> Option<DateRole> {
    match (&span.kind, &span.capture) {
        (SpanKind::DateMarker(role), Capture::Date { date, time }) => {
            marker_date(date, time.as_deref()).map(|_| *role)
        }
        _ => None,
    }
}

fn sweep(spans: &[MetadataSpan], marked: &HashSet<DateRole>) -> Resolution {
    let mut resolution = Resolution::default();
    for span in spans {
        if let SpanKind::DateKeyword(role) = span.kind {
            if marked.contains(&role) {
                debug!("'{}' loses to a {} marker", span.raw, role.as_ref());
                resolution.discarded.push(span.clone());
                continue;
            }
        }
        if span.start < resolution.last_end {
            debug!("'{}' overlaps an accepted span", span.raw);
            resolution.discarded.push(span.clone());
            continue;
        }
        resolution.last_end = span.end;
        resolution.accepted.push(span.clone());
    }
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(kind: SpanKind, start: usize, end: usize) -> MetadataSpan {
        let line = "x".repeat(64);
        MetadataSpan::new(kind, &line, start, end)
    }

    fn marker(role: DateRole, date: &str, start: usize, end: usize) -> MetadataSpan {
        span(SpanKind::DateMarker(role), start, end).with_capture(Capture::Date {
            date: date.to_string(),
            time: None,
        })
    }

    fn is_sorted_and_disjoint(spans: &[MetadataSpan]) -> bool {
        spans.windows(2).all(|w| w[0].end <= w[1].start)
    }

    #[test]
    fn no_candidates_accepts_nothing() {
        let resolution = resolve(Vec::new());
        assert!(resolution.accepted.is_empty());
        assert_eq!(resolution.last_end, 0);
    }

    #[test]
    fn longest_wins_at_same_start() {
        let resolution = resolve(vec![
            span(SpanKind::SingleTime, 9, 13),
            span(SpanKind::TimeRange, 9, 19),
            span(SpanKind::SingleTime, 14, 19),
        ]);
        assert_eq!(resolution.accepted.len(), 1);
        assert_eq!(resolution.accepted[0].kind, SpanKind::TimeRange);
        assert_eq!(resolution.last_end, 19);
        assert_eq!(resolution.discarded.len(), 2);
    }

    #[test]
    fn earlier_span_wins_partial_overlap() {
        let resolution = resolve(vec![
            span(SpanKind::DateKeyword(DateRole::Due), 10, 20),
            span(SpanKind::Tag, 5, 12),
        ]);
        assert_eq!(resolution.accepted.len(), 1);
        assert_eq!(resolution.accepted[0].kind, SpanKind::Tag);
    }

    #[test]
    fn marker_beats_keyword_of_same_role_anywhere() {
        let resolution = resolve(vec![
            span(SpanKind::DateKeyword(DateRole::Due), 0, 12),
            span(SpanKind::DateKeyword(DateRole::Start), 13, 20),
            marker(DateRole::Due, "2025-01-10", 30, 43),
        ]);
        let kinds: Vec<_> = resolution.accepted.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SpanKind::DateKeyword(DateRole::Start),
                SpanKind::DateMarker(DateRole::Due)
            ]
        );
    }

    #[test]
    fn marker_with_impossible_date_does_not_cancel_keywords() {
        let resolution = resolve(vec![
            span(SpanKind::DateKeyword(DateRole::Due), 4, 12),
            marker(DateRole::Due, "2025-02-30", 13, 26),
        ]);
        let kinds: Vec<_> = resolution.accepted.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SpanKind::DateKeyword(DateRole::Due), SpanKind::DateMarker(DateRole::Due)]
        );
    }

    #[test]
    fn marker_hidden_inside_another_span_does_not_cancel_keywords() {
        let resolution = resolve(vec![
            span(SpanKind::DateKeyword(DateRole::Due), 4, 12),
            span(SpanKind::DataviewField, 13, 40),
            marker(DateRole::Due, "2025-01-10", 21, 34),
        ]);
        let kinds: Vec<_> = resolution.accepted.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SpanKind::DateKeyword(DateRole::Due), SpanKind::DataviewField]
        );
        assert_eq!(resolution.discarded.len(), 1);
    }

    #[test]
    fn displaced_markers_cascade() {
        // Freeing the due keyword pushes out the start marker, which frees the start keyword.
        let resolution = resolve(vec![
            span(SpanKind::DataviewField, 0, 20),
            marker(DateRole::Due, "2025-01-10", 5, 18),
            span(SpanKind::DateKeyword(DateRole::Start), 22, 30),
            span(SpanKind::DateKeyword(DateRole::Due), 31, 40),
            marker(DateRole::Start, "2025-01-02", 35, 48),
        ]);
        let kinds: Vec<_> = resolution.accepted.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SpanKind::DataviewField,
                SpanKind::DateKeyword(DateRole::Start),
                SpanKind::DateKeyword(DateRole::Due)
            ]
        );
    }

    #[test]
    fn accepted_spans_are_disjoint_and_ordered() {
        let resolution = resolve(vec![
            span(SpanKind::Tag, 40, 45),
            span(SpanKind::SingleTime, 2, 8),
            span(SpanKind::TimeRange, 2, 14),
            span(SpanKind::DataviewField, 12, 30),
            span(SpanKind::Priority, 30, 31),
            span(SpanKind::Tag, 44, 50),
        ]);
        assert!(is_sorted_and_disjoint(&resolution.accepted));
        let ranges: Vec<_> = resolution.accepted.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(2, 14), (30, 31), (40, 45)]);
    }
}
