use std::ops::Range;

use crate::config::EngineConfig;
use crate::extract::TaskLine;
use crate::keywords::DateRole;
use crate::span::{MetadataSpan, SpanKind};

/// Markers that are kept in the line, moved to its end, when `relocate_markers` is on.
pub fn is_relocated(kind: SpanKind, config: &EngineConfig) -> bool {
    config.relocate_markers
        && matches!(
            kind,
            SpanKind::DateMarker(_) | SpanKind::Priority | SpanKind::TaskProperty(_)
        )
}

/// A rewritten line, with the input offset every output byte was taken from.
///
/// Inserted seam spaces point at the byte that follows them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewritten {
    pub text: String,
    pub origin: Vec<usize>,
}

impl Rewritten {
    fn verbatim(raw: &str) -> Self {
        Self {
            text: raw.to_string(),
            origin: (0..raw.len()).collect(),
        }
    }

    fn push(&mut self, s: &str, at: usize) {
        self.text.push_str(s);
        self.origin.extend(at..at + s.len());
    }

    fn push_space(&mut self, at: usize) {
        self.text.push(' ');
        self.origin.push(at);
    }

    fn truncate(&mut self, len: usize) {
        self.text.truncate(len);
        self.origin.truncate(len);
    }

    fn trim_end(&mut self) {
        self.truncate(self.text.trim_end().len());
    }

    fn ends_with_space(&self) -> bool {
        self.text.ends_with(char::is_whitespace)
    }

    /// Input range that `start..end` of the output was cut from.
    pub fn source_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let first = *self.origin.get(start)?;
        let last = *self.origin.get(end.checked_sub(1)?)?;
        Some((first, last + 1))
    }

    /// Re-expresses the origins through the origins of the line this one was
    /// rewritten from.
    pub fn through(self, outer: &[usize]) -> Self {
        let origin = self
            .origin
            .into_iter()
            .map(|at| outer.get(at).copied().unwrap_or(at))
            .collect();
        Self {
            text: self.text,
            origin,
        }
    }
}

/// Builds the cleaned line from the accepted spans.
///
/// The checkbox prefix stays as is. Accepted spans are cut out and the
/// whitespace at every seam collapses to one space. A cut with text glued on
/// both sides leaves one space, so the halves never fuse into a new token.
/// Relocated markers are appended in document order, then the block reference.
///
/// # Examples
///
/// ```
/// # use taskline_core::{EngineConfig, extract::{extract, TaskLine}, patterns::PatternSet};
/// # use taskline_core::{resolve::resolve, rewrite::rewrite};
/// let config = EngineConfig::default();
/// let patterns = PatternSet::compile(&config).unwrap();
/// let line = TaskLine::scan("- [ ] pay ⏫ rent #bills ^rent");
/// let accepted = resolve(extract(&line, &patterns)).accepted;
///
/// assert_eq!(rewrite(&line, &accepted, &config).text, "- [ ] pay rent ⏫ ^rent");
/// ```
pub fn rewrite(line: &TaskLine, accepted: &[MetadataSpan], config: &EngineConfig) -> Rewritten {
    if !config.remove_original_text {
        return Rewritten::verbatim(&line.raw);
    }
    if accepted.is_empty() {
        return match &line.block_reference {
            Some(block) => {
                let mut out = Rewritten::default();
                out.push(&line.raw[..line.body_end], 0);
                join_block(out, block)
            }
            None => Rewritten::verbatim(&line.raw),
        };
    }
    let moved: Vec<(&str, usize)> = accepted
        .iter()
        .filter(|s| is_relocated(s.kind, config))
        .map(|s| {
            let text = s.raw.trim();
            (text, s.start + s.raw.len() - s.raw.trim_start().len())
        })
        .collect();
    splice(line, accepted, &moved)
}

/// Cuts `spans` out of the body, then appends `tail` (text and its offset)
/// and the block reference.
pub(crate) fn splice(line: &TaskLine, spans: &[MetadataSpan], tail: &[(&str, usize)]) -> Rewritten {
    let raw = line.raw.as_str();
    let floor = line.body_start;
    let mut out = Rewritten::default();
    out.push(&raw[..floor], 0);
    let mut cursor = floor;
    for span in spans {
        if span.start < cursor || span.end > line.body_end {
            continue;
        }
        push_segment(&mut out, raw, cursor..span.start, floor);
        cursor = span.end;
    }
    if !raw[cursor..line.body_end].trim().is_empty() {
        push_segment(&mut out, raw, cursor..line.body_end, floor);
    }
    out.trim_end();
    for &(text, at) in tail {
        if !out.text.is_empty() {
            out.push_space(at);
        }
        out.push(text, at);
    }
    match &line.block_reference {
        Some(block) => join_block(out, block),
        None => out,
    }
}

fn join_block(mut out: Rewritten, block: &MetadataSpan) -> Rewritten {
    out.trim_end();
    if !out.text.is_empty() {
        out.push_space(block.start);
    }
    out.push(&block.raw, block.start);
    out
}

/// Appends `raw[range]`, collapsing the whitespace at the seam to a single
/// space. Nothing at or below `floor` (the prefix) is touched, and leading
/// whitespace right after the prefix is dropped.
fn push_segment(out: &mut Rewritten, raw: &str, range: Range<usize>, floor: usize) {
    let segment = &raw[range.clone()];
    let body = segment.trim_start();
    let at = range.end - body.len();
    let leading = body.len() < segment.len();
    if out.text.len() > floor {
        if leading || out.ends_with_space() {
            let keep = out.text.trim_end().len().max(floor);
            out.truncate(keep);
            if out.text.len() > floor {
                out.push_space(at);
            }
        } else if !body.is_empty() {
            out.push_space(at);
        }
    }
    out.push(body, at);
}

/// Offset where a new marker for `role` belongs.
///
/// `completed` goes at the end of the task, right before the block reference.
/// `cancelled` follows an existing start marker. Everything else goes right
/// after the task text, before the first tag, field or marker.
pub fn marker_position(line: &TaskLine, accepted: &[MetadataSpan], role: DateRole) -> usize {
    if role == DateRole::Completed {
        return line.body_end;
    }
    if role == DateRole::Cancelled {
        if let Some(start) = accepted
            .iter()
            .find(|s| s.kind == SpanKind::DateMarker(DateRole::Start))
        {
            return start.end;
        }
    }
    accepted
        .iter()
        .find(|s| {
            matches!(
                s.kind,
                SpanKind::Tag
                    | SpanKind::DataviewField
                    | SpanKind::DateMarker(_)
                    | SpanKind::Priority
                    | SpanKind::TaskProperty(_)
            )
        })
        .map_or(line.body_end, |s| s.start)
}

/// Inserts `text` at `pos` with a single space on each side.
pub(crate) fn insert_at(line: &TaskLine, pos: usize, text: &str) -> String {
    let raw = line.raw.as_str();
    let left = raw[..pos].trim_end();
    let right = &raw[pos..];
    let mut out = String::with_capacity(raw.len() + text.len() + 2);
    out.push_str(left);
    if !left.is_empty() {
        out.push(' ');
    }
    out.push_str(text);
    if !right.is_empty() && !right.starts_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(right);
    out
}
