//! Splitting answers into transport-sized segments.
//!
//! Text is first cut into structural slices (plain gaps and whole marker
//! pairs), then any slice over the ceiling is cut into fixed windows. Windows
//! of a quoted slice are re-wrapped in markers so no segment carries half a
//! pair. Lengths are counted in characters.
//!
//! A ceiling no larger than the two markers combined cannot hold a wrapped
//! window; such quoted slices are cut like plain text and may lose marker
//! pairing. That configuration is unsupported.

use crate::assistant::annotations::QUOTE_MARKER;

/// Opening and closing delimiters of a quoted excerpt.
#[derive(Debug, Clone, Copy)]
pub struct MarkerPair<'a> {
    pub open: &'a str,
    pub close: &'a str,
}

pub const QUOTE: MarkerPair<'static> = MarkerPair {
    open: QUOTE_MARKER,
    close: QUOTE_MARKER,
};

#[derive(Debug, PartialEq, Eq)]
enum Slice<'a> {
    Plain(&'a str),
    /// Starts with the open marker; `closed` is false for a trailing unmatched opener.
    Quoted { text: &'a str, closed: bool },
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into segments of at most `max_len` characters using the quote markers.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    chunk_with(text, max_len, QUOTE)
}

/// As [`chunk`] with caller-chosen markers. An empty marker disables quote
/// handling and the whole text is cut as plain windows.
pub fn chunk_with(text: &str, max_len: usize, markers: MarkerPair<'_>) -> Vec<String> {
    let max_len = max_len.max(1);
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    structural_slices(text, markers)
        .into_iter()
        .flat_map(|slice| enforce_length(slice, max_len, markers))
        .filter(|segment| !is_marker_only(segment, markers))
        .collect()
}

/// Alternate between open and close markers, keeping each pair whole.
fn structural_slices<'a>(text: &'a str, markers: MarkerPair<'_>) -> Vec<Slice<'a>> {
    if markers.open.is_empty() || markers.close.is_empty() {
        return vec![Slice::Plain(text)];
    }

    let mut slices = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let Some(start) = rest.find(markers.open) else {
            slices.push(Slice::Plain(rest));
            break;
        };
        if start > 0 {
            slices.push(Slice::Plain(&rest[..start]));
        }

        let body_start = start + markers.open.len();
        match rest[body_start..].find(markers.close) {
            Some(rel) => {
                let end = body_start + rel + markers.close.len();
                slices.push(Slice::Quoted {
                    text: &rest[start..end],
                    closed: true,
                });
                rest = &rest[end..];
            }
            None => {
                slices.push(Slice::Quoted {
                    text: &rest[start..],
                    closed: false,
                });
                break;
            }
        }
    }

    slices
}

fn enforce_length(slice: Slice<'_>, max_len: usize, markers: MarkerPair<'_>) -> Vec<String> {
    match slice {
        Slice::Plain(text) => windows(text, max_len).into_iter().map(str::to_string).collect(),
        Slice::Quoted { text, .. } if char_len(text) <= max_len => vec![text.to_string()],
        Slice::Quoted { text, closed } => {
            let width = max_len.saturating_sub(char_len(markers.open) + char_len(markers.close));
            if width == 0 {
                return windows(text, max_len).into_iter().map(str::to_string).collect();
            }

            let inner = &text[markers.open.len()..];
            let inner = if closed {
                &inner[..inner.len() - markers.close.len()]
            } else {
                inner
            };
            windows(inner, width)
                .into_iter()
                .map(|w| format!("{}{}{}", markers.open, w, markers.close))
                .collect()
        }
    }
}

/// Non-overlapping windows of `width` characters.
fn windows(text: &str, width: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == width {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn is_marker_only(segment: &str, markers: MarkerPair<'_>) -> bool {
    segment.is_empty()
        || segment == markers.open
        || segment == markers.close
        || segment
            .strip_prefix(markers.open)
            .is_some_and(|rest| rest == markers.close)
}
