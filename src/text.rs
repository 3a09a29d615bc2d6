//! Text primitives shared by virtual documents and span mapping.
//!
//! Offsets and character positions are expressed in UTF-16 code units, the
//! unit used by the Razor language server and by LSP positions. Internally the
//! text is stored as UTF-8, so every conversion goes through [`PositionMapper`].

use serde::{Deserialize, Serialize};
use tower_lsp_server::ls_types::{Position, Range};

/// A half-open span `[start, start + length)` in UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub length: usize,
}

impl TextSpan {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    pub fn from_bounds(start: usize, end: usize) -> Self {
        Self {
            start,
            length: end.saturating_sub(start),
        }
    }

    /// Exclusive end, saturating at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.length)
    }

    /// Exclusive end, or `None` when `start + length` overflows.
    pub fn checked_end(&self) -> Option<usize> {
        self.start.checked_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether `other` lies entirely inside this span.
    pub fn contains_span(&self, other: &TextSpan) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }
}

/// One incremental edit: replace `span` (relative to the buffer state after all
/// previous edits of the same batch) with `new_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
    pub span: TextSpan,
    pub new_text: String,
}

impl TextChange {
    pub fn new(start: usize, length: usize, new_text: impl Into<String>) -> Self {
        Self {
            span: TextSpan::new(start, length),
            new_text: new_text.into(),
        }
    }

    pub fn insert(at: usize, new_text: impl Into<String>) -> Self {
        Self::new(at, 0, new_text)
    }

    /// Whether this change targets the very start of an empty buffer.
    pub fn is_origin_insert(&self) -> bool {
        self.span.start == 0 && self.span.length == 0
    }
}

/// Error returned when a change does not fit the buffer it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "change #{index} at offset {} (length {}) exceeds buffer length {buffer_len}",
    .span.start,
    .span.length
)]
pub struct ChangeOutOfBounds {
    /// Index of the offending change within its batch.
    pub index: usize,
    pub span: TextSpan,
    /// Buffer length (UTF-16) at the time the change was applied.
    pub buffer_len: usize,
}

/// Apply `changes` sequentially to `text`.
///
/// Offsets of change `i` are interpreted against the result of changes
/// `0..i`. Returns the new text, or the first change that does not fit.
pub fn apply_changes(text: &str, changes: &[TextChange]) -> Result<String, ChangeOutOfBounds> {
    let mut buffer = text.to_string();
    for (index, change) in changes.iter().enumerate() {
        let mapper = PositionMapper::new(&buffer);
        let (Some(start), Some(end)) = (
            mapper.utf16_offset_to_byte(change.span.start),
            change
                .span
                .checked_end()
                .and_then(|end| mapper.utf16_offset_to_byte(end)),
        ) else {
            return Err(ChangeOutOfBounds {
                index,
                span: change.span,
                buffer_len: mapper.utf16_len(),
            });
        };
        buffer.replace_range(start..end, &change.new_text);
    }
    Ok(buffer)
}

/// Converts between UTF-16 offsets, byte offsets and LSP positions for one text.
///
/// Line starts are computed once on construction; `\n`, `\r\n` and lone `\r`
/// all terminate a line.
pub struct PositionMapper<'a> {
    text: &'a str,
    /// Byte offset of the first character of every line.
    line_starts: Vec<usize>,
}

impl<'a> PositionMapper<'a> {
    pub fn new(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let mut line_starts = vec![0];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                    line_starts.push(i + 2);
                    i += 2;
                    continue;
                }
                b'\r' | b'\n' => line_starts.push(i + 1),
                _ => {}
            }
            i += 1;
        }
        Self { text, line_starts }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Total length in UTF-16 code units.
    pub fn utf16_len(&self) -> usize {
        self.text.encode_utf16().count()
    }

    /// Convert a UTF-16 offset to a byte offset.
    ///
    /// Returns `None` past the end of the text or inside a surrogate pair.
    pub fn utf16_offset_to_byte(&self, offset: usize) -> Option<usize> {
        let mut units = 0;
        for (byte, ch) in self.text.char_indices() {
            if units == offset {
                return Some(byte);
            }
            units += ch.len_utf16();
            if units > offset {
                return None;
            }
        }
        (units == offset).then_some(self.text.len())
    }

    /// Convert a byte offset (on a char boundary) to a UTF-16 offset.
    pub fn byte_to_utf16_offset(&self, byte: usize) -> Option<usize> {
        if byte > self.text.len() || !self.text.is_char_boundary(byte) {
            return None;
        }
        Some(self.text[..byte].encode_utf16().count())
    }

    /// Byte range of line `line`, excluding its terminator.
    pub fn line_byte_range(&self, line: usize) -> Option<std::ops::Range<usize>> {
        let start = *self.line_starts.get(line)?;
        let next = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text.len());
        let content = &self.text[start..next];
        let trimmed = content.trim_end_matches(['\r', '\n']);
        Some(start..start + trimmed.len())
    }

    /// Text of line `line`, excluding its terminator.
    pub fn line_text(&self, line: usize) -> Option<&'a str> {
        self.line_byte_range(line).map(|r| &self.text[r])
    }

    pub fn position_to_byte(&self, position: Position) -> Option<usize> {
        let range = self.line_byte_range(position.line as usize)?;
        let line = &self.text[range.clone()];
        let mut units = 0usize;
        for (byte, ch) in line.char_indices() {
            if units == position.character as usize {
                return Some(range.start + byte);
            }
            units += ch.len_utf16();
        }
        (units == position.character as usize).then_some(range.end)
    }

    pub fn byte_to_position(&self, byte: usize) -> Option<Position> {
        if byte > self.text.len() || !self.text.is_char_boundary(byte) {
            return None;
        }
        let line = match self.line_starts.binary_search(&byte) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let character = self.text[line_start..byte].encode_utf16().count();
        Some(Position::new(line as u32, character as u32))
    }

    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        self.byte_to_utf16_offset(self.position_to_byte(position)?)
    }

    pub fn offset_to_position(&self, offset: usize) -> Option<Position> {
        self.byte_to_position(self.utf16_offset_to_byte(offset)?)
    }

    pub fn span_to_range(&self, span: TextSpan) -> Option<Range> {
        Some(Range::new(
            self.offset_to_position(span.start)?,
            self.offset_to_position(span.end())?,
        ))
    }

    pub fn range_to_span(&self, range: Range) -> Option<TextSpan> {
        let start = self.position_to_offset(range.start)?;
        let end = self.position_to_offset(range.end)?;
        (end >= start).then(|| TextSpan::from_bounds(start, end))
    }

    /// Slice the text covered by a UTF-16 span.
    pub fn slice(&self, span: TextSpan) -> Option<&'a str> {
        let start = self.utf16_offset_to_byte(span.start)?;
        let end = self.utf16_offset_to_byte(span.end())?;
        Some(&self.text[start..end])
    }
}
