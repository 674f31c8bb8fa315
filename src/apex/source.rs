//! Source text with a structurally masked view.
//!
//! Every scan works on two views of the same unit: the original text, used
//! for snippets, and a masked copy in which comments and string literal
//! contents are replaced by spaces. The masked copy has exactly the same byte
//! length and line layout as the original, so offsets found in one are valid
//! in the other.

use std::ops::Range;

use crate::detect::LineSpan;

/// An Apex compilation unit prepared for lexical scanning.
#[derive(Debug, Clone)]
pub struct ApexSource<'a> {
    original: &'a str,
    masked: String,
    line_starts: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment,
    StringLiteral,
}

impl<'a> ApexSource<'a> {
    /// Build the masked view of `text`.
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));

        Self {
            original: text,
            masked: mask(text),
            line_starts,
        }
    }

    /// The unmodified source text.
    pub fn original(&self) -> &'a str {
        self.original
    }

    /// The masked source text (comments and string contents blanked).
    pub fn masked(&self) -> &str {
        &self.masked
    }

    /// Original text for a byte range.
    pub fn slice(&self, range: Range<usize>) -> &'a str {
        &self.original[range]
    }

    /// 1-based line number containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Line span covered by a non-empty byte range (end exclusive).
    pub fn span(&self, range: Range<usize>) -> LineSpan {
        let end = if range.end > range.start {
            range.end - 1
        } else {
            range.start
        };
        LineSpan::new(self.line_of(range.start), self.line_of(end))
    }

    /// Shrink a range so it starts and ends on non-whitespace.
    pub fn trim_range(&self, range: Range<usize>) -> Range<usize> {
        let text = &self.original[range.clone()];
        let leading = text.len() - text.trim_start().len();
        let trailing = text.len() - text.trim_end().len();
        if leading == text.len() {
            return range.start..range.start;
        }
        (range.start + leading)..(range.end - trailing)
    }

    /// Find the delimiter closing the one at `open` in the masked text.
    ///
    /// Supports `(`, `[` and `{`. Returns the offset of the closing byte.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        let bytes = self.masked.as_bytes();
        let (open_ch, close_ch) = match bytes.get(open)? {
            b'(' => (b'(', b')'),
            b'[' => (b'[', b']'),
            b'{' => (b'{', b'}'),
            _ => return None,
        };

        let mut depth = 0usize;
        for (i, &b) in bytes.iter().enumerate().skip(open) {
            if b == open_ch {
                depth += 1;
            } else if b == close_ch {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Offset of the first non-whitespace byte at or after `from`.
    pub fn skip_whitespace(&self, from: usize) -> Option<usize> {
        self.masked.as_bytes()[from.min(self.masked.len())..]
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|p| from + p)
    }

    /// Range of the statement containing `offset`.
    ///
    /// A statement starts after the nearest preceding `;`, `{` or `}` and runs
    /// through the next `;` (inclusive). Unterminated statements run to the
    /// end of the unit.
    pub fn statement_range(&self, offset: usize) -> Range<usize> {
        let bytes = self.masked.as_bytes();
        let start = bytes[..offset]
            .iter()
            .rposition(|b| matches!(b, b';' | b'{' | b'}'))
            .map(|p| p + 1)
            .unwrap_or(0);
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == b';')
            .map(|p| offset + p + 1)
            .unwrap_or(bytes.len());
        self.trim_range(start..end)
    }

    /// Masked text preceding `offset` within its statement.
    pub fn statement_prefix(&self, offset: usize) -> &str {
        let bytes = self.masked.as_bytes();
        let start = bytes[..offset]
            .iter()
            .rposition(|b| matches!(b, b';' | b'{' | b'}'))
            .map(|p| p + 1)
            .unwrap_or(0);
        &self.masked[start..offset]
    }
}

/// Blank comments and string literal contents, preserving byte length and
/// newlines. Quote characters are kept so literals stay visible as tokens.
fn mask(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = LexState::Code;
    let mut chars = text.char_indices().peekable();

    let blank = |out: &mut String, c: char| {
        if c == '\n' {
            out.push('\n');
        } else {
            for _ in 0..c.len_utf8() {
                out.push(' ');
            }
        }
    };

    while let Some((_, c)) = chars.next() {
        match state {
            LexState::Code => match c {
                '/' if matches!(chars.peek(), Some((_, '/'))) => {
                    chars.next();
                    out.push_str("  ");
                    state = LexState::LineComment;
                }
                '/' if matches!(chars.peek(), Some((_, '*'))) => {
                    chars.next();
                    out.push_str("  ");
                    state = LexState::BlockComment;
                }
                '\'' => {
                    out.push('\'');
                    state = LexState::StringLiteral;
                }
                _ => out.push(c),
            },
            LexState::LineComment => {
                if c == '\n' {
                    state = LexState::Code;
                }
                blank(&mut out, c);
            }
            LexState::BlockComment => {
                if c == '*' && matches!(chars.peek(), Some((_, '/'))) {
                    chars.next();
                    out.push_str("  ");
                    state = LexState::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            LexState::StringLiteral => match c {
                '\\' => {
                    blank(&mut out, c);
                    if let Some((_, escaped)) = chars.next() {
                        blank(&mut out, escaped);
                    }
                }
                '\'' => {
                    out.push('\'');
                    state = LexState::Code;
                }
                _ => blank(&mut out, c),
            },
        }
    }

    out
}
