use dashmap::DashMap;
use regex::Regex;
use tower_lsp::lsp_types::{Position, Range};

pub type DocumentStore = DashMap<String, Document>;

type LineOffset = usize;

#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    line_index: LineIndex,
}

impl Document {
    pub fn new(text: String) -> Self {
        let line_index = LineIndex::new(&text);
        Self { text, line_index }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn offset(&self, position: Position) -> Option<usize> {
        self.line_index.offset(&self.text, position)
    }

    pub fn position_at(&self, byte_offset: usize) -> Position {
        self.line_index.position_at(&self.text, byte_offset)
    }

    pub fn range(&self) -> Range {
        self.line_index.range(&self.text)
    }

    /// Byte offset where `line` starts, if the line exists.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_index.line_starts.get(line).copied()
    }

    /// Range covering `len` bytes starting at byte column `column` of `line`.
    pub fn span(&self, line: usize, column: usize, len: usize) -> Range {
        let start = self.line_start(line).unwrap_or(self.text.len()) + column;
        Range {
            start: self.position_at(start),
            end: self.position_at(start + len),
        }
    }
}

#[derive(Debug, Clone)]
struct LineIndex {
    line_starts: Vec<LineOffset>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        let bytes = text.as_bytes();
        for (idx, ch) in text.char_indices() {
            match ch {
                '\n' => line_starts.push(idx + 1),
                '\r' if bytes.get(idx + 1) != Some(&b'\n') => line_starts.push(idx + 1),
                _ => {}
            }
        }
        Self { line_starts }
    }

    fn offset(&self, text: &str, position: Position) -> Option<usize> {
        let line = position.line as usize;
        let line_start = *self.line_starts.get(line)?;
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or_else(|| text.len());
        let line_slice = strip_line_break(&text[line_start..line_end]);

        let mut current_units = 0u32;
        for (byte_idx, ch) in line_slice.char_indices() {
            if current_units == position.character {
                return Some(line_start + byte_idx);
            }
            current_units += ch.len_utf16() as u32;
        }

        if current_units == position.character {
            return Some(line_start + line_slice.len());
        }

        None
    }

    fn position_at(&self, text: &str, byte_offset: usize) -> Position {
        let mut clamped = byte_offset.min(text.len());
        while !text.is_char_boundary(clamped) {
            clamped -= 1;
        }
        let line = self.line_for_offset(clamped);
        let line_start = *self.line_starts.get(line).unwrap_or(&0);
        let line_slice = &text[line_start..clamped];
        let column_units = line_slice.chars().map(|ch| ch.len_utf16() as u32).sum();

        Position {
            line: line as u32,
            character: column_units,
        }
    }

    fn range(&self, text: &str) -> Range {
        let line_index = self.line_starts.len().saturating_sub(1) as u32;
        let last_start = self.line_starts.last().copied().unwrap_or(0);
        let last_len = text[last_start..]
            .chars()
            .map(|ch| ch.len_utf16() as u32)
            .sum();

        Range {
            start: Position {
                line: 0,
                character: 0,
            },
            end: Position {
                line: line_index,
                character: last_len,
            },
        }
    }

    fn line_for_offset(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next_line) => next_line.saturating_sub(1),
        }
    }
}

fn strip_line_break(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Splits on `\r\n`, `\n` and lone `\r`, matching the line numbering of [`Document`].
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\n' => {
                lines.push(&text[start..idx]);
                start = idx + 1;
            }
            b'\r' => {
                lines.push(&text[start..idx]);
                if bytes.get(idx + 1) == Some(&b'\n') {
                    idx += 1;
                }
                start = idx + 1;
            }
            _ => {}
        }
        idx += 1;
    }
    lines.push(&text[start..]);
    lines
}

/// Byte index of the `;` that opens the line comment, ignoring `;` inside `"..."`.
pub fn comment_start(line: &str) -> Option<usize> {
    let mut in_string = false;
    for (idx, byte) in line.bytes().enumerate() {
        match byte {
            b'"' => in_string = !in_string,
            b';' if !in_string => return Some(idx),
            _ => {}
        }
    }
    None
}

/// The part of `line` before its comment.
pub fn code_part(line: &str) -> &str {
    match comment_start(line) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// True when byte `index` of `line` falls inside a string literal.
/// A doubled quote toggles twice, so `""` inside a literal keeps the state.
pub fn in_string(line: &str, index: usize) -> bool {
    line.bytes()
        .take(index.min(line.len()))
        .filter(|byte| *byte == b'"')
        .count()
        % 2
        == 1
}

/// Replaces string literal contents (quotes included) with spaces, keeping byte offsets.
pub fn mask_strings(code: &str) -> String {
    let mut in_string = false;
    code.chars()
        .map(|ch| {
            if ch == '"' {
                in_string = !in_string;
                ' '
            } else if in_string {
                if ch.is_ascii() {
                    ' '
                } else {
                    ch
                }
            } else {
                ch
            }
        })
        .collect()
}

/// Code portion of `line` with string literals blanked out.
pub fn clean_code(line: &str) -> String {
    mask_strings(code_part(line))
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Case-insensitive whole-word pattern for `name`.
pub fn word_pattern(name: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_universal_newlines() {
        assert_eq!(split_lines("a\r\nb\rc\nd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines("a\n"), vec!["a", ""]);
    }

    #[test]
    fn comment_ignores_semicolon_in_string() {
        let line = "msg = \"a;b\" ; tail";
        assert_eq!(code_part(line), "msg = \"a;b\" ");
        assert!(in_string(line, 8));
        assert!(!in_string(line, 2));
    }

    #[test]
    fn masks_string_literals_preserving_offsets() {
        let masked = mask_strings("x = \"abc\" + y");
        assert_eq!(masked.len(), "x = \"abc\" + y".len());
        assert!(!masked.contains("abc"));
        assert!(masked.ends_with("+ y"));
    }

    #[test]
    fn maps_offsets_through_crlf_lines() {
        let doc = Document::new("DEF a()\r\n  x = 1\r\nEND".to_string());
        let offset = doc.offset(Position::new(1, 2)).unwrap();
        assert_eq!(&doc.text()[offset..offset + 1], "x");
        assert_eq!(doc.position_at(offset), Position::new(1, 2));
        assert_eq!(doc.range().end, Position::new(2, 3));
    }

    #[test]
    fn validates_identifiers() {
        assert!(is_identifier("my_var1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("$TOOL"));
        assert!(!is_identifier(""));
    }
}
