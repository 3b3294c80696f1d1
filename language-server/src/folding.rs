use regex::Regex;
use tower_lsp::lsp_types::{
    DocumentHighlight, DocumentHighlightKind, FoldingRange, FoldingRangeKind, Position,
};

use crate::classify::{classify_line, LineKind};
use crate::patterns::{BlockKind, PATTERNS};
use crate::text::{clean_code, code_part, in_string, split_lines, Document};
use crate::words::word_at;

/// `;FOLD`/`;ENDFOLD` regions and `DEF`/`DEFFCT`/`DEFDAT` blocks.
pub fn folding_ranges(text: &str) -> Vec<FoldingRange> {
    let mut ranges = Vec::new();
    let mut folds: Vec<(u32, String)> = Vec::new();
    let mut routines: Vec<u32> = Vec::new();

    for (idx, line) in split_lines(text).into_iter().enumerate() {
        let line_no = idx as u32;
        if let Some(found) = PATTERNS.fold_open.find(line) {
            let label = line[found.end()..]
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            folds.push((line_no, label));
            continue;
        }
        if PATTERNS.fold_close.is_match(line) {
            if let Some((start, label)) = folds.pop() {
                ranges.push(FoldingRange {
                    start_line: start,
                    start_character: None,
                    end_line: line_no,
                    end_character: None,
                    kind: Some(FoldingRangeKind::Region),
                    collapsed_text: (!label.is_empty()).then_some(label),
                });
            }
            continue;
        }

        let code = code_part(line);
        if PATTERNS.routine_opener.is_match(code) {
            routines.push(line_no);
        } else if PATTERNS.routine_closer.is_match(code) {
            if let Some(start) = routines.pop() {
                if line_no > start {
                    ranges.push(FoldingRange {
                        start_line: start,
                        start_character: None,
                        end_line: line_no,
                        end_character: None,
                        kind: None,
                        collapsed_text: None,
                    });
                }
            }
        }
    }
    ranges.sort_by_key(|range| (range.start_line, range.end_line));
    ranges
}

/// Highlights for the cursor position: the keyword and its block partner
/// when the cursor sits on a block keyword, otherwise every occurrence of
/// the word in the document.
pub fn highlights(text: &str, position: Position) -> Vec<DocumentHighlight> {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);
    let line_no = position.line as usize;
    let Some(line) = lines.get(line_no) else {
        return Vec::new();
    };
    let Some(column) = document
        .offset(position)
        .zip(document.line_start(line_no))
        .map(|(offset, start)| offset - start)
    else {
        return Vec::new();
    };
    if column > code_part(line).len() || in_string(line, column) {
        return Vec::new();
    }
    let Some(word) = word_at(line, column) else {
        return Vec::new();
    };

    if let Some(pair) = block_partner(&lines, line_no, &word.text) {
        return pair
            .into_iter()
            .map(|(idx, start, len)| DocumentHighlight {
                range: document.span(idx, start, len),
                kind: Some(DocumentHighlightKind::TEXT),
            })
            .collect();
    }
    occurrences(&document, &lines, &word.text)
}

/// The keyword on `line` and its partner, as `(line, column, len)`.
fn block_partner(lines: &[&str], line: usize, word: &str) -> Option<Vec<(usize, usize, usize)>> {
    let (kind, is_opener) = BlockKind::from_keyword(word)?;
    let rule = PATTERNS.block_rule(kind);
    let code = clean_code(lines[line]);
    if is_opener && !rule.opener.is_match(&code) {
        return None;
    }
    if !is_opener && !rule.closer.is_match(&code) {
        return None;
    }

    let mut depth = 0usize;
    let partner = if is_opener {
        (line + 1..lines.len()).find(|&idx| {
            let code = clean_code(lines[idx]);
            if rule.opener.is_match(&code) {
                depth += 1;
            } else if rule.closer.is_match(&code) {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            false
        })?
    } else {
        (0..line).rev().find(|&idx| {
            let code = clean_code(lines[idx]);
            if rule.closer.is_match(&code) {
                depth += 1;
            } else if rule.opener.is_match(&code) {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            false
        })?
    };

    let keyword_at = |idx: usize, keyword: &str| -> Option<(usize, usize, usize)> {
        let pattern = Regex::new(&format!(r"(?i)\b{keyword}\b")).ok()?;
        let cleaned = clean_code(lines[idx]);
        let found = pattern.find(&cleaned)?;
        Some((idx, found.start(), found.len()))
    };
    let (open_line, close_line) = if is_opener { (line, partner) } else { (partner, line) };
    Some(vec![
        keyword_at(open_line, kind.opener())?,
        keyword_at(close_line, kind.closer())?,
    ])
}

fn occurrences(document: &Document, lines: &[&str], word: &str) -> Vec<DocumentHighlight> {
    let system = word.starts_with('$');
    let pattern = if system {
        Regex::new(&format!(r"(?i){}\b", regex::escape(word)))
    } else {
        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
    };
    let Ok(pattern) = pattern else {
        return Vec::new();
    };

    let mut result = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        let is_declaration = matches!(classify_line(line), LineKind::Declaration(_));
        for found in pattern.find_iter(code) {
            if in_string(line, found.start()) {
                continue;
            }
            let before = code[..found.start()].chars().next_back();
            if !system && matches!(before, Some('$' | '.')) {
                continue;
            }
            // declared names and assignment targets are writes
            let declared = is_declaration && !code[..found.start()].contains('=');
            let rest = code[found.end()..].trim_start();
            let is_write = declared || (rest.starts_with('=') && !rest.starts_with("=="));
            result.push(DocumentHighlight {
                range: document.span(idx, found.start(), found.len()),
                kind: Some(if is_write {
                    DocumentHighlightKind::WRITE
                } else {
                    DocumentHighlightKind::READ
                }),
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = "DEF main()\n  IF a THEN\n    IF b THEN\n      x = 1\n    ENDIF\n  ENDIF\nEND";

    fn lines_of(highlights: &[DocumentHighlight]) -> Vec<u32> {
        highlights.iter().map(|highlight| highlight.range.start.line).collect()
    }

    #[test]
    fn folds_regions_and_routines() {
        let text = "DEF main()\n;FOLD PTP HOME;%{PE}\nPTP HOME\n;ENDFOLD\nEND\nDEFDAT main\nENDDAT";
        let ranges = folding_ranges(text);
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start_line, ranges[0].end_line), (0, 4));
        assert_eq!((ranges[1].start_line, ranges[1].end_line), (1, 3));
        assert_eq!(ranges[1].kind, Some(FoldingRangeKind::Region));
        assert_eq!(ranges[1].collapsed_text.as_deref(), Some("PTP HOME"));
        assert_eq!((ranges[2].start_line, ranges[2].end_line), (5, 6));
    }

    #[test]
    fn pairs_nested_blocks_in_both_directions() {
        assert_eq!(lines_of(&highlights(NESTED, Position::new(1, 3))), vec![1, 5]);
        assert_eq!(lines_of(&highlights(NESTED, Position::new(4, 6))), vec![2, 4]);
        assert_eq!(lines_of(&highlights(NESTED, Position::new(6, 1))), vec![0, 6]);
    }

    #[test]
    fn other_words_highlight_every_occurrence() {
        let text = "x = 1\nIF x == 2 THEN\n  y = \"x\" ; x\nENDIF";
        let found = highlights(text, Position::new(0, 0));
        assert_eq!(lines_of(&found), vec![0, 1]);
        assert_eq!(found[0].kind, Some(DocumentHighlightKind::WRITE));
        assert_eq!(found[1].kind, Some(DocumentHighlightKind::READ));
    }

    #[test]
    fn declarations_are_writes_and_enum_literals_are_found() {
        let text = "ENUM color_t red, green\nDECL INT n = 2\nDECL color_t c = #red\nIF c == #red THEN\n  n = n + 1\nENDIF";
        let colors = highlights(text, Position::new(0, 14));
        assert_eq!(lines_of(&colors), vec![0, 2, 3]);
        assert_eq!(colors[0].kind, Some(DocumentHighlightKind::WRITE));
        assert_eq!(colors[1].kind, Some(DocumentHighlightKind::READ));
        assert_eq!(colors[2].kind, Some(DocumentHighlightKind::READ));

        let counts = highlights(text, Position::new(1, 9));
        assert_eq!(lines_of(&counts), vec![1, 4, 4]);
        assert_eq!(counts[0].kind, Some(DocumentHighlightKind::WRITE));
        assert_eq!(counts[1].kind, Some(DocumentHighlightKind::WRITE));
        assert_eq!(counts[2].kind, Some(DocumentHighlightKind::READ));
    }
}
