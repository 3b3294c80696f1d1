use tower_lsp::lsp_types::TextEdit;

use crate::catalog;
use crate::patterns::{BlockKind, PATTERNS};
use crate::text::{code_part, mask_strings, split_lines, Document};
use crate::words::tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
    pub blank_line_before_blocks: bool,
    pub blank_line_after_blocks: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
            blank_line_before_blocks: false,
            blank_line_after_blocks: false,
        }
    }
}

impl FormatOptions {
    fn indent_unit(&self) -> String {
        if self.insert_spaces {
            " ".repeat(self.tab_size as usize)
        } else {
            "\t".to_string()
        }
    }
}

const DEDENT_BEFORE: &[&str] = &[
    "END", "ENDFCT", "ENDDAT", "ENDIF", "ELSE", "ENDFOR", "ENDWHILE", "ENDLOOP", "UNTIL",
    "ENDSWITCH", "CASE", "DEFAULT", "ENDSPLINE",
];

const INDENT_AFTER: &[&str] = &[
    "DEF", "DEFFCT", "DEFDAT", "IF", "ELSE", "FOR", "WHILE", "LOOP", "REPEAT", "SWITCH", "CASE",
    "DEFAULT", "SPLINE",
];

/// First keyword of the code, skipping a leading `GLOBAL`.
fn leading_keyword(masked: &str) -> Option<String> {
    let toks = tokens(masked);
    let first = toks.first()?;
    if first.start != masked.len() - masked.trim_start().len() {
        return None;
    }
    let word = if first.text.eq_ignore_ascii_case("GLOBAL") {
        toks.get(1)?.text
    } else {
        first.text
    };
    Some(word.to_ascii_uppercase())
}

/// Upper-cases keyword tokens in the code part; strings and the comment stay as written.
fn uppercase_keywords(line: &str) -> String {
    let code = code_part(line);
    let masked = mask_strings(code);
    let mut result = String::with_capacity(line.len());
    let mut cursor = 0;
    for token in tokens(&masked) {
        if matches!(token.prefix, Some('$' | '#' | '.')) || !catalog::is_keyword(token.text) {
            continue;
        }
        result.push_str(&code[cursor..token.start]);
        result.push_str(&token.text.to_ascii_uppercase());
        cursor = token.end;
    }
    result.push_str(&line[cursor..]);
    result
}

/// Indent change after a line whose leading keyword opens a block. A block
/// closed on the same line nets zero.
fn opens_block(keyword: &str, masked: &str) -> bool {
    if !INDENT_AFTER.contains(&keyword) {
        return false;
    }
    match BlockKind::from_keyword(keyword) {
        Some((kind, true)) => {
            let rule = PATTERNS.block_rule(kind);
            match rule.opener.find(masked) {
                Some(found) => !rule.closer.is_match(&masked[found.end()..]),
                None => true,
            }
        }
        _ => true,
    }
}

fn is_block_opener(keyword: &str) -> bool {
    matches!(BlockKind::from_keyword(keyword), Some((_, true)))
}

fn is_block_closer(keyword: &str) -> bool {
    matches!(BlockKind::from_keyword(keyword), Some((_, false)))
}

/// Re-indents `text` and upper-cases keywords. The result uses `\n` line
/// endings and always ends with one.
pub fn format_document(text: &str, options: &FormatOptions) -> String {
    let unit = options.indent_unit();
    let mut result = String::with_capacity(text.len());
    let mut indent_level: usize = 0;
    let mut last_blank = true;
    let mut pending_blank = false;

    let mut lines = split_lines(text);
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            result.push('\n');
            last_blank = true;
            pending_blank = false;
            continue;
        }

        let normalized = uppercase_keywords(trimmed);
        let masked = mask_strings(code_part(&normalized));
        let keyword = leading_keyword(&masked);
        let keyword = keyword.as_deref().unwrap_or("");

        if DEDENT_BEFORE.contains(&keyword) {
            indent_level = indent_level.saturating_sub(1);
        }

        let wants_blank = (options.blank_line_before_blocks && is_block_opener(keyword))
            || (pending_blank && !DEDENT_BEFORE.contains(&keyword));
        if wants_blank && !last_blank {
            result.push('\n');
        }
        pending_blank = false;

        result.push_str(&unit.repeat(indent_level));
        result.push_str(&normalized);
        result.push('\n');
        last_blank = false;

        if opens_block(keyword, &masked) {
            indent_level += 1;
        }
        if options.blank_line_after_blocks && is_block_closer(keyword) {
            pending_blank = true;
        }
    }

    if result.is_empty() {
        result.push('\n');
    }
    result
}

/// A single whole-document edit, or none when the text is already formatted.
pub fn format_edits(text: &str, options: &FormatOptions) -> Vec<TextEdit> {
    let formatted = format_document(text, options);
    if formatted == text.replace("\r\n", "\n") {
        return Vec::new();
    }
    let document = Document::new(text.to_string());
    vec![TextEdit {
        range: document.range(),
        new_text: formatted,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(text: &str) -> String {
        format_document(text, &FormatOptions::default())
    }

    #[test]
    fn indents_nested_blocks() {
        let source = "def main()\nif a then\nx=1\nelse\nx=2\nendif\nend";
        let expected = "DEF main()\n    IF a THEN\n        x=1\n    ELSE\n        x=2\n    ENDIF\nEND\n";
        assert_eq!(format(source), expected);
    }

    #[test]
    fn leaves_comments_and_strings_untouched() {
        let source = "if a then ; if lower\nmsg = \"endif\"\nendif";
        let expected = "IF a THEN ; if lower\n    msg = \"endif\"\nENDIF\n";
        assert_eq!(format(source), expected);
    }

    #[test]
    fn same_line_if_nets_zero() {
        let source = "DEF m()\nIF a THEN b() ENDIF\nx = 1\nEND";
        let expected = "DEF m()\n    IF a THEN b() ENDIF\n    x = 1\nEND\n";
        assert_eq!(format(source), expected);
    }

    #[test]
    fn switch_cases_share_one_level() {
        let source = "SWITCH mode\nCASE 1\nx = 1\nDEFAULT\nx = 2\nENDSWITCH";
        let expected = "SWITCH mode\nCASE 1\n    x = 1\nDEFAULT\n    x = 2\nENDSWITCH\n";
        assert_eq!(format(source), expected);
    }

    #[test]
    fn system_variables_and_global_routines() {
        let source = "global def run()\n$vel.cp = 0.2\nwait for $in[1]\nend";
        let expected = "GLOBAL DEF run()\n    $vel.cp = 0.2\n    WAIT FOR $in[1]\nEND\n";
        assert_eq!(format(source), expected);
    }

    #[test]
    fn optional_blank_lines_around_blocks() {
        let options = FormatOptions {
            blank_line_before_blocks: true,
            blank_line_after_blocks: true,
            ..FormatOptions::default()
        };
        let source = "DEF m()\nx = 1\nFOR i = 1 TO 3\nx = x + i\nENDFOR\ny = x\nEND";
        let expected =
            "DEF m()\n    x = 1\n\n    FOR i = 1 TO 3\n        x = x + i\n    ENDFOR\n\n    y = x\nEND\n";
        let once = format_document(source, &options);
        assert_eq!(once, expected);
        assert_eq!(format_document(&once, &options), once);
    }

    #[test]
    fn uses_tabs_when_requested() {
        let options = FormatOptions {
            insert_spaces: false,
            ..FormatOptions::default()
        };
        assert_eq!(format_document("LOOP\nx = 1\nENDLOOP", &options), "LOOP\n\tx = 1\nENDLOOP\n");
    }

    #[test]
    fn formatting_is_idempotent() {
        let source = "DEF main()\r\n  DECL INT i\r\nfor i = 1 to 3\r\n ptp home ; go\r\nendfor\r\nEND\r\n";
        let once = format(source);
        assert_eq!(format(&once), once);
        assert!(format_edits(&once, &FormatOptions::default()).is_empty());

        let edits = format_edits(source, &FormatOptions::default());
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_text, once);
    }
}
