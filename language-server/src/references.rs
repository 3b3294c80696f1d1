use std::collections::HashMap;

use tower_lsp::lsp_types::{Location, Position, Range, TextEdit, Url};

use crate::catalog;
use crate::classify::{classify_line, LineKind};
use crate::diagnostics::MAX_NAME_LEN;
use crate::resolver::SourceFile;
use crate::text::{code_part, in_string, is_identifier, split_lines, word_pattern, Document};
use crate::words::{word_at, WordAt};

/// Whole-word, case-insensitive occurrences of `name` across `files`.
///
/// Matches inside comments and string literals are skipped, as are system
/// variables and member accesses that merely share the name. Enum literals
/// such as `#red` count as uses of the member `red`.
/// Without `include_declaration`, a match on a declaration line counts as the
/// declaration itself unless an `=` precedes it; `DECL INT a[N]` therefore
/// reports `N` as a declaration.
pub fn find_references(files: &[SourceFile], name: &str, include_declaration: bool) -> Vec<Location> {
    let Some(pattern) = word_pattern(name) else {
        return Vec::new();
    };

    let mut locations = Vec::new();
    for file in files {
        let document = Document::new(file.text.clone());
        for (line_no, line) in split_lines(&file.text).into_iter().enumerate() {
            let code = code_part(line);
            let is_declaration = matches!(classify_line(line), LineKind::Declaration(_));
            for found in pattern.find_iter(code) {
                if in_string(line, found.start()) {
                    continue;
                }
                let before = code[..found.start()].chars().next_back();
                if matches!(before, Some('$' | '.')) {
                    continue;
                }
                if is_declaration && !include_declaration && !code[..found.start()].contains('=') {
                    continue;
                }
                locations.push(Location {
                    uri: file.uri.clone(),
                    range: document.span(line_no, found.start(), found.len()),
                });
            }
        }
    }
    locations
}

/// Edits renaming every occurrence of `name` to `new_name`, grouped per file.
pub fn rename_edits(files: &[SourceFile], name: &str, new_name: &str) -> HashMap<Url, Vec<TextEdit>> {
    let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
    for location in find_references(files, name, true) {
        changes.entry(location.uri).or_default().push(TextEdit {
            range: location.range,
            new_text: new_name.to_string(),
        });
    }
    changes
}

/// Range of the renameable identifier under the cursor. System variables,
/// keywords, built-in types and library functions cannot be renamed.
pub fn prepare_rename(text: &str, position: Position) -> Option<Range> {
    let document = Document::new(text.to_string());
    let (line_no, word) = renameable_word(&document, position)?;
    Some(document.span(line_no, word.start, word.end - word.start))
}

/// Name of the user symbol under the cursor, the target of reference and
/// rename requests.
pub fn symbol_at(text: &str, position: Position) -> Option<String> {
    let document = Document::new(text.to_string());
    renameable_word(&document, position).map(|(_, word)| word.text)
}

fn renameable_word(document: &Document, position: Position) -> Option<(usize, WordAt)> {
    let lines = split_lines(document.text());
    let line_no = position.line as usize;
    let line = *lines.get(line_no)?;
    let column = document.offset(position)? - document.line_start(line_no)?;
    if column > code_part(line).len() || in_string(line, column) {
        return None;
    }
    let word = word_at(line, column)?;
    is_renameable(&word.text).then_some((line_no, word))
}

fn is_renameable(name: &str) -> bool {
    is_identifier(name)
        && !catalog::is_keyword(name)
        && !catalog::is_builtin_type(name)
        && catalog::library_function(name).is_none()
}

/// Checks a requested new name; the error text goes back to the client.
pub fn validate_new_name(new_name: &str) -> Result<(), String> {
    if !is_identifier(new_name) {
        return Err(format!("'{new_name}' is not a valid identifier"));
    }
    if !is_renameable(new_name) {
        return Err(format!("'{new_name}' is a reserved word"));
    }
    if new_name.len() > MAX_NAME_LEN {
        return Err(format!(
            "'{new_name}' is longer than {MAX_NAME_LEN} characters"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector;

    fn file(path: &str, text: &str) -> SourceFile {
        SourceFile {
            uri: Url::parse(&format!("file:///cell/{path}")).unwrap(),
            text: text.to_string(),
        }
    }

    fn apply(text: &str, edits: &[TextEdit]) -> String {
        let document = Document::new(text.to_string());
        let mut sorted: Vec<&TextEdit> = edits.iter().collect();
        sorted.sort_by_key(|edit| std::cmp::Reverse((edit.range.start.line, edit.range.start.character)));
        let mut result = text.to_string();
        for edit in sorted {
            let start = document.offset(edit.range.start).unwrap();
            let end = document.offset(edit.range.end).unwrap();
            result.replace_range(start..end, &edit.new_text);
        }
        result
    }

    #[test]
    fn skips_strings_comments_system_and_member_words() {
        let files = [file(
            "main.src",
            "DECL INT count\ncount = count + 1 ; count\nmsg = \"count\"\n$count = #count\nf.count = 1",
        )];
        let found = find_references(&files, "count", true);
        let lines: Vec<u32> = found.iter().map(|loc| loc.range.start.line).collect();
        assert_eq!(lines, vec![0, 1, 1, 3]);
        assert_eq!(found[3].range.start, Position::new(3, 10));
    }

    #[test]
    fn renaming_an_enum_member_updates_its_literals() {
        let text = "ENUM color_t red, green\nDECL color_t c\nc = #red\nIF c == #red THEN\nENDIF";
        let files = [file("colors.src", text)];
        assert_eq!(symbol_at(text, Position::new(2, 5)).as_deref(), Some("red"));

        let found = find_references(&files, "red", true);
        let starts: Vec<Position> = found.iter().map(|loc| loc.range.start).collect();
        assert_eq!(
            starts,
            vec![Position::new(0, 13), Position::new(2, 5), Position::new(3, 9)]
        );

        let changes = rename_edits(&files, "red", "crimson");
        let renamed = apply(text, &changes[&files[0].uri]);
        assert_eq!(
            renamed,
            "ENUM color_t crimson, green\nDECL color_t c\nc = #crimson\nIF c == #crimson THEN\nENDIF"
        );
        assert!(collector::extract(&renamed).variable("crimson").is_some());
    }

    #[test]
    fn excludes_declarations_unless_assigned_from() {
        let files = [
            file("a.dat", "DECL INT limit = 4\nDECL INT other = limit"),
            file("b.src", "IF LIMIT > 2 THEN\nENDIF"),
        ];
        let without = find_references(&files, "limit", false);
        assert_eq!(without.len(), 2);
        assert_eq!(without[0].range.start, Position::new(1, 17));
        assert_eq!(without[1].uri.path(), "/cell/b.src");
        assert_eq!(find_references(&files, "limit", true).len(), 3);
    }

    #[test]
    fn rename_replaces_every_occurrence() {
        let text = "DEF main()\n  DECL INT x\n  x = 1\n  IF x > 0 THEN\n    x = x - 1\n  ENDIF\nEND";
        let files = [file("main.src", text)];
        let changes = rename_edits(&files, "x", "y");
        let edits = &changes[&files[0].uri];
        assert_eq!(edits.len(), 5);

        let renamed = apply(text, edits);
        let table = collector::extract(&renamed);
        assert!(table.variable("y").is_some());
        assert!(table.variable("x").is_none());
        assert!(!renamed.contains(" x "));
    }

    #[test]
    fn prepare_rename_refuses_reserved_names() {
        let text = "$OV_PRO = 10\nLOOP\nspeed = SQRT(2)";
        assert!(prepare_rename(text, Position::new(0, 2)).is_none());
        assert!(prepare_rename(text, Position::new(1, 1)).is_none());
        assert!(prepare_rename(text, Position::new(2, 10)).is_none());
        assert_eq!(
            prepare_rename(text, Position::new(2, 2)),
            Some(Range::new(Position::new(2, 0), Position::new(2, 5)))
        );
    }

    #[test]
    fn validates_new_names() {
        assert!(validate_new_name("next_pose").is_ok());
        assert!(validate_new_name("1pose").is_err());
        assert!(validate_new_name("ENDIF").is_err());
        assert!(validate_new_name("a_name_that_is_far_too_long_for_krl").is_err());
    }
}
