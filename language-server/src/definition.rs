use std::path::PathBuf;

use tower_lsp::lsp_types::{Location, Position, Range, Url};
use tracing::debug;

use crate::catalog;
use crate::collector;
use crate::resolver::{enclosing_scope, resolve, resolve_in_window, ResolveKind, Resolved, SourceProvider};
use crate::symbols::{MergedSymbols, SymbolTable};
use crate::text::{code_part, split_lines, word_pattern, Document};
use crate::words::word_at;

/// Everything a definition lookup reads besides the document itself.
pub struct Workspace<'a> {
    pub roots: &'a [PathBuf],
    pub merged: &'a MergedSymbols,
    pub sources: &'a dyn SourceProvider,
}

/// Declaring location of the identifier under the cursor.
///
/// Routines resolve through the collected tables. Variables and structure
/// types are searched in the enclosing routine first, then among the routine
/// parameters and `GOTO` labels, then in this file, then across the workspace.
pub fn definition(text: &str, uri: &Url, position: Position, workspace: &Workspace<'_>) -> Option<Location> {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);
    let line_no = position.line as usize;
    let line = *lines.get(line_no)?;
    let column = document.offset(position)? - document.line_start(line_no)?;
    if column > code_part(line).len() {
        return None;
    }
    let word = word_at(line, column)?;
    if word.is_member || word.text.starts_with('$') || catalog::is_keyword(&word.text) {
        return None;
    }
    let name = word.text.as_str();
    let local = collector::extract(text);

    if let Some(signature) = local.function(name) {
        return signature.symbol.range.map(|range| Location::new(uri.clone(), range));
    }
    if let Some(located) = workspace.merged.function(name) {
        return located
            .location()
            .map(|location| Location::new(location.uri, location.range));
    }

    let kind = if is_struct_type(name, &local, workspace.merged) {
        ResolveKind::Struct
    } else {
        ResolveKind::Variable
    };
    let file = uri
        .to_file_path()
        .unwrap_or_else(|_| PathBuf::from(uri.path()));
    let to_location = |resolved: Resolved| -> Option<Location> {
        debug!(path = %resolved.path.display(), line = resolved.line, detail = %resolved.detail, "resolved declaration");
        let target = if resolved.path == file {
            uri.clone()
        } else {
            Url::from_file_path(&resolved.path).ok()?
        };
        Some(Location::new(target, resolved.range))
    };

    if let Some(window) = enclosing_scope(&lines, line_no) {
        if let Some(found) = resolve_in_window(name, kind, &file, text, window).and_then(to_location) {
            return Some(found);
        }
        if let Some(found) = parameter(&lines, &document, &local, window.start, name) {
            return Some(Location::new(uri.clone(), found));
        }
    }

    if let Some(found) = label(&lines, &document, name) {
        return Some(Location::new(uri.clone(), found));
    }
    if let Some(range) = local.variable(name).and_then(|symbol| symbol.range) {
        return Some(Location::new(uri.clone(), range));
    }

    for root in workspace.roots {
        if let Some(found) = resolve(root, name, kind, None, workspace.sources).and_then(to_location) {
            return Some(found);
        }
    }

    let located = workspace.merged.variable(name)?;
    located
        .symbol
        .range
        .map(|range| Location::new(located.uri.clone(), range))
}

fn is_struct_type(name: &str, local: &SymbolTable, merged: &MergedSymbols) -> bool {
    local
        .structs
        .iter()
        .any(|def| !def.is_enum && def.name.eq_ignore_ascii_case(name))
        || merged
            .structs
            .get(&name.to_ascii_uppercase())
            .is_some_and(|def| !def.is_enum)
}

/// The parameter `name` in the header on `header_line`.
fn parameter(
    lines: &[&str],
    document: &Document,
    local: &SymbolTable,
    header_line: usize,
    name: &str,
) -> Option<Range> {
    let signature = local
        .functions
        .iter()
        .find(|signature| signature.header_line as usize == header_line)?;
    if !signature
        .params
        .iter()
        .any(|param| param.name.eq_ignore_ascii_case(name))
    {
        return None;
    }
    let code = code_part(lines[header_line]);
    let paren = code.find('(')?;
    let found = word_pattern(name)?.find(&code[paren..])?;
    Some(document.span(header_line, paren + found.start(), found.len()))
}

/// A `name:` jump label.
fn label(lines: &[&str], document: &Document, name: &str) -> Option<Range> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        let code = code_part(line);
        let trimmed = code.trim();
        let label = trimmed.strip_suffix(':')?.trim_end();
        if !label.eq_ignore_ascii_case(name) {
            return None;
        }
        let column = code.len() - code.trim_start().len();
        Some(document.span(idx, column, label.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DiskSources;
    use std::fs;

    const MAIN: &str = "DEF main()\n  counter = counter + 1\n  helper(1)\nEND\nDEF helper(n:IN)\n  DECL INT n\n  n = n + 1\nEND";

    fn lookup(text: &str, uri: &Url, line: u32, character: u32, roots: &[PathBuf]) -> Option<Location> {
        let merged = MergedSymbols::default();
        let workspace = Workspace {
            roots,
            merged: &merged,
            sources: &DiskSources,
        };
        definition(text, uri, Position::new(line, character), &workspace)
    }

    #[test]
    fn resolves_global_variable_in_another_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("lib.dat"),
            "DEFDAT lib PUBLIC\nDECL GLOBAL INT counter = 0\nENDDAT\n",
        )
        .unwrap();
        fs::write(dir.path().join("main.src"), MAIN).unwrap();
        let uri = Url::from_file_path(dir.path().join("main.src")).unwrap();
        let roots = vec![dir.path().to_path_buf()];

        let found = lookup(MAIN, &uri, 1, 3, &roots).unwrap();
        assert!(found.uri.path().ends_with("lib.dat"));
        assert_eq!(found.range.start, Position::new(1, 16));
    }

    #[test]
    fn resolves_routines_and_routine_locals() {
        let uri = Url::parse("file:///cell/main.src").unwrap();
        let routine = lookup(MAIN, &uri, 2, 4, &[]).unwrap();
        assert_eq!(routine.range.start, Position::new(4, 4));

        let local = lookup(MAIN, &uri, 6, 2, &[]).unwrap();
        assert_eq!(local.range.start, Position::new(5, 11));
        assert_eq!(local.uri, uri);
    }

    #[test]
    fn falls_back_to_parameters_and_labels() {
        let uri = Url::parse("file:///cell/f.src").unwrap();
        let text = "DEF f(k:IN)\n  x = k\n  GOTO done\n  x = 1\ndone:\nEND";
        let param = lookup(text, &uri, 1, 6, &[]).unwrap();
        assert_eq!(param.range.start, Position::new(0, 6));

        let target = lookup(text, &uri, 2, 8, &[]).unwrap();
        assert_eq!(target.range.start, Position::new(4, 0));
        assert_eq!(target.range.end, Position::new(4, 4));
    }

    #[test]
    fn ignores_system_variables_and_keywords() {
        let uri = Url::parse("file:///cell/f.src").unwrap();
        assert!(lookup("$TOOL = t\nLOOP", &uri, 0, 2, &[]).is_none());
        assert!(lookup("$TOOL = t\nLOOP", &uri, 1, 1, &[]).is_none());
    }
}
