use tower_lsp::lsp_types::{DocumentSymbol, Location, Range, SymbolInformation, SymbolKind};

use crate::collector::{self, function_header};
use crate::patterns::PATTERNS;
use crate::symbols::{MergedSymbols, Scope, Symbol, SymbolKind as DeclKind};
use crate::text::{code_part, split_lines, Document};

fn lsp_kind(kind: DeclKind) -> SymbolKind {
    match kind {
        DeclKind::Variable | DeclKind::Parameter => SymbolKind::VARIABLE,
        DeclKind::Function => SymbolKind::FUNCTION,
        DeclKind::Struct => SymbolKind::STRUCT,
        DeclKind::EnumMember => SymbolKind::ENUM_MEMBER,
        DeclKind::Signal => SymbolKind::EVENT,
    }
}

#[allow(deprecated)]
fn document_symbol(name: String, detail: Option<String>, kind: SymbolKind, range: Range, selection_range: Range) -> DocumentSymbol {
    DocumentSymbol {
        name,
        detail,
        kind,
        tags: None,
        deprecated: None,
        range,
        selection_range,
        children: None,
    }
}

struct Container {
    symbol: DocumentSymbol,
    start: usize,
    end: usize,
}

/// Outline of one document: `DEF`/`DEFFCT`/`DEFDAT` blocks with the
/// declarations they contain nested below them.
pub fn document_symbols(text: &str) -> Vec<DocumentSymbol> {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);

    let mut containers: Vec<Container> = Vec::new();
    let mut open: Option<usize> = None;
    for (line_no, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if let Some(idx) = open {
            if PATTERNS.routine_closer.is_match(code) {
                containers[idx].end = line_no;
                containers[idx].symbol.range.end = document.span(line_no, 0, line.len()).end;
                open = None;
            }
            continue;
        }

        let range = document.span(line_no, 0, line.len());
        let header = if let Some(signature) = function_header(code, line_no, &document) {
            let selection = signature.symbol.range.unwrap_or(range);
            Some((signature.name().to_string(), signature.label(), SymbolKind::FUNCTION, selection))
        } else if let Some(caps) = PATTERNS.defdat_header.captures(code) {
            caps.get(1).map(|name| {
                (
                    name.as_str().to_string(),
                    code.trim().to_string(),
                    SymbolKind::MODULE,
                    document.span(line_no, name.start(), name.len()),
                )
            })
        } else {
            None
        };
        if let Some((name, detail, kind, selection)) = header {
            open = Some(containers.len());
            containers.push(Container {
                symbol: document_symbol(name, Some(detail), kind, range, selection),
                start: line_no,
                end: lines.len().saturating_sub(1),
            });
        }
    }
    if let Some(idx) = open {
        let last = lines.len().saturating_sub(1);
        containers[idx].symbol.range.end = document.span(last, 0, lines[last].len()).end;
    }

    let mut top_level: Vec<DocumentSymbol> = Vec::new();
    for symbol in collector::extract(text).variables {
        let Some(range) = symbol.range else {
            continue;
        };
        let line = range.start.line as usize;
        let child = document_symbol(
            symbol.name.clone(),
            symbol.type_name.clone(),
            lsp_kind(symbol.kind),
            range,
            range,
        );
        match containers
            .iter_mut()
            .find(|container| (container.start..=container.end).contains(&line))
        {
            Some(container) => container.symbol.children.get_or_insert_with(Vec::new).push(child),
            None => top_level.push(child),
        }
    }

    let mut result: Vec<DocumentSymbol> = containers.into_iter().map(|container| container.symbol).collect();
    result.extend(top_level);
    result.sort_by_key(|symbol| (symbol.range.start.line, symbol.range.start.character));
    result
}

#[allow(deprecated)]
fn information(name: &str, kind: SymbolKind, location: Location, container: Option<String>) -> SymbolInformation {
    SymbolInformation {
        name: name.to_string(),
        kind,
        tags: None,
        deprecated: None,
        location,
        container_name: container,
    }
}

fn is_exported(symbol: &Symbol) -> bool {
    symbol.scope == Scope::Global || symbol.kind == DeclKind::Struct
}

/// Routines, structure types and global variables whose name contains
/// `query`, compared case-insensitively. An empty query lists everything.
pub fn workspace_symbols(merged: &MergedSymbols, query: &str) -> Vec<SymbolInformation> {
    let needle = query.to_ascii_lowercase();
    let matches = |name: &str| name.to_ascii_lowercase().contains(&needle);

    let mut result = Vec::new();
    for located in &merged.functions {
        let Some(location) = located.location() else {
            continue;
        };
        if matches(located.signature.name()) {
            result.push(information(
                located.signature.name(),
                SymbolKind::FUNCTION,
                Location::new(location.uri, location.range),
                None,
            ));
        }
    }
    for located in &merged.variables {
        let symbol = &located.symbol;
        let Some(range) = symbol.range else {
            continue;
        };
        if is_exported(symbol) && matches(&symbol.name) {
            result.push(information(
                &symbol.name,
                lsp_kind(symbol.kind),
                Location::new(located.uri.clone(), range),
                symbol.type_name.clone(),
            ));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolStore;
    use tower_lsp::lsp_types::Url;

    #[test]
    fn nests_declarations_under_their_blocks() {
        let text = "DECL INT top\nDEF main()\n  DECL REAL speed\nEND\nDEFFCT INT f()\nENDFCT";
        let symbols = document_symbols(text);
        let names: Vec<&str> = symbols.iter().map(|symbol| symbol.name.as_str()).collect();
        assert_eq!(names, vec!["top", "main", "f"]);

        let main = &symbols[1];
        assert_eq!(main.kind, SymbolKind::FUNCTION);
        assert_eq!(main.range.end.line, 3);
        let children = main.children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "speed");
        assert_eq!(children[0].detail.as_deref(), Some("REAL"));
    }

    #[test]
    fn data_lists_become_modules() {
        let symbols = document_symbols("DEFDAT cell PUBLIC\nDECL GLOBAL INT count = 0\nENDDAT");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].kind, SymbolKind::MODULE);
        assert_eq!(symbols[0].selection_range.start.character, 7);
        assert_eq!(symbols[0].children.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn workspace_query_matches_exported_names() {
        let store = SymbolStore::default();
        let lib = Url::parse("file:///cell/lib.dat").unwrap();
        let prog = Url::parse("file:///cell/prog.src").unwrap();
        store.replace_document(
            &lib,
            collector::extract(
                "DEFDAT lib PUBLIC\nDECL GLOBAL INT part_count = 0\nDECL INT hidden\nGLOBAL STRUC part_t INT id\nENDDAT",
            ),
        );
        store.replace_document(&prog, collector::extract("GLOBAL DEF pick_part()\nEND"));
        let merged = store.merged();

        let found = workspace_symbols(&merged, "PART");
        let names: Vec<&str> = found.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["pick_part", "part_count", "part_t"]);
        assert_eq!(found[2].kind, SymbolKind::STRUCT);
        assert_eq!(workspace_symbols(&merged, "").len(), 3);
        assert!(workspace_symbols(&merged, "zzz").is_empty());
    }
}
