use std::collections::HashMap;

use tower_lsp::lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, Position, Range,
    SymbolKind, Url,
};

use crate::catalog;
use crate::collector::{self, function_header};
use crate::patterns::PATTERNS;
use crate::resolver::{enclosing_scope, SourceFile};
use crate::symbols::{FunctionSignature, MergedSymbols};
use crate::text::{clean_code, code_part, split_lines, Document};
use crate::words::word_at;

pub fn item(uri: &Url, signature: &FunctionSignature) -> CallHierarchyItem {
    let header = signature.header_line;
    let selection_range = signature
        .symbol
        .range
        .unwrap_or_else(|| Range::new(Position::new(header, 0), Position::new(header, 0)));
    CallHierarchyItem {
        name: signature.name().to_string(),
        kind: SymbolKind::FUNCTION,
        tags: None,
        detail: Some(signature.label()),
        uri: uri.clone(),
        range: Range::new(Position::new(header, 0), selection_range.end),
        selection_range,
        data: None,
    }
}

/// The routine named under the cursor, defined in this file or anywhere in
/// the workspace.
pub fn prepare(text: &str, uri: &Url, position: Position, merged: &MergedSymbols) -> Option<CallHierarchyItem> {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);
    let line_no = position.line as usize;
    let line = *lines.get(line_no)?;
    let column = document.offset(position)? - document.line_start(line_no)?;
    let word = word_at(line, column)?;
    if word.is_member || catalog::is_keyword(&word.text) {
        return None;
    }

    let local = collector::extract(text);
    if let Some(signature) = local.function(&word.text) {
        return Some(item(uri, signature));
    }
    merged
        .function(&word.text)
        .map(|located| item(&located.uri, &located.signature))
}

/// Calls of `name(` in `files`, grouped by the routine containing them.
/// Routines do not nest, so the upward search for the caller gives up at the
/// first routine closer it crosses.
pub fn incoming_calls(files: &[SourceFile], name: &str) -> Vec<CallHierarchyIncomingCall> {
    let mut calls: Vec<CallHierarchyIncomingCall> = Vec::new();
    let mut index: HashMap<(Url, u32), usize> = HashMap::new();

    for file in files {
        let document = Document::new(file.text.clone());
        let lines = split_lines(&file.text);
        for (line_no, line) in lines.iter().enumerate() {
            let code = clean_code(line);
            if function_header(&code, line_no, &document).is_some() {
                continue;
            }
            for caps in PATTERNS.call.captures_iter(&code) {
                let Some(callee) = caps.get(1) else {
                    continue;
                };
                if !callee.as_str().eq_ignore_ascii_case(name) {
                    continue;
                }
                let prefix = code[..callee.start()].chars().next_back();
                if matches!(prefix, Some('$' | '#' | '.')) {
                    continue;
                }
                let Some(caller) = caller_of(&lines, line_no, &document) else {
                    continue;
                };
                let range = document.span(line_no, callee.start(), callee.len());
                let key = (file.uri.clone(), caller.header_line);
                match index.get(&key) {
                    Some(&idx) => calls[idx].from_ranges.push(range),
                    None => {
                        index.insert(key, calls.len());
                        calls.push(CallHierarchyIncomingCall {
                            from: item(&file.uri, &caller),
                            from_ranges: vec![range],
                        });
                    }
                }
            }
        }
    }
    calls
}

fn caller_of(lines: &[&str], line: usize, document: &Document) -> Option<FunctionSignature> {
    for idx in (0..line).rev() {
        let code = code_part(lines[idx]);
        if let Some(signature) = function_header(code, idx, document) {
            return Some(signature);
        }
        if PATTERNS.routine_closer.is_match(code) {
            return None;
        }
    }
    None
}

/// Routines called from the body of `name` in `text`, grouped by callee.
/// Keywords and recursive calls are left out.
pub fn outgoing_calls(
    text: &str,
    uri: &Url,
    name: &str,
    merged: &MergedSymbols,
) -> Vec<CallHierarchyOutgoingCall> {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);
    let local = collector::extract(text);
    let Some(signature) = local.function(name) else {
        return Vec::new();
    };
    let header = signature.header_line as usize;
    let end = enclosing_scope(&lines, header)
        .map(|window| window.end)
        .unwrap_or(lines.len().saturating_sub(1));

    let mut calls: Vec<CallHierarchyOutgoingCall> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for line_no in header + 1..=end {
        let Some(line) = lines.get(line_no) else {
            break;
        };
        let code = clean_code(line);
        for caps in PATTERNS.call.captures_iter(&code) {
            let Some(callee) = caps.get(1) else {
                continue;
            };
            let callee_name = callee.as_str();
            if catalog::is_keyword(callee_name) || callee_name.eq_ignore_ascii_case(name) {
                continue;
            }
            let target = match local.function(callee_name) {
                Some(found) => item(uri, found),
                None => match merged.function(callee_name) {
                    Some(located) => item(&located.uri, &located.signature),
                    None => continue,
                },
            };
            let range = document.span(line_no, callee.start(), callee.len());
            let key = callee_name.to_ascii_uppercase();
            match index.get(&key) {
                Some(&idx) => calls[idx].from_ranges.push(range),
                None => {
                    index.insert(key, calls.len());
                    calls.push(CallHierarchyOutgoingCall {
                        to: target,
                        from_ranges: vec![range],
                    });
                }
            }
        }
    }
    calls
}
