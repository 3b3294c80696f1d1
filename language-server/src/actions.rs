use std::collections::HashMap;

use tower_lsp::lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, Diagnostic, NumberOrString, Position, Range,
    TextEdit, Url, WorkspaceEdit,
};

use crate::collector;
use crate::messages::DiagnosticCode;
use crate::patterns::PATTERNS;
use crate::resolver::enclosing_scope;
use crate::text::{code_part, split_lines, word_pattern, Document};

struct Source<'a> {
    uri: &'a Url,
    text: &'a str,
    document: Document,
    lines: Vec<&'a str>,
}

impl Source<'_> {
    /// Byte column of `position` within its line.
    fn column(&self, position: Position) -> Option<usize> {
        Some(self.document.offset(position)? - self.document.line_start(position.line as usize)?)
    }

    fn fix(&self, title: String, diagnostic: &Diagnostic, edits: Vec<TextEdit>, preferred: bool) -> CodeActionOrCommand {
        let mut changes = HashMap::new();
        changes.insert(self.uri.clone(), edits);
        CodeActionOrCommand::CodeAction(CodeAction {
            title,
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: Some(vec![diagnostic.clone()]),
            edit: Some(WorkspaceEdit {
                changes: Some(changes),
                ..WorkspaceEdit::default()
            }),
            is_preferred: Some(preferred),
            ..CodeAction::default()
        })
    }
}

fn code_of(diagnostic: &Diagnostic) -> Option<DiagnosticCode> {
    match diagnostic.code.as_ref()? {
        NumberOrString::String(code) => DiagnosticCode::parse(code),
        NumberOrString::Number(_) => None,
    }
}

fn data_str<'a>(diagnostic: &'a Diagnostic, key: &str) -> Option<&'a str> {
    diagnostic.data.as_ref()?.get(key)?.as_str()
}

/// Quick fixes for the diagnostics the client sent with the request. Fixes
/// dispatch on the diagnostic code and its data, never on the message text.
pub fn quick_fixes(text: &str, uri: &Url, diagnostics: &[Diagnostic]) -> Vec<CodeActionOrCommand> {
    let source = Source {
        uri,
        text,
        document: Document::new(text.to_string()),
        lines: split_lines(text),
    };

    let mut actions = Vec::new();
    for diagnostic in diagnostics {
        let Some(code) = code_of(diagnostic) else {
            continue;
        };
        match code {
            DiagnosticCode::ShouldBeReal => should_be_real(&source, diagnostic, &mut actions),
            DiagnosticCode::MissingGlobal => actions.push(source.fix(
                "Add GLOBAL".to_string(),
                diagnostic,
                vec![TextEdit::new(
                    Range::new(diagnostic.range.start, diagnostic.range.start),
                    "GLOBAL ".to_string(),
                )],
                true,
            )),
            DiagnosticCode::GlobalNotPublic => global_not_public(&source, diagnostic, &mut actions),
            DiagnosticCode::UndefinedVariable => undefined_variable(&source, diagnostic, &mut actions),
            DiagnosticCode::UnsafeVelocityCp | DiagnosticCode::UnsafeVelocityPtp => {
                let Some(limit) = diagnostic
                    .data
                    .as_ref()
                    .and_then(|data| data.get("limit"))
                    .and_then(|limit| limit.as_f64())
                else {
                    continue;
                };
                actions.push(source.fix(
                    format!("Clamp to {limit}"),
                    diagnostic,
                    vec![TextEdit::new(diagnostic.range, limit.to_string())],
                    true,
                ));
            }
            DiagnosticCode::DeadCode => {
                let line = diagnostic.range.start.line;
                let end = if (line as usize + 1) < source.lines.len() {
                    Position::new(line + 1, 0)
                } else {
                    diagnostic.range.end
                };
                actions.push(source.fix(
                    "Remove unreachable statement".to_string(),
                    diagnostic,
                    vec![TextEdit::new(Range::new(Position::new(line, 0), end), String::new())],
                    false,
                ));
            }
            _ => {}
        }
    }
    actions
}

fn should_be_real(source: &Source<'_>, diagnostic: &Diagnostic, actions: &mut Vec<CodeActionOrCommand>) {
    let (Some(name), Some(value)) = (data_str(diagnostic, "varName"), data_str(diagnostic, "value")) else {
        return;
    };

    // the declaration can only be edited when it lives in this file
    let table = collector::extract(source.text);
    let declaration = table.variable(name).and_then(|symbol| {
        let range = symbol.range?;
        let type_name = symbol.type_name.as_deref()?;
        let line = range.start.line as usize;
        let found = word_pattern(type_name)?.find(code_part(source.lines.get(line)?))?;
        Some(source.document.span(line, found.start(), found.len()))
    });
    if let Some(type_range) = declaration {
        actions.push(source.fix(
            format!("Change type of '{name}' to REAL"),
            diagnostic,
            vec![TextEdit::new(type_range, "REAL".to_string())],
            true,
        ));
    }

    if let Ok(parsed) = value.parse::<f64>() {
        let truncated = parsed.trunc() as i64;
        actions.push(source.fix(
            format!("Use integer value {truncated}"),
            diagnostic,
            vec![TextEdit::new(diagnostic.range, truncated.to_string())],
            false,
        ));
    }
}

fn global_not_public(source: &Source<'_>, diagnostic: &Diagnostic, actions: &mut Vec<CodeActionOrCommand>) {
    let line_no = diagnostic.range.start.line as usize;
    if let (Some(line), Some(column)) = (source.lines.get(line_no), source.column(diagnostic.range.start)) {
        if let Some(found) = line
            .get(column..)
            .and_then(|rest| PATTERNS.global_keyword.find(rest))
            .filter(|found| found.start() == 0)
        {
            actions.push(source.fix(
                "Remove GLOBAL".to_string(),
                diagnostic,
                vec![TextEdit::new(
                    source.document.span(line_no, column, found.len()),
                    String::new(),
                )],
                false,
            ));
        }
    }

    let header = source.lines.iter().enumerate().find_map(|(idx, line)| {
        let caps = PATTERNS.defdat_header.captures(code_part(line))?;
        if caps.get(2).is_some() {
            return None;
        }
        let name = caps.get(1)?;
        Some((idx, name.end(), name.as_str().to_string()))
    });
    if let Some((idx, end, name)) = header {
        let at = source.document.span(idx, end, 0);
        actions.push(source.fix(
            format!("Mark DEFDAT '{name}' PUBLIC"),
            diagnostic,
            vec![TextEdit::new(at, " PUBLIC".to_string())],
            true,
        ));
    }
}

fn undefined_variable(source: &Source<'_>, diagnostic: &Diagnostic, actions: &mut Vec<CodeActionOrCommand>) {
    let Some(name) = data_str(diagnostic, "varName") else {
        return;
    };
    let line_no = diagnostic.range.start.line as usize;
    let Some(line) = source.lines.get(line_no) else {
        return;
    };

    let (insert_line, indent) = match enclosing_scope(&source.lines, line_no) {
        Some(window) => {
            let indent = &line[..line.len() - line.trim_start().len()];
            (window.start + 1, indent)
        }
        None => (0, ""),
    };
    let edit = if insert_line < source.lines.len() {
        TextEdit::new(
            source.document.span(insert_line, 0, 0),
            format!("{indent}DECL INT {name}\n"),
        )
    } else {
        let end = source.document.range().end;
        TextEdit::new(Range::new(end, end), format!("\n{indent}DECL INT {name}"))
    };
    actions.push(source.fix(format!("Declare '{name}' as INT"), diagnostic, vec![edit], true));
}
