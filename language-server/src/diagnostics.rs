//! Line-oriented validators. Each validator is independent and runs on every
//! pass; the results are concatenated without short-circuiting.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::{json, Value};
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, DiagnosticTag, NumberOrString, Range};

use crate::catalog;
use crate::classify::{classify_line_with, declaration_parts_with, LineKind};
use crate::collector::{self, split_initializer, split_list, strip_index};
use crate::messages::{Locale, Message};
use crate::patterns::{BlockKind, PATTERNS};
use crate::symbols::{MergedSymbols, SymbolTable};
use crate::text::{code_part, mask_strings, split_lines, Document};
use crate::words::tokens;

pub const SOURCE: &str = "krl";
pub const MAX_NAME_LEN: usize = 24;
pub const MAX_VEL_CP: f64 = 3.0;
pub const MAX_VEL_PTP: f64 = 100.0;

/// Controller configuration directories exempt from undefined-variable checks.
const SYSTEM_DIRS: &[&str] = &["System", "TP", "Mada", "Steu"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticOptions {
    pub locale: Locale,
    pub non_ascii_warnings: bool,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            non_ascii_warnings: true,
        }
    }
}

pub fn is_system_file(path: &Path) -> bool {
    let in_system_dir = path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        SYSTEM_DIRS.iter().any(|dir| dir.eq_ignore_ascii_case(&name))
    });
    let dollar_file = path
        .file_name()
        .map(|name| name.to_string_lossy().starts_with('$'))
        .unwrap_or(false);
    in_system_dir || dollar_file
}

/// Runs every validator over `text`. `merged` is the workspace view; the
/// document's own declarations are re-collected from `text`.
pub fn compute_diagnostics(
    text: &str,
    path: Option<&Path>,
    merged: &MergedSymbols,
    options: &DiagnosticOptions,
) -> Vec<Diagnostic> {
    let ctx = Context::new(text, merged, options);
    let mut diagnostics = Vec::new();

    if !path.map(is_system_file).unwrap_or(false) {
        diagnostics.extend(undefined_variables(&ctx));
    }
    diagnostics.extend(global_public(&ctx));
    diagnostics.extend(name_rules(&ctx));
    diagnostics.extend(block_balance(&ctx));
    diagnostics.extend(duplicate_names(&ctx));
    diagnostics.extend(dead_code(&ctx));
    diagnostics.extend(empty_blocks(&ctx));
    diagnostics.extend(dangerous_statements(&ctx));
    diagnostics.extend(type_usage(&ctx));
    diagnostics.extend(velocity_limits(&ctx));
    diagnostics.extend(tool_base_initialization(&ctx));
    if options.non_ascii_warnings {
        diagnostics.extend(non_ascii(&ctx));
    }
    diagnostics
}

struct Context<'a> {
    document: Document,
    lines: Vec<&'a str>,
    /// Code part of each line with string literals blanked; byte offsets match `lines`.
    code: Vec<String>,
    kinds: Vec<LineKind>,
    local: SymbolTable,
    local_names: HashSet<String>,
    struct_types: HashSet<String>,
    merged: &'a MergedSymbols,
    options: &'a DiagnosticOptions,
}

impl<'a> Context<'a> {
    fn new(text: &'a str, merged: &'a MergedSymbols, options: &'a DiagnosticOptions) -> Self {
        let lines = split_lines(text);
        let local = collector::extract(text);
        let mut struct_types: HashSet<String> = merged.structs.keys().cloned().collect();
        struct_types.extend(local.structs.iter().map(|def| def.name.to_ascii_uppercase()));
        let code = lines
            .iter()
            .map(|line| mask_strings(code_part(line)))
            .collect();
        let kinds = lines
            .iter()
            .map(|line| classify_line_with(line, &struct_types))
            .collect();
        Self {
            document: Document::new(text.to_string()),
            local_names: local.declared_names(),
            lines,
            code,
            kinds,
            local,
            struct_types,
            merged,
            options,
        }
    }

    fn at(&self, line: usize, column: usize, len: usize) -> Range {
        self.document.span(line, column, len)
    }

    /// Range of the trimmed code on `line`.
    fn code_range(&self, line: usize) -> Range {
        let code = &self.code[line];
        let start = code.len() - code.trim_start().len();
        self.at(line, start, code.trim().len())
    }

    fn make(
        &self,
        range: Range,
        severity: DiagnosticSeverity,
        message: Message<'_>,
        data: Option<Value>,
    ) -> Diagnostic {
        Diagnostic {
            range,
            severity: Some(severity),
            code: Some(NumberOrString::String(message.code().as_str().to_string())),
            source: Some(SOURCE.to_string()),
            message: message.render(self.options.locale),
            data,
            ..Diagnostic::default()
        }
    }

    fn is_known(&self, name: &str) -> bool {
        let upper = name.to_ascii_uppercase();
        catalog::is_keyword(name)
            || catalog::is_builtin_type(name)
            || catalog::library_function(name).is_some()
            || self.local_names.contains(&upper)
            || self.struct_types.contains(&upper)
            || self.merged.declared_names.contains(&upper)
            || self.merged.function_names.contains(&upper)
    }

    fn variable_type(&self, name: &str) -> Option<String> {
        self.local
            .variable(name)
            .and_then(|symbol| symbol.type_name.clone())
            .or_else(|| {
                self.merged
                    .variable(name)
                    .and_then(|located| located.symbol.type_name.clone())
            })
    }

    /// Declared names of a variable or signal line, with their byte columns.
    fn declared_on_line(&self, line: usize) -> Vec<(&str, usize)> {
        let code = self.code[line].as_str();
        if let Some(caps) = PATTERNS.signal.captures(code) {
            return caps
                .get(2)
                .map(|name| vec![(&self.lines[line][name.range()], name.start())])
                .unwrap_or_default();
        }
        let Some(parts) = declaration_parts_with(code, &self.struct_types) else {
            return Vec::new();
        };
        let raw = self.lines[line];
        split_list(parts.list)
            .into_iter()
            .filter_map(|item| {
                let (lhs, _) = split_initializer(item.text);
                let name = strip_index(lhs.trim());
                if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                    return None;
                }
                let lead = item.text.len() - item.text.trim_start().len();
                let column = parts.list_start + item.offset + lead;
                Some((&raw[column..column + name.len()], column))
            })
            .collect()
    }
}

fn undefined_variables(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let labels: HashSet<String> = ctx
        .code
        .iter()
        .filter(|code| PATTERNS.label.is_match(code))
        .filter_map(|code| code.trim().trim_end_matches(':').trim_end().split_whitespace().next())
        .map(str::to_ascii_uppercase)
        .collect();

    let mut diagnostics = Vec::new();
    for (idx, code) in ctx.code.iter().enumerate() {
        if ctx.kinds[idx] != LineKind::Usage || PATTERNS.label.is_match(code) {
            continue;
        }
        let toks = tokens(code);
        for (pos, token) in toks.iter().enumerate() {
            if matches!(token.prefix, Some('$' | '#' | '.')) {
                continue;
            }
            if pos > 0 && toks[pos - 1].text.eq_ignore_ascii_case("GOTO") {
                continue;
            }
            if ctx.is_known(token.text) || labels.contains(&token.text.to_ascii_uppercase()) {
                continue;
            }
            if code[token.end..].trim_start().starts_with('(') {
                continue;
            }
            if is_aggregate_field(code, token.start, token.prefix) {
                continue;
            }
            diagnostics.push(ctx.make(
                ctx.at(idx, token.start, token.end - token.start),
                DiagnosticSeverity::ERROR,
                Message::UndefinedVariable { name: token.text },
                Some(json!({ "varName": token.text })),
            ));
        }
    }
    dedup(diagnostics)
}

/// Drops repeats of the same range and message, keeping the first.
fn dedup(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut seen: HashSet<(u32, u32, u32, u32, String)> = HashSet::new();
    diagnostics
        .into_iter()
        .filter(|diagnostic| {
            let Range { start, end } = diagnostic.range;
            seen.insert((
                start.line,
                start.character,
                end.line,
                end.character,
                diagnostic.message.clone(),
            ))
        })
        .collect()
}

// Field names of aggregate literals such as `{X 1.0, Y 2.0}`.
fn is_aggregate_field(code: &str, start: usize, prefix: Option<char>) -> bool {
    let depth = code[..start].bytes().fold(0i32, |depth, byte| match byte {
        b'{' => depth + 1,
        b'}' => depth - 1,
        _ => depth,
    });
    depth > 0 && matches!(prefix, Some('{' | ',' | ':'))
}

fn global_public(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut public: Option<bool> = None;
    for (idx, code) in ctx.code.iter().enumerate() {
        if let Some(caps) = PATTERNS.defdat_header.captures(code) {
            public = Some(caps.get(2).is_some());
            continue;
        }
        if PATTERNS.block_rule(BlockKind::Defdat).closer.is_match(code) {
            public = None;
            continue;
        }
        let Some(is_public) = public else {
            continue;
        };
        if !PATTERNS.decl_keyword.is_match(code) {
            continue;
        }
        let name = ctx
            .declared_on_line(idx)
            .first()
            .map(|(name, _)| name.to_string())
            .or_else(|| PATTERNS.struc.captures(code).map(|caps| caps[4].to_string()))
            .unwrap_or_else(|| "DECL".to_string());
        let global = PATTERNS.global_keyword.find(code);
        match (is_public, global) {
            (true, None) => diagnostics.push(ctx.make(
                ctx.code_range(idx),
                DiagnosticSeverity::WARNING,
                Message::MissingGlobal { name: &name },
                Some(json!({ "name": name })),
            )),
            (false, Some(found)) => diagnostics.push(ctx.make(
                ctx.at(idx, found.start(), "GLOBAL".len()),
                DiagnosticSeverity::ERROR,
                Message::GlobalNotPublic { name: &name },
                Some(json!({ "name": name })),
            )),
            _ => {}
        }
    }
    diagnostics
}

fn name_rules(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut in_dat = false;
    for (idx, code) in ctx.code.iter().enumerate() {
        if PATTERNS.defdat_header.is_match(code) {
            in_dat = true;
            continue;
        }
        if PATTERNS.block_rule(BlockKind::Defdat).closer.is_match(code) {
            in_dat = false;
            continue;
        }
        if !in_dat {
            continue;
        }
        for (name, column) in ctx.declared_on_line(idx) {
            let range = ctx.at(idx, column, name.len());
            if name.starts_with(|ch: char| ch.is_ascii_digit()) {
                diagnostics.push(ctx.make(
                    range,
                    DiagnosticSeverity::ERROR,
                    Message::NameStartsWithDigit { name },
                    None,
                ));
            } else if name.len() > MAX_NAME_LEN {
                diagnostics.push(ctx.make(
                    range,
                    DiagnosticSeverity::ERROR,
                    Message::NameTooLong {
                        name,
                        max: MAX_NAME_LEN,
                    },
                    None,
                ));
            }
        }
    }
    diagnostics
}

#[derive(Debug, Clone, Copy)]
struct BlockEvent {
    kind: BlockKind,
    opener: bool,
    line: usize,
    column: usize,
}

impl BlockEvent {
    fn keyword(&self) -> &'static str {
        if self.opener {
            self.kind.opener()
        } else {
            self.kind.closer()
        }
    }
}

/// Opener and closer keywords of one line, in column order.
fn block_events(code: &str, line: usize) -> Vec<BlockEvent> {
    let mut events = Vec::new();
    for rule in &PATTERNS.blocks {
        if let Some(found) = rule.opener.find(code) {
            events.push(BlockEvent {
                kind: rule.kind,
                opener: true,
                line,
                column: found.end() - rule.kind.opener().len(),
            });
        }
        for found in rule.closer.find_iter(code) {
            events.push(BlockEvent {
                kind: rule.kind,
                opener: false,
                line,
                column: found.start(),
            });
        }
    }
    events.sort_by_key(|event| event.column);
    events
}

fn block_balance(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut stack: Vec<BlockEvent> = Vec::new();

    let unclosed = |open: &BlockEvent| {
        ctx.make(
            ctx.at(open.line, open.column, open.keyword().len()),
            DiagnosticSeverity::ERROR,
            Message::UnclosedBlock {
                opener: open.kind.opener(),
                closer: open.kind.closer(),
            },
            Some(json!({ "expected": open.kind.closer() })),
        )
    };

    for (idx, code) in ctx.code.iter().enumerate() {
        for event in block_events(code, idx) {
            if event.opener {
                stack.push(event);
                continue;
            }
            match stack.iter().rposition(|open| open.kind == event.kind) {
                Some(pos) => {
                    // openers above the match are abandoned; the closer carries the finding
                    if let Some(top) = stack.last().filter(|_| pos + 1 < stack.len()) {
                        diagnostics.push(ctx.make(
                            ctx.at(idx, event.column, event.keyword().len()),
                            DiagnosticSeverity::ERROR,
                            Message::MismatchedCloser {
                                closer: event.kind.closer(),
                                expected: top.kind.closer(),
                            },
                            Some(json!({ "expected": top.kind.closer() })),
                        ));
                    }
                    stack.truncate(pos);
                }
                None => diagnostics.push(ctx.make(
                    ctx.at(idx, event.column, event.keyword().len()),
                    DiagnosticSeverity::ERROR,
                    Message::UnexpectedCloser {
                        closer: event.kind.closer(),
                        opener: event.kind.opener(),
                    },
                    Some(json!({ "expected": event.kind.opener() })),
                )),
            }
        }
    }
    diagnostics.extend(stack.iter().map(unclosed));
    diagnostics
}

fn duplicate_names(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut routines: HashMap<String, usize> = HashMap::new();
    let mut module_vars: HashMap<String, usize> = HashMap::new();
    let mut body_vars: Option<HashMap<String, usize>> = None;
    let mut params: HashSet<String> = HashSet::new();

    for (idx, code) in ctx.code.iter().enumerate() {
        if let Some(signature) = collector::function_header(code, idx, &ctx.document) {
            let key = signature.symbol.key();
            match routines.get(&key) {
                Some(&first) => {
                    if let Some(range) = signature.symbol.range {
                        diagnostics.push(ctx.make(
                            range,
                            DiagnosticSeverity::ERROR,
                            Message::DuplicateRoutine {
                                name: signature.name(),
                                first_line: first + 1,
                            },
                            Some(json!({ "name": signature.name(), "firstLine": first + 1 })),
                        ));
                    }
                }
                None => {
                    routines.insert(key, idx);
                }
            }
            params = signature
                .params
                .iter()
                .map(|param| param.name.to_ascii_uppercase())
                .collect();
            body_vars = Some(HashMap::new());
            continue;
        }
        if let Some(caps) = PATTERNS.routine_closer.captures(code) {
            if !caps[1].eq_ignore_ascii_case("ENDDAT") {
                body_vars = None;
                params.clear();
            }
            continue;
        }

        for (name, column) in ctx.declared_on_line(idx) {
            let key = name.to_ascii_uppercase();
            let in_body = body_vars.is_some();
            let scope = body_vars.as_mut().unwrap_or(&mut module_vars);
            if in_body && params.remove(&key) {
                scope.insert(key, idx);
                continue;
            }
            match scope.get(&key) {
                Some(&first) => diagnostics.push(ctx.make(
                    ctx.at(idx, column, name.len()),
                    DiagnosticSeverity::ERROR,
                    Message::DuplicateVariable {
                        name,
                        first_line: first + 1,
                    },
                    Some(json!({ "name": name, "firstLine": first + 1 })),
                )),
                None => {
                    scope.insert(key, idx);
                }
            }
        }
    }
    diagnostics
}

fn dead_code(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut unreachable = false;
    for (idx, code) in ctx.code.iter().enumerate() {
        if unreachable {
            if PATTERNS.reachability_restore.is_match(code) || PATTERNS.label.is_match(code) {
                unreachable = false;
            } else {
                if ctx.kinds[idx].is_code() {
                    let mut diagnostic = ctx.make(
                        ctx.code_range(idx),
                        DiagnosticSeverity::WARNING,
                        Message::DeadCode,
                        None,
                    );
                    diagnostic.tags = Some(vec![DiagnosticTag::UNNECESSARY]);
                    diagnostics.push(diagnostic);
                }
                continue;
            }
        }
        if PATTERNS.unconditional_exit.is_match(code) {
            unreachable = true;
        }
    }
    diagnostics
}

const EMPTY_CHECKED: [BlockKind; 4] = [BlockKind::If, BlockKind::For, BlockKind::While, BlockKind::Loop];

fn empty_blocks(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for kind in EMPTY_CHECKED {
        let rule = PATTERNS.block_rule(kind);
        for (idx, code) in ctx.code.iter().enumerate() {
            let Some(found) = rule.opener.find(code) else {
                continue;
            };
            if rule.closer.is_match(&code[found.end()..]) {
                continue;
            }
            let Some((end_line, end_column)) = matching_closer(ctx, kind, idx) else {
                continue;
            };
            let body_has_code = (idx + 1..end_line).any(|line| {
                ctx.kinds[line].is_code() && !is_bare_else(&ctx.code[line])
            }) || !ctx.code[end_line][..end_column].trim().is_empty();
            if body_has_code {
                continue;
            }
            let column = found.end() - kind.opener().len();
            diagnostics.push(ctx.make(
                ctx.at(idx, column, kind.opener().len()),
                DiagnosticSeverity::WARNING,
                Message::EmptyBlock {
                    keyword: kind.opener(),
                },
                Some(json!({ "keyword": kind.opener() })),
            ));
        }
    }
    diagnostics
}

fn is_bare_else(code: &str) -> bool {
    code.trim().eq_ignore_ascii_case("ELSE")
}

/// Line and column of the closer pairing with the `kind` opener on `line`.
fn matching_closer(ctx: &Context<'_>, kind: BlockKind, line: usize) -> Option<(usize, usize)> {
    let rule = PATTERNS.block_rule(kind);
    let mut depth = 0usize;
    for idx in line + 1..ctx.code.len() {
        let code = &ctx.code[idx];
        if rule.opener.is_match(code) {
            depth += 1;
        }
        for found in rule.closer.find_iter(code) {
            if depth == 0 {
                return Some((idx, found.start()));
            }
            depth -= 1;
        }
    }
    None
}

fn leading(code: &str) -> usize {
    code.len() - code.trim_start().len()
}

fn dangerous_statements(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (idx, code) in ctx.code.iter().enumerate() {
        if let Some(found) = PATTERNS.wait_for.find(code) {
            if !PATTERNS.timeout.is_match(code) {
                let start = leading(code);
                diagnostics.push(ctx.make(
                    ctx.at(idx, start, found.end() - start),
                    DiagnosticSeverity::INFORMATION,
                    Message::WaitWithoutTimeout,
                    None,
                ));
            }
        }
        if PATTERNS.halt.is_match(code) {
            diagnostics.push(ctx.make(
                ctx.at(idx, leading(code), "HALT".len()),
                DiagnosticSeverity::INFORMATION,
                Message::HaltStatement,
                None,
            ));
        }
    }
    diagnostics
}

fn type_usage(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (idx, code) in ctx.code.iter().enumerate() {
        if let Some(subject) = PATTERNS.switch_subject.captures(code).and_then(|caps| caps.get(1)) {
            let is_real = ctx
                .variable_type(subject.as_str())
                .is_some_and(|ty| ty.eq_ignore_ascii_case("REAL"));
            if is_real {
                diagnostics.push(ctx.make(
                    ctx.at(idx, subject.start(), subject.len()),
                    DiagnosticSeverity::ERROR,
                    Message::RealInSwitch {
                        name: subject.as_str(),
                    },
                    Some(json!({ "varName": subject.as_str() })),
                ));
            }
            continue;
        }
        let Some(caps) = PATTERNS.literal_assignment.captures(code) else {
            continue;
        };
        let (Some(var), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let is_int = ctx
            .variable_type(var.as_str())
            .is_some_and(|ty| ty.eq_ignore_ascii_case("INT"));
        if is_int {
            diagnostics.push(ctx.make(
                ctx.at(idx, value.start(), value.len()),
                DiagnosticSeverity::WARNING,
                Message::ShouldBeReal {
                    name: var.as_str(),
                    value: value.as_str(),
                },
                Some(json!({ "varName": var.as_str(), "value": value.as_str() })),
            ));
        }
    }
    diagnostics
}

fn velocity_limits(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (idx, code) in ctx.code.iter().enumerate() {
        let checks = [
            (&PATTERNS.vel_cp, MAX_VEL_CP, true),
            (&PATTERNS.vel_ptp, MAX_VEL_PTP, false),
        ];
        for (pattern, limit, is_cp) in checks {
            let Some(found) = pattern.captures(code).and_then(|caps| caps.get(1)) else {
                continue;
            };
            let Ok(value) = found.as_str().parse::<f64>() else {
                continue;
            };
            if value <= limit {
                continue;
            }
            let message = if is_cp {
                Message::UnsafeVelocityCp { value, limit }
            } else {
                Message::UnsafeVelocityPtp { value, limit }
            };
            diagnostics.push(ctx.make(
                ctx.at(idx, found.start(), found.len()),
                DiagnosticSeverity::WARNING,
                message,
                Some(json!({ "value": found.as_str(), "limit": limit })),
            ));
        }
    }
    diagnostics
}

fn tool_base_initialization(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut tool = false;
    let mut base = false;
    for (idx, code) in ctx.code.iter().enumerate() {
        if PATTERNS.def_header.is_match(code) || PATTERNS.deffct_header.is_match(code) {
            tool = false;
            base = false;
            continue;
        }
        if PATTERNS.tool_assignment.is_match(code) {
            tool = true;
        }
        if PATTERNS.base_assignment.is_match(code) {
            base = true;
        }
        if PATTERNS.bas_initmov.is_match(code) {
            tool = true;
            base = true;
        }
        let Some(motion) = PATTERNS.motion.captures(code).and_then(|caps| caps.get(1)) else {
            continue;
        };
        let range = ctx.at(idx, motion.start(), motion.len());
        if !tool {
            diagnostics.push(ctx.make(
                range,
                DiagnosticSeverity::WARNING,
                Message::ToolNotInitialized,
                None,
            ));
        }
        if !base {
            diagnostics.push(ctx.make(
                range,
                DiagnosticSeverity::WARNING,
                Message::BaseNotInitialized,
                None,
            ));
        }
    }
    diagnostics
}

fn non_ascii(ctx: &Context<'_>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (idx, line) in ctx.lines.iter().enumerate() {
        let mut run: Option<usize> = None;
        let flush = |start: usize, end: usize, diagnostics: &mut Vec<Diagnostic>| {
            diagnostics.push(ctx.make(
                ctx.at(idx, start, end - start),
                DiagnosticSeverity::WARNING,
                Message::NonAscii {
                    text: &line[start..end],
                },
                None,
            ));
        };
        for (pos, ch) in line.char_indices() {
            match (ch.is_ascii(), run) {
                (false, None) => run = Some(pos),
                (true, Some(start)) => {
                    flush(start, pos, &mut diagnostics);
                    run = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run {
            flush(start, line.len(), &mut diagnostics);
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolStore;
    use tower_lsp::lsp_types::{Position, Url};

    fn run(text: &str) -> Vec<Diagnostic> {
        compute_diagnostics(text, None, &MergedSymbols::default(), &DiagnosticOptions::default())
    }

    fn with_code<'a>(diagnostics: &'a [Diagnostic], code: &str) -> Vec<&'a Diagnostic> {
        diagnostics
            .iter()
            .filter(|d| d.code == Some(NumberOrString::String(code.to_string())))
            .collect()
    }

    fn count_severity(diagnostics: &[Diagnostic], severity: DiagnosticSeverity) -> usize {
        diagnostics
            .iter()
            .filter(|d| d.severity == Some(severity))
            .count()
    }

    #[test]
    fn decimal_literal_into_int_suggests_real() {
        let diagnostics = run("DECL INT a, b\na = 1.5");
        let found = with_code(&diagnostics, "shouldBeReal");
        assert_eq!(found.len(), 1);
        let data = found[0].data.as_ref().unwrap();
        assert_eq!(data["varName"], "a");
        assert_eq!(data["value"], "1.5");
        assert_eq!(found[0].severity, Some(DiagnosticSeverity::WARNING));
    }

    #[test]
    fn real_switch_subject_is_an_error() {
        let diagnostics = run("DECL REAL r\nSWITCH r\nCASE 1\nENDSWITCH");
        assert_eq!(count_severity(&diagnostics, DiagnosticSeverity::ERROR), 1);
        assert_eq!(with_code(&diagnostics, "realInSwitch").len(), 1);
    }

    #[test]
    fn empty_for_loop_is_reported_once() {
        let diagnostics = run("DECL INT i\nFOR i=1 TO 10\nENDFOR");
        assert_eq!(count_severity(&diagnostics, DiagnosticSeverity::WARNING), 1);
        let empty = with_code(&diagnostics, "emptyBlock");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].data.as_ref().unwrap()["keyword"], "FOR");
        assert_eq!(empty[0].range.start, Position::new(1, 0));
    }

    #[test]
    fn if_with_only_comments_is_empty_but_else_branch_counts() {
        let diagnostics = run("DECL BOOL f\nIF f THEN\n  ; nothing\nENDIF\nIF f THEN\nELSE\n  f = FALSE\nENDIF");
        let empty = with_code(&diagnostics, "emptyBlock");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].range.start.line, 1);
    }

    #[test]
    fn duplicate_routine_cites_first_line() {
        let diagnostics = run("DEF Foo()\nEND\nDEF Foo()\nEND");
        let duplicates = with_code(&diagnostics, "duplicateName");
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].range.start, Position::new(2, 4));
        assert_eq!(duplicates[0].data.as_ref().unwrap()["firstLine"], 1);
        assert!(duplicates[0].message.contains("line 1"));
    }

    #[test]
    fn motion_without_tool_and_base_warns_twice_at_motion() {
        let diagnostics = run("PTP P1");
        let tool = with_code(&diagnostics, "toolNotInitialized");
        let base = with_code(&diagnostics, "baseNotInitialized");
        assert_eq!((tool.len(), base.len()), (1, 1));
        assert_eq!(count_severity(&diagnostics, DiagnosticSeverity::WARNING), 2);
        for diagnostic in tool.iter().chain(base.iter()) {
            assert_eq!(diagnostic.range.start, Position::new(0, 0));
            assert_eq!(diagnostic.range.end, Position::new(0, 3));
        }
    }

    #[test]
    fn initialisation_resets_per_routine() {
        let text = "DEF a()\n  BAS(#INITMOV, 0)\n  PTP HOME\nEND\nDEF b()\n  $TOOL = TOOL_DATA[1]\n  LIN P2\nEND";
        let diagnostics = run(text);
        assert!(with_code(&diagnostics, "toolNotInitialized").is_empty());
        let base = with_code(&diagnostics, "baseNotInitialized");
        assert_eq!(base.len(), 1);
        assert_eq!(base[0].range.start.line, 6);
    }

    #[test]
    fn balanced_blocks_produce_no_balance_findings() {
        let text = "DEF main()\n  IF a THEN\n    FOR i = 1 TO 3\n      WHILE b\n      ENDWHILE\n    ENDFOR\n  ELSE\n    LOOP\n      EXIT\n    ENDLOOP\n  ENDIF\n  REPEAT\n    x = 1\n  UNTIL x > 0\n  SWITCH s\n  CASE 1\n  ENDSWITCH\nEND";
        let diagnostics = run(text);
        assert!(with_code(&diagnostics, "unmatchedBlock").is_empty());
        assert!(with_code(&diagnostics, "unclosedBlock").is_empty());
    }

    #[test]
    fn wrong_closer_is_reported_once_at_the_closer() {
        let diagnostics = run("DEF main()\n  IF a THEN\n    FOR i = 1 TO 3\n  ENDIF\nEND");
        let balance: Vec<_> = diagnostics
            .iter()
            .filter(|d| {
                matches!(&d.code, Some(NumberOrString::String(code)) if code == "unmatchedBlock" || code == "unclosedBlock")
            })
            .collect();
        assert_eq!(balance.len(), 1);
        assert_eq!(balance[0].code, Some(NumberOrString::String("unmatchedBlock".to_string())));
        assert_eq!(balance[0].data.as_ref().unwrap()["expected"], "ENDFOR");
        assert_eq!(balance[0].range.start, Position::new(3, 2));
        assert_eq!(balance[0].range.end, Position::new(3, 7));
    }

    #[test]
    fn single_unmatched_closer_yields_one_finding() {
        let diagnostics = run("DEF main()\n  ENDWHILE\nEND");
        let balance = with_code(&diagnostics, "unmatchedBlock");
        assert_eq!(balance.len(), 1);
        assert_eq!(balance[0].data.as_ref().unwrap()["expected"], "WHILE");
        assert!(with_code(&diagnostics, "unclosedBlock").is_empty());
    }

    #[test]
    fn same_line_if_endif_is_balanced() {
        let diagnostics = run("DECL BOOL a\nDECL INT b\nIF a THEN b = 1 ENDIF");
        assert!(with_code(&diagnostics, "unmatchedBlock").is_empty());
        assert!(with_code(&diagnostics, "unclosedBlock").is_empty());
        assert!(with_code(&diagnostics, "emptyBlock").is_empty());
    }

    #[test]
    fn undefined_variable_skips_strings_prefixes_and_comments() {
        let text = "DEF main()\n  msg = \"ghost text\"\n  $OUT[1] = #ON\n  pose.X = 1 ; phantom\n  call_me(1)\nEND";
        let mut table_text = String::from("DECL CHAR msg[20]\nDECL FRAME pose\n");
        table_text.push_str(text);
        let diagnostics = run(&table_text);
        assert!(with_code(&diagnostics, "undefinedVariable").is_empty());
    }

    #[test]
    fn undefined_variable_reported_at_each_occurrence() {
        let diagnostics = run("DECL INT a\na = ghost + ghost");
        let undefined = with_code(&diagnostics, "undefinedVariable");
        assert_eq!(undefined.len(), 2);
        assert_ne!(undefined[0].range, undefined[1].range);
        assert_eq!(undefined[0].data.as_ref().unwrap()["varName"], "ghost");
    }

    #[test]
    fn repeated_range_and_message_is_dropped() {
        let diagnostics = run("DECL INT a\na = ghost + other");
        let undefined: Vec<Diagnostic> = with_code(&diagnostics, "undefinedVariable")
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(undefined.len(), 2);

        let mut doubled = undefined.clone();
        doubled.push(undefined[0].clone());
        doubled.push(undefined[1].clone());
        let unique = dedup(doubled);
        assert_eq!(unique, undefined);

        let mut moved = undefined[0].clone();
        moved.range = Range::new(Position::new(5, 0), Position::new(5, 5));
        assert_eq!(dedup(vec![undefined[0].clone(), moved]).len(), 2);
    }

    #[test]
    fn opener_left_open_at_end_of_file_is_reported_at_the_opener() {
        let diagnostics = run("DECL BOOL a\nIF a THEN\n  a = FALSE");
        let unclosed = with_code(&diagnostics, "unclosedBlock");
        assert_eq!(unclosed.len(), 1);
        assert_eq!(unclosed[0].range.start, Position::new(1, 0));
        assert_eq!(unclosed[0].data.as_ref().unwrap()["expected"], "ENDIF");
        assert!(with_code(&diagnostics, "unmatchedBlock").is_empty());
    }

    #[test]
    fn undefined_variable_uses_workspace_symbols_and_labels() {
        let store = SymbolStore::default();
        let uri = Url::parse("file:///cell/globals.dat").unwrap();
        store.replace_document(&uri, collector::extract("GLOBAL DECL INT shared\nGLOBAL DEF helper()\nEND"));
        let text = "shared = 1\nGOTO skip\nskip:\nhelper()\nxp = {X 1.0, Y shared}";
        let diagnostics = compute_diagnostics(text, None, &store.merged(), &DiagnosticOptions::default());
        let undefined = with_code(&diagnostics, "undefinedVariable");
        assert_eq!(undefined.len(), 1);
        assert_eq!(undefined[0].data.as_ref().unwrap()["varName"], "xp");
    }

    #[test]
    fn system_files_are_exempt_from_undefined_check() {
        let diagnostics = compute_diagnostics(
            "ghost = 1",
            Some(Path::new("/robot/KRC/R1/Mada/$machine.dat")),
            &MergedSymbols::default(),
            &DiagnosticOptions::default(),
        );
        assert!(with_code(&diagnostics, "undefinedVariable").is_empty());
        assert!(is_system_file(Path::new("R1/System/$config.dat")));
        assert!(!is_system_file(Path::new("R1/Program/cell.src")));
    }

    #[test]
    fn public_data_list_requires_global() {
        let text = "DEFDAT cell PUBLIC\nDECL INT count = 0\nGLOBAL DECL INT shared = 0\nENDDAT\nDEFDAT other\nGLOBAL DECL INT leaked = 0\nENDDAT";
        let diagnostics = run(text);
        let missing = with_code(&diagnostics, "missingGlobal");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(missing[0].range.start.line, 1);
        let not_public = with_code(&diagnostics, "globalNotPublic");
        assert_eq!(not_public.len(), 1);
        assert_eq!(not_public[0].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(not_public[0].range.start, Position::new(5, 0));
        assert_eq!(not_public[0].range.end, Position::new(5, 6));
    }

    #[test]
    fn data_list_names_obey_controller_limits() {
        let text = "DEFDAT cell\nDECL INT a_name_that_is_way_too_long_for_krc\nDECL INT 1st\nDECL INT fine\nENDDAT";
        let diagnostics = run(text);
        assert_eq!(with_code(&diagnostics, "nameTooLong").len(), 1);
        let digit = with_code(&diagnostics, "nameStartsWithDigit");
        assert_eq!(digit.len(), 1);
        assert_eq!(digit[0].range.start, Position::new(2, 9));
    }

    #[test]
    fn duplicate_variables_respect_scope_windows_and_params() {
        let text = "DECL INT top\nDEF a(n:IN)\n  DECL INT n\n  DECL INT tmp\n  DECL REAL tmp\nEND\nDEF b()\n  DECL INT tmp\nEND\nDECL INT top";
        let diagnostics = run(text);
        let duplicates = with_code(&diagnostics, "duplicateName");
        let lines: Vec<u32> = duplicates.iter().map(|d| d.range.start.line).collect();
        assert_eq!(lines, vec![4, 9]);
    }

    #[test]
    fn code_after_exit_is_unreachable_until_closer() {
        let text = "DEF main()\n  LOOP\n    EXIT\n    a = 1\n\n    ; note\n  ENDLOOP\n  RETURN\n  b = 2\nlbl:\n  c = 3\nEND";
        let diagnostics = run(text);
        let dead: Vec<u32> = with_code(&diagnostics, "deadCode")
            .iter()
            .map(|d| d.range.start.line)
            .collect();
        assert_eq!(dead, vec![3, 8]);
    }

    #[test]
    fn risky_statements_are_informational() {
        let diagnostics = run("WAIT FOR $IN[1]\nWAIT FOR $IN[2] TIMEOUT 5\nHALT");
        let waits = with_code(&diagnostics, "waitWithoutTimeout");
        assert_eq!(waits.len(), 1);
        assert_eq!(waits[0].severity, Some(DiagnosticSeverity::INFORMATION));
        assert_eq!(with_code(&diagnostics, "haltStatement").len(), 1);
    }

    #[test]
    fn velocity_limits_are_checked() {
        let diagnostics = run("$VEL.CP = 2.5\n$VEL.CP = 4\n$VEL_PTP = 100\n$VEL_PTP = 120");
        let cp = with_code(&diagnostics, "unsafeVelocityCp");
        assert_eq!(cp.len(), 1);
        assert_eq!(cp[0].range.start.line, 1);
        assert_eq!(cp[0].data.as_ref().unwrap()["value"], "4");
        let ptp = with_code(&diagnostics, "unsafeVelocityPtp");
        assert_eq!(ptp.len(), 1);
        assert_eq!(ptp[0].range.start.line, 3);
    }

    #[test]
    fn non_ascii_runs_are_option_gated() {
        let text = "; Größe prüfen";
        let diagnostics = run(text);
        let found = with_code(&diagnostics, "nonAsciiCharacter");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].range.start, Position::new(0, 4));
        // "öß" is one run
        assert_eq!(found[0].range.end, Position::new(0, 6));
        assert!(found[0].message.contains("öß"));

        let options = DiagnosticOptions {
            non_ascii_warnings: false,
            ..DiagnosticOptions::default()
        };
        let quiet = compute_diagnostics(text, None, &MergedSymbols::default(), &options);
        assert!(with_code(&quiet, "nonAsciiCharacter").is_empty());
    }

    #[test]
    fn messages_follow_locale_but_codes_do_not() {
        let options = DiagnosticOptions {
            locale: Locale::De,
            ..DiagnosticOptions::default()
        };
        let diagnostics = compute_diagnostics("HALT", None, &MergedSymbols::default(), &options);
        let halt = with_code(&diagnostics, "haltStatement");
        assert_eq!(halt.len(), 1);
        assert!(halt[0].message.contains("Programmausführung"));
    }
}
