use std::collections::HashSet;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, InsertTextFormat,
    Position, Range, TextEdit,
};

use crate::catalog::{self, KEYWORDS, LIBRARY_FUNCTIONS, SYSTEM_VARIABLES};
use crate::collector;
use crate::patterns::PATTERNS;
use crate::symbols::{FunctionSignature, MergedSymbols, Symbol, SymbolKind, SymbolTable};
use crate::text::{comment_start, in_string, Document};
use crate::words::prefix_before;

/// Sort tiers; lower sorts first.
const TIER_USER_FUNCTION: u8 = 0;
const TIER_LIBRARY: u8 = 1;
const TIER_KEYWORD: u8 = 2;
const TIER_SYSTEM: u8 = 3;
const TIER_VARIABLE: u8 = 4;

struct Cursor<'a> {
    /// Line text up to the cursor.
    before: &'a str,
    position: Position,
}

impl Cursor<'_> {
    fn replace_range(&self, typed: &str) -> Range {
        let typed_units = typed.encode_utf16().count() as u32;
        Range {
            start: Position::new(
                self.position.line,
                self.position.character.saturating_sub(typed_units),
            ),
            end: self.position,
        }
    }
}

pub fn complete(text: &str, position: Position, merged: &MergedSymbols) -> Vec<CompletionItem> {
    let document = Document::new(text.to_string());
    let Some(offset) = document.offset(position) else {
        return Vec::new();
    };
    let line_start = document.line_start(position.line as usize).unwrap_or(0);
    let before = &text[line_start..offset];

    let column = before.len();
    if comment_start(before).is_some() || in_string(before, column) {
        return Vec::new();
    }

    let cursor = Cursor { before, position };
    let local = collector::extract(text);

    if let Some(caps) = PATTERNS.member_prefix.captures(before) {
        let owner = &caps[1];
        let typed = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        return member_items(owner, typed, &cursor, &local, merged);
    }

    let typed = prefix_before(before, column);
    general_items(typed, &cursor, &local, merged)
}

fn member_items(
    owner: &str,
    typed: &str,
    cursor: &Cursor<'_>,
    local: &SymbolTable,
    merged: &MergedSymbols,
) -> Vec<CompletionItem> {
    let type_name = local
        .variable(owner)
        .and_then(|symbol| symbol.type_name.clone())
        .or_else(|| merged.variable_types.get(&owner.to_ascii_uppercase()).cloned())
        .or_else(|| catalog::system_variable(owner).map(|var| var.type_name.to_string()));
    let Some(type_name) = type_name else {
        return Vec::new();
    };

    let members: Vec<String> = local
        .structs
        .iter()
        .find(|def| def.name.eq_ignore_ascii_case(&type_name))
        .map(|def| def.members.clone())
        .or_else(|| merged.struct_members(&type_name))
        .unwrap_or_default();

    members
        .into_iter()
        .filter(|member| matches_prefix(member, typed))
        .map(|member| CompletionItem {
            label: member.clone(),
            kind: Some(CompletionItemKind::FIELD),
            detail: Some(format!("{} member", type_name)),
            sort_text: Some(sort_key(TIER_VARIABLE, &member, typed)),
            text_edit: Some(edit(cursor, typed, &member)),
            ..CompletionItem::default()
        })
        .collect()
}

fn general_items(
    typed: &str,
    cursor: &Cursor<'_>,
    local: &SymbolTable,
    merged: &MergedSymbols,
) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    let mut function_names: HashSet<String> = HashSet::new();

    let user_functions = local
        .functions
        .iter()
        .chain(merged.functions.iter().map(|located| &located.signature));
    for signature in user_functions {
        if !function_names.insert(signature.symbol.key()) {
            continue;
        }
        if !matches_prefix(signature.name(), typed) {
            continue;
        }
        items.push(CompletionItem {
            label: signature.name().to_string(),
            kind: Some(CompletionItemKind::FUNCTION),
            detail: Some(signature.label()),
            sort_text: Some(sort_key(TIER_USER_FUNCTION, signature.name(), typed)),
            insert_text_format: Some(InsertTextFormat::SNIPPET),
            text_edit: Some(edit(cursor, typed, &user_snippet(signature))),
            ..CompletionItem::default()
        });
    }

    for function in LIBRARY_FUNCTIONS {
        if !function_names.insert(function.name.to_ascii_uppercase()) {
            continue;
        }
        if !matches_prefix(function.name, typed) {
            continue;
        }
        items.push(CompletionItem {
            label: function.name.to_string(),
            kind: Some(CompletionItemKind::FUNCTION),
            detail: Some(function.signature()),
            documentation: Some(Documentation::String(function.doc.to_string())),
            sort_text: Some(sort_key(TIER_LIBRARY, function.name, typed)),
            insert_text_format: Some(InsertTextFormat::SNIPPET),
            text_edit: Some(edit(
                cursor,
                typed,
                &snippet(function.name, function.params.iter().map(|param| param_name(param))),
            )),
            ..CompletionItem::default()
        });
    }

    for keyword in KEYWORDS {
        if function_names.contains(keyword.name) || !matches_prefix(keyword.name, typed) {
            continue;
        }
        items.push(CompletionItem {
            label: keyword.name.to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            documentation: Some(Documentation::String(keyword.doc.to_string())),
            sort_text: Some(sort_key(TIER_KEYWORD, keyword.name, typed)),
            text_edit: Some(edit(cursor, typed, keyword.name)),
            ..CompletionItem::default()
        });
    }

    for variable in SYSTEM_VARIABLES {
        if !matches_prefix(variable.name, typed) {
            continue;
        }
        items.push(CompletionItem {
            label: variable.name.to_string(),
            kind: Some(CompletionItemKind::VARIABLE),
            detail: Some(variable.type_name.to_string()),
            documentation: Some(Documentation::String(variable.doc.to_string())),
            sort_text: Some(sort_key(TIER_SYSTEM, variable.name, typed)),
            text_edit: Some(edit(cursor, typed, variable.name)),
            ..CompletionItem::default()
        });
    }

    let mut seen: HashSet<String> = HashSet::new();
    let variables = local
        .variables
        .iter()
        .chain(merged.variables.iter().map(|located| &located.symbol));
    for symbol in variables {
        if !seen.insert(symbol.key()) || !matches_prefix(&symbol.name, typed) {
            continue;
        }
        items.push(variable_item(symbol, typed, cursor));
    }

    items
}

fn variable_item(symbol: &Symbol, typed: &str, cursor: &Cursor<'_>) -> CompletionItem {
    let kind = match symbol.kind {
        SymbolKind::Struct => CompletionItemKind::STRUCT,
        SymbolKind::EnumMember => CompletionItemKind::ENUM_MEMBER,
        SymbolKind::Signal => CompletionItemKind::CONSTANT,
        _ => CompletionItemKind::VARIABLE,
    };
    // enum members are written with a leading '#'
    let hashed = cursor.before[..cursor.before.len() - typed.len()].ends_with('#');
    let insert = if symbol.kind == SymbolKind::EnumMember && !hashed {
        format!("#{}", symbol.name)
    } else {
        symbol.name.clone()
    };
    CompletionItem {
        label: symbol.name.clone(),
        kind: Some(kind),
        detail: symbol
            .type_name
            .clone()
            .or_else(|| Some(symbol.kind.label().to_string())),
        sort_text: Some(sort_key(TIER_VARIABLE, &symbol.name, typed)),
        text_edit: Some(edit(cursor, typed, &insert)),
        ..CompletionItem::default()
    }
}

fn matches_prefix(candidate: &str, typed: &str) -> bool {
    typed.is_empty()
        || candidate
            .get(..typed.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(typed))
}

/// Exact-case prefix hits rank ahead of case-insensitive ones within a tier.
fn sort_key(tier: u8, label: &str, typed: &str) -> String {
    let exact = u8::from(typed.is_empty() || !label.starts_with(typed));
    format!("{}{}_{}", tier, exact, label.to_ascii_lowercase())
}

fn edit(cursor: &Cursor<'_>, typed: &str, new_text: &str) -> CompletionTextEdit {
    CompletionTextEdit::Edit(TextEdit {
        range: cursor.replace_range(typed),
        new_text: new_text.to_string(),
    })
}

fn param_name(raw: &str) -> &str {
    let name = raw.split(':').next().unwrap_or(raw);
    collector::strip_index(name.trim())
}

fn user_snippet(signature: &FunctionSignature) -> String {
    snippet(
        signature.name(),
        signature.params.iter().map(|param| param.name.as_str()),
    )
}

fn snippet<'a>(name: &str, params: impl Iterator<Item = &'a str>) -> String {
    let placeholders: Vec<String> = params
        .enumerate()
        .map(|(idx, param)| format!("${{{}:{}}}", idx + 1, param))
        .collect();
    format!("{}({})", name, placeholders.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolStore;
    use tower_lsp::lsp_types::Url;

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    fn end_of(text: &str) -> Position {
        let lines: Vec<&str> = text.split('\n').collect();
        Position::new(
            (lines.len() - 1) as u32,
            lines.last().unwrap().encode_utf16().count() as u32,
        )
    }

    #[test]
    fn user_functions_come_first_with_snippets() {
        let text = "DEF pick(slot:IN, force)\nEND\nDEF main()\n  pi";
        let items = complete(text, end_of(text), &MergedSymbols::default());
        let pick = items.iter().find(|item| item.label == "pick").unwrap();
        assert_eq!(pick.insert_text_format, Some(InsertTextFormat::SNIPPET));
        match pick.text_edit.as_ref().unwrap() {
            CompletionTextEdit::Edit(edit) => {
                assert_eq!(edit.new_text, "pick(${1:slot}, ${2:force})");
                assert_eq!(edit.range.start, Position::new(3, 2));
            }
            other => panic!("unexpected edit {other:?}"),
        }
        let mut sorted = items.clone();
        sorted.sort_by(|a, b| a.sort_text.cmp(&b.sort_text));
        assert_eq!(sorted[0].label, "pick");
    }

    #[test]
    fn user_function_shadows_library_function() {
        let text = "DEFFCT REAL abs(v)\nENDFCT\nx = ab";
        let items = complete(text, end_of(text), &MergedSymbols::default());
        let abs: Vec<_> = items
            .iter()
            .filter(|item| item.label.eq_ignore_ascii_case("ABS"))
            .collect();
        assert_eq!(abs.len(), 1);
        assert_eq!(abs[0].label, "abs");
    }

    #[test]
    fn keywords_filter_by_prefix() {
        let text = "  WH";
        let items = complete(text, end_of(text), &MergedSymbols::default());
        let names = labels(&items);
        assert!(names.contains(&"WHILE"));
        assert!(names.contains(&"WHEN"));
        assert!(!names.contains(&"IF"));
    }

    #[test]
    fn system_variables_match_dollar_prefix() {
        let text = "$TO";
        let items = complete(text, end_of(text), &MergedSymbols::default());
        assert_eq!(labels(&items), vec!["$TOOL"]);
        match items[0].text_edit.as_ref().unwrap() {
            CompletionTextEdit::Edit(edit) => assert_eq!(edit.range.start.character, 0),
            other => panic!("unexpected edit {other:?}"),
        }
    }

    #[test]
    fn workspace_variables_are_offered() {
        let store = SymbolStore::default();
        let uri = Url::parse("file:///cell/cell.dat").unwrap();
        store.replace_document(&uri, collector::extract("DECL GLOBAL INT part_count = 0"));
        let text = "part";
        let items = complete(text, end_of(text), &store.merged());
        assert!(labels(&items).contains(&"part_count"));
    }

    #[test]
    fn member_access_offers_only_struct_members() {
        let text = "DECL FRAME base_frame\nbase_frame.";
        let items = complete(text, end_of(text), &MergedSymbols::default());
        assert_eq!(labels(&items), vec!["X", "Y", "Z", "A", "B", "C"]);

        let text = "STRUC grip_t BOOL closed, REAL force\nDECL grip_t grip\ngrip.fo";
        let items = complete(text, end_of(text), &MergedSymbols::default());
        assert_eq!(labels(&items), vec!["force"]);
    }

    #[test]
    fn unknown_member_owner_yields_nothing() {
        let text = "mystery.";
        assert!(complete(text, end_of(text), &MergedSymbols::default()).is_empty());
    }

    #[test]
    fn no_completion_in_comments_or_strings() {
        let text = "x = 1 ; WH";
        assert!(complete(text, end_of(text), &MergedSymbols::default()).is_empty());
        let text = "msg = \"WH";
        assert!(complete(text, end_of(text), &MergedSymbols::default()).is_empty());
    }

    #[test]
    fn enum_members_insert_with_hash() {
        let text = "ENUM color_t red, green\nc = gre";
        let items = complete(text, end_of(text), &MergedSymbols::default());
        let green = items.iter().find(|item| item.label == "green").unwrap();
        match green.text_edit.as_ref().unwrap() {
            CompletionTextEdit::Edit(edit) => assert_eq!(edit.new_text, "#green"),
            other => panic!("unexpected edit {other:?}"),
        }
    }
}
