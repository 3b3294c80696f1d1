use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Url};

use crate::catalog;
use crate::collector;
use crate::resolver::enclosing_scope;
use crate::symbols::{
    sanitize_markdown, FunctionSignature, MergedSymbols, Scope, Symbol, SymbolKind, SymbolTable,
};
use crate::text::{split_lines, Document};
use crate::words::word_at;

/// Resolves the word under the cursor through, in order: struct members,
/// system variables, user routines, declarations in the enclosing block,
/// this file, the workspace, struct types, library functions and keywords.
pub fn hover(text: &str, position: Position, merged: &MergedSymbols) -> Option<Hover> {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);
    let line_no = position.line as usize;
    let line = *lines.get(line_no)?;
    let offset = document.offset(position)?;
    let column = offset - document.line_start(line_no)?;
    let word = word_at(line, column)?;
    let local = collector::extract(text);

    let value = if word.is_member {
        member_hover(&word.text, word.owner.as_deref()?, &local, merged)?
    } else {
        symbol_hover(&word.text, &lines, line_no, &local, merged)?
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(document.span(line_no, word.start, word.end - word.start)),
    })
}

fn member_hover(
    member: &str,
    owner: &str,
    local: &SymbolTable,
    merged: &MergedSymbols,
) -> Option<String> {
    let type_name = local
        .variable(owner)
        .and_then(|symbol| symbol.type_name.clone())
        .or_else(|| merged.variable_types.get(&owner.to_ascii_uppercase()).cloned())
        .or_else(|| catalog::system_variable(owner).map(|var| var.type_name.to_string()))?;
    let members = local
        .structs
        .iter()
        .find(|def| def.name.eq_ignore_ascii_case(&type_name))
        .map(|def| def.members.clone())
        .or_else(|| merged.struct_members(&type_name))?;
    members
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(member))
        .then(|| {
            format!(
                "**Member** `{}` of `{}`",
                sanitize_markdown(member),
                sanitize_markdown(&type_name)
            )
        })
}

fn symbol_hover(
    name: &str,
    lines: &[&str],
    line_no: usize,
    local: &SymbolTable,
    merged: &MergedSymbols,
) -> Option<String> {
    if let Some(variable) = catalog::system_variable(name) {
        return Some(format!(
            "**System variable** `{}`: `{}`\n\n{}",
            variable.name, variable.type_name, variable.doc
        ));
    }

    if let Some(signature) = local.function(name) {
        return Some(format_function(signature, None));
    }
    if let Some(located) = merged.function(name) {
        return Some(format_function(&located.signature, Some(&located.uri)));
    }

    // the file table keeps only the first declaration, so re-collect the block
    if let Some(window) = enclosing_scope(lines, line_no) {
        let block = collector::extract(&lines[window.start..=window.end].join("\n"));
        if let Some(symbol) = block.variable(name) {
            return Some(format_symbol(symbol, None));
        }
    }
    if let Some(symbol) = local.variable(name) {
        return Some(format_symbol(symbol, None));
    }
    if let Some(located) = merged.variable(name) {
        return Some(format_symbol(&located.symbol, Some(&located.uri)));
    }

    if let Some(def) = local
        .structs
        .iter()
        .find(|def| def.name.eq_ignore_ascii_case(name))
        .or_else(|| merged.structs.get(&name.to_ascii_uppercase()))
    {
        let keyword = if def.is_enum { "ENUM" } else { "STRUC" };
        return Some(format!(
            "```krl\n{} {} {}\n```",
            keyword,
            def.name,
            def.members.join(", ")
        ));
    }
    if let Some(members) = catalog::builtin_struct_members(name) {
        return Some(format!(
            "**Type** `{}`\n\nMembers: {}",
            name.to_ascii_uppercase(),
            members.join(", ")
        ));
    }

    if let Some(function) = catalog::library_function(name) {
        return Some(format!("```krl\n{}\n```\n\n{}", function.signature(), function.doc));
    }
    catalog::keyword(name).map(|keyword| format!("**{}**\n\n{}", keyword.name, keyword.doc))
}

fn format_function(signature: &FunctionSignature, uri: Option<&Url>) -> String {
    let mut lines = vec![format!("```krl\n{}\n```", signature.label())];
    if let Some(uri) = uri {
        lines.push(format!("Defined in `{}`", file_name(uri)));
    }
    lines.join("\n\n")
}

fn format_symbol(symbol: &Symbol, uri: Option<&Url>) -> String {
    let declaration = match symbol.kind {
        SymbolKind::Signal => format!(
            "SIGNAL {} {}",
            symbol.name,
            symbol.value.as_deref().unwrap_or_default()
        ),
        SymbolKind::Struct => format!("STRUC {}", symbol.name),
        SymbolKind::EnumMember => format!(
            "#{} ({})",
            symbol.name,
            symbol.type_name.as_deref().unwrap_or("ENUM")
        ),
        _ => {
            let mut text = format!(
                "DECL {} {}",
                symbol.type_name.as_deref().unwrap_or("?"),
                symbol.name
            );
            if let Some(value) = &symbol.value {
                text.push_str(" = ");
                text.push_str(value);
            }
            text
        }
    };
    let scope = match symbol.scope {
        Scope::Global => "global",
        Scope::Local => "local",
    };
    let mut lines = vec![
        format!("```krl\n{}\n```", declaration.trim_end()),
        format!("{} ({})", symbol.kind.label(), scope),
    ];
    if let Some(uri) = uri {
        lines.push(format!("Declared in `{}`", file_name(uri)));
    }
    lines.join("\n\n")
}

fn file_name(uri: &Url) -> String {
    uri.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .unwrap_or_else(|| uri.to_string())
}
