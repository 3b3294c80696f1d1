use tower_lsp::lsp_types::{
    Documentation, ParameterInformation, ParameterLabel, Position, SignatureHelp,
    SignatureInformation,
};

use crate::catalog;
use crate::collector;
use crate::symbols::MergedSymbols;
use crate::text::{code_part, mask_strings, Document};

/// Byte index of the unmatched `(` left of the end of `code`.
fn open_paren(code: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, byte) in code.bytes().enumerate().rev() {
        match byte {
            b')' => depth += 1,
            b'(' if depth == 0 => return Some(idx),
            b'(' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Commas at nesting depth zero.
fn active_parameter(args: &str) -> u32 {
    let mut depth = 0i32;
    let mut commas = 0u32;
    for byte in args.bytes() {
        match byte {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    commas
}

pub fn signature_help(text: &str, position: Position, merged: &MergedSymbols) -> Option<SignatureHelp> {
    let document = Document::new(text.to_string());
    let offset = document.offset(position)?;
    let line_start = document.line_start(position.line as usize)?;
    let before = &text[line_start..offset];
    if code_part(before).len() < before.len() {
        return None;
    }
    let code = mask_strings(before);

    let paren = open_paren(&code)?;
    let head = code[..paren].trim_end();
    let name_start = head
        .rfind(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let name = &head[name_start..];
    if name.is_empty() || catalog::is_keyword(name) {
        return None;
    }

    let local = collector::extract(text);
    let (label, params, documentation) = if let Some(signature) = local
        .function(name)
        .or_else(|| merged.function(name).map(|located| &located.signature))
    {
        let params: Vec<String> = signature.params.iter().map(|param| param.raw.clone()).collect();
        (signature.label(), params, None)
    } else {
        let function = catalog::library_function(name)?;
        (
            function.signature(),
            function.params.iter().map(|param| param.to_string()).collect(),
            Some(Documentation::String(function.doc.to_string())),
        )
    };

    let active = active_parameter(&code[paren + 1..]);
    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label,
            documentation,
            parameters: Some(
                params
                    .into_iter()
                    .map(|param| ParameterInformation {
                        label: ParameterLabel::Simple(param),
                        documentation: None,
                    })
                    .collect(),
            ),
            active_parameter: Some(active),
        }],
        active_signature: Some(0),
        active_parameter: Some(active),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn help_at_end(text: &str) -> Option<SignatureHelp> {
        let last = text.rsplit('\n').next().unwrap();
        let line = text.matches('\n').count() as u32;
        signature_help(
            text,
            Position::new(line, last.len() as u32),
            &MergedSymbols::default(),
        )
    }

    #[test]
    fn counts_top_level_commas_only() {
        let text = "DEF move(target:IN, speed:IN, flags)\nEND\nmove(pts[1,2], {X 1, Y 2}, ";
        let help = help_at_end(text).unwrap();
        assert_eq!(help.active_parameter, Some(2));
        assert_eq!(help.signatures[0].label, "DEF move(target:IN, speed:IN, flags)");
        assert_eq!(help.signatures[0].parameters.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn finds_enclosing_call_across_nested_parens() {
        let text = "DEF outer(a, b)\nEND\nouter(ABS(x), ";
        let help = help_at_end(text).unwrap();
        assert_eq!(help.active_parameter, Some(1));
        assert!(help.signatures[0].label.contains("outer"));

        let inner = help_at_end("x = outer(ABS(y").unwrap();
        assert!(inner.signatures[0].label.contains("ABS"));
        assert_eq!(inner.active_parameter, Some(0));
    }

    #[test]
    fn commas_in_strings_do_not_count() {
        let help = help_at_end("StrAdd(buffer, \"a, b, c\", ").unwrap();
        assert_eq!(help.active_parameter, Some(2));
    }

    #[test]
    fn no_help_outside_calls_or_for_keywords() {
        assert!(help_at_end("x = 1").is_none());
        assert!(help_at_end("IF (a").is_none());
        assert!(help_at_end("unknown_fn(").is_none());
        assert!(help_at_end("; outer(").is_none());
    }
}
