use std::collections::{HashMap, HashSet};

use tower_lsp::lsp_types::Range;

use crate::catalog;
use crate::classify::declaration_parts_with;
use crate::patterns::PATTERNS;
use crate::symbols::{
    Direction, FunctionSignature, Param, Scope, StructDefinition, Symbol, SymbolKind, SymbolTable,
};
use crate::text::{code_part, is_identifier, split_lines, Document};

/// One item of a comma separated list together with its byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListItem<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// Splits on commas that are outside `[...]`, `{...}`, `(...)` and string literals.
pub fn split_list(list: &str) -> Vec<ListItem<'_>> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0;
    for (idx, byte) in list.bytes().enumerate() {
        match byte {
            b'"' => in_string = !in_string,
            b'[' | b'{' | b'(' if !in_string => depth += 1,
            b']' | b'}' | b')' if !in_string => depth = (depth - 1).max(0),
            b',' if !in_string && depth == 0 => {
                items.push(ListItem {
                    offset: start,
                    text: &list[start..idx],
                });
                start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(ListItem {
        offset: start,
        text: &list[start..],
    });
    items
}

/// Splits `name[2] = value` at the first top-level `=`.
pub fn split_initializer(item: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    let mut in_string = false;
    for (idx, byte) in item.bytes().enumerate() {
        match byte {
            b'"' => in_string = !in_string,
            b'[' | b'{' | b'(' if !in_string => depth += 1,
            b']' | b'}' | b')' if !in_string => depth -= 1,
            b'=' if !in_string && depth == 0 => {
                return (&item[..idx], Some(item[idx + 1..].trim()));
            }
            _ => {}
        }
    }
    (item, None)
}

/// Drops an array suffix: `b[n]` becomes `b`.
pub fn strip_index(name: &str) -> &str {
    match name.find('[') {
        Some(idx) => name[..idx].trim_end(),
        None => name,
    }
}

/// Collects every declaration of a document. Pure function of `text`.
pub fn extract(text: &str) -> SymbolTable {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);
    let struct_types = declared_type_names(&lines);

    let mut variables: Vec<Symbol> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut functions: Vec<FunctionSignature> = Vec::new();
    let mut seen_functions: HashSet<String> = HashSet::new();

    let mut insert = |variables: &mut Vec<Symbol>, symbol: Symbol| {
        let key = symbol.key();
        match seen.get(&key) {
            Some(&idx) => {
                let existing = &mut variables[idx];
                // a DECL inside the body gives an untyped parameter its type
                if existing.kind == SymbolKind::Parameter && existing.type_name.is_none() {
                    existing.type_name = symbol.type_name;
                    existing.range = symbol.range;
                    existing.value = symbol.value;
                }
            }
            None => {
                seen.insert(key, variables.len());
                variables.push(symbol);
            }
        }
    };

    for (line_no, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if code.trim().is_empty() {
            continue;
        }

        if let Some(signature) = function_header(code, line_no, &document) {
            for param in &signature.params {
                insert(
                    &mut variables,
                    Symbol {
                        name: param.name.clone(),
                        kind: SymbolKind::Parameter,
                        type_name: None,
                        range: None,
                        scope: Scope::Local,
                        value: None,
                    },
                );
            }
            if seen_functions.insert(signature.symbol.key()) {
                functions.push(signature);
            }
            continue;
        }

        if let Some(caps) = PATTERNS.struc.captures(code) {
            let global = caps.get(1).is_some() || caps.get(2).is_some();
            let scope = if global { Scope::Global } else { Scope::Local };
            let name_match = &caps[4];
            if caps[3].eq_ignore_ascii_case("ENUM") {
                for item in split_list(&caps[5]) {
                    let member = item.text.trim();
                    if is_identifier(member) {
                        insert(
                            &mut variables,
                            Symbol {
                                name: member.to_string(),
                                kind: SymbolKind::EnumMember,
                                type_name: Some(name_match.to_string()),
                                range: None,
                                scope,
                                value: None,
                            },
                        );
                    }
                }
            } else if let Some(name) = caps.get(4) {
                insert(
                    &mut variables,
                    Symbol {
                        name: name.as_str().to_string(),
                        kind: SymbolKind::Struct,
                        type_name: None,
                        range: Some(name_range(&document, line_no, name.start(), name.as_str())),
                        scope,
                        value: Some(caps[5].trim().to_string()),
                    },
                );
            }
            continue;
        }

        if let Some(caps) = PATTERNS.signal.captures(code) {
            if let Some(name) = caps.get(2) {
                if is_identifier(name.as_str()) {
                    let value = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
                    insert(
                        &mut variables,
                        Symbol {
                            name: name.as_str().to_string(),
                            kind: SymbolKind::Signal,
                            type_name: None,
                            range: Some(name_range(&document, line_no, name.start(), name.as_str())),
                            scope: if caps.get(1).is_some() {
                                Scope::Global
                            } else {
                                Scope::Local
                            },
                            value: (!value.is_empty()).then(|| value.to_string()),
                        },
                    );
                }
            }
            continue;
        }

        if let Some(parts) = declaration_parts_with(code, &struct_types) {
            let scope = if parts.global {
                Scope::Global
            } else {
                Scope::Local
            };
            for item in split_list(parts.list) {
                let (lhs, value) = split_initializer(item.text);
                let name = strip_index(lhs.trim());
                if !is_identifier(name) {
                    continue;
                }
                let lead = item.text.len() - item.text.trim_start().len();
                let column = parts.list_start + item.offset + lead;
                insert(
                    &mut variables,
                    Symbol {
                        name: name.to_string(),
                        kind: SymbolKind::Variable,
                        type_name: Some(parts.type_name.to_string()),
                        range: Some(name_range(&document, line_no, column, name)),
                        scope,
                        value: value.filter(|v| !v.is_empty()).map(str::to_string),
                    },
                );
            }
        }
    }

    SymbolTable {
        variables,
        functions,
        structs: extract_structs(text, &HashSet::new()),
    }
}

/// Parses a `DEF`/`DEFFCT` header line.
pub fn function_header(code: &str, line_no: usize, document: &Document) -> Option<FunctionSignature> {
    let (global, return_type, name, params) = if let Some(caps) = PATTERNS.deffct_header.captures(code) {
        (
            caps.get(1).is_some(),
            Some(caps.get(2)?.as_str().to_string()),
            caps.get(3)?,
            caps.get(4)?.as_str(),
        )
    } else {
        let caps = PATTERNS.def_header.captures(code)?;
        (caps.get(1).is_some(), None, caps.get(2)?, caps.get(3)?.as_str())
    };

    Some(FunctionSignature {
        symbol: Symbol {
            name: name.as_str().to_string(),
            kind: SymbolKind::Function,
            type_name: return_type.clone(),
            range: Some(name_range(document, line_no, name.start(), name.as_str())),
            scope: if global { Scope::Global } else { Scope::Local },
            value: None,
        },
        params: parse_params(params),
        return_type,
        header_line: line_no as u32,
    })
}

pub fn parse_params(list: &str) -> Vec<Param> {
    split_list(list)
        .into_iter()
        .filter_map(|item| {
            let raw = item.text.trim();
            if raw.is_empty() {
                return None;
            }
            let (name_part, direction) = match raw.rsplit_once(':') {
                Some((name, dir)) => {
                    let direction = match dir.trim().to_ascii_uppercase().as_str() {
                        "IN" => Some(Direction::In),
                        "OUT" => Some(Direction::Out),
                        _ => None,
                    };
                    (name, direction)
                }
                None => (raw, None),
            };
            let name = strip_index(name_part.trim());
            is_identifier(name).then(|| Param {
                name: name.to_string(),
                direction,
                raw: raw.to_string(),
            })
        })
        .collect()
}

/// Structure and enumeration definitions of a data file. Type keywords and the
/// names in `known_structs` (upper-cased) are dropped from member lists.
pub fn extract_structs(text: &str, known_structs: &HashSet<String>) -> Vec<StructDefinition> {
    let lines = split_lines(text);
    let mut known: HashSet<String> = known_structs.clone();
    known.extend(declared_type_names(&lines));

    let mut definitions: Vec<StructDefinition> = Vec::new();
    for line in lines {
        let code = code_part(line);
        let Some(caps) = PATTERNS.struc.captures(code) else {
            continue;
        };
        let name = caps[4].to_string();
        if definitions
            .iter()
            .any(|def| def.name.eq_ignore_ascii_case(&name))
        {
            continue;
        }
        let is_enum = caps[3].eq_ignore_ascii_case("ENUM");
        let mut members = Vec::new();
        for item in split_list(&caps[5]) {
            for token in item.text.split_whitespace() {
                let token = strip_index(token);
                if !is_identifier(token) {
                    continue;
                }
                let upper = token.to_ascii_uppercase();
                if !is_enum && (catalog::is_builtin_type(token) || known.contains(&upper)) {
                    continue;
                }
                members.push(token.to_string());
            }
        }
        definitions.push(StructDefinition {
            name,
            members,
            is_enum,
        });
    }
    definitions
}

fn declared_type_names(lines: &[&str]) -> HashSet<String> {
    lines
        .iter()
        .filter_map(|line| PATTERNS.struc.captures(code_part(line)))
        .map(|caps| caps[4].to_ascii_uppercase())
        .collect()
}

fn name_range(document: &Document, line_no: usize, column: usize, name: &str) -> Range {
    document.span(line_no, column, name.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Position;

    fn names(table: &SymbolTable) -> Vec<String> {
        table.variables.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn collects_plain_array_and_initialised_names() {
        let table = extract("DECL INT a, b[10], c = 5");
        assert_eq!(names(&table), vec!["a", "b", "c"]);
        let c = table.variable("c").unwrap();
        assert_eq!(c.value.as_deref(), Some("5"));
        assert_eq!(c.type_name.as_deref(), Some("INT"));
    }

    #[test]
    fn respects_brackets_and_strings_when_splitting() {
        let table = extract("DECL CHAR msg[20] = \"a, b\", other[2,3]\nDECL E6POS xp1={X 1.0, Y 2.0}");
        assert_eq!(names(&table), vec!["msg", "other", "xp1"]);
    }

    #[test]
    fn accepts_bare_type_form_and_strips_comments() {
        let table = extract("REAL speed ; DECL INT hidden\nGLOBAL BOOL done");
        assert_eq!(names(&table), vec!["speed", "done"]);
        assert_eq!(table.variable("done").unwrap().scope, Scope::Global);
        assert_eq!(table.variable("speed").unwrap().scope, Scope::Local);
    }

    #[test]
    fn first_declaration_wins() {
        let table = extract("DECL INT a\nDECL REAL a");
        assert_eq!(table.variables.len(), 1);
        assert_eq!(table.variables[0].type_name.as_deref(), Some("INT"));
    }

    #[test]
    fn computes_ranges_from_line_offsets() {
        let table = extract("DEF main()\n  DECL INT first, second\nEND");
        let second = table.variable("second").unwrap();
        assert_eq!(
            second.range.unwrap().start,
            Position {
                line: 1,
                character: 18
            }
        );
        assert_eq!(second.range.unwrap().end.character, 24);
    }

    #[test]
    fn collects_signals_verbatim() {
        let table = extract("SIGNAL gripper_in $IN[1] TO $IN[8]");
        let signal = table.variable("gripper_in").unwrap();
        assert_eq!(signal.kind, SymbolKind::Signal);
        assert_eq!(signal.value.as_deref(), Some("$IN[1] TO $IN[8]"));
    }

    #[test]
    fn parses_function_signatures() {
        let table = extract(
            "GLOBAL DEFFCT REAL scale(factor:IN, values[]:OUT)\nENDFCT\nDEF main()\nEND",
        );
        assert_eq!(table.functions.len(), 2);
        let scale = table.function("SCALE").unwrap();
        assert_eq!(scale.return_type.as_deref(), Some("REAL"));
        assert_eq!(scale.symbol.scope, Scope::Global);
        assert_eq!(scale.params[0].name, "factor");
        assert_eq!(scale.params[0].direction, Some(Direction::In));
        assert_eq!(scale.params[1].name, "values");
        assert_eq!(scale.params[1].raw, "values[]:OUT");
        assert_eq!(scale.label(), "GLOBAL DEFFCT REAL scale(factor:IN, values[]:OUT)");
        let main = table.function("main").unwrap();
        assert!(main.return_type.is_none());
        assert!(main.params.is_empty());
    }

    #[test]
    fn parameter_gets_type_from_body_declaration() {
        let table = extract("DEF move(count:IN)\n  DECL INT count\nEND");
        let count = table.variable("count").unwrap();
        assert_eq!(count.kind, SymbolKind::Parameter);
        assert_eq!(count.type_name.as_deref(), Some("INT"));
        assert!(count.range.is_some());
    }

    #[test]
    fn enum_members_have_no_range() {
        let table = extract("GLOBAL ENUM color_t red, green, blue");
        let green = table.variable("green").unwrap();
        assert_eq!(green.kind, SymbolKind::EnumMember);
        assert!(green.range.is_none());
        assert_eq!(green.type_name.as_deref(), Some("color_t"));
    }

    #[test]
    fn drops_malformed_names() {
        let table = extract("DECL INT 1abc, ok, a-b");
        assert_eq!(names(&table), vec!["ok"]);
    }

    #[test]
    fn struct_members_drop_type_keywords_and_known_structs() {
        let text = "DEFDAT cell\nGLOBAL STRUC point_t REAL x, y\nSTRUC pallet_t INT rows, cols, point_t origin, CHAR label[12]\nENDDAT";
        let structs = extract_structs(text, &HashSet::new());
        assert_eq!(structs.len(), 2);
        assert_eq!(structs[0].members, vec!["x", "y"]);
        assert_eq!(structs[1].members, vec!["rows", "cols", "origin", "label"]);
    }

    #[test]
    fn bare_user_struct_declarations_are_collected() {
        let table = extract("STRUC point_t REAL x, y\npoint_t corner");
        assert!(table.variable("corner").is_some());
        assert_eq!(table.variable("point_t").unwrap().kind, SymbolKind::Struct);
    }
}
