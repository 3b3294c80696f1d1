use std::collections::HashSet;

use crate::catalog;
use crate::patterns::PATTERNS;
use crate::text::code_part;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Variable,
    Signal,
    Struct,
    Enum,
    Routine,
    DataList,
}

/// Shared classification of a source line, consumed by every validator and provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    Declaration(DeclKind),
    Usage,
}

impl LineKind {
    pub fn is_code(self) -> bool {
        matches!(self, LineKind::Declaration(_) | LineKind::Usage)
    }
}

/// Type token and variable list of a `DECL`-style line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclParts<'a> {
    pub global: bool,
    pub explicit_decl: bool,
    pub type_name: &'a str,
    pub list: &'a str,
    /// Byte column of `list` within the line.
    pub list_start: usize,
}

pub fn classify_line(line: &str) -> LineKind {
    classify_line_with(line, &HashSet::new())
}

/// Like [`classify_line`], additionally accepting the upper-cased names in
/// `struct_types` as type keywords of the bare declaration form.
pub fn classify_line_with(line: &str, struct_types: &HashSet<String>) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with(';') || trimmed.starts_with('&') {
        return LineKind::Comment;
    }
    let code = code_part(line);
    if code.trim().is_empty() {
        return LineKind::Comment;
    }

    if PATTERNS.def_header.is_match(code) || PATTERNS.deffct_header.is_match(code) {
        return LineKind::Declaration(DeclKind::Routine);
    }
    if PATTERNS.defdat_header.is_match(code) {
        return LineKind::Declaration(DeclKind::DataList);
    }
    if let Some(caps) = PATTERNS.struc.captures(code) {
        return if caps[3].eq_ignore_ascii_case("ENUM") {
            LineKind::Declaration(DeclKind::Enum)
        } else {
            LineKind::Declaration(DeclKind::Struct)
        };
    }
    if PATTERNS.signal.is_match(code) {
        return LineKind::Declaration(DeclKind::Signal);
    }
    if declaration_parts_with(code, struct_types).is_some() {
        return LineKind::Declaration(DeclKind::Variable);
    }
    LineKind::Usage
}

/// Splits a variable declaration into its type and list. Without `DECL` the
/// type must be a built-in type or one of `struct_types`.
pub fn declaration_parts_with<'a>(
    code: &'a str,
    struct_types: &HashSet<String>,
) -> Option<DeclParts<'a>> {
    let caps = PATTERNS.declaration.captures(code)?;
    let type_match = caps.get(6)?;
    let list_match = caps.get(7)?;
    let type_name = type_match.as_str();
    let explicit_decl = caps.get(3).is_some();
    let global = caps.get(1).is_some() || caps.get(4).is_some();
    let upper = type_name.to_ascii_uppercase();

    if matches!(
        upper.as_str(),
        "DEF" | "DEFFCT" | "DEFDAT" | "STRUC" | "ENUM" | "SIGNAL" | "INTERRUPT" | "DECL"
    ) {
        return None;
    }
    if !explicit_decl && !catalog::is_builtin_type(type_name) && !struct_types.contains(&upper) {
        return None;
    }
    if !explicit_decl && caps.get(2).is_none() && caps.get(5).is_none() && !global {
        // a bare `INT = 3` style assignment is not a declaration
        if list_match.as_str().trim_start().starts_with('=') {
            return None;
        }
    }

    Some(DeclParts {
        global,
        explicit_decl,
        type_name,
        list: list_match.as_str(),
        list_start: list_match.start(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_lines() {
        assert_eq!(classify_line("   "), LineKind::Blank);
        assert_eq!(classify_line("; comment"), LineKind::Comment);
        assert_eq!(
            classify_line("DECL INT a, b"),
            LineKind::Declaration(DeclKind::Variable)
        );
        assert_eq!(
            classify_line("REAL speed = 1.5"),
            LineKind::Declaration(DeclKind::Variable)
        );
        assert_eq!(
            classify_line("GLOBAL DEF main()"),
            LineKind::Declaration(DeclKind::Routine)
        );
        assert_eq!(
            classify_line("SIGNAL gripper $OUT[3]"),
            LineKind::Declaration(DeclKind::Signal)
        );
        assert_eq!(
            classify_line("DECL GLOBAL ENUM color red, green"),
            LineKind::Declaration(DeclKind::Enum)
        );
        assert_eq!(classify_line("PTP HOME"), LineKind::Usage);
        assert_eq!(classify_line("INTERRUPT DECL 3 WHEN $IN[1] DO stop()"), LineKind::Usage);
    }

    #[test]
    fn bare_user_struct_type_needs_context() {
        let mut structs = HashSet::new();
        assert_eq!(classify_line_with("pallet_t p1", &structs), LineKind::Usage);
        structs.insert("PALLET_T".to_string());
        assert_eq!(
            classify_line_with("pallet_t p1", &structs),
            LineKind::Declaration(DeclKind::Variable)
        );
    }

    #[test]
    fn declaration_parts_report_list_offset() {
        let line = "GLOBAL DECL E6POS xp1={X 1.0}";
        let parts = declaration_parts_with(line, &HashSet::new()).unwrap();
        assert!(parts.global);
        assert_eq!(parts.type_name, "E6POS");
        assert_eq!(&line[parts.list_start..], "xp1={X 1.0}");
    }
}
