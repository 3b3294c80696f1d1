use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tower_lsp::lsp_types::{Range, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Function,
    Struct,
    EnumMember,
    Signal,
    Parameter,
}

impl SymbolKind {
    pub fn label(self) -> &'static str {
        match self {
            SymbolKind::Variable => "Variable",
            SymbolKind::Function => "Function",
            SymbolKind::Struct => "Struct",
            SymbolKind::EnumMember => "Enum member",
            SymbolKind::Signal => "Signal",
            SymbolKind::Parameter => "Parameter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub type_name: Option<String>,
    pub range: Option<Range>,
    pub scope: Scope,
    pub value: Option<String>,
}

impl Symbol {
    pub fn key(&self) -> String {
        self.name.to_ascii_uppercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub direction: Option<Direction>,
    /// Parameter text as written, e.g. `count:IN`.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub symbol: Symbol,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    /// Zero-based line of the `DEF`/`DEFFCT` header.
    pub header_line: u32,
}

impl FunctionSignature {
    pub fn name(&self) -> &str {
        &self.symbol.name
    }

    pub fn label(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|param| param.raw.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let global = if self.symbol.scope == Scope::Global {
            "GLOBAL "
        } else {
            ""
        };
        match &self.return_type {
            Some(ret) => format!("{}DEFFCT {} {}({})", global, ret, self.symbol.name, params),
            None => format!("{}DEF {}({})", global, self.symbol.name, params),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDefinition {
    pub name: String,
    pub members: Vec<String>,
    pub is_enum: bool,
}

/// Output of one collection pass over a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    pub variables: Vec<Symbol>,
    pub functions: Vec<FunctionSignature>,
    pub structs: Vec<StructDefinition>,
}

impl SymbolTable {
    pub fn variable(&self, name: &str) -> Option<&Symbol> {
        self.variables
            .iter()
            .find(|symbol| symbol.name.eq_ignore_ascii_case(name))
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions
            .iter()
            .find(|function| function.name().eq_ignore_ascii_case(name))
    }

    pub fn declared_names(&self) -> HashSet<String> {
        self.variables
            .iter()
            .map(Symbol::key)
            .chain(self.functions.iter().map(|function| function.symbol.key()))
            .chain(self.structs.iter().map(|def| def.name.to_ascii_uppercase()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SymbolLocation {
    pub uri: Url,
    pub range: Range,
}

#[derive(Debug, Clone)]
pub struct LocatedSymbol {
    pub uri: Url,
    pub symbol: Symbol,
}

#[derive(Debug, Clone)]
pub struct LocatedFunction {
    pub uri: Url,
    pub signature: FunctionSignature,
}

impl LocatedFunction {
    pub fn location(&self) -> Option<SymbolLocation> {
        self.signature.symbol.range.map(|range| SymbolLocation {
            uri: self.uri.clone(),
            range,
        })
    }
}

/// Workspace-wide view recomputed from the union of all file entries.
#[derive(Debug, Default)]
pub struct MergedSymbols {
    pub variables: Vec<LocatedSymbol>,
    pub functions: Vec<LocatedFunction>,
    pub structs: HashMap<String, StructDefinition>,
    /// Upper-cased variable name to its declared structure type.
    pub variable_types: HashMap<String, String>,
    pub declared_names: HashSet<String>,
    pub function_names: HashSet<String>,
}

impl MergedSymbols {
    fn build(files: &DashMap<String, (Url, Arc<SymbolTable>)>) -> Self {
        let mut entries: Vec<(Url, Arc<SymbolTable>)> = files
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

        let mut merged = MergedSymbols::default();
        for (uri, table) in entries {
            for def in &table.structs {
                merged
                    .structs
                    .entry(def.name.to_ascii_uppercase())
                    .or_insert_with(|| def.clone());
            }
            for function in &table.functions {
                let key = function.symbol.key();
                merged.declared_names.insert(key.clone());
                if merged.function_names.insert(key) {
                    merged.functions.push(LocatedFunction {
                        uri: uri.clone(),
                        signature: function.clone(),
                    });
                }
            }
            for symbol in &table.variables {
                merged.declared_names.insert(symbol.key());
                merged.variables.push(LocatedSymbol {
                    uri: uri.clone(),
                    symbol: symbol.clone(),
                });
            }
        }

        // a field typed with a structure from another file lists that type as a member
        let struct_names: HashSet<String> = merged.structs.keys().cloned().collect();
        for def in merged.structs.values_mut().filter(|def| !def.is_enum) {
            def.members
                .retain(|member| !struct_names.contains(&member.to_ascii_uppercase()));
        }

        for located in &merged.variables {
            if let Some(type_name) = &located.symbol.type_name {
                let upper = type_name.to_ascii_uppercase();
                if merged.structs.contains_key(&upper)
                    || crate::catalog::builtin_struct_members(&upper).is_some()
                {
                    merged
                        .variable_types
                        .entry(located.symbol.key())
                        .or_insert(upper);
                }
            }
        }
        merged
    }

    pub fn function(&self, name: &str) -> Option<&LocatedFunction> {
        self.functions
            .iter()
            .find(|function| function.signature.name().eq_ignore_ascii_case(name))
    }

    pub fn variable(&self, name: &str) -> Option<&LocatedSymbol> {
        let matches = || {
            self.variables
                .iter()
                .filter(|located| located.symbol.name.eq_ignore_ascii_case(name))
        };
        matches()
            .find(|located| located.symbol.scope == Scope::Global)
            .or_else(|| matches().next())
    }

    pub fn struct_members(&self, type_name: &str) -> Option<Vec<String>> {
        let upper = type_name.to_ascii_uppercase();
        if let Some(def) = self.structs.get(&upper) {
            return Some(def.members.clone());
        }
        crate::catalog::builtin_struct_members(&upper)
            .map(|members| members.iter().map(|member| member.to_string()).collect())
    }
}

/// Session state of one workspace: per-file tables plus the merged view.
/// A file's entry is swapped as a whole, so readers see either the old or
/// the new table, never a partial one.
#[derive(Debug, Default)]
pub struct SymbolStore {
    files: DashMap<String, (Url, Arc<SymbolTable>)>,
    merged: RwLock<Arc<MergedSymbols>>,
}

impl SymbolStore {
    pub fn replace_document(&self, uri: &Url, table: SymbolTable) {
        self.files
            .insert(uri.to_string(), (uri.clone(), Arc::new(table)));
        self.rebuild();
    }

    pub fn clear_document(&self, uri: &Url) {
        if self.files.remove(uri.as_str()).is_some() {
            self.rebuild();
        }
    }

    /// Drops every cached table; called when the workspace root changes.
    pub fn clear_on_root_change(&self) {
        self.files.clear();
        *self.merged.write() = Arc::new(MergedSymbols::default());
    }

    pub fn merged(&self) -> Arc<MergedSymbols> {
        self.merged.read().clone()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    fn rebuild(&self) {
        // held across the build so concurrent rebuilds cannot publish a stale view last
        let mut guard = self.merged.write();
        *guard = Arc::new(MergedSymbols::build(&self.files));
    }
}

pub(crate) fn sanitize_markdown(value: &str) -> String {
    value.trim().replace('|', "\\|").replace('\n', "<br>")
}
