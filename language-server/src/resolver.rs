use std::path::{Path, PathBuf};

use regex::Regex;
use tower_lsp::lsp_types::{Position, Range, Url};
use walkdir::{DirEntry, WalkDir};

use crate::patterns::PATTERNS;
use crate::text::{code_part, mask_strings, split_lines, word_pattern};

pub const SOURCE_EXTENSIONS: [&str; 3] = ["src", "dat", "sub"];

const DEPENDENCY_DIRS: &[&str] = &["node_modules", "target", "out", "dist"];

pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SOURCE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn is_pruned(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || DEPENDENCY_DIRS.iter().any(|dir| name == *dir)
}

/// Every source file under `root`, sorted by path. Hidden and dependency
/// directories are skipped; unreadable entries are ignored.
pub fn source_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_pruned(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|path| is_source_file(path))
        .collect();
    files.sort();
    files
}

/// Reads file content for workspace-wide scans. `None` means the file is
/// skipped.
pub trait SourceProvider {
    fn read(&self, path: &Path) -> Option<String>;
}

/// A workspace file with the content the scan saw.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub uri: Url,
    pub text: String,
}

/// Plain disk reads.
pub struct DiskSources;

impl SourceProvider for DiskSources {
    fn read(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }
}

impl<F> SourceProvider for F
where
    F: Fn(&Path) -> Option<String>,
{
    fn read(&self, path: &Path) -> Option<String> {
        self(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    Function,
    Variable,
    Struct,
}

/// Narrows a lookup to one file and optionally an inclusive line window.
#[derive(Debug, Clone, Copy)]
pub struct ScopeHint<'a> {
    pub file: &'a Path,
    pub lines: Option<ScopeWindow>,
}

/// Inclusive zero-based line range of a routine or data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeWindow {
    pub start: usize,
    pub end: usize,
}

impl ScopeWindow {
    pub fn contains(&self, line: usize) -> bool {
        (self.start..=self.end).contains(&line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    pub line: usize,
    pub range: Range,
    /// The declaring line, trimmed.
    pub detail: String,
}

struct Matcher {
    kind: ResolveKind,
    line: Regex,
    word: Regex,
}

impl Matcher {
    fn new(name: &str, kind: ResolveKind) -> Option<Self> {
        let escaped = regex::escape(name);
        let line = match kind {
            ResolveKind::Function => Regex::new(&format!(
                r"(?i)^\s*(?:GLOBAL\s+)?(?:DEF|DEFFCT)\s+(?:[\w$\[\]]+\s+)?({escaped})\s*\(([^)]*)\)"
            )),
            ResolveKind::Variable => Regex::new(r"(?i)^\s*(?:GLOBAL\s+)?(?:CONST\s+)?(?:DECL|SIGNAL)\b"),
            ResolveKind::Struct => Regex::new(&format!(
                r"(?i)^\s*(?:GLOBAL\s+)?(?:DECL\s+)?(?:GLOBAL\s+)?STRUC\s+({escaped})\b"
            )),
        }
        .ok()?;
        Some(Self {
            kind,
            line,
            word: word_pattern(name)?,
        })
    }

    /// Byte column and length of the name on a matching line.
    fn find(&self, line: &str) -> Option<(usize, usize)> {
        let code = mask_strings(code_part(line));
        match self.kind {
            ResolveKind::Function | ResolveKind::Struct => {
                let caps = self.line.captures(&code)?;
                let name = caps.get(1)?;
                Some((name.start(), name.len()))
            }
            ResolveKind::Variable => {
                if !self.line.is_match(&code) {
                    return None;
                }
                self.word
                    .find_iter(&code)
                    .find(|found| {
                        let before = code[..found.start()].chars().next_back();
                        !matches!(before, Some('$' | '#' | '.'))
                    })
                    .map(|found| (found.start(), found.len()))
            }
        }
    }
}

/// Finds the declaring location of `name`. Files are searched in path order,
/// then line order; the first hit wins. With a hint only the hinted file (and
/// window) is searched.
pub fn resolve(
    root: &Path,
    name: &str,
    kind: ResolveKind,
    hint: Option<ScopeHint<'_>>,
    sources: &dyn SourceProvider,
) -> Option<Resolved> {
    let matcher = Matcher::new(name, kind)?;

    let candidates = match hint {
        Some(hint) => vec![hint.file.to_path_buf()],
        None => source_files(root),
    };
    let window = hint.and_then(|hint| hint.lines);

    for path in candidates {
        let Some(content) = sources.read(&path) else {
            continue;
        };
        for (line_no, line) in split_lines(&content).into_iter().enumerate() {
            if let Some(window) = window {
                if line_no < window.start {
                    continue;
                }
                if line_no > window.end {
                    break;
                }
            }
            if let Some((column, len)) = matcher.find(line) {
                return Some(Resolved {
                    range: line_range(line, line_no, column, len),
                    path,
                    line: line_no,
                    detail: line.trim().to_string(),
                });
            }
        }
    }
    None
}

fn line_range(line: &str, line_no: usize, column: usize, len: usize) -> Range {
    let utf16 = |end: usize| line[..end.min(line.len())].encode_utf16().count() as u32;
    Range {
        start: Position::new(line_no as u32, utf16(column)),
        end: Position::new(line_no as u32, utf16(column + len)),
    }
}

/// Searches only `window` of the in-memory `text` belonging to `file`.
pub fn resolve_in_window(
    name: &str,
    kind: ResolveKind,
    file: &Path,
    text: &str,
    window: ScopeWindow,
) -> Option<Resolved> {
    resolve(
        Path::new(""),
        name,
        kind,
        Some(ScopeHint {
            file,
            lines: Some(window),
        }),
        &|path: &Path| (path == file).then(|| text.to_string()),
    )
}

/// Lines of the `DEF`/`DEFFCT`/`DEFDAT` block containing `line`. `None` when
/// the line sits outside any block.
pub fn enclosing_scope(lines: &[&str], line: usize) -> Option<ScopeWindow> {
    if line >= lines.len() {
        return None;
    }
    let opener = &PATTERNS.routine_opener;
    let closer = &PATTERNS.routine_closer;

    let mut depth = 0usize;
    let mut start = None;
    for idx in (0..=line).rev() {
        let code = code_part(lines[idx]);
        if opener.is_match(code) {
            if depth == 0 {
                start = Some(idx);
                break;
            }
            depth -= 1;
        } else if closer.is_match(code) && idx != line {
            depth += 1;
        }
    }
    let start = start?;

    let mut depth = 0usize;
    let mut end = lines.len() - 1;
    for (idx, text) in lines.iter().enumerate().skip(line) {
        let code = code_part(text);
        if closer.is_match(code) {
            if depth == 0 {
                end = idx;
                break;
            }
            depth -= 1;
        } else if opener.is_match(code) && idx != line {
            depth += 1;
        }
    }
    Some(ScopeWindow { start, end })
}
