//! One-shot command-line mode: validate or format a single file and print
//! the result to stdout.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tower_lsp::lsp_types::Url;

use crate::collector;
use crate::diagnostics::{compute_diagnostics, DiagnosticOptions};
use crate::formatter::{format_document, FormatOptions};
use crate::symbols::SymbolStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Check(PathBuf),
    Format(PathBuf),
}

impl Command {
    fn path(&self) -> &Path {
        match self {
            Command::Check(path) | Command::Format(path) => path,
        }
    }
}

/// Parses the arguments after the program name. `None` means no CLI mode was
/// requested and the server should run.
pub(crate) fn parse_args(args: &[String]) -> Result<Option<Command>> {
    let Some(flag) = args.first() else {
        return Ok(None);
    };
    let path = || -> Result<PathBuf> {
        let raw = args
            .get(1)
            .with_context(|| format!("{flag} expects a file argument"))?;
        let path = PathBuf::from(raw);
        if !is_safe_path(&path) {
            bail!("refusing path '{raw}': use a relative path without '..'");
        }
        Ok(path)
    };

    let command = match flag.as_str() {
        "--check" => Command::Check(path()?),
        "--format" => Command::Format(path()?),
        other => bail!("unknown argument '{other}' (expected --check <file> or --format <file>)"),
    };
    if args.len() > 2 {
        bail!("unexpected extra arguments after '{}'", args[1]);
    }
    Ok(Some(command))
}

/// Relative, and never climbs above the working directory.
pub(crate) fn is_safe_path(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

pub(crate) fn run(command: &Command) -> Result<()> {
    let path = command.path();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let output = render(command, &text)?;
    print!("{output}");
    Ok(())
}

fn render(command: &Command, text: &str) -> Result<String> {
    match command {
        Command::Check(path) => {
            let absolute = std::env::current_dir()
                .context("failed to resolve the working directory")?
                .join(path);
            let uri = Url::from_file_path(&absolute)
                .map_err(|_| anyhow!("cannot build a file URI for {}", absolute.display()))?;

            let store = SymbolStore::default();
            store.replace_document(&uri, collector::extract(text));
            let diagnostics = compute_diagnostics(
                text,
                Some(path.as_path()),
                &store.merged(),
                &DiagnosticOptions::default(),
            );
            let mut json = serde_json::to_string_pretty(&diagnostics)
                .context("failed to serialize diagnostics")?;
            json.push('\n');
            Ok(json)
        }
        Command::Format(_) => Ok(format_document(text, &FormatOptions::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_means_serve() {
        assert_eq!(parse_args(&[]).unwrap(), None);
    }

    #[test]
    fn parses_check_and_format() {
        assert_eq!(
            parse_args(&args(&["--check", "R1/main.src"])).unwrap(),
            Some(Command::Check(PathBuf::from("R1/main.src")))
        );
        assert_eq!(
            parse_args(&args(&["--format", "./cell.src"])).unwrap(),
            Some(Command::Format(PathBuf::from("./cell.src")))
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(&args(&["--check"])).is_err());
        assert!(parse_args(&args(&["--lint", "a.src"])).is_err());
        assert!(parse_args(&args(&["--check", "a.src", "b.src"])).is_err());
        assert!(parse_args(&args(&["--check", "../a.src"])).is_err());
    }

    #[test]
    fn only_relative_paths_are_safe() {
        assert!(is_safe_path(Path::new("R1/Program/main.src")));
        assert!(!is_safe_path(Path::new("R1/../../etc/passwd")));
        assert!(!is_safe_path(Path::new("/etc/passwd")));
        assert!(!is_safe_path(Path::new("")));
    }

    #[test]
    fn check_prints_diagnostics_as_json() {
        let command = Command::Check(PathBuf::from("main.src"));
        let output = render(&command, "DEF main()\n  x = 1\nEND\n").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        let codes: Vec<&str> = parsed
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|diagnostic| diagnostic["code"].as_str())
            .collect();
        assert!(codes.contains(&"undefinedVariable"));
    }

    #[test]
    fn format_prints_the_formatted_text() {
        let command = Command::Format(PathBuf::from("main.src"));
        assert_eq!(render(&command, "def m()\nx = 1\nend").unwrap(), "DEF m()\n    x = 1\nEND\n");
    }
}
