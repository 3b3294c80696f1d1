use tower_lsp::lsp_types::{CodeLens, Command};

use crate::collector;
use crate::references::find_references;
use crate::resolver::{enclosing_scope, SourceFile};
use crate::text::{split_lines, Document};

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// "N references · M lines" above every routine header of `text`. `files`
/// is the workspace content the reference count runs over.
pub fn code_lenses(text: &str, files: &[SourceFile]) -> Vec<CodeLens> {
    let document = Document::new(text.to_string());
    let lines = split_lines(text);

    collector::extract(text)
        .functions
        .iter()
        .map(|signature| {
            let header = signature.header_line as usize;
            let span = enclosing_scope(&lines, header)
                .map(|window| window.end - window.start + 1)
                .unwrap_or(1);
            let references = find_references(files, signature.name(), false).len();
            let title = format!("{} · {}", plural(references, "reference"), plural(span, "line"));
            CodeLens {
                range: document.span(header, 0, lines.get(header).map_or(0, |line| line.len())),
                command: Some(Command {
                    title,
                    command: String::new(),
                    arguments: None,
                }),
                data: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Url;

    #[test]
    fn counts_calls_and_routine_length() {
        let text = "DEF main()\n  pick()\n  pick()\nEND\nDEF pick()\nEND";
        let other = "DEF cell()\n  pick()\nEND";
        let files = [
            SourceFile {
                uri: Url::parse("file:///cell/main.src").unwrap(),
                text: text.to_string(),
            },
            SourceFile {
                uri: Url::parse("file:///cell/cell.src").unwrap(),
                text: other.to_string(),
            },
        ];
        let lenses = code_lenses(text, &files);
        let titles: Vec<String> = lenses
            .iter()
            .map(|lens| lens.command.as_ref().unwrap().title.clone())
            .collect();
        assert_eq!(titles, vec!["0 references · 4 lines", "3 references · 2 lines"]);
        assert_eq!(lenses[1].range.start.line, 4);
    }
}
