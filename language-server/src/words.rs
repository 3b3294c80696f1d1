/// Identifier under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordAt {
    pub text: String,
    /// Byte columns within the line, end exclusive.
    pub start: usize,
    pub end: usize,
    /// Preceded by `.`, i.e. a structure member access.
    pub is_member: bool,
    /// Text of the identifier before the `.` when `is_member` is set.
    pub owner: Option<String>,
}

/// One identifier token of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    /// The non-blank character directly before the token, if any.
    pub prefix: Option<char>,
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Finds the identifier touching byte column `column` of `line`. System
/// variables keep their leading `$`.
pub fn word_at(line: &str, column: usize) -> Option<WordAt> {
    let bytes = line.as_bytes();
    let column = column.min(bytes.len());

    let mut start = column;
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = column;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    if start == end {
        if column < bytes.len() && bytes[column] == b'$' {
            end = column + 1;
            while end < bytes.len() && is_word_byte(bytes[end]) {
                end += 1;
            }
            start = column + 1;
            if start == end {
                return None;
            }
        } else {
            return None;
        }
    }
    if bytes[start].is_ascii_digit() {
        return None;
    }
    if start > 0 && bytes[start - 1] == b'$' {
        start -= 1;
    }

    let is_member = start > 0 && bytes[start - 1] == b'.';
    let owner = if is_member {
        let owner_end = skip_index_back(bytes, start - 1);
        let mut owner_start = owner_end;
        while owner_start > 0 && (is_word_byte(bytes[owner_start - 1]) || bytes[owner_start - 1] == b'$') {
            owner_start -= 1;
        }
        (owner_start < owner_end).then(|| line[owner_start..owner_end].to_string())
    } else {
        None
    };

    Some(WordAt {
        text: line[start..end].to_string(),
        start,
        end,
        is_member,
        owner,
    })
}

// Steps back over an `[...]` index that sits before a `.`.
fn skip_index_back(bytes: &[u8], dot: usize) -> usize {
    if dot == 0 || bytes[dot - 1] != b']' {
        return dot;
    }
    let mut depth = 0usize;
    let mut idx = dot;
    while idx > 0 {
        idx -= 1;
        match bytes[idx] {
            b']' => depth += 1,
            b'[' => {
                depth -= 1;
                if depth == 0 {
                    return idx;
                }
            }
            _ => {}
        }
    }
    dot
}

/// Identifier tokens of a code fragment; numbers are skipped.
pub fn tokens(code: &str) -> Vec<Token<'_>> {
    let bytes = code.as_bytes();
    let mut result = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if byte.is_ascii_alphabetic() || byte == b'_' {
            let start = idx;
            while idx < bytes.len() && is_word_byte(bytes[idx]) {
                idx += 1;
            }
            let prefix = code[..start].chars().rev().find(|ch| !ch.is_whitespace());
            let direct = code[..start].chars().next_back();
            result.push(Token {
                text: &code[start..idx],
                start,
                end: idx,
                prefix: match direct {
                    Some(ch @ ('$' | '#' | '.')) => Some(ch),
                    _ => prefix,
                },
            });
        } else if byte.is_ascii_digit() {
            // numeric literals, including hex/bin forms like 'H1F' and exponents
            while idx < bytes.len() && (is_word_byte(bytes[idx]) || bytes[idx] == b'.') {
                idx += 1;
            }
        } else if byte == b'\'' {
            idx += 1;
            while idx < bytes.len() && bytes[idx] != b'\'' {
                idx += 1;
            }
            idx += 1;
        } else {
            idx += 1;
        }
    }
    result
}

/// Identifier characters directly before byte column `column`.
pub fn prefix_before(line: &str, column: usize) -> &str {
    let bytes = line.as_bytes();
    let column = column.min(bytes.len());
    let mut start = column;
    while start > 0 && (is_word_byte(bytes[start - 1]) || bytes[start - 1] == b'$') {
        start -= 1;
    }
    &line[start..column]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_word_under_cursor() {
        let word = word_at("  counter = counter + 1", 5).unwrap();
        assert_eq!(word.text, "counter");
        assert_eq!((word.start, word.end), (2, 9));
        assert!(!word.is_member);
    }

    #[test]
    fn flags_member_access_with_owner() {
        let word = word_at("pose[2].X = 10", 9).unwrap();
        assert_eq!(word.text, "X");
        assert!(word.is_member);
        assert_eq!(word.owner.as_deref(), Some("pose"));
    }

    #[test]
    fn keeps_system_variable_sigil() {
        let word = word_at("$TOOL = TOOL_DATA[1]", 2).unwrap();
        assert_eq!(word.text, "$TOOL");
        let word = word_at("$TOOL = TOOL_DATA[1]", 0).unwrap();
        assert_eq!(word.text, "$TOOL");
    }

    #[test]
    fn tokens_report_direct_prefixes() {
        let toks = tokens("x = $IN[1] AND #ON OR p.X");
        let names: Vec<_> = toks.iter().map(|t| (t.text, t.prefix)).collect();
        assert!(names.contains(&("IN", Some('$'))));
        assert!(names.contains(&("ON", Some('#'))));
        assert!(names.contains(&("X", Some('.'))));
        assert!(names.contains(&("x", None)));
    }

    #[test]
    fn skips_numeric_literals() {
        let toks = tokens("a = 1.5E3 + 'H1F'");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].text, "a");
    }
}
