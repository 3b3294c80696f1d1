use once_cell::sync::Lazy;
use regex::Regex;

/// Block families tracked by the balance checker, folding and highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    If,
    For,
    While,
    Loop,
    Repeat,
    Switch,
    Def,
    Deffct,
    Defdat,
}

impl BlockKind {
    pub const ALL: [BlockKind; 9] = [
        BlockKind::If,
        BlockKind::For,
        BlockKind::While,
        BlockKind::Loop,
        BlockKind::Repeat,
        BlockKind::Switch,
        BlockKind::Def,
        BlockKind::Deffct,
        BlockKind::Defdat,
    ];

    pub fn opener(self) -> &'static str {
        match self {
            BlockKind::If => "IF",
            BlockKind::For => "FOR",
            BlockKind::While => "WHILE",
            BlockKind::Loop => "LOOP",
            BlockKind::Repeat => "REPEAT",
            BlockKind::Switch => "SWITCH",
            BlockKind::Def => "DEF",
            BlockKind::Deffct => "DEFFCT",
            BlockKind::Defdat => "DEFDAT",
        }
    }

    pub fn closer(self) -> &'static str {
        match self {
            BlockKind::If => "ENDIF",
            BlockKind::For => "ENDFOR",
            BlockKind::While => "ENDWHILE",
            BlockKind::Loop => "ENDLOOP",
            BlockKind::Repeat => "UNTIL",
            BlockKind::Switch => "ENDSWITCH",
            BlockKind::Def => "END",
            BlockKind::Deffct => "ENDFCT",
            BlockKind::Defdat => "ENDDAT",
        }
    }

    pub fn from_keyword(word: &str) -> Option<(BlockKind, bool)> {
        let upper = word.to_ascii_uppercase();
        BlockKind::ALL.iter().find_map(|kind| {
            if kind.opener() == upper {
                Some((*kind, true))
            } else if kind.closer() == upper {
                Some((*kind, false))
            } else {
                None
            }
        })
    }
}

pub struct BlockRule {
    pub kind: BlockKind,
    pub opener: Regex,
    pub closer: Regex,
}

/// Every line-level pattern the engine relies on, compiled once.
pub struct Patterns {
    pub declaration: Regex,
    pub signal: Regex,
    pub def_header: Regex,
    pub deffct_header: Regex,
    pub defdat_header: Regex,
    pub struc: Regex,
    pub routine_opener: Regex,
    pub routine_closer: Regex,
    pub blocks: Vec<BlockRule>,
    pub unconditional_exit: Regex,
    pub reachability_restore: Regex,
    pub label: Regex,
    pub wait_for: Regex,
    pub timeout: Regex,
    pub halt: Regex,
    pub switch_subject: Regex,
    pub literal_assignment: Regex,
    pub vel_cp: Regex,
    pub vel_ptp: Regex,
    pub tool_assignment: Regex,
    pub base_assignment: Regex,
    pub bas_initmov: Regex,
    pub motion: Regex,
    pub fold_open: Regex,
    pub fold_close: Regex,
    pub call: Regex,
    pub member_prefix: Regex,
    pub global_keyword: Regex,
    pub decl_keyword: Regex,
}

fn rule(pattern: &str, name: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("bad {name} pattern: {err}"))
}

impl Patterns {
    pub fn new() -> Self {
        let blocks = BlockKind::ALL
            .iter()
            .map(|kind| {
                let opener = match kind {
                    BlockKind::Def | BlockKind::Deffct => {
                        format!(r"(?i)^\s*(?:GLOBAL\s+)?{}\b", kind.opener())
                    }
                    _ => format!(r"(?i)^\s*{}\b", kind.opener()),
                };
                BlockRule {
                    kind: *kind,
                    opener: rule(&opener, kind.opener()),
                    closer: rule(&format!(r"(?i)\b{}\b", kind.closer()), kind.closer()),
                }
            })
            .collect();

        Self {
            declaration: rule(
                r"(?i)^\s*(?:(GLOBAL)\s+)?(?:(CONST)\s+)?(?:(DECL)\s+)?(?:(GLOBAL)\s+)?(?:(CONST)\s+)?([A-Za-z_$][\w$]*)\s+(\S.*)$",
                "declaration",
            ),
            signal: rule(
                r"(?i)^\s*(?:(GLOBAL)\s+)?SIGNAL\s+(\S+)\s*(.*)$",
                "signal",
            ),
            def_header: rule(
                r"(?i)^\s*(?:(GLOBAL)\s+)?DEF\s+([A-Za-z_]\w*)\s*\(([^)]*)\)",
                "def header",
            ),
            deffct_header: rule(
                r"(?i)^\s*(?:(GLOBAL)\s+)?DEFFCT\s+([A-Za-z_$][\w$\[\]]*)\s+([A-Za-z_]\w*)\s*\(([^)]*)\)",
                "deffct header",
            ),
            defdat_header: rule(
                r"(?i)^\s*DEFDAT\s+([A-Za-z_$][\w$]*)(?:\s+(PUBLIC))?",
                "defdat header",
            ),
            struc: rule(
                r"(?i)^\s*(?:(GLOBAL)\s+)?(?:DECL\s+)?(?:(GLOBAL)\s+)?(STRUC|ENUM)\s+([A-Za-z_]\w*)\s+(.*)$",
                "struc",
            ),
            routine_opener: rule(r"(?i)^\s*(?:GLOBAL\s+)?(DEF|DEFFCT|DEFDAT)\b", "routine opener"),
            routine_closer: rule(r"(?i)^\s*(END|ENDFCT|ENDDAT)\b", "routine closer"),
            blocks,
            unconditional_exit: rule(r"(?i)^\s*(RETURN|EXIT|GOTO|HALT)\b", "exit"),
            reachability_restore: rule(
                r"(?i)^\s*(END\w*|UNTIL|CASE|DEFAULT|ELSE)\b",
                "reachability",
            ),
            label: rule(r"^\s*[A-Za-z_]\w*\s*:\s*$", "label"),
            wait_for: rule(r"(?i)^\s*WAIT\s+FOR\b", "wait for"),
            timeout: rule(r"(?i)\bTIMEOUT\b", "timeout"),
            halt: rule(r"(?i)^\s*HALT\b", "halt"),
            switch_subject: rule(r"(?i)^\s*SWITCH\s+([A-Za-z_]\w*)\s*$", "switch subject"),
            literal_assignment: rule(
                r"^\s*([A-Za-z_]\w*)\s*=\s*([+-]?(?:\d+\.\d*|\.\d+)(?:[eE][+-]?\d+)?)\s*$",
                "literal assignment",
            ),
            vel_cp: rule(r"(?i)^\s*\$VEL\.CP\s*=\s*([+-]?\d+(?:\.\d*)?|[+-]?\.\d+)", "vel cp"),
            vel_ptp: rule(
                r"(?i)^\s*\$VEL_PTP\s*=\s*([+-]?\d+(?:\.\d*)?|[+-]?\.\d+)",
                "vel ptp",
            ),
            tool_assignment: rule(r"(?i)^\s*\$TOOL\s*=", "tool assignment"),
            base_assignment: rule(r"(?i)^\s*\$BASE\s*=", "base assignment"),
            bas_initmov: rule(r"(?i)\bBAS\s*\(\s*#INITMOV\b", "bas initmov"),
            motion: rule(
                r"(?i)^\s*(PTP|LIN|CIRC|SPTP|SLIN|SCIRC)(?:_REL)?\b",
                "motion",
            ),
            fold_open: rule(r"(?i)^\s*;\s*FOLD\b", "fold open"),
            fold_close: rule(r"(?i)^\s*;\s*ENDFOLD\b", "fold close"),
            call: rule(r"([A-Za-z_]\w*)\s*\(", "call"),
            member_prefix: rule(r"([A-Za-z_$][\w$]*)(?:\[[^\]]*\])?\.(\w*)$", "member prefix"),
            global_keyword: rule(r"(?i)\bGLOBAL\s+", "global keyword"),
            decl_keyword: rule(r"(?i)^\s*(?:GLOBAL\s+)?(?:CONST\s+)?DECL\b", "decl keyword"),
        }
    }

    pub fn block_rule(&self, kind: BlockKind) -> &BlockRule {
        &self.blocks[BlockKind::ALL
            .iter()
            .position(|candidate| *candidate == kind)
            .unwrap_or(0)]
    }
}

pub static PATTERNS: Lazy<Patterns> = Lazy::new(Patterns::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routine_opener_excludes_compound_keywords() {
        let def = &PATTERNS.block_rule(BlockKind::Def).opener;
        assert!(def.is_match("DEF main()"));
        assert!(def.is_match("global def main()"));
        assert!(!def.is_match("DEFFCT INT f()"));
        assert!(!def.is_match("DEFDAT main"));
    }

    #[test]
    fn end_closer_excludes_endif() {
        let end = &PATTERNS.block_rule(BlockKind::Def).closer;
        assert!(end.is_match("END"));
        assert!(!end.is_match("ENDIF"));
        assert!(!end.is_match("ENDFOR"));
    }

    #[test]
    fn wait_for_is_not_a_for_opener() {
        let for_rule = &PATTERNS.block_rule(BlockKind::For).opener;
        assert!(for_rule.is_match("  FOR i = 1 TO 3"));
        assert!(!for_rule.is_match("WAIT FOR $IN[1]"));
    }

    #[test]
    fn keywords_map_to_block_kinds() {
        assert_eq!(BlockKind::from_keyword("until"), Some((BlockKind::Repeat, false)));
        assert_eq!(BlockKind::from_keyword("DEFFCT"), Some((BlockKind::Deffct, true)));
        assert_eq!(BlockKind::from_keyword("THEN"), None);
    }
}
