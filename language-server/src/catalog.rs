//! Built-in vocabulary of the robot language: keywords, primitive and system
//! types, a selection of system variables and library functions.

use std::collections::HashSet;

use once_cell::sync::Lazy;

pub struct KeywordInfo {
    pub name: &'static str,
    pub doc: &'static str,
}

pub struct LibraryFunction {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub return_type: Option<&'static str>,
    pub doc: &'static str,
}

pub struct SystemVariable {
    pub name: &'static str,
    pub type_name: &'static str,
    pub doc: &'static str,
}

pub const KEYWORDS: &[KeywordInfo] = &[
    KeywordInfo { name: "DEF", doc: "Starts a subroutine." },
    KeywordInfo { name: "END", doc: "Ends a subroutine." },
    KeywordInfo { name: "DEFFCT", doc: "Starts a function returning a value." },
    KeywordInfo { name: "ENDFCT", doc: "Ends a function." },
    KeywordInfo { name: "DEFDAT", doc: "Starts a data list." },
    KeywordInfo { name: "ENDDAT", doc: "Ends a data list." },
    KeywordInfo { name: "PUBLIC", doc: "Makes the global declarations of a data list importable." },
    KeywordInfo { name: "GLOBAL", doc: "Makes a declaration or routine visible to other modules." },
    KeywordInfo { name: "DECL", doc: "Declares variables." },
    KeywordInfo { name: "CONST", doc: "Declares a constant." },
    KeywordInfo { name: "SIGNAL", doc: "Binds a name to one or more I/O channels." },
    KeywordInfo { name: "STRUC", doc: "Declares a structure type." },
    KeywordInfo { name: "ENUM", doc: "Declares an enumeration type." },
    KeywordInfo { name: "IF", doc: "Conditional branch: IF cond THEN ... [ELSE ...] ENDIF." },
    KeywordInfo { name: "THEN", doc: "Begins the true branch of IF." },
    KeywordInfo { name: "ELSE", doc: "Begins the false branch of IF." },
    KeywordInfo { name: "ENDIF", doc: "Ends an IF block." },
    KeywordInfo { name: "FOR", doc: "Counting loop: FOR i = a TO b [STEP s] ... ENDFOR." },
    KeywordInfo { name: "TO", doc: "Upper bound of FOR, or range of SIGNAL." },
    KeywordInfo { name: "STEP", doc: "Increment of FOR." },
    KeywordInfo { name: "ENDFOR", doc: "Ends a FOR loop." },
    KeywordInfo { name: "WHILE", doc: "Pre-test loop: WHILE cond ... ENDWHILE." },
    KeywordInfo { name: "ENDWHILE", doc: "Ends a WHILE loop." },
    KeywordInfo { name: "REPEAT", doc: "Post-test loop: REPEAT ... UNTIL cond." },
    KeywordInfo { name: "UNTIL", doc: "Ends a REPEAT loop with its exit condition." },
    KeywordInfo { name: "LOOP", doc: "Endless loop: LOOP ... ENDLOOP." },
    KeywordInfo { name: "ENDLOOP", doc: "Ends a LOOP." },
    KeywordInfo { name: "EXIT", doc: "Leaves the innermost loop." },
    KeywordInfo { name: "SWITCH", doc: "Multi-way branch on an integral or enum value." },
    KeywordInfo { name: "CASE", doc: "Branch of a SWITCH." },
    KeywordInfo { name: "DEFAULT", doc: "Fallback branch of a SWITCH." },
    KeywordInfo { name: "ENDSWITCH", doc: "Ends a SWITCH." },
    KeywordInfo { name: "GOTO", doc: "Jumps to a label." },
    KeywordInfo { name: "RETURN", doc: "Returns from a routine." },
    KeywordInfo { name: "HALT", doc: "Stops program execution." },
    KeywordInfo { name: "WAIT", doc: "WAIT FOR cond, or WAIT SEC t." },
    KeywordInfo { name: "SEC", doc: "Time in seconds for WAIT SEC." },
    KeywordInfo { name: "TIMEOUT", doc: "Upper bound for a wait." },
    KeywordInfo { name: "CONTINUE", doc: "Suppresses advance-run stop for the next line." },
    KeywordInfo { name: "INTERRUPT", doc: "Declares or controls an interrupt." },
    KeywordInfo { name: "WHEN", doc: "Condition of an interrupt or trigger." },
    KeywordInfo { name: "DO", doc: "Action of an interrupt or trigger." },
    KeywordInfo { name: "ON", doc: "Switches an interrupt or analog cycle on." },
    KeywordInfo { name: "OFF", doc: "Switches an interrupt or analog cycle off." },
    KeywordInfo { name: "TRIGGER", doc: "Path-related switching action." },
    KeywordInfo { name: "DISTANCE", doc: "Trigger anchor point." },
    KeywordInfo { name: "DELAY", doc: "Trigger time offset." },
    KeywordInfo { name: "PATH", doc: "Path trigger offset." },
    KeywordInfo { name: "PRIO", doc: "Trigger priority." },
    KeywordInfo { name: "BRAKE", doc: "Stops the robot in an interrupt routine." },
    KeywordInfo { name: "RESUME", doc: "Cancels running interrupt routines." },
    KeywordInfo { name: "PTP", doc: "Point-to-point motion." },
    KeywordInfo { name: "LIN", doc: "Linear motion." },
    KeywordInfo { name: "CIRC", doc: "Circular motion." },
    KeywordInfo { name: "PTP_REL", doc: "Relative point-to-point motion." },
    KeywordInfo { name: "LIN_REL", doc: "Relative linear motion." },
    KeywordInfo { name: "CIRC_REL", doc: "Relative circular motion." },
    KeywordInfo { name: "SPTP", doc: "Spline point-to-point motion." },
    KeywordInfo { name: "SLIN", doc: "Spline linear motion." },
    KeywordInfo { name: "SCIRC", doc: "Spline circular motion." },
    KeywordInfo { name: "SPLINE", doc: "Starts a spline block." },
    KeywordInfo { name: "ENDSPLINE", doc: "Ends a spline block." },
    KeywordInfo { name: "C_PTP", doc: "Approximate a PTP motion." },
    KeywordInfo { name: "C_DIS", doc: "Approximate by distance." },
    KeywordInfo { name: "C_VEL", doc: "Approximate by velocity." },
    KeywordInfo { name: "C_ORI", doc: "Approximate by orientation." },
    KeywordInfo { name: "CA", doc: "Circular angle." },
    KeywordInfo { name: "AND", doc: "Logical and." },
    KeywordInfo { name: "OR", doc: "Logical or." },
    KeywordInfo { name: "NOT", doc: "Logical negation." },
    KeywordInfo { name: "EXOR", doc: "Logical exclusive or." },
    KeywordInfo { name: "B_AND", doc: "Bitwise and." },
    KeywordInfo { name: "B_OR", doc: "Bitwise or." },
    KeywordInfo { name: "B_NOT", doc: "Bitwise negation." },
    KeywordInfo { name: "B_EXOR", doc: "Bitwise exclusive or." },
    KeywordInfo { name: "TRUE", doc: "Boolean true." },
    KeywordInfo { name: "FALSE", doc: "Boolean false." },
    KeywordInfo { name: "IN", doc: "Input parameter direction." },
    KeywordInfo { name: "OUT", doc: "Output parameter direction." },
    KeywordInfo { name: "ANIN", doc: "Cyclic analog input." },
    KeywordInfo { name: "ANOUT", doc: "Cyclic analog output." },
    KeywordInfo { name: "PULSE", doc: "Sets an output for a given time." },
    KeywordInfo { name: "IMPORT", doc: "Imports data from another data list." },
    KeywordInfo { name: "IS", doc: "Part of an IMPORT statement." },
    KeywordInfo { name: "EXT", doc: "Declares an external subroutine." },
    KeywordInfo { name: "EXTFCT", doc: "Declares an external function." },
];

pub const PRIMITIVE_TYPES: &[&str] = &["INT", "REAL", "BOOL", "CHAR"];

pub const SYSTEM_TYPES: &[&str] = &[
    "FRAME", "POS", "E6POS", "E3POS", "AXIS", "E6AXIS", "E3AXIS", "LOAD", "FDAT", "PDAT",
    "LDAT", "E6POS_T",
];

pub const LIBRARY_FUNCTIONS: &[LibraryFunction] = &[
    LibraryFunction { name: "ABS", params: &["x"], return_type: Some("REAL"), doc: "Absolute value." },
    LibraryFunction { name: "SQRT", params: &["x"], return_type: Some("REAL"), doc: "Square root." },
    LibraryFunction { name: "SIN", params: &["x"], return_type: Some("REAL"), doc: "Sine of an angle in degrees." },
    LibraryFunction { name: "COS", params: &["x"], return_type: Some("REAL"), doc: "Cosine of an angle in degrees." },
    LibraryFunction { name: "TAN", params: &["x"], return_type: Some("REAL"), doc: "Tangent of an angle in degrees." },
    LibraryFunction { name: "ACOS", params: &["x"], return_type: Some("REAL"), doc: "Arc cosine in degrees." },
    LibraryFunction { name: "ATAN2", params: &["y", "x"], return_type: Some("REAL"), doc: "Arc tangent of y/x in degrees." },
    LibraryFunction { name: "MAX", params: &["a", "b"], return_type: Some("REAL"), doc: "Larger of two values." },
    LibraryFunction { name: "MIN", params: &["a", "b"], return_type: Some("REAL"), doc: "Smaller of two values." },
    LibraryFunction { name: "STRLEN", params: &["text[]"], return_type: Some("INT"), doc: "Length of a character array." },
    LibraryFunction { name: "StrAdd", params: &["dest[]:OUT", "src[]:IN"], return_type: Some("INT"), doc: "Appends src to dest." },
    LibraryFunction { name: "StrClear", params: &["text[]:OUT"], return_type: Some("BOOL"), doc: "Clears a character array." },
    LibraryFunction { name: "StrComp", params: &["a[]:IN", "b[]:IN", "ignore_case:IN"], return_type: Some("BOOL"), doc: "Compares two character arrays." },
    LibraryFunction { name: "StrCopy", params: &["dest[]:OUT", "src[]:IN"], return_type: Some("BOOL"), doc: "Copies src into dest." },
    LibraryFunction { name: "StrFind", params: &["start:IN", "text[]:IN", "key[]:IN", "ignore_case:IN"], return_type: Some("INT"), doc: "Finds key in text." },
    LibraryFunction { name: "StrLen", params: &["text[]:IN"], return_type: Some("INT"), doc: "Length of a character array." },
    LibraryFunction { name: "INV_POS", params: &["pos:IN"], return_type: Some("FRAME"), doc: "Inverts a frame." },
    LibraryFunction { name: "BAS", params: &["command:IN", "value:IN"], return_type: None, doc: "Base package: initialises motion parameters." },
    LibraryFunction { name: "VARSTATE", params: &["name[]:IN"], return_type: Some("VAR_STATE"), doc: "Initialisation state of a variable." },
    LibraryFunction { name: "MSG_SEND", params: &["msg:IN"], return_type: Some("INT"), doc: "Sends a message to the message window." },
    LibraryFunction { name: "SET_KRLMSG", params: &["type:IN", "msg:OUT", "params[]:OUT", "opts:OUT"], return_type: Some("INT"), doc: "Issues a KRL message." },
    LibraryFunction { name: "GET_SIG_INF", params: &["name[]:IN", "info:OUT"], return_type: Some("INT"), doc: "Reads signal properties." },
];

pub const SYSTEM_VARIABLES: &[SystemVariable] = &[
    SystemVariable { name: "$TOOL", type_name: "FRAME", doc: "Current tool frame." },
    SystemVariable { name: "$BASE", type_name: "FRAME", doc: "Current base frame." },
    SystemVariable { name: "$POS_ACT", type_name: "E6POS", doc: "Current Cartesian position." },
    SystemVariable { name: "$AXIS_ACT", type_name: "E6AXIS", doc: "Current axis position." },
    SystemVariable { name: "$VEL", type_name: "VEL_STRUC", doc: "Cartesian velocity (CP in m/s)." },
    SystemVariable { name: "$VEL_PTP", type_name: "INT", doc: "PTP axis velocity in percent." },
    SystemVariable { name: "$ACC", type_name: "ACC_STRUC", doc: "Cartesian acceleration." },
    SystemVariable { name: "$ACC_PTP", type_name: "INT", doc: "PTP axis acceleration in percent." },
    SystemVariable { name: "$APO", type_name: "APO_STRUC", doc: "Approximation parameters." },
    SystemVariable { name: "$IN", type_name: "BOOL", doc: "Digital inputs." },
    SystemVariable { name: "$OUT", type_name: "BOOL", doc: "Digital outputs." },
    SystemVariable { name: "$ANIN", type_name: "REAL", doc: "Analog inputs." },
    SystemVariable { name: "$ANOUT", type_name: "REAL", doc: "Analog outputs." },
    SystemVariable { name: "$TIMER", type_name: "INT", doc: "Timers in milliseconds." },
    SystemVariable { name: "$TIMER_STOP", type_name: "BOOL", doc: "Timer stop flags." },
    SystemVariable { name: "$FLAG", type_name: "BOOL", doc: "Flags." },
    SystemVariable { name: "$CYCFLAG", type_name: "BOOL", doc: "Cyclic flags." },
    SystemVariable { name: "$OV_PRO", type_name: "INT", doc: "Program override in percent." },
    SystemVariable { name: "$MODE_OP", type_name: "MODE_OP", doc: "Operating mode." },
    SystemVariable { name: "$LOAD", type_name: "LOAD", doc: "Current payload." },
    SystemVariable { name: "$ORI_TYPE", type_name: "ORI_TYPE", doc: "Orientation control type." },
    SystemVariable { name: "$ADVANCE", type_name: "INT", doc: "Advance run depth." },
    SystemVariable { name: "$NULLFRAME", type_name: "FRAME", doc: "Zero frame." },
    SystemVariable { name: "$WORLD", type_name: "FRAME", doc: "World coordinate system." },
    SystemVariable { name: "$ROBROOT", type_name: "FRAME", doc: "Robot root frame." },
    SystemVariable { name: "$H_POS", type_name: "E6AXIS", doc: "Home position." },
];

/// Members of the built-in structure types, for `var.` completion.
pub const BUILTIN_STRUCTS: &[(&str, &[&str])] = &[
    ("FRAME", &["X", "Y", "Z", "A", "B", "C"]),
    ("POS", &["X", "Y", "Z", "A", "B", "C", "S", "T"]),
    ("E3POS", &["X", "Y", "Z", "A", "B", "C", "S", "T", "E1", "E2", "E3"]),
    ("E6POS", &["X", "Y", "Z", "A", "B", "C", "S", "T", "E1", "E2", "E3", "E4", "E5", "E6"]),
    ("AXIS", &["A1", "A2", "A3", "A4", "A5", "A6"]),
    ("E3AXIS", &["A1", "A2", "A3", "A4", "A5", "A6", "E1", "E2", "E3"]),
    ("E6AXIS", &["A1", "A2", "A3", "A4", "A5", "A6", "E1", "E2", "E3", "E4", "E5", "E6"]),
    ("LOAD", &["M", "CM", "J"]),
    ("VEL_STRUC", &["CP", "ORI1", "ORI2"]),
    ("ACC_STRUC", &["CP", "ORI1", "ORI2"]),
    ("APO_STRUC", &["CVEL", "CPTP", "CDIS", "CORI"]),
];

static KEYWORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| KEYWORDS.iter().map(|keyword| keyword.name).collect());

static TYPE_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    PRIMITIVE_TYPES
        .iter()
        .chain(SYSTEM_TYPES.iter())
        .copied()
        .collect()
});

pub fn is_keyword(word: &str) -> bool {
    KEYWORD_SET.contains(word.to_ascii_uppercase().as_str())
}

pub fn is_builtin_type(word: &str) -> bool {
    TYPE_SET.contains(word.to_ascii_uppercase().as_str())
}

pub fn keyword(word: &str) -> Option<&'static KeywordInfo> {
    KEYWORDS
        .iter()
        .find(|keyword| keyword.name.eq_ignore_ascii_case(word))
}

pub fn library_function(name: &str) -> Option<&'static LibraryFunction> {
    LIBRARY_FUNCTIONS
        .iter()
        .find(|function| function.name.eq_ignore_ascii_case(name))
}

pub fn system_variable(name: &str) -> Option<&'static SystemVariable> {
    SYSTEM_VARIABLES
        .iter()
        .find(|variable| variable.name.eq_ignore_ascii_case(name))
}

pub fn builtin_struct_members(type_name: &str) -> Option<&'static [&'static str]> {
    BUILTIN_STRUCTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(type_name))
        .map(|(_, members)| *members)
}

impl LibraryFunction {
    pub fn signature(&self) -> String {
        match self.return_type {
            Some(ret) => format!("DEFFCT {} {}({})", ret, self.name, self.params.join(", ")),
            None => format!("DEF {}({})", self.name, self.params.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        assert!(is_keyword("endif"));
        assert!(!is_keyword("counter"));
        assert!(is_builtin_type("e6pos"));
        assert_eq!(system_variable("$vel").map(|var| var.type_name), Some("VEL_STRUC"));
        assert_eq!(builtin_struct_members("frame").map(<[_]>::len), Some(6));
    }

    #[test]
    fn library_signatures_read_like_headers() {
        assert_eq!(
            library_function("sqrt").map(LibraryFunction::signature).as_deref(),
            Some("DEFFCT REAL SQRT(x)")
        );
        assert_eq!(
            library_function("BAS").map(LibraryFunction::signature).as_deref(),
            Some("DEF BAS(command:IN, value:IN)")
        );
    }

    #[test]
    fn system_variable_types_have_members_when_structured() {
        for variable in SYSTEM_VARIABLES {
            if variable.type_name.ends_with("_STRUC") {
                assert!(builtin_struct_members(variable.type_name).is_some(), "{}", variable.name);
            }
        }
    }
}
