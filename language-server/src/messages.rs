use std::fmt;

use serde::Serialize;

/// Display language of diagnostic messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Locale {
    #[default]
    En,
    De,
}

impl Locale {
    /// Accepts tags such as `de`, `de-DE` or `DE_at`; anything unknown is English.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "de" => Locale::De,
            _ => Locale::En,
        }
    }
}

/// Stable machine-readable discriminator carried in `Diagnostic::code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticCode {
    UndefinedVariable,
    MissingGlobal,
    GlobalNotPublic,
    NameTooLong,
    NameStartsWithDigit,
    UnmatchedBlock,
    UnclosedBlock,
    DuplicateName,
    DeadCode,
    EmptyBlock,
    WaitWithoutTimeout,
    HaltStatement,
    RealInSwitch,
    ShouldBeReal,
    UnsafeVelocityCp,
    UnsafeVelocityPtp,
    ToolNotInitialized,
    BaseNotInitialized,
    NonAsciiCharacter,
}

impl DiagnosticCode {
    pub const ALL: [DiagnosticCode; 19] = [
        DiagnosticCode::UndefinedVariable,
        DiagnosticCode::MissingGlobal,
        DiagnosticCode::GlobalNotPublic,
        DiagnosticCode::NameTooLong,
        DiagnosticCode::NameStartsWithDigit,
        DiagnosticCode::UnmatchedBlock,
        DiagnosticCode::UnclosedBlock,
        DiagnosticCode::DuplicateName,
        DiagnosticCode::DeadCode,
        DiagnosticCode::EmptyBlock,
        DiagnosticCode::WaitWithoutTimeout,
        DiagnosticCode::HaltStatement,
        DiagnosticCode::RealInSwitch,
        DiagnosticCode::ShouldBeReal,
        DiagnosticCode::UnsafeVelocityCp,
        DiagnosticCode::UnsafeVelocityPtp,
        DiagnosticCode::ToolNotInitialized,
        DiagnosticCode::BaseNotInitialized,
        DiagnosticCode::NonAsciiCharacter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::UndefinedVariable => "undefinedVariable",
            DiagnosticCode::MissingGlobal => "missingGlobal",
            DiagnosticCode::GlobalNotPublic => "globalNotPublic",
            DiagnosticCode::NameTooLong => "nameTooLong",
            DiagnosticCode::NameStartsWithDigit => "nameStartsWithDigit",
            DiagnosticCode::UnmatchedBlock => "unmatchedBlock",
            DiagnosticCode::UnclosedBlock => "unclosedBlock",
            DiagnosticCode::DuplicateName => "duplicateName",
            DiagnosticCode::DeadCode => "deadCode",
            DiagnosticCode::EmptyBlock => "emptyBlock",
            DiagnosticCode::WaitWithoutTimeout => "waitWithoutTimeout",
            DiagnosticCode::HaltStatement => "haltStatement",
            DiagnosticCode::RealInSwitch => "realInSwitch",
            DiagnosticCode::ShouldBeReal => "shouldBeReal",
            DiagnosticCode::UnsafeVelocityCp => "unsafeVelocityCp",
            DiagnosticCode::UnsafeVelocityPtp => "unsafeVelocityPtp",
            DiagnosticCode::ToolNotInitialized => "toolNotInitialized",
            DiagnosticCode::BaseNotInitialized => "baseNotInitialized",
            DiagnosticCode::NonAsciiCharacter => "nonAsciiCharacter",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic message with its arguments, rendered per locale.
#[derive(Debug, Clone, PartialEq)]
pub enum Message<'a> {
    UndefinedVariable { name: &'a str },
    MissingGlobal { name: &'a str },
    GlobalNotPublic { name: &'a str },
    NameTooLong { name: &'a str, max: usize },
    NameStartsWithDigit { name: &'a str },
    UnexpectedCloser { closer: &'a str, opener: &'a str },
    MismatchedCloser { closer: &'a str, expected: &'a str },
    UnclosedBlock { opener: &'a str, closer: &'a str },
    DuplicateRoutine { name: &'a str, first_line: usize },
    DuplicateVariable { name: &'a str, first_line: usize },
    DeadCode,
    EmptyBlock { keyword: &'a str },
    WaitWithoutTimeout,
    HaltStatement,
    RealInSwitch { name: &'a str },
    ShouldBeReal { name: &'a str, value: &'a str },
    UnsafeVelocityCp { value: f64, limit: f64 },
    UnsafeVelocityPtp { value: f64, limit: f64 },
    ToolNotInitialized,
    BaseNotInitialized,
    NonAscii { text: &'a str },
}

impl Message<'_> {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Message::UndefinedVariable { .. } => DiagnosticCode::UndefinedVariable,
            Message::MissingGlobal { .. } => DiagnosticCode::MissingGlobal,
            Message::GlobalNotPublic { .. } => DiagnosticCode::GlobalNotPublic,
            Message::NameTooLong { .. } => DiagnosticCode::NameTooLong,
            Message::NameStartsWithDigit { .. } => DiagnosticCode::NameStartsWithDigit,
            Message::UnexpectedCloser { .. } | Message::MismatchedCloser { .. } => {
                DiagnosticCode::UnmatchedBlock
            }
            Message::UnclosedBlock { .. } => DiagnosticCode::UnclosedBlock,
            Message::DuplicateRoutine { .. } | Message::DuplicateVariable { .. } => {
                DiagnosticCode::DuplicateName
            }
            Message::DeadCode => DiagnosticCode::DeadCode,
            Message::EmptyBlock { .. } => DiagnosticCode::EmptyBlock,
            Message::WaitWithoutTimeout => DiagnosticCode::WaitWithoutTimeout,
            Message::HaltStatement => DiagnosticCode::HaltStatement,
            Message::RealInSwitch { .. } => DiagnosticCode::RealInSwitch,
            Message::ShouldBeReal { .. } => DiagnosticCode::ShouldBeReal,
            Message::UnsafeVelocityCp { .. } => DiagnosticCode::UnsafeVelocityCp,
            Message::UnsafeVelocityPtp { .. } => DiagnosticCode::UnsafeVelocityPtp,
            Message::ToolNotInitialized => DiagnosticCode::ToolNotInitialized,
            Message::BaseNotInitialized => DiagnosticCode::BaseNotInitialized,
            Message::NonAscii { .. } => DiagnosticCode::NonAsciiCharacter,
        }
    }

    pub fn render(&self, locale: Locale) -> String {
        match locale {
            Locale::En => self.english(),
            Locale::De => self.german(),
        }
    }

    fn english(&self) -> String {
        match self {
            Message::UndefinedVariable { name } => format!("Variable '{name}' is not declared."),
            Message::MissingGlobal { name } => {
                format!("'{name}' is declared in a PUBLIC data list but is not GLOBAL.")
            }
            Message::GlobalNotPublic { name } => {
                format!("'{name}' is GLOBAL but the data list is not PUBLIC.")
            }
            Message::NameTooLong { name, max } => {
                format!("Name '{name}' is longer than {max} characters.")
            }
            Message::NameStartsWithDigit { name } => {
                format!("Name '{name}' must not start with a digit.")
            }
            Message::UnexpectedCloser { closer, opener } => {
                format!("'{closer}' has no matching '{opener}'.")
            }
            Message::MismatchedCloser { closer, expected } => {
                format!("Found '{closer}' where '{expected}' was expected.")
            }
            Message::UnclosedBlock { opener, closer } => {
                format!("'{opener}' is never closed; expected '{closer}'.")
            }
            Message::DuplicateRoutine { name, first_line } => {
                format!("Routine '{name}' is already defined on line {first_line}.")
            }
            Message::DuplicateVariable { name, first_line } => {
                format!("'{name}' is already declared on line {first_line}.")
            }
            Message::DeadCode => "Unreachable code.".to_string(),
            Message::EmptyBlock { keyword } => format!("Empty {keyword} block."),
            Message::WaitWithoutTimeout => {
                "WAIT FOR without TIMEOUT may block indefinitely.".to_string()
            }
            Message::HaltStatement => "HALT stops program execution.".to_string(),
            Message::RealInSwitch { name } => {
                format!("SWITCH on '{name}' of type REAL; use INT, CHAR or an ENUM.")
            }
            Message::ShouldBeReal { name, value } => {
                format!("'{name}' is INT but is assigned the decimal value {value}.")
            }
            Message::UnsafeVelocityCp { value, limit } => {
                format!("$VEL.CP = {value} m/s exceeds the safe limit of {limit} m/s.")
            }
            Message::UnsafeVelocityPtp { value, limit } => {
                format!("$VEL_PTP = {value} exceeds {limit} percent.")
            }
            Message::ToolNotInitialized => "Motion before $TOOL is initialized.".to_string(),
            Message::BaseNotInitialized => "Motion before $BASE is initialized.".to_string(),
            Message::NonAscii { text } => {
                format!("Non-ASCII characters '{text}' may not be supported by the controller.")
            }
        }
    }

    fn german(&self) -> String {
        match self {
            Message::UndefinedVariable { name } => format!("Variable '{name}' ist nicht deklariert."),
            Message::MissingGlobal { name } => {
                format!("'{name}' steht in einer PUBLIC-Datenliste, ist aber nicht GLOBAL.")
            }
            Message::GlobalNotPublic { name } => {
                format!("'{name}' ist GLOBAL, die Datenliste ist aber nicht PUBLIC.")
            }
            Message::NameTooLong { name, max } => {
                format!("Name '{name}' ist länger als {max} Zeichen.")
            }
            Message::NameStartsWithDigit { name } => {
                format!("Name '{name}' darf nicht mit einer Ziffer beginnen.")
            }
            Message::UnexpectedCloser { closer, opener } => {
                format!("'{closer}' ohne passendes '{opener}'.")
            }
            Message::MismatchedCloser { closer, expected } => {
                format!("'{closer}' gefunden, aber '{expected}' erwartet.")
            }
            Message::UnclosedBlock { opener, closer } => {
                format!("'{opener}' wird nicht geschlossen; '{closer}' erwartet.")
            }
            Message::DuplicateRoutine { name, first_line } => {
                format!("Routine '{name}' ist bereits in Zeile {first_line} definiert.")
            }
            Message::DuplicateVariable { name, first_line } => {
                format!("'{name}' ist bereits in Zeile {first_line} deklariert.")
            }
            Message::DeadCode => "Nicht erreichbarer Code.".to_string(),
            Message::EmptyBlock { keyword } => format!("Leerer {keyword}-Block."),
            Message::WaitWithoutTimeout => {
                "WAIT FOR ohne TIMEOUT kann endlos blockieren.".to_string()
            }
            Message::HaltStatement => "HALT hält die Programmausführung an.".to_string(),
            Message::RealInSwitch { name } => {
                format!("SWITCH auf '{name}' vom Typ REAL; INT, CHAR oder ENUM verwenden.")
            }
            Message::ShouldBeReal { name, value } => {
                format!("'{name}' ist INT, erhält aber den Dezimalwert {value}.")
            }
            Message::UnsafeVelocityCp { value, limit } => {
                format!("$VEL.CP = {value} m/s überschreitet das sichere Limit von {limit} m/s.")
            }
            Message::UnsafeVelocityPtp { value, limit } => {
                format!("$VEL_PTP = {value} überschreitet {limit} Prozent.")
            }
            Message::ToolNotInitialized => "Bewegung vor Initialisierung von $TOOL.".to_string(),
            Message::BaseNotInitialized => "Bewegung vor Initialisierung von $BASE.".to_string(),
            Message::NonAscii { text } => {
                format!("Nicht-ASCII-Zeichen '{text}' werden von der Steuerung evtl. nicht unterstützt.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_strings() {
        for code in DiagnosticCode::ALL {
            assert_eq!(DiagnosticCode::parse(code.as_str()), Some(code));
            assert_eq!(
                serde_json::to_value(code).unwrap(),
                serde_json::Value::String(code.as_str().to_string())
            );
        }
        assert_eq!(DiagnosticCode::parse("nope"), None);
    }

    #[test]
    fn code_is_independent_of_locale() {
        let message = Message::ShouldBeReal {
            name: "a",
            value: "1.5",
        };
        assert_ne!(message.render(Locale::En), message.render(Locale::De));
        assert_eq!(message.code(), DiagnosticCode::ShouldBeReal);
    }

    #[test]
    fn parses_locale_tags() {
        assert_eq!(Locale::from_tag("de-DE"), Locale::De);
        assert_eq!(Locale::from_tag("DE_at"), Locale::De);
        assert_eq!(Locale::from_tag("fr"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }
}
