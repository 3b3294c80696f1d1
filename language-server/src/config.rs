use std::time::Duration;

use serde::Deserialize;
use tower_lsp::lsp_types::ConfigurationItem;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::diagnostics::DiagnosticOptions;
use crate::formatter::FormatOptions;
use crate::messages::Locale;

pub(crate) const SECTION: &str = "krl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServerConfig {
    pub(crate) locale: Locale,
    pub(crate) non_ascii_warnings: bool,
    pub(crate) debounce: Duration,
    pub(crate) blank_line_before_blocks: bool,
    pub(crate) blank_line_after_blocks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            non_ascii_warnings: true,
            debounce: Duration::from_millis(300),
            blank_line_before_blocks: false,
            blank_line_after_blocks: false,
        }
    }
}

impl ServerConfig {
    pub(crate) fn diagnostic_options(&self) -> DiagnosticOptions {
        DiagnosticOptions {
            locale: self.locale,
            non_ascii_warnings: self.non_ascii_warnings,
        }
    }

    pub(crate) fn format_options(&self, tab_size: u32, insert_spaces: bool) -> FormatOptions {
        FormatOptions {
            tab_size,
            insert_spaces,
            blank_line_before_blocks: self.blank_line_before_blocks,
            blank_line_after_blocks: self.blank_line_after_blocks,
        }
    }

    /// Applies a `krl` settings object. Missing keys keep their current value.
    fn apply(&mut self, section: KrlConfigSection) {
        if let Some(locale) = section.locale.as_deref() {
            self.locale = Locale::from_tag(locale);
        }
        if let Some(value) = section.diagnostics.non_ascii_warnings {
            self.non_ascii_warnings = value;
        }
        if let Some(ms) = section.diagnostics.debounce_ms {
            self.debounce = Duration::from_millis(ms);
        }
        if let Some(value) = section.formatting.blank_line_before_blocks {
            self.blank_line_before_blocks = value;
        }
        if let Some(value) = section.formatting.blank_line_after_blocks {
            self.blank_line_after_blocks = value;
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct KrlConfigSection {
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    diagnostics: DiagnosticsConfig,
    #[serde(default)]
    formatting: FormattingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DiagnosticsConfig {
    #[serde(default)]
    non_ascii_warnings: Option<bool>,
    #[serde(default)]
    debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FormattingConfig {
    #[serde(default)]
    blank_line_before_blocks: Option<bool>,
    #[serde(default)]
    blank_line_after_blocks: Option<bool>,
}

/// Builds a config from defaults plus one settings object. Malformed input
/// leaves the defaults in place.
pub(crate) fn parse_section(value: serde_json::Value) -> ServerConfig {
    let mut config = ServerConfig::default();
    match serde_json::from_value::<KrlConfigSection>(value) {
        Ok(section) => config.apply(section),
        Err(err) => warn!(%err, "ignoring malformed krl settings"),
    }
    config
}

impl Backend {
    pub(crate) async fn load_config(&self) {
        let items = vec![ConfigurationItem {
            scope_uri: None,
            section: Some(SECTION.to_string()),
        }];

        match self.client.configuration(items).await {
            Ok(values) => {
                if let Some(value) = values.into_iter().next().filter(|value| !value.is_null()) {
                    let config = parse_section(value);
                    debug!(?config, "loaded configuration");
                    *self.config.write() = config;
                }
            }
            Err(err) => debug!(%err, "client did not answer workspace/configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_camel_case_keys() {
        let config = parse_section(json!({
            "locale": "de",
            "diagnostics": { "nonAsciiWarnings": false, "debounceMs": 50 },
            "formatting": { "blankLineAfterBlocks": true }
        }));
        assert_eq!(config.locale, Locale::De);
        assert!(!config.non_ascii_warnings);
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert!(config.blank_line_after_blocks);
        assert!(!config.blank_line_before_blocks);
    }

    #[test]
    fn malformed_sections_keep_defaults() {
        assert_eq!(parse_section(json!({ "diagnostics": 3 })), ServerConfig::default());
        assert_eq!(parse_section(json!({})), ServerConfig::default());
    }
}
