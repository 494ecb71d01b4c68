use std::path::PathBuf;
use std::time::Duration;

use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error in '{field_path}': {message}")]
pub struct ValidationError {
    /// JSON path to the field (e.g., "remote.timeoutMs")
    pub field_path: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field_path: field_path.into(), message: message.into() }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    ValidationErrors(Vec<ValidationError>),

    #[error("Failed to load configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// 検証エラーを番号付きの行にまとめる
fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, err)| format!("  {}. {} - {}", i + 1, err.field_path, err.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlaySettings {
    pub remote: RemoteConfig,

    /// What to do once a changed dictionary has been adopted while the
    /// document is visible. Hidden documents are always reloaded.
    pub reload: ReloadMode,

    pub selector: SelectorConfig,
    pub polling: PollingConfig,

    /// How translation strings are written into elements.
    pub content_policy: ContentPolicy,

    /// Directory of the persistent cache file.
    /// If unset, `<platform cache dir>/passage-overlay` is used.
    pub cache_dir: Option<PathBuf>,

    /// Dictionary JSON consulted when the cache is empty or unreadable.
    pub bundled_snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    /// Remote dictionary location. `None` disables remote sync.
    pub url: Option<String>,
    pub timeout_ms: u64,
    pub strategy: ReconcileStrategy,
}

impl RemoteConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { url: None, timeout_ms: 8000, strategy: ReconcileStrategy::default() }
    }
}

/// How a remote payload is recognized as new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileStrategy {
    /// Always download and compare a BLAKE3 digest of the body.
    #[default]
    ContentHash,
    /// Send the stored validator as `If-None-Match` and trust `304`.
    Conditional,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReloadMode {
    /// Ask before reloading a visible document.
    #[default]
    Prompt,
    /// Reload without asking.
    Always,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentPolicy {
    /// Translations are entity-escaped passage source and are decoded
    /// before being written as text.
    #[default]
    Markup,
    /// Translations are written verbatim.
    PlainText,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorConfig {
    pub tag: String,
    pub attribute: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { tag: "tw-passagedata".to_string(), attribute: "name".to_string() }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    /// Number of ticks before the poller stops. `0` disables polling.
    pub iterations: u32,
}

impl PollingConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 500, iterations: 20 }
    }
}

impl OverlaySettings {
    /// # Errors
    /// - Required field is empty
    /// - Zero timeout or poll interval
    /// - Unparsable remote URL
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(url) = &self.remote.url {
            if url.is_empty() {
                errors.push(ValidationError::new(
                    "remote.url",
                    "The URL cannot be empty. Remove this field to disable remote sync",
                ));
            } else if let Err(e) = reqwest::Url::parse(url) {
                errors.push(ValidationError::new(
                    "remote.url",
                    format!("Invalid URL '{url}': {e}"),
                ));
            }
        }

        if self.remote.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "remote.timeoutMs",
                "The timeout must be greater than zero. Example: 8000",
            ));
        }

        if self.selector.tag.trim().is_empty() {
            errors.push(ValidationError::new(
                "selector.tag",
                "The tag cannot be empty. Example: \"tw-passagedata\"",
            ));
        }

        if self.selector.attribute.trim().is_empty() {
            errors.push(ValidationError::new(
                "selector.attribute",
                "The attribute cannot be empty. Example: \"name\"",
            ));
        }

        if self.polling.interval_ms == 0 && self.polling.iterations > 0 {
            errors.push(ValidationError::new(
                "polling.intervalMs",
                "The interval must be greater than zero while polling is enabled. Set \"iterations\" to 0 to disable polling",
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Explicit cache directory, or `<platform cache dir>/passage-overlay`.
    ///
    /// Relative paths are returned as written; [`super::ConfigManager::cache_dir`]
    /// resolves them against the config directory.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("passage-overlay")
        })
    }
}
