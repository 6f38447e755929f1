//! Configuration for the mock server.
//!
//! Defines the per-path override rules loaded from the response config
//! document and the runtime settings consumed by the dispatcher.

use axum::http::{HeaderValue, StatusCode};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while loading the override rule document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be read from disk.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document was read but is not a valid rule list.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Ordered list of override rules.
///
/// Rule identity is its position: earlier rules win when several rules
/// supply the same field for a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    pub rules: Vec<OverrideRule>,
}

impl RuleSet {
    /// Create a rule set from an ordered list of rules.
    pub fn new(rules: Vec<OverrideRule>) -> Self {
        Self { rules }
    }

    /// Load rules from a file. YAML is used for `.yaml`/`.yml`, JSON otherwise.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed: Result<Self, Box<dyn std::error::Error + Send + Sync>> = match path
            .extension()
            .and_then(|ext| ext.to_str())
        {
            Some("yaml") | Some("yml") => Self::from_yaml(&content).map_err(Into::into),
            _ => Self::from_json(&content).map_err(Into::into),
        };

        parsed.map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load rules from a file, falling back to an empty rule set.
    ///
    /// A missing or malformed document is not fatal: the server keeps
    /// answering every request with the default (no override) behavior.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(rules) => {
                info!(path = %path.display(), rules = rules.len(), "Loaded override rules");
                rules
            }
            Err(err) => {
                warn!(error = %err, "No override rules available, continuing without overrides");
                Self::default()
            }
        }
    }

    /// Parse rules from a JSON array.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse rules from a YAML sequence.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Report rules that can never take full effect.
    ///
    /// Invalid rules are still loaded; the matcher ignores the unusable
    /// parts. This is used to surface mistakes before the server starts.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (i, rule) in self.rules.iter().enumerate() {
            if let Err(e) = Regex::new(&rule.path) {
                problems.push(format!("Rule {}: invalid pattern {:?}: {}", i, rule.path, e));
            }
            if rule.http_status != 0 && rule.status().is_none() {
                problems.push(format!(
                    "Rule {}: invalid HTTP status {}",
                    i, rule.http_status
                ));
            }
            if !rule.content_type.is_empty() && rule.header_content_type().is_none() {
                problems.push(format!(
                    "Rule {}: content type {:?} is not a valid header value",
                    i, rule.content_type
                ));
            }
        }
        problems
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OverrideRule> {
        self.rules.iter()
    }
}

/// A single override rule.
///
/// Zero and empty values mean "not configured" for their field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRule {
    /// Regex searched anywhere within the request path
    pub path: String,

    /// Artificial delay in milliseconds
    #[serde(default)]
    pub delay: u64,

    /// Forced HTTP status
    #[serde(default)]
    pub http_status: u16,

    /// Forced Content-Type for fixture responses
    #[serde(default)]
    pub content_type: String,
}

impl OverrideRule {
    /// Create a rule for a pattern with every field unset.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            delay: 0,
            http_status: 0,
            content_type: String::new(),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = delay_ms;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// The configured delay, if any.
    pub fn delay(&self) -> Option<Duration> {
        (self.delay > 0).then(|| Duration::from_millis(self.delay))
    }

    /// The configured status, if set and valid.
    pub fn status(&self) -> Option<StatusCode> {
        if self.http_status == 0 {
            return None;
        }
        StatusCode::from_u16(self.http_status).ok()
    }

    /// The configured content type as a header value, if set and valid.
    pub fn header_content_type(&self) -> Option<HeaderValue> {
        if self.content_type.is_empty() {
            return None;
        }
        HeaderValue::from_str(&self.content_type).ok()
    }
}

/// Runtime settings resolved by the CLI layer.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Answer preflights and attach CORS headers to fixture responses
    pub cors_enabled: bool,

    /// Directory names served as static assets (`/<prefix>/...`)
    pub static_prefixes: Vec<String>,

    /// Directory holding the static asset directories
    pub static_root: PathBuf,

    /// Root of the `<method>/<path>.json` fixture tree
    pub data_dir: PathBuf,

    /// Delay applied to every non-static request, on top of rule delays
    pub uniform_delay_ms: u64,

    /// Log request headers and body alongside the access line
    pub detailed_logging: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            cors_enabled: false,
            static_prefixes: vec![default_static_prefix()],
            static_root: PathBuf::from("."),
            data_dir: PathBuf::from("data"),
            uniform_delay_ms: 0,
            detailed_logging: false,
        }
    }
}

impl ServerSettings {
    /// Replace the static prefixes, normalizing `"/html/"` to `"html"`.
    pub fn with_static_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.static_prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    pub fn uniform_delay(&self) -> Duration {
        Duration::from_millis(self.uniform_delay_ms)
    }

    /// The static prefix that `path` falls under, if any.
    pub fn static_prefix_for(&self, path: &str) -> Option<&str> {
        let rest = path.strip_prefix('/')?;
        self.static_prefixes
            .iter()
            .find(|prefix| {
                rest.strip_prefix(prefix.as_str())
                    .is_some_and(|tail| tail.starts_with('/'))
            })
            .map(String::as_str)
    }
}

fn default_static_prefix() -> String {
    "html".to_string()
}
