//! Override rule matching.
//!
//! Resolves the effective override for a request path by searching every
//! rule's pattern within the path and merging the fields of matching rules.
//! For each field the first matching rule that sets it wins.

use crate::config::{OverrideRule, RuleSet};
use axum::http::{HeaderValue, StatusCode};
use regex::Regex;
use std::time::Duration;
use tracing::warn;

/// Per-request result of merging all matching override rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveOverride {
    /// The request path the override was resolved for
    pub path: String,
    /// Artificial delay before responding
    pub delay: Option<Duration>,
    /// Status forced onto fixture responses
    pub status: Option<StatusCode>,
    /// Content-Type forced onto fixture responses
    pub content_type: Option<HeaderValue>,
}

impl EffectiveOverride {
    /// An override with every field unset.
    pub fn unset(path: &str) -> Self {
        Self {
            path: path.to_string(),
            delay: None,
            status: None,
            content_type: None,
        }
    }
}

/// A rule with its pattern compiled and its zero/empty fields decoded to `None`.
struct CompiledRule {
    /// `None` when the pattern failed to compile; such a rule never matches
    pattern: Option<Regex>,
    delay: Option<Duration>,
    status: Option<StatusCode>,
    content_type: Option<HeaderValue>,
}

impl CompiledRule {
    fn compile(index: usize, rule: &OverrideRule) -> Self {
        let pattern = match Regex::new(&rule.path) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(rule = index, pattern = %rule.path, error = %e, "Invalid rule pattern, rule will never match");
                None
            }
        };

        let status = rule.status();
        if rule.http_status != 0 && status.is_none() {
            warn!(rule = index, status = rule.http_status, "Invalid HTTP status in rule, ignoring");
        }

        let content_type = rule.header_content_type();
        if !rule.content_type.is_empty() && content_type.is_none() {
            warn!(rule = index, content_type = %rule.content_type, "Invalid content type in rule, ignoring");
        }

        Self {
            pattern,
            delay: rule.delay(),
            status,
            content_type,
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|regex| regex.is_match(path))
            .unwrap_or(false)
    }
}

/// Override rule matcher.
///
/// Built once from the loaded rule set and shared read-only between requests.
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
}

impl RuleMatcher {
    /// Compile every rule in order.
    pub fn new(rules: &RuleSet) -> Self {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| CompiledRule::compile(i, rule))
            .collect();

        Self { rules }
    }

    /// Number of rules, including ones whose pattern did not compile.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve the effective override for a request path.
    ///
    /// Patterns are searched, not anchored: `"/users"` matches
    /// `"/api/users/1"`. Every rule is visited because rules are sparse and
    /// a later rule may still supply a field no earlier match set.
    pub fn resolve(&self, path: &str) -> EffectiveOverride {
        let mut effective = EffectiveOverride::unset(path);

        for rule in self.rules.iter().filter(|rule| rule.matches(path)) {
            if effective.delay.is_none() {
                effective.delay = rule.delay;
            }
            if effective.status.is_none() {
                effective.status = rule.status;
            }
            if effective.content_type.is_none() {
                effective.content_type = rule.content_type.clone();
            }
        }

        effective
    }
}
