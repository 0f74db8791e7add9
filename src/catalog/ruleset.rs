//! YAML rule-set documents.
//!
//! A rule-set is a named list of rules:
//!
//! ```yaml
//! name: Best Practices
//! rules:
//!   - name: AvoidPrintStackTrace
//!     language: java
//!     priority: 3
//!     message: Avoid printStackTrace(); use a logger call instead.
//!     external_info_url: https://example.com/rules/AvoidPrintStackTrace
//!     description: Printing a stack trace loses it in production logs.
//!     pattern: '\.printStackTrace\s*\(\s*\)'
//! ```
//!
//! References of the form `category/<language>/<name>.yaml` name a standard
//! rule-set compiled into the binary; any other reference is a file path.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use serde::Deserialize;
use thiserror::Error;

use super::{description, Priority, RuleDescriptor, RuleMatcher};
use crate::language::Language;

/// Standard rule-sets, keyed by reference.
static STANDARD_RULESETS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "category/html/bestpractices.yaml" => include_str!("../../rulesets/html/bestpractices.yaml"),
    "category/java/bestpractices.yaml" => include_str!("../../rulesets/java/bestpractices.yaml"),
    "category/java/errorprone.yaml" => include_str!("../../rulesets/java/errorprone.yaml"),
    "category/javascript/bestpractices.yaml" => include_str!("../../rulesets/javascript/bestpractices.yaml"),
    "category/python/bestpractices.yaml" => include_str!("../../rulesets/python/bestpractices.yaml"),
    "category/typescript/bestpractices.yaml" => include_str!("../../rulesets/typescript/bestpractices.yaml"),
    "category/xml/errorprone.yaml" => include_str!("../../rulesets/xml/errorprone.yaml"),
};

/// A rule-set that could not be read, parsed, or validated.
#[derive(Debug, Error)]
#[error("rule-set \"{reference}\": {reason}")]
pub struct RuleSetError {
    pub reference: String,
    pub reason: String,
}

impl RuleSetError {
    fn new(reference: &str, reason: impl Into<String>) -> Self {
        Self {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

/// On-disk rule-set document.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSetDocument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// One rule as written in a rule-set document.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub language: String,
    pub message: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_info_url: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

/// Standard rule-set references for a language, sorted.
pub fn standard_references(language: Language) -> Vec<&'static str> {
    let prefix = format!("category/{}/", language.as_str());
    let mut refs: Vec<&'static str> = STANDARD_RULESETS
        .keys()
        .copied()
        .filter(|r| r.starts_with(&prefix))
        .collect();
    refs.sort_unstable();
    refs
}

/// Whether a reference names a compiled-in rule-set.
pub fn is_standard_reference(reference: &str) -> bool {
    STANDARD_RULESETS.contains_key(reference)
}

/// Load and validate a rule-set. Relative paths resolve against `root`.
///
/// Every failure is a [`RuleSetError`] naming the reference.
pub fn load(reference: &str, root: &Path) -> anyhow::Result<Vec<RuleDescriptor>> {
    let content: Cow<'static, str> = match STANDARD_RULESETS.get(reference) {
        Some(text) => Cow::Borrowed(*text),
        None => {
            let path = resolve_path(reference, root);
            let text = fs::read_to_string(&path).map_err(|e| {
                RuleSetError::new(reference, format!("could not read {}: {}", path.display(), e))
            })?;
            Cow::Owned(text)
        }
    };

    let document: RuleSetDocument = serde_yaml::from_str(&content)
        .map_err(|e| RuleSetError::new(reference, format!("invalid rule-set document: {}", e)))?;

    let mut rules = Vec::with_capacity(document.rules.len());
    for spec in &document.rules {
        if let Some(rule) = build_rule(reference, &document.name, spec)? {
            rules.push(rule);
        }
    }
    Ok(rules)
}

fn resolve_path(reference: &str, root: &Path) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn build_rule(
    reference: &str,
    rule_set_name: &str,
    spec: &RuleSpec,
) -> Result<Option<RuleDescriptor>, RuleSetError> {
    let language = Language::from_id(&spec.language).ok_or_else(|| {
        RuleSetError::new(
            reference,
            format!(
                "rule \"{}\" declares unknown language \"{}\"",
                spec.name, spec.language
            ),
        )
    })?;

    let matcher = match (&spec.pattern, &spec.query) {
        (Some(pattern), None) => {
            let regex = RegexBuilder::new(pattern)
                .multi_line(true)
                .build()
                .map_err(|e| {
                    RuleSetError::new(
                        reference,
                        format!("rule \"{}\" has an invalid pattern: {}", spec.name, e),
                    )
                })?;
            RuleMatcher::Pattern(regex)
        }
        (None, Some(query)) => match compile_query(reference, &spec.name, language, query)? {
            Some(matcher) => matcher,
            None => return Ok(None),
        },
        (Some(_), Some(_)) => {
            return Err(RuleSetError::new(
                reference,
                format!("rule \"{}\" sets both pattern and query", spec.name),
            ))
        }
        (None, None) => {
            return Err(RuleSetError::new(
                reference,
                format!("rule \"{}\" needs a pattern or a query", spec.name),
            ))
        }
    };

    let url = spec.external_info_url.clone().filter(|u| !u.trim().is_empty());
    Ok(Some(RuleDescriptor {
        name: spec.name.clone(),
        language_id: language,
        description: spec
            .description
            .as_deref()
            .map(|d| description::normalize(d, url.as_deref()))
            .unwrap_or_default(),
        message: spec.message.clone(),
        external_info_url: url,
        rule_sets: vec![rule_set_name.to_string()],
        priority: spec.priority.unwrap_or(Priority::DEFAULT),
        rule_set_file: reference.to_string(),
        matcher,
    }))
}

#[cfg(feature = "tree-sitter")]
fn compile_query(
    reference: &str,
    rule: &str,
    language: Language,
    source: &str,
) -> Result<Option<RuleMatcher>, RuleSetError> {
    let grammar = language.grammar().ok_or_else(|| {
        RuleSetError::new(
            reference,
            format!(
                "rule \"{}\" uses a query but {} has no syntax tree support",
                rule, language
            ),
        )
    })?;
    let query = tree_sitter::Query::new(&grammar, source).map_err(|e| {
        RuleSetError::new(
            reference,
            format!("rule \"{}\" has an invalid query: {}", rule, e),
        )
    })?;
    Ok(Some(RuleMatcher::Query(std::sync::Arc::new(query))))
}

#[cfg(not(feature = "tree-sitter"))]
fn compile_query(
    reference: &str,
    rule: &str,
    _language: Language,
    _source: &str,
) -> Result<Option<RuleMatcher>, RuleSetError> {
    tracing::warn!(
        "Skipping rule \"{}\" from rule-set \"{}\": queries need the tree-sitter feature",
        rule,
        reference
    );
    Ok(None)
}
