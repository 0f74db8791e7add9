//! Rule catalog resolution.
//!
//! Rules come from YAML rule-sets. Custom rule-sets are loaded first so
//! that their definitions win over standard rules with the same
//! `(language, name)` identity; later duplicates are dropped and logged.

pub mod description;
pub mod ruleset;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::Error;
use crate::language::Language;

pub use ruleset::RuleSetError;

/// Rule priority, from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "PriorityValue")]
pub enum Priority {
    High = 1,
    MediumHigh = 2,
    Medium = 3,
    MediumLow = 4,
    Low = 5,
}

impl Priority {
    /// Priority given to rules that don't declare one.
    pub const DEFAULT: Priority = Priority::Low;

    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::MediumHigh => "Medium High",
            Priority::Medium => "Medium",
            Priority::MediumLow => "Medium Low",
            Priority::Low => "Low",
        }
    }

    fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Priority::High),
            2 => Some(Priority::MediumHigh),
            3 => Some(Priority::Medium),
            4 => Some(Priority::MediumLow),
            5 => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Priorities may be written as a level (1-5) or a label.
#[derive(Deserialize)]
#[serde(untagged)]
enum PriorityValue {
    Level(u8),
    Label(String),
}

impl TryFrom<PriorityValue> for Priority {
    type Error = String;

    fn try_from(value: PriorityValue) -> Result<Self, Self::Error> {
        match value {
            PriorityValue::Level(level) => Priority::from_level(level)
                .ok_or_else(|| format!("priority level must be between 1 and 5, got {}", level)),
            PriorityValue::Label(label) => [
                Priority::High,
                Priority::MediumHigh,
                Priority::Medium,
                Priority::MediumLow,
                Priority::Low,
            ]
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(label.trim()))
            .ok_or_else(|| format!("unsupported priority: {}", label)),
        }
    }
}

/// How a rule finds violations.
#[derive(Clone)]
pub enum RuleMatcher {
    /// Regular expression over the whole file text (multi-line mode).
    Pattern(Regex),
    /// Tree-sitter query; the `@violation` capture (or the first capture)
    /// marks the reported span.
    #[cfg(feature = "tree-sitter")]
    Query(std::sync::Arc<tree_sitter::Query>),
}

impl fmt::Debug for RuleMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleMatcher::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            #[cfg(feature = "tree-sitter")]
            RuleMatcher::Query(query) => f
                .debug_tuple("Query")
                .field(&query.capture_names())
                .finish(),
        }
    }
}

/// A resolved rule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescriptor {
    pub name: String,
    pub language_id: Language,
    pub description: String,
    pub message: String,
    pub external_info_url: Option<String>,
    pub rule_sets: Vec<String>,
    pub priority: Priority,
    pub rule_set_file: String,
    #[serde(skip)]
    pub matcher: RuleMatcher,
}

impl RuleDescriptor {
    pub fn identity(&self) -> (Language, &str) {
        (self.language_id, self.name.as_str())
    }
}

/// Resolves the effective rule list for a set of languages.
pub struct RuleCatalog {
    root: PathBuf,
    include_standard_rules: bool,
}

impl RuleCatalog {
    /// Create a catalog resolving relative rule-set paths against `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            include_standard_rules: true,
        }
    }

    /// Set whether the standard rule-sets of each language are added after
    /// the explicitly named ones.
    pub fn include_standard_rules(mut self, include: bool) -> Self {
        self.include_standard_rules = include;
        self
    }

    /// Resolve the rules for `languages`. Load failures of a named
    /// rule-set become [`Error::RuleSetLoad`]; anything else becomes
    /// [`Error::RuleResolution`].
    pub fn resolve(
        &self,
        custom_refs: &[String],
        languages: &[Language],
    ) -> crate::error::Result<Vec<RuleDescriptor>> {
        self.collect(custom_refs, languages)
            .map_err(classify_resolution_error)
    }

    fn collect(
        &self,
        custom_refs: &[String],
        languages: &[Language],
    ) -> anyhow::Result<Vec<RuleDescriptor>> {
        let wanted: HashSet<Language> = languages.iter().copied().collect();
        let mut resolved = ResolvedRules::default();
        let mut loaded: HashSet<&str> = HashSet::new();

        for reference in custom_refs {
            if !loaded.insert(reference.as_str()) {
                continue;
            }
            for rule in ruleset::load(reference, &self.root)? {
                if wanted.contains(&rule.language_id) {
                    resolved.insert(rule);
                }
            }
        }

        if self.include_standard_rules {
            let mut ordered: Vec<Language> = wanted.iter().copied().collect();
            ordered.sort();
            for language in ordered {
                for reference in ruleset::standard_references(language) {
                    if !loaded.insert(reference) {
                        continue;
                    }
                    for rule in ruleset::load(reference, &self.root)? {
                        if wanted.contains(&rule.language_id) {
                            resolved.insert(rule);
                        }
                    }
                }
            }
        }

        debug!("resolved {} rule(s)", resolved.rules.len());
        Ok(resolved.rules)
    }
}

/// Insertion-ordered rules keyed by identity. The first definition of a
/// key wins.
#[derive(Default)]
struct ResolvedRules {
    rules: Vec<RuleDescriptor>,
    index: HashMap<(Language, String), usize>,
}

impl ResolvedRules {
    fn insert(&mut self, rule: RuleDescriptor) -> bool {
        let key = (rule.language_id, rule.name.clone());
        if let Some(&existing) = self.index.get(&key) {
            info!(
                "Skipping rule \"{}\" for language \"{}\" from rule-set \"{}\": already defined by rule-set \"{}\"",
                rule.name,
                rule.language_id,
                rule.rule_set_file,
                self.rules[existing].rule_set_file
            );
            return false;
        }
        self.index.insert(key, self.rules.len());
        self.rules.push(rule);
        true
    }
}

fn classify_resolution_error(err: anyhow::Error) -> Error {
    match err.downcast_ref::<RuleSetError>() {
        Some(load) => Error::RuleSetLoad {
            reference: load.reference.clone(),
            reason: load.reason.clone(),
        },
        None => Error::RuleResolution(format!("{:#}", err)),
    }
}
