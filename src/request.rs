//! Batch request documents and their validation.
//!
//! Validation happens once, before any analyzer runs. It turns the
//! `runDataPerLanguage` map into an ordered list of [`LanguagePass`]es,
//! dropping languages whose file list is empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{CloneSettings, LanguagePass};
use crate::engine::clones::DEFAULT_MINIMUM_TOKENS;
use crate::error::{Error, Result};
use crate::language::Language;

/// Field names used in error messages.
const RUN_DATA_FIELD: &str = "runDataPerLanguage";
const RULE_SET_FIELD: &str = "ruleSetInputFile";

/// Files and options for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageRunData {
    #[serde(default)]
    pub files_to_scan: Vec<PathBuf>,
    /// Per-language override of the clone threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_tokens: Option<i64>,
}

impl LanguageRunData {
    pub fn new(files_to_scan: Vec<PathBuf>) -> Self {
        Self {
            files_to_scan,
            minimum_tokens: None,
        }
    }
}

/// Request for a clone detection batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneRunRequest {
    #[serde(default)]
    pub run_data_per_language: Option<BTreeMap<String, LanguageRunData>>,
    #[serde(default)]
    pub minimum_tokens: Option<i64>,
    #[serde(default)]
    pub skip_duplicate_files: bool,
}

/// Request for a rule checking batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRunRequest {
    #[serde(default)]
    pub rule_set_input_file: Option<String>,
    #[serde(default)]
    pub custom_rulesets: Vec<String>,
    #[serde(default)]
    pub include_standard_rules: bool,
    /// Only run rules with these names.
    #[serde(default)]
    pub selected_rules: Option<Vec<String>>,
    #[serde(default)]
    pub run_data_per_language: Option<BTreeMap<String, LanguageRunData>>,
}

/// A validated rule batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulePlan {
    pub passes: Vec<LanguagePass>,
    /// Rule-set references in load order.
    pub rule_set_refs: Vec<String>,
    pub include_standard_rules: bool,
    pub selected_rules: Option<Vec<String>>,
}

impl RulePlan {
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.passes.iter().map(|p| p.language).collect();
        languages.sort();
        languages.dedup();
        languages
    }
}

impl CloneRunRequest {
    /// Validate the request and derive the passes and clone settings.
    pub fn validate(&self) -> Result<(Vec<LanguagePass>, CloneSettings)> {
        let passes = language_passes(self.run_data_per_language.as_ref())?;
        let run_data = self.run_data_per_language.as_ref();

        let mut minimum_tokens = BTreeMap::new();
        for pass in &passes {
            let own = run_data
                .and_then(|data| data.get(&pass.key))
                .and_then(|data| data.minimum_tokens);
            let effective = own.or(self.minimum_tokens);
            match effective {
                Some(value) if value > 0 => {
                    minimum_tokens.insert(pass.key.clone(), value as usize);
                }
                _ => {
                    return Err(Error::NonPositiveThreshold {
                        language: pass.key.clone(),
                    })
                }
            }
        }

        let settings = CloneSettings {
            default_minimum_tokens: self
                .minimum_tokens
                .filter(|v| *v > 0)
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_MINIMUM_TOKENS),
            minimum_tokens,
            skip_duplicate_files: self.skip_duplicate_files,
        };
        Ok((passes, settings))
    }
}

impl RuleRunRequest {
    /// Validate the request and derive the rule plan.
    pub fn validate(&self) -> Result<RulePlan> {
        let rule_set = self
            .rule_set_input_file
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingField {
                field: RULE_SET_FIELD,
            })?;
        let passes = language_passes(self.run_data_per_language.as_ref())?;

        let mut rule_set_refs: Vec<String> = self
            .custom_rulesets
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        rule_set_refs.push(rule_set.to_string());

        Ok(RulePlan {
            passes,
            rule_set_refs,
            include_standard_rules: self.include_standard_rules,
            selected_rules: self.selected_rules.clone(),
        })
    }
}

/// Turn the per-language map into passes, in key order.
///
/// Languages with no files are dropped. Every remaining key must name a
/// known language and at least one must remain.
pub fn language_passes(
    run_data: Option<&BTreeMap<String, LanguageRunData>>,
) -> Result<Vec<LanguagePass>> {
    let run_data = run_data.ok_or(Error::MissingField {
        field: RUN_DATA_FIELD,
    })?;

    let mut passes = Vec::with_capacity(run_data.len());
    for (key, data) in run_data {
        if data.files_to_scan.is_empty() {
            debug!("dropping language {}: no files to scan", key);
            continue;
        }
        passes.push(LanguagePass {
            key: key.clone(),
            language: Language::resolve(key)?,
            files: data.files_to_scan.clone(),
        });
    }

    if passes.is_empty() {
        return Err(Error::NoLanguages);
    }
    Ok(passes)
}

/// Read and parse a JSON request document.
pub fn read_request<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| Error::ReadInput {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::ParseInput {
        path: path.display().to_string(),
        source,
    })
}
