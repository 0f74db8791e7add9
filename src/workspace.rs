//! Workspace scanning: turn a directory into a batch request.
//!
//! Files are assigned to languages by extension. Hidden directories and
//! dependency folders are never entered, and the config's
//! `excluded_paths` globs are matched against paths relative to the root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::GlobSet;
use tracing::debug;
use walkdir::WalkDir;

use crate::catalog::ruleset::standard_references;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::language::Language;
use crate::request::{CloneRunRequest, LanguageRunData, RuleRunRequest};

/// Directories that never hold first-party sources.
const SKIPPED_DIRS: &[&str] = &["node_modules", "vendor", "target", "__pycache__"];

/// Source files of a workspace, grouped by language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workspace {
    files: BTreeMap<Language, Vec<PathBuf>>,
}

impl Workspace {
    /// Walk `root` and collect every file with a known language.
    pub fn scan(root: &Path, exclusions: &GlobSet) -> Result<Self> {
        let mut files: BTreeMap<Language, Vec<PathBuf>> = BTreeMap::new();

        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if exclusions.is_match(relative) {
                debug!("excluded {}", relative.display());
                continue;
            }
            if let Some(language) = Language::for_path(path) {
                files.entry(language).or_default().push(path.to_path_buf());
            }
        }

        debug!(
            "workspace {}: {} file(s) in {} language(s)",
            root.display(),
            files.values().map(Vec::len).sum::<usize>(),
            files.len()
        );
        Ok(Self { files })
    }

    pub fn languages(&self) -> Vec<Language> {
        self.files.keys().copied().collect()
    }

    pub fn files(&self, language: Language) -> &[PathBuf] {
        self.files.get(&language).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn run_data(&self, only: Option<&[Language]>) -> BTreeMap<String, LanguageRunData> {
        self.files
            .iter()
            .filter(|(language, _)| only.map_or(true, |keep| keep.contains(language)))
            .map(|(language, files)| {
                (
                    language.as_str().to_string(),
                    LanguageRunData::new(files.clone()),
                )
            })
            .collect()
    }

    /// Build a clone request using the config's thresholds.
    pub fn clone_request(&self, config: &Config) -> CloneRunRequest {
        let mut run_data = self.run_data(None);
        for (key, data) in run_data.iter_mut() {
            data.minimum_tokens = config.minimum_tokens.get(key).copied();
        }
        CloneRunRequest {
            run_data_per_language: Some(run_data),
            minimum_tokens: Some(config.default_minimum_tokens()),
            skip_duplicate_files: config.skip_duplicate_files,
        }
    }

    /// Build a rule request. The first rule-set reference becomes the input
    /// file and the rest are loaded as custom rule-sets ahead of it, after
    /// those listed in the config. With no references at all the first
    /// standard rule-set of a scanned language is used. Languages are
    /// limited to the config's `rule_languages` when set.
    pub fn rule_request(&self, config: &Config, rulesets: &[String]) -> Result<RuleRunRequest> {
        let languages = config.rule_languages()?;
        let only = (!languages.is_empty()).then_some(languages.as_slice());

        let mut custom_rulesets = config.custom_rulesets.clone();
        let rule_set_input_file = match rulesets.split_first() {
            Some((first, rest)) => {
                custom_rulesets.extend(rest.iter().cloned());
                Some(first.clone())
            }
            None => custom_rulesets.pop().or_else(|| {
                self.files
                    .keys()
                    .filter(|language| only.map_or(true, |keep| keep.contains(language)))
                    .flat_map(|language| standard_references(*language))
                    .next()
                    .map(str::to_string)
            }),
        };

        Ok(RuleRunRequest {
            rule_set_input_file,
            custom_rulesets,
            include_standard_rules: config.should_include_standard_rules(),
            selected_rules: None,
            run_data_per_language: Some(self.run_data(only)),
        })
    }
}
