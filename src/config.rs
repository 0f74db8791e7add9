//! Optional YAML configuration for scanbridge.
//!
//! The config file tunes the `scan` and `rules describe` commands: which
//! custom rule-sets to load, clone thresholds, progress weighting, and
//! which paths to leave out of a workspace scan.
//!
//! ```yaml
//! custom_rulesets:
//!   - rulesets/team.yaml
//! rule_languages: [java, xml]
//! default_minimum_tokens: 100
//! minimum_tokens:
//!   java: 75
//! skip_duplicate_files: true
//! progress_weighting: file_count
//! excluded_paths:
//!   - "**/generated/**"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::engine::clones::DEFAULT_MINIMUM_TOKENS;
use crate::error::{Error, Result};
use crate::language::Language;
use crate::progress::Weighting;

/// Config file names searched for, in order.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["scanbridge.yaml", ".scanbridge.yaml"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Rule-set references loaded before the standard ones.
    #[serde(default)]
    pub custom_rulesets: Vec<String>,
    /// Languages to describe or check when none are given on the command line.
    #[serde(default)]
    pub rule_languages: Vec<String>,
    /// Whether `scan` adds the standard rule-sets (default: true)
    #[serde(default)]
    pub include_standard_rules: Option<bool>,
    /// Clone threshold for languages without an entry in `minimum_tokens`.
    #[serde(default)]
    pub default_minimum_tokens: Option<i64>,
    /// Per-language clone thresholds.
    #[serde(default)]
    pub minimum_tokens: BTreeMap<String, i64>,
    #[serde(default)]
    pub skip_duplicate_files: bool,
    #[serde(default)]
    pub progress_weighting: Option<Weighting>,
    /// Glob patterns for paths to exclude from workspace scans (e.g., "**/vendor/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,

    /// Directory relative references resolve against.
    #[serde(skip)]
    root: PathBuf,
}

impl Config {
    /// Parse a config from a YAML file. Its directory becomes the root.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| Error::ReadInput {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Find a config file in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load the explicit config, or a discovered one, or the defaults
    /// rooted at `search_dir`. The result is validated.
    pub fn load(explicit: Option<&Path>, search_dir: &Path) -> Result<Self> {
        let config = match explicit.map(Path::to_path_buf).or_else(|| Self::discover(search_dir)) {
            Some(path) => {
                tracing::debug!("using config {}", path.display());
                Self::parse_file(path)?
            }
            None => Self {
                root: search_dir.to_path_buf(),
                ..Default::default()
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Directory relative rule-set references resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns whether `scan` adds standard rule-sets (defaults to true).
    pub fn should_include_standard_rules(&self) -> bool {
        self.include_standard_rules.unwrap_or(true)
    }

    /// Returns the clone threshold used when a language has no override.
    pub fn default_minimum_tokens(&self) -> i64 {
        self.default_minimum_tokens
            .unwrap_or(DEFAULT_MINIMUM_TOKENS as i64)
    }

    /// Configured rule languages, resolved.
    pub fn rule_languages(&self) -> Result<Vec<Language>> {
        self.rule_languages
            .iter()
            .map(|id| Language::resolve(id.trim()))
            .collect()
    }

    /// Compiled `excluded_paths` patterns.
    pub fn exclusions(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_paths {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::Config(format!("invalid excluded_paths pattern {:?}: {}", pattern, e))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("invalid excluded_paths: {}", e)))
    }

    /// Check a config for correctness.
    pub fn validate(&self) -> Result<()> {
        for id in &self.rule_languages {
            Language::from_id(id.trim()).ok_or_else(|| {
                Error::Config(format!("unknown language {:?} in rule_languages", id))
            })?;
        }

        if self.default_minimum_tokens() <= 0 {
            return Err(Error::Config(format!(
                "default_minimum_tokens must be positive, got {}",
                self.default_minimum_tokens()
            )));
        }
        for (language, tokens) in &self.minimum_tokens {
            if Language::from_id(language).is_none() {
                return Err(Error::Config(format!(
                    "unknown language {:?} in minimum_tokens",
                    language
                )));
            }
            if *tokens <= 0 {
                return Err(Error::Config(format!(
                    "minimum_tokens for {} must be positive, got {}",
                    language, tokens
                )));
            }
        }

        self.exclusions()?;
        Ok(())
    }
}
