//! Result document types and the aggregator that assembles them.
//!
//! The document maps each language key to that language's findings and
//! processing errors. Languages with nothing to report are left out, so a
//! batch with no findings serializes to `{}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Detail value marking a processing error that stands for an engine fault
/// rather than a problem in a scanned file.
pub const TERMINATING_EXCEPTION_MARKER: &str = "[TERMINATING_EXCEPTION]";

/// File value for processing errors that are not tied to one file.
pub const UNKNOWN_FILE: &str = "unknown";

/// A span of source code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLocation {
    pub file: String,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

/// A rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule: String,
    pub message: String,
    pub code_location: CodeLocation,
}

/// A block of code that appears at two or more locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneMatch {
    pub num_tokens_in_block: usize,
    pub num_nonempty_lines_in_block: usize,
    pub num_blocks: usize,
    pub block_locations: Vec<CodeLocation>,
}

impl CloneMatch {
    /// Build a match from its block locations. Returns `None` when fewer
    /// than two locations remain, since a clone needs two occurrences.
    pub fn new(
        num_tokens_in_block: usize,
        num_nonempty_lines_in_block: usize,
        block_locations: Vec<CodeLocation>,
    ) -> Option<Self> {
        if block_locations.len() < 2 {
            return None;
        }
        Some(Self {
            num_tokens_in_block,
            num_nonempty_lines_in_block,
            num_blocks: block_locations.len(),
            block_locations,
        })
    }
}

/// A non-fatal diagnostic surfaced in the output instead of thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub file: String,
    pub message: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ProcessingError {
    /// A diagnostic for one file.
    pub fn for_file(file: &Path, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            file: file.to_string_lossy().to_string(),
            message: message.into(),
            detail,
        }
    }

    /// An engine fault, carrying the full cause chain.
    pub fn terminating(fault: &anyhow::Error) -> Self {
        Self {
            file: UNKNOWN_FILE.to_string(),
            message: format!("{:?}", fault),
            detail: Some(TERMINATING_EXCEPTION_MARKER.to_string()),
        }
    }

    /// Whether this error stands for an engine fault.
    pub fn is_terminating(&self) -> bool {
        self.detail.as_deref() == Some(TERMINATING_EXCEPTION_MARKER)
    }
}

/// The mode-dependent findings of one language pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Findings {
    Matches(Vec<CloneMatch>),
    Violations(Vec<Violation>),
}

impl Findings {
    pub fn len(&self) -> usize {
        match self {
            Findings::Matches(m) => m.len(),
            Findings::Violations(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn matches(&self) -> &[CloneMatch] {
        match self {
            Findings::Matches(m) => m,
            Findings::Violations(_) => &[],
        }
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Findings::Violations(v) => v,
            Findings::Matches(_) => &[],
        }
    }
}

/// Everything one language pass produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageRunResult {
    #[serde(flatten)]
    pub findings: Findings,
    #[serde(default)]
    pub processing_errors: Vec<ProcessingError>,
}

impl LanguageRunResult {
    /// An empty result holding findings of the same kind as `findings`.
    pub fn new(findings: Findings) -> Self {
        Self {
            findings,
            processing_errors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.processing_errors.is_empty()
    }

    pub fn terminating_errors(&self) -> impl Iterator<Item = &ProcessingError> {
        self.processing_errors.iter().filter(|e| e.is_terminating())
    }
}

/// The final result document of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchResult {
    languages: BTreeMap<String, LanguageRunResult>,
}

impl BatchResult {
    pub fn get(&self, language: &str) -> Option<&LanguageRunResult> {
        self.languages.get(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = (&String, &LanguageRunResult)> {
        self.languages.iter()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    /// Total number of findings across all languages.
    pub fn finding_count(&self) -> usize {
        self.languages.values().map(|r| r.findings.len()).sum()
    }

    /// Total number of processing errors across all languages.
    pub fn processing_error_count(&self) -> usize {
        self.languages.values().map(|r| r.processing_errors.len()).sum()
    }
}

/// Accumulates per-language results into a [`BatchResult`].
#[derive(Debug, Default)]
pub struct ResultAggregator {
    languages: BTreeMap<String, LanguageRunResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a finished language result. Empty results are
    /// dropped. Returns whether the result was kept.
    pub fn add(&mut self, language: &str, result: LanguageRunResult) -> bool {
        if result.is_empty() {
            tracing::debug!("omitting {} from results: nothing to report", language);
            return false;
        }
        self.languages.insert(language.to_string(), result);
        true
    }

    /// Freeze the accumulated results.
    pub fn finish(self) -> BatchResult {
        BatchResult {
            languages: self.languages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(file: &str, line: usize) -> CodeLocation {
        CodeLocation {
            file: file.to_string(),
            start_line: line,
            start_col: 1,
            end_line: line + 4,
            end_col: 2,
        }
    }

    #[test]
    fn test_clone_match_requires_two_blocks() {
        assert!(CloneMatch::new(20, 5, vec![location("/a.java", 1)]).is_none());
        let m = CloneMatch::new(20, 5, vec![location("/a.java", 1), location("/b.java", 3)])
            .unwrap();
        assert_eq!(m.num_blocks, 2);
    }

    #[test]
    fn test_aggregator_drops_empty_languages() {
        let mut aggregator = ResultAggregator::new();
        assert!(!aggregator.add("xml", LanguageRunResult::new(Findings::Matches(vec![]))));

        let mut java = LanguageRunResult::new(Findings::Matches(vec![]));
        java.processing_errors.push(ProcessingError::for_file(
            Path::new("/a.java"),
            "bad",
            None,
        ));
        assert!(aggregator.add("java", java));

        let batch = aggregator.finish();
        assert_eq!(batch.len(), 1);
        assert!(batch.get("xml").is_none());
        assert_eq!(batch.processing_error_count(), 1);
    }

    #[test]
    fn test_empty_batch_serializes_to_empty_object() {
        let batch = ResultAggregator::new().finish();
        assert_eq!(serde_json::to_string(&batch).unwrap(), "{}");
    }

    #[test]
    fn test_document_shape() {
        let mut aggregator = ResultAggregator::new();
        let mut result = LanguageRunResult::new(Findings::Matches(vec![CloneMatch::new(
            18,
            5,
            vec![location("/a.java", 1), location("/b.java", 18)],
        )
        .unwrap()]));
        result
            .processing_errors
            .push(ProcessingError::terminating(&anyhow::anyhow!("boom")));
        aggregator.add("java", result);
        let json = serde_json::to_value(aggregator.finish()).unwrap();

        let java = &json["java"];
        assert_eq!(java["matches"][0]["numTokensInBlock"], 18);
        assert_eq!(java["matches"][0]["numNonemptyLinesInBlock"], 5);
        assert_eq!(java["matches"][0]["numBlocks"], 2);
        assert_eq!(java["matches"][0]["blockLocations"][1]["startLine"], 18);
        assert_eq!(java["processingErrors"][0]["file"], "unknown");
        assert_eq!(java["processingErrors"][0]["detail"], TERMINATING_EXCEPTION_MARKER);
        assert!(java.get("violations").is_none());
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let mut aggregator = ResultAggregator::new();
        let mut result = LanguageRunResult::new(Findings::Violations(vec![Violation {
            rule: "AvoidPrintStackTrace".to_string(),
            message: "Avoid printStackTrace()".to_string(),
            code_location: location("/a.java", 7),
        }]));
        result.processing_errors.push(ProcessingError::for_file(
            Path::new("/b.java"),
            "syntax error",
            Some("ParseError".to_string()),
        ));
        aggregator.add("java", result);
        aggregator.add(
            "xml",
            LanguageRunResult {
                findings: Findings::Violations(vec![]),
                processing_errors: vec![ProcessingError::for_file(
                    Path::new("/c.xml"),
                    "unreadable",
                    None,
                )],
            },
        );
        let batch = aggregator.finish();

        let json = serde_json::to_string(&batch).unwrap();
        let parsed: BatchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, batch);
    }

    #[test]
    fn test_terminating_error_keeps_cause_chain() {
        let fault = anyhow::anyhow!("disk vanished").context("tokenizing /a.java");
        let err = ProcessingError::terminating(&fault);
        assert!(err.is_terminating());
        assert!(err.message.contains("tokenizing /a.java"));
        assert!(err.message.contains("disk vanished"));
    }
}
