//! Rule checking engine.
//!
//! Runs resolved [`RuleDescriptor`]s over the files of one language pass.
//! Files whose syntax tree contains an error are reported as processing
//! errors and not checked.

use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use super::{
    read_source, AnalysisListener, AnalysisReport, Analyzer, FaultReporter, LanguagePass,
    ProgressModel,
};
use crate::catalog::{RuleDescriptor, RuleMatcher};
use crate::language::Language;
use crate::parser::lexer::{line_starts, position};
use crate::result::{CodeLocation, Findings, ProcessingError, Violation};

/// Detail value of processing errors for unparseable files.
pub const PARSE_ERROR_DETAIL: &str = "ParseError";

/// Rule engine over a resolved rule list.
pub struct RuleAnalyzer {
    rules: Vec<RuleDescriptor>,
}

impl RuleAnalyzer {
    pub fn new(rules: Vec<RuleDescriptor>) -> Self {
        Self { rules }
    }

    fn rules_for(&self, language: Language) -> Vec<&RuleDescriptor> {
        self.rules
            .iter()
            .filter(|r| r.language_id == language)
            .collect()
    }
}

impl Analyzer for RuleAnalyzer {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn progress_model(&self) -> ProgressModel {
        ProgressModel::PerFile
    }

    fn empty_findings(&self) -> Findings {
        Findings::Violations(Vec::new())
    }

    fn analyze(
        &self,
        pass: &LanguagePass,
        listener: &dyn AnalysisListener,
        faults: &dyn FaultReporter,
    ) -> anyhow::Result<AnalysisReport> {
        let rules = self.rules_for(pass.language);
        debug!(
            "{}: checking {} file(s) against {} rule(s)",
            pass.key,
            pass.files.len(),
            rules.len()
        );
        listener.files_to_analyze(pass.files.len());

        let outcomes: Vec<FileOutcome> = pass
            .files
            .par_iter()
            .map(|file| {
                listener.start_file_analysis(file);
                check_file(file, pass.language, &rules, faults)
            })
            .collect();

        let mut violations = Vec::new();
        let mut processing_errors = Vec::new();
        for outcome in outcomes {
            violations.extend(outcome.violations);
            processing_errors.extend(outcome.error);
        }

        Ok(AnalysisReport {
            findings: Findings::Violations(violations),
            processing_errors,
        })
    }
}

#[derive(Default)]
struct FileOutcome {
    violations: Vec<Violation>,
    error: Option<ProcessingError>,
}

fn check_file(
    file: &Path,
    language: Language,
    rules: &[&RuleDescriptor],
    faults: &dyn FaultReporter,
) -> FileOutcome {
    let content = match read_source(file, "rule checking", faults) {
        Ok(content) => content,
        Err(error) => {
            return FileOutcome {
                violations: Vec::new(),
                error,
            }
        }
    };

    #[cfg_attr(not(feature = "tree-sitter"), allow(unused_variables))]
    let tree = match syntax::parse(file, language, &content) {
        Ok(tree) => tree,
        Err(syntax::ParseFailure::Syntax(error)) => {
            return FileOutcome {
                violations: Vec::new(),
                error: Some(error),
            }
        }
        Err(syntax::ParseFailure::Fault(fault)) => {
            faults.report_fault(fault);
            return FileOutcome::default();
        }
    };

    let file_name = file.to_string_lossy().to_string();
    let starts = line_starts(&content);
    let mut violations = Vec::new();

    for rule in rules {
        match &rule.matcher {
            RuleMatcher::Pattern(regex) => {
                for m in regex.find_iter(&content).filter(|m| !m.is_empty()) {
                    let (start_line, start_col) = position(&starts, m.start());
                    let (end_line, end_col) = position(&starts, m.end() - 1);
                    violations.push(Violation {
                        rule: rule.name.clone(),
                        message: rule.message.clone(),
                        code_location: CodeLocation {
                            file: file_name.clone(),
                            start_line,
                            start_col,
                            end_line,
                            end_col,
                        },
                    });
                }
            }
            #[cfg(feature = "tree-sitter")]
            RuleMatcher::Query(query) => {
                if let Some(tree) = &tree {
                    for location in syntax::query_locations(query, tree, &content, &file_name) {
                        violations.push(Violation {
                            rule: rule.name.clone(),
                            message: rule.message.clone(),
                            code_location: location,
                        });
                    }
                }
            }
        }
    }

    violations.sort_by(|a, b| {
        (a.code_location.start_line, a.code_location.start_col, &a.rule).cmp(&(
            b.code_location.start_line,
            b.code_location.start_col,
            &b.rule,
        ))
    });

    FileOutcome {
        violations,
        error: None,
    }
}

#[cfg(feature = "tree-sitter")]
mod syntax {
    use std::path::Path;

    use anyhow::Context;
    use streaming_iterator::StreamingIterator;
    use tree_sitter::{Query, QueryCursor, Tree};

    use super::PARSE_ERROR_DETAIL;
    use crate::language::Language;
    use crate::parser::treesitter::{first_syntax_error, TreeSitterTokenizer};
    use crate::result::{CodeLocation, ProcessingError};

    pub(super) enum ParseFailure {
        Syntax(ProcessingError),
        Fault(anyhow::Error),
    }

    /// Parse a file when its language has a grammar. Syntax errors become a
    /// processing error for the file.
    pub(super) fn parse(
        file: &Path,
        language: Language,
        content: &str,
    ) -> Result<Option<Tree>, ParseFailure> {
        let Some(grammar) = language.grammar() else {
            return Ok(None);
        };
        let tree = TreeSitterTokenizer::new(language, grammar)
            .parse(content.as_bytes())
            .with_context(|| format!("parsing {}", file.display()))
            .map_err(ParseFailure::Fault)?;

        if let Some(error) = first_syntax_error(tree.root_node()) {
            return Err(ParseFailure::Syntax(ProcessingError::for_file(
                file,
                format!(
                    "Error while parsing {}: {} at line {}, column {}",
                    language, error.message, error.line, error.col
                ),
                Some(PARSE_ERROR_DETAIL.to_string()),
            )));
        }
        Ok(Some(tree))
    }

    /// Locations of every match of a rule query. The `@violation` capture
    /// marks the span when present, otherwise the first capture does.
    pub(super) fn query_locations(
        query: &Query,
        tree: &Tree,
        content: &str,
        file_name: &str,
    ) -> Vec<CodeLocation> {
        let marker = query
            .capture_names()
            .iter()
            .position(|name| *name == "violation");

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, tree.root_node(), content.as_bytes());
        let mut locations = Vec::new();

        while let Some(m) = matches.next() {
            let capture = marker
                .and_then(|index| m.captures.iter().find(|c| c.index as usize == index))
                .or_else(|| m.captures.first());
            let Some(capture) = capture else {
                continue;
            };
            let start = capture.node.start_position();
            let end = capture.node.end_position();
            locations.push(CodeLocation {
                file: file_name.to_string(),
                start_line: start.row + 1,
                start_col: start.column + 1,
                end_line: end.row + 1,
                end_col: end.column.max(1),
            });
        }
        locations.dedup();
        locations
    }
}

#[cfg(not(feature = "tree-sitter"))]
mod syntax {
    use std::path::Path;

    use crate::language::Language;
    use crate::result::ProcessingError;

    pub(super) enum ParseFailure {
        #[allow(dead_code)]
        Syntax(ProcessingError),
        #[allow(dead_code)]
        Fault(anyhow::Error),
    }

    /// Without grammars there is no syntax tree to check.
    pub(super) fn parse(
        _file: &Path,
        _language: Language,
        _content: &str,
    ) -> Result<Option<()>, ParseFailure> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RuleCatalog;
    use crate::engine::{FaultCollector, NoopListener};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn java_rules() -> RuleAnalyzer {
        let rules = RuleCatalog::new("/")
            .resolve(&[], &[Language::Java])
            .unwrap();
        RuleAnalyzer::new(rules)
    }

    fn pass(language: Language, files: Vec<PathBuf>) -> LanguagePass {
        LanguagePass {
            key: language.as_str().to_string(),
            language,
            files,
        }
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_pattern_violation_location() {
        let temp = TempDir::new().unwrap();
        let file = write(
            &temp,
            "A.java",
            "class A {\n  void f() {\n    System.out.println(\"hi\");\n  }\n}\n",
        );
        let report = java_rules()
            .analyze(&pass(Language::Java, vec![file.clone()]), &NoopListener, &FaultCollector::new())
            .unwrap();

        let violations = report.findings.violations();
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.rule, "SystemPrintln");
        assert_eq!(v.message, "Usage of System.out/err");
        assert_eq!(v.code_location.file, file.to_string_lossy());
        assert_eq!((v.code_location.start_line, v.code_location.start_col), (3, 5));
        assert_eq!(v.code_location.end_line, 3);
        assert!(report.processing_errors.is_empty());
    }

    #[test]
    #[cfg(feature = "tree-sitter")]
    fn test_query_rule() {
        let temp = TempDir::new().unwrap();
        let file = write(
            &temp,
            "A.java",
            "class A {\n  void f() {\n    try { g(); } catch (Exception e) { }\n  }\n}\n",
        );
        let report = java_rules()
            .analyze(&pass(Language::Java, vec![file]), &NoopListener, &FaultCollector::new())
            .unwrap();
        let violations = report.findings.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "EmptyCatchBlock");
        assert_eq!(violations[0].code_location.start_line, 3);
        assert_eq!(violations[0].code_location.start_col, 18);
    }

    #[test]
    #[cfg(feature = "tree-sitter")]
    fn test_syntax_error_is_processing_error() {
        let temp = TempDir::new().unwrap();
        let broken = write(&temp, "Broken.java", "class Broken { void f( { System.out.println(1); }");
        let good = write(&temp, "Good.java", "class Good { void f() { System.out.println(1); } }");

        let report = java_rules()
            .analyze(&pass(Language::Java, vec![broken.clone(), good]), &NoopListener, &FaultCollector::new())
            .unwrap();

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.processing_errors.len(), 1);
        let error = &report.processing_errors[0];
        assert_eq!(error.file, broken.to_string_lossy());
        assert_eq!(error.detail.as_deref(), Some(PARSE_ERROR_DETAIL));
        assert!(!error.is_terminating());
    }

    #[test]
    fn test_missing_file_is_fault_and_others_still_checked() {
        let temp = TempDir::new().unwrap();
        let good = write(&temp, "Good.java", "class Good { void f() { e.printStackTrace(); } }");
        let missing = temp.path().join("Gone.java");

        let faults = FaultCollector::new();
        let report = java_rules()
            .analyze(&pass(Language::Java, vec![missing, good]), &NoopListener, &faults)
            .unwrap();

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings.violations()[0].rule, "AvoidPrintStackTrace");
        assert!(report.processing_errors.is_empty());
        assert_eq!(faults.drain().len(), 1);
    }

    #[test]
    fn test_only_rules_of_pass_language_run() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "page.html", "<p style=\"color:red\">System.out.println(1)</p>");
        let rules = RuleCatalog::new("/")
            .resolve(&[], &[Language::Java, Language::Html])
            .unwrap();
        let report = RuleAnalyzer::new(rules)
            .analyze(&pass(Language::Html, vec![file]), &NoopListener, &FaultCollector::new())
            .unwrap();
        let violations = report.findings.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "AvoidInlineStyles");
    }

    #[derive(Default)]
    struct StartRecorder {
        total: Mutex<usize>,
        started: Mutex<Vec<PathBuf>>,
    }

    impl AnalysisListener for StartRecorder {
        fn files_to_analyze(&self, total: usize) {
            *self.total.lock().unwrap() = total;
        }

        fn start_file_analysis(&self, file: &Path) {
            self.started.lock().unwrap().push(file.to_path_buf());
        }
    }

    #[test]
    fn test_reports_each_file_start() {
        let temp = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..5)
            .map(|i| write(&temp, &format!("F{}.java", i), "class F {}"))
            .collect();
        let recorder = StartRecorder::default();
        java_rules()
            .analyze(&pass(Language::Java, files), &recorder, &FaultCollector::new())
            .unwrap();
        assert_eq!(*recorder.total.lock().unwrap(), 5);
        assert_eq!(recorder.started.lock().unwrap().len(), 5);
    }
}
