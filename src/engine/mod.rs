//! Analyzer engines and the interface the orchestrator drives them through.
//!
//! - `Analyzer`: one engine, driven by the orchestrator one language pass
//!   at a time and returning an `AnalysisReport` of findings and errors
//! - `AnalysisListener`: progress events flowing back to the orchestrator
//! - `FaultReporter`: unexpected failures that must not abort the pass
//!
//! An analyzer may be internally parallel, so listener and fault callbacks
//! can arrive from several threads.

pub mod clones;
pub mod fake;
pub mod rules;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::language::Language;
use crate::progress::lock;
use crate::result::{Findings, ProcessingError};

pub use clones::{CloneAnalyzer, CloneSettings};
pub use fake::FakeAnalyzer;
pub use rules::RuleAnalyzer;

/// Coarse phases reported by the clone engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init = 0,
    Hash = 1,
    Match = 2,
    Grouping = 3,
    Done = 4,
}

impl Phase {
    /// Highest phase index.
    pub const MAX: u32 = Phase::Done as u32;

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Progress hooks an analyzer calls while running a language pass.
///
/// All methods have empty defaults; engines call the subset that matches
/// how they measure progress.
pub trait AnalysisListener: Send + Sync {
    /// Total number of files the pass will analyze.
    fn files_to_analyze(&self, _total: usize) {}

    /// Files taken into the intake phase.
    fn files_added(&self, _count: usize) {}

    /// The analyzer moved to a new phase.
    fn phase_update(&self, _phase: Phase) {}

    /// The analyzer started working on a file.
    fn start_file_analysis(&self, _file: &Path) {}
}

/// A listener that ignores every event.
pub struct NoopListener;

impl AnalysisListener for NoopListener {}

/// Hook for unexpected failures inside the analyzer machinery. Reported
/// faults never abort the pass.
pub trait FaultReporter: Send + Sync {
    fn report_fault(&self, fault: anyhow::Error);
}

/// Thread-safe collector of reported faults.
#[derive(Default)]
pub struct FaultCollector {
    faults: Mutex<Vec<anyhow::Error>>,
}

impl FaultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every fault reported so far.
    pub fn drain(&self) -> Vec<anyhow::Error> {
        std::mem::take(&mut *lock(&self.faults))
    }
}

impl FaultReporter for FaultCollector {
    fn report_fault(&self, fault: anyhow::Error) {
        lock(&self.faults).push(fault);
    }
}

/// What an analyzer produced for one language.
#[derive(Debug)]
pub struct AnalysisReport {
    pub findings: Findings,
    pub processing_errors: Vec<ProcessingError>,
}

/// One language's worth of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePass {
    /// Language key as written in the request.
    pub key: String,
    pub language: Language,
    pub files: Vec<PathBuf>,
}

/// How an analyzer's progress events map onto a per-language percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressModel {
    /// File intake is the first quarter, later phases fill the rest.
    IntakeThenPhases,
    /// Percentage of files whose analysis has started.
    PerFile,
}

/// Analyzer trait for running one language pass.
pub trait Analyzer: Send + Sync {
    /// Short engine name used in logs.
    fn name(&self) -> &'static str;

    /// Which progress events this analyzer emits.
    fn progress_model(&self) -> ProgressModel;

    /// Findings of this analyzer's kind with nothing in them.
    fn empty_findings(&self) -> Findings;

    /// Analyze exactly the given files as the given language.
    ///
    /// File-scoped diagnostics go into the report's processing errors.
    /// Unexpected failures either go to `faults` (and the pass continues)
    /// or are returned as `Err` (and the pass ends).
    fn analyze(
        &self,
        pass: &LanguagePass,
        listener: &dyn AnalysisListener,
        faults: &dyn FaultReporter,
    ) -> anyhow::Result<AnalysisReport>;
}

/// Read a file for analysis.
///
/// Missing or unreadable files are engine faults. Content that isn't UTF-8
/// is a per-file processing error.
pub(crate) fn read_source(
    file: &Path,
    engine: &str,
    faults: &dyn FaultReporter,
) -> Result<String, Option<ProcessingError>> {
    let bytes = match std::fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            faults.report_fault(
                anyhow::Error::new(e)
                    .context(format!("{} could not read file {}", engine, file.display())),
            );
            return Err(None);
        }
    };
    String::from_utf8(bytes).map_err(|e| {
        Some(ProcessingError::for_file(
            file,
            format!("file is not valid UTF-8: {}", e.utf8_error()),
            Some("EncodingError".to_string()),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_indices() {
        assert_eq!(Phase::Init.index(), 0);
        assert_eq!(Phase::Grouping.index(), 3);
        assert_eq!(Phase::MAX, 4);
    }

    #[test]
    fn test_fault_collector_drains() {
        let collector = FaultCollector::new();
        collector.report_fault(anyhow::anyhow!("first"));
        collector.report_fault(anyhow::anyhow!("second"));
        let faults = collector.drain();
        assert_eq!(faults.len(), 2);
        assert!(collector.drain().is_empty());
    }

    #[test]
    fn test_read_source_missing_file_is_fault() {
        let collector = FaultCollector::new();
        let result = read_source(Path::new("/definitely/not/here.java"), "test", &collector);
        assert!(matches!(result, Err(None)));
        let faults = collector.drain();
        assert_eq!(faults.len(), 1);
        assert!(format!("{:?}", faults[0]).contains("could not read file"));
    }

    #[test]
    fn test_read_source_invalid_utf8_is_processing_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("bad.java");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let collector = FaultCollector::new();
        let result = read_source(&path, "test", &collector);
        let err = result.unwrap_err().expect("processing error");
        assert_eq!(err.detail.as_deref(), Some("EncodingError"));
        assert!(collector.drain().is_empty());
    }
}
