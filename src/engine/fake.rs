//! In-memory analyzer with scripted outcomes.
//!
//! Used to exercise the orchestrator without touching real engines. Each
//! language key can be scripted to return findings and processing errors,
//! report faults through the fault hook, fail outright, or panic. Progress
//! events are emitted from the rayon pool like a real engine would.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rayon::prelude::*;

use super::{
    AnalysisListener, AnalysisReport, Analyzer, FaultReporter, LanguagePass, Phase, ProgressModel,
};
use crate::progress::lock;
use crate::result::{CloneMatch, Findings, ProcessingError, Violation};

#[derive(Debug, Clone, Default)]
struct Script {
    findings: Option<Findings>,
    processing_errors: Vec<ProcessingError>,
    faults: Vec<String>,
    failure: Option<String>,
    panic: Option<String>,
}

/// Scripted analyzer.
pub struct FakeAnalyzer {
    model: ProgressModel,
    scripts: HashMap<String, Script>,
    invocations: Mutex<Vec<String>>,
}

impl FakeAnalyzer {
    /// A fake reporting progress the way the given model describes. With no
    /// script a language yields no findings of the model's kind: matches
    /// for [`ProgressModel::IntakeThenPhases`], violations otherwise.
    pub fn new(model: ProgressModel) -> Self {
        Self {
            model,
            scripts: HashMap::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    fn script(&mut self, language: &str) -> &mut Script {
        self.scripts.entry(language.to_string()).or_default()
    }

    pub fn with_violations(mut self, language: &str, violations: Vec<Violation>) -> Self {
        self.script(language).findings = Some(Findings::Violations(violations));
        self
    }

    pub fn with_matches(mut self, language: &str, matches: Vec<CloneMatch>) -> Self {
        self.script(language).findings = Some(Findings::Matches(matches));
        self
    }

    pub fn with_processing_error(mut self, language: &str, error: ProcessingError) -> Self {
        self.script(language).processing_errors.push(error);
        self
    }

    /// Report a fault through the hook and keep going.
    pub fn with_fault(mut self, language: &str, message: &str) -> Self {
        self.script(language).faults.push(message.to_string());
        self
    }

    /// Return an error from `analyze`.
    pub fn failing(mut self, language: &str, message: &str) -> Self {
        self.script(language).failure = Some(message.to_string());
        self
    }

    /// Panic inside `analyze` after emitting progress.
    pub fn panicking(mut self, language: &str, message: &str) -> Self {
        self.script(language).panic = Some(message.to_string());
        self
    }

    /// Language keys analyzed so far, in call order.
    pub fn invocations(&self) -> Vec<String> {
        lock(&self.invocations).clone()
    }

    fn emit_progress(&self, pass: &LanguagePass, listener: &dyn AnalysisListener) {
        listener.files_to_analyze(pass.files.len());
        match self.model {
            ProgressModel::PerFile => {
                pass.files
                    .par_iter()
                    .for_each(|file| listener.start_file_analysis(file));
            }
            ProgressModel::IntakeThenPhases => {
                listener.phase_update(Phase::Init);
                pass.files.par_iter().for_each(|_| listener.files_added(1));
                for phase in [Phase::Hash, Phase::Match, Phase::Grouping, Phase::Done] {
                    listener.phase_update(phase);
                }
            }
        }
    }
}

impl Analyzer for FakeAnalyzer {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn progress_model(&self) -> ProgressModel {
        self.model
    }

    fn empty_findings(&self) -> Findings {
        match self.model {
            ProgressModel::IntakeThenPhases => Findings::Matches(Vec::new()),
            ProgressModel::PerFile => Findings::Violations(Vec::new()),
        }
    }

    fn analyze(
        &self,
        pass: &LanguagePass,
        listener: &dyn AnalysisListener,
        faults: &dyn FaultReporter,
    ) -> anyhow::Result<AnalysisReport> {
        lock(&self.invocations).push(pass.key.clone());

        let script = self.scripts.get(&pass.key).cloned().unwrap_or_default();
        self.emit_progress(pass, listener);

        if let Some(message) = script.panic {
            panic!("{}", message);
        }
        if let Some(message) = script.failure {
            anyhow::bail!(message);
        }
        for message in script.faults {
            faults.report_fault(anyhow::anyhow!(message));
        }

        Ok(AnalysisReport {
            findings: script.findings.unwrap_or_else(|| self.empty_findings()),
            processing_errors: script.processing_errors,
        })
    }
}

/// A violation for tests.
pub fn violation(rule: &str, file: &Path, line: usize) -> Violation {
    Violation {
        rule: rule.to_string(),
        message: format!("{} violated", rule),
        code_location: crate::result::CodeLocation {
            file: file.to_string_lossy().to_string(),
            start_line: line,
            start_col: 1,
            end_line: line,
            end_col: 10,
        },
    }
}
