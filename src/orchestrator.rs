//! Multi-language run orchestration.
//!
//! A batch is validated up front, then each language is analyzed in turn.
//! Structural problems abort the batch before any analysis. Everything that
//! goes wrong inside a language pass is recorded in that language's result:
//! file-scoped problems as ordinary processing errors, engine faults
//! (returned errors, hook-reported faults, and panics) as processing errors
//! carrying the terminating-exception marker.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::catalog::RuleCatalog;
use crate::engine::{
    Analyzer, CloneAnalyzer, FaultCollector, LanguagePass, ProgressModel, RuleAnalyzer,
};
use crate::error::Result;
use crate::progress::{lock, PassProgress, ProgressAggregator, ProgressSink, Weighting};
use crate::request::{CloneRunRequest, RuleRunRequest};
use crate::result::{BatchResult, LanguageRunResult, ProcessingError, ResultAggregator};

/// Batch options shared by both modes.
#[derive(Default)]
pub struct RunOptions {
    /// Overrides the mode's default weighting.
    pub weighting: Option<Weighting>,
    /// Receives overall progress percentages.
    pub progress: Option<ProgressSink>,
    /// Base directory for relative rule-set paths.
    pub config_root: Option<PathBuf>,
}

/// Drives one analyzer over every language pass of a batch.
pub struct RunOrchestrator<'a> {
    analyzer: &'a dyn Analyzer,
    weighting: Weighting,
    progress: Option<ProgressSink>,
}

impl<'a> RunOrchestrator<'a> {
    /// Create an orchestrator. Phase-reporting analyzers default to even
    /// weighting, per-file analyzers to file-count weighting.
    pub fn new(analyzer: &'a dyn Analyzer) -> Self {
        let weighting = match analyzer.progress_model() {
            ProgressModel::IntakeThenPhases => Weighting::Even,
            ProgressModel::PerFile => Weighting::FileCount,
        };
        Self {
            analyzer,
            weighting,
            progress: None,
        }
    }

    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Run every pass in order and collect the non-empty results.
    pub fn run(self, passes: &[LanguagePass]) -> BatchResult {
        let mut aggregator = ProgressAggregator::new(self.weighting);
        if let Some(sink) = self.progress {
            aggregator = aggregator.with_sink(sink);
        }
        for pass in passes {
            aggregator.register(&pass.key, pass.files.len());
        }
        let aggregator = Mutex::new(aggregator);

        let mut results = ResultAggregator::new();
        for pass in passes {
            let result = run_language(self.analyzer, pass, &aggregator);
            lock(&aggregator).complete_language(&pass.key);
            debug!(
                "{}: {} finding(s), {} processing error(s)",
                pass.key,
                result.findings.len(),
                result.processing_errors.len()
            );
            results.add(&pass.key, result);
        }
        lock(&aggregator).finish();

        let batch = results.finish();
        info!(
            "{} finished: {} finding(s) and {} processing error(s) across {} language(s)",
            self.analyzer.name(),
            batch.finding_count(),
            batch.processing_error_count(),
            batch.len()
        );
        batch
    }
}

/// Run one language pass, containing every failure inside its result.
fn run_language(
    analyzer: &dyn Analyzer,
    pass: &LanguagePass,
    aggregator: &Mutex<ProgressAggregator>,
) -> LanguageRunResult {
    let listener = PassProgress::new(
        &pass.key,
        pass.files.len(),
        analyzer.progress_model(),
        aggregator,
    );
    let faults = FaultCollector::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        analyzer.analyze(pass, &listener, &faults)
    }));

    let mut result = LanguageRunResult::new(analyzer.empty_findings());
    let mut terminal = None;
    match outcome {
        Ok(Ok(report)) => {
            result.findings = report.findings;
            result.processing_errors = report.processing_errors;
        }
        Ok(Err(err)) => {
            terminal = Some(err.context(format!(
                "{} analysis of language {} failed",
                analyzer.name(),
                pass.key
            )));
        }
        Err(payload) => {
            terminal = Some(anyhow::anyhow!(
                "panicked: {}",
                panic_message(payload.as_ref())
            ));
        }
    }

    for fault in faults.drain().into_iter().chain(terminal) {
        warn!("{}: engine fault: {:#}", pass.key, fault);
        result
            .processing_errors
            .push(ProcessingError::terminating(&fault));
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run a clone detection batch.
pub fn run_clone_detection(request: &CloneRunRequest, options: RunOptions) -> Result<BatchResult> {
    let (passes, settings) = request.validate()?;
    let analyzer = CloneAnalyzer::new(settings);
    Ok(orchestrator(&analyzer, options).run(&passes))
}

/// Run a rule checking batch.
pub fn run_rule_checking(request: &RuleRunRequest, options: RunOptions) -> Result<BatchResult> {
    let plan = request.validate()?;
    let root = match &options.config_root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };

    let mut rules = RuleCatalog::new(&root)
        .include_standard_rules(plan.include_standard_rules)
        .resolve(&plan.rule_set_refs, &plan.languages())?;

    if let Some(selected) = &plan.selected_rules {
        let wanted: HashSet<&str> = selected.iter().map(String::as_str).collect();
        rules.retain(|r| wanted.contains(r.name.as_str()));
        let found: HashSet<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        for name in wanted.difference(&found) {
            warn!("selected rule \"{}\" is not defined for the requested languages", name);
        }
    }
    debug!("running {} rule(s)", rules.len());

    let analyzer = RuleAnalyzer::new(rules);
    Ok(orchestrator(&analyzer, options).run(&plan.passes))
}

fn orchestrator(analyzer: &dyn Analyzer, options: RunOptions) -> RunOrchestrator<'_> {
    let mut orchestrator = RunOrchestrator::new(analyzer);
    if let Some(weighting) = options.weighting {
        orchestrator = orchestrator.weighting(weighting);
    }
    if let Some(sink) = options.progress {
        orchestrator = orchestrator.progress_sink(sink);
    }
    orchestrator
}
