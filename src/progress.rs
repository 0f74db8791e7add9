//! Batch progress accounting.
//!
//! Each language pass reports engine events to a [`PassProgress`] listener,
//! which turns them into a per-language percentage and folds it into the
//! shared [`ProgressAggregator`]. The aggregator publishes the weighted
//! overall percentage whenever it has advanced by at least one point.
//!
//! Locks are always taken in the order pass state, then aggregator.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::engine::{AnalysisListener, Phase, ProgressModel};

/// Share of a clone pass attributed to file intake.
const INTAKE_SHARE: f64 = 25.0;

/// Callback receiving overall percentages.
pub type ProgressSink = Box<dyn Fn(f64) + Send + Sync>;

/// How per-language progress is weighted into the overall percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every language counts the same.
    #[default]
    Even,
    /// Languages count in proportion to their number of files.
    FileCount,
}

#[derive(Debug, Clone, Copy)]
struct LanguageProgress {
    percent: f64,
    files: usize,
}

/// Folds per-language completion into one non-decreasing percentage.
pub struct ProgressAggregator {
    weighting: Weighting,
    languages: BTreeMap<String, LanguageProgress>,
    last_emitted: f64,
    sink: Option<ProgressSink>,
}

impl ProgressAggregator {
    pub fn new(weighting: Weighting) -> Self {
        Self {
            weighting,
            languages: BTreeMap::new(),
            last_emitted: 0.0,
            sink: None,
        }
    }

    /// Publish emitted percentages to `sink`.
    pub fn with_sink(mut self, sink: ProgressSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Declare a language and its file count. Every language of the batch
    /// should be registered before any progress arrives so that weights
    /// are fixed for the whole run.
    pub fn register(&mut self, language: &str, files: usize) {
        self.languages
            .entry(language.to_string())
            .or_insert(LanguageProgress {
                percent: 0.0,
                files,
            });
    }

    /// Record a language's completion. Values are clamped to [0, 100] and
    /// never move backwards.
    pub fn update(&mut self, language: &str, percent: f64) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        let entry = self
            .languages
            .entry(language.to_string())
            .or_insert(LanguageProgress {
                percent: 0.0,
                files: 0,
            });
        entry.percent = entry.percent.max(percent);
        self.maybe_emit();
    }

    /// Mark a language as done.
    pub fn complete_language(&mut self, language: &str) {
        self.update(language, 100.0);
    }

    /// Emit a final 100 if the last emission was below it.
    pub fn finish(&mut self) {
        if self.last_emitted < 100.0 {
            self.emit(100.0);
        }
    }

    pub fn language_percentage(&self, language: &str) -> Option<f64> {
        self.languages.get(language).map(|l| l.percent)
    }

    /// Weighted mean of the per-language percentages.
    pub fn overall_percentage(&self) -> f64 {
        if self.languages.is_empty() {
            return 0.0;
        }
        let total_files: usize = self.languages.values().map(|l| l.files).sum();
        let by_files = self.weighting == Weighting::FileCount && total_files > 0;

        let (weighted, weights) =
            self.languages
                .values()
                .fold((0.0, 0.0), |(sum, weights), language| {
                    let weight = if by_files { language.files as f64 } else { 1.0 };
                    (sum + language.percent * weight, weights + weight)
                });
        if weights == 0.0 {
            0.0
        } else {
            (weighted / weights).min(100.0)
        }
    }

    fn maybe_emit(&mut self) {
        let overall = self.overall_percentage();
        if overall >= self.last_emitted + 1.0 {
            self.emit(overall);
        }
    }

    fn emit(&mut self, percent: f64) {
        self.last_emitted = percent;
        if let Some(sink) = &self.sink {
            sink(percent);
        }
    }
}

/// Format a progress line for the stdout side channel.
pub fn format_progress_line(percent: f64) -> String {
    format!("[Progress]{}", percent)
}

/// A sink writing `[Progress]<percent>` lines to stdout.
pub fn stdout_sink() -> ProgressSink {
    Box::new(|percent| {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        // A closed stdout must not abort the batch.
        let _ = writeln!(out, "{}", format_progress_line(percent));
        let _ = out.flush();
    })
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, Copy)]
struct PassState {
    total: usize,
    added: usize,
    started: usize,
    phase: Phase,
}

impl PassState {
    fn percent(&self, model: ProgressModel) -> f64 {
        match model {
            ProgressModel::IntakeThenPhases => {
                let intake = if self.total == 0 {
                    0.0
                } else {
                    INTAKE_SHARE * (self.added as f64 / self.total as f64).min(1.0)
                };
                let phase = 100.0 * self.phase.index() as f64 / Phase::MAX as f64;
                intake.max(phase)
            }
            ProgressModel::PerFile => {
                if self.total == 0 {
                    0.0
                } else {
                    100.0 * (self.started as f64 / self.total as f64).min(1.0)
                }
            }
        }
    }
}

/// Listener for one language pass feeding the shared aggregator.
pub struct PassProgress<'a> {
    language: String,
    model: ProgressModel,
    aggregator: &'a Mutex<ProgressAggregator>,
    state: Mutex<PassState>,
}

impl<'a> PassProgress<'a> {
    pub fn new(
        language: &str,
        files: usize,
        model: ProgressModel,
        aggregator: &'a Mutex<ProgressAggregator>,
    ) -> Self {
        Self {
            language: language.to_string(),
            model,
            aggregator,
            state: Mutex::new(PassState {
                total: files,
                added: 0,
                started: 0,
                phase: Phase::Init,
            }),
        }
    }

    fn record(&self, change: impl FnOnce(&mut PassState)) {
        let mut state = lock(&self.state);
        change(&mut state);
        let percent = state.percent(self.model);
        lock(self.aggregator).update(&self.language, percent);
    }
}

impl AnalysisListener for PassProgress<'_> {
    fn files_to_analyze(&self, total: usize) {
        self.record(|s| s.total = total);
    }

    fn files_added(&self, count: usize) {
        self.record(|s| s.added += count);
    }

    fn phase_update(&self, phase: Phase) {
        self.record(|s| s.phase = s.phase.max(phase));
    }

    fn start_file_analysis(&self, _file: &std::path::Path) {
        self.record(|s| s.started += 1);
    }
}
