//! Copy/paste detection over token streams.
//!
//! Every file of the pass is tokenized, the token images are interned to
//! integer ids, and all files are concatenated into one stream with a unique
//! separator after each file. Windows of `minimum_tokens` ids are bucketed
//! by a rolling hash; positions sharing a bucket are compared exactly and
//! extended to the longest common run. Only left-maximal runs are kept, and
//! runs with identical token sequences are merged into one match.
//!
//! Matches are emitted longest first. Occurrences overlapping an earlier
//! occurrence of the same match are dropped, and a match whose occurrences
//! all lie inside blocks already reported is suppressed, so periodic code
//! yields one match rather than one per offset.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;
use tracing::debug;

use super::{
    read_source, AnalysisListener, AnalysisReport, Analyzer, FaultReporter, LanguagePass, Phase,
    ProgressModel,
};
use crate::parser::{self, Token, Tokenizer};
use crate::result::{CloneMatch, CodeLocation, Findings, ProcessingError};

/// Default minimum size of a reported clone, in tokens.
pub const DEFAULT_MINIMUM_TOKENS: usize = 100;

/// Multiplier of the rolling window hash.
const HASH_BASE: u64 = 1_000_003;

/// Options for clone detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneSettings {
    /// Minimum tokens for languages without an override.
    pub default_minimum_tokens: usize,
    /// Per-language overrides, keyed by request language key.
    pub minimum_tokens: BTreeMap<String, usize>,
    /// Ignore files whose bytes equal those of a file seen earlier.
    pub skip_duplicate_files: bool,
}

impl Default for CloneSettings {
    fn default() -> Self {
        Self {
            default_minimum_tokens: DEFAULT_MINIMUM_TOKENS,
            minimum_tokens: BTreeMap::new(),
            skip_duplicate_files: false,
        }
    }
}

impl CloneSettings {
    /// Effective minimum token count for a language key.
    pub fn minimum_tokens_for(&self, language: &str) -> usize {
        self.minimum_tokens
            .get(language)
            .copied()
            .unwrap_or(self.default_minimum_tokens)
    }
}

/// Token-based clone detector.
pub struct CloneAnalyzer {
    settings: CloneSettings,
}

impl CloneAnalyzer {
    pub fn new(settings: CloneSettings) -> Self {
        Self { settings }
    }
}

impl Analyzer for CloneAnalyzer {
    fn name(&self) -> &'static str {
        "clones"
    }

    fn progress_model(&self) -> ProgressModel {
        ProgressModel::IntakeThenPhases
    }

    fn empty_findings(&self) -> Findings {
        Findings::Matches(Vec::new())
    }

    fn analyze(
        &self,
        pass: &LanguagePass,
        listener: &dyn AnalysisListener,
        faults: &dyn FaultReporter,
    ) -> anyhow::Result<AnalysisReport> {
        let minimum = self.settings.minimum_tokens_for(&pass.key);
        if minimum == 0 {
            anyhow::bail!("minimum token count for {} must be positive", pass.key);
        }
        let tokenizer = parser::for_language(pass.language)?;

        listener.phase_update(Phase::Init);
        listener.files_to_analyze(pass.files.len());

        let intake: Vec<Intake> = pass
            .files
            .par_iter()
            .map(|file| {
                let outcome = load_file(file, tokenizer.as_ref(), faults);
                listener.files_added(1);
                outcome
            })
            .collect();

        let mut processing_errors = Vec::new();
        let mut sources = Vec::with_capacity(intake.len());
        for outcome in intake {
            match outcome {
                Intake::Loaded(source) => sources.push(source),
                Intake::Failed(error) => processing_errors.push(error),
                Intake::Skipped => {}
            }
        }
        if self.settings.skip_duplicate_files {
            sources = drop_duplicate_files(sources);
        }

        listener.phase_update(Phase::Hash);
        let corpus = TokenCorpus::build(&sources);
        let buckets = corpus.window_buckets(minimum);

        listener.phase_update(Phase::Match);
        let groups = corpus.find_duplicates(&buckets, minimum);

        listener.phase_update(Phase::Grouping);
        let matches = corpus.into_matches(&sources, groups);

        listener.phase_update(Phase::Done);
        debug!(
            "{}: {} clone(s) across {} file(s), minimum {} tokens",
            pass.key,
            matches.len(),
            sources.len(),
            minimum
        );

        Ok(AnalysisReport {
            findings: Findings::Matches(matches),
            processing_errors,
        })
    }
}

/// A tokenized file.
struct SourceFile {
    path: PathBuf,
    content: String,
    tokens: Vec<Token>,
}

enum Intake {
    Loaded(SourceFile),
    Failed(ProcessingError),
    Skipped,
}

fn load_file(file: &Path, tokenizer: &dyn Tokenizer, faults: &dyn FaultReporter) -> Intake {
    let content = match read_source(file, "clone detection", faults) {
        Ok(content) => content,
        Err(Some(error)) => return Intake::Failed(error),
        Err(None) => return Intake::Skipped,
    };
    match tokenizer
        .tokenize(&content)
        .with_context(|| format!("tokenizing {}", file.display()))
    {
        Ok(tokens) => Intake::Loaded(SourceFile {
            path: file.to_path_buf(),
            content,
            tokens,
        }),
        Err(e) => {
            faults.report_fault(e);
            Intake::Skipped
        }
    }
}

/// Keep the first of each group of byte-identical files.
fn drop_duplicate_files(sources: Vec<SourceFile>) -> Vec<SourceFile> {
    let mut kept: Vec<SourceFile> = Vec::with_capacity(sources.len());
    let mut by_digest: HashMap<u64, Vec<usize>> = HashMap::new();

    for source in sources {
        let mut hasher = DefaultHasher::new();
        source.content.hash(&mut hasher);
        let candidates = by_digest.entry(hasher.finish()).or_default();
        if candidates
            .iter()
            .any(|&i| kept[i].content == source.content)
        {
            debug!("skipping duplicate file {}", source.path.display());
            continue;
        }
        candidates.push(kept.len());
        kept.push(source);
    }
    kept
}

/// Interned token ids of every file, laid end to end.
struct TokenCorpus {
    stream: Vec<u64>,
    starts: Vec<usize>,
    lens: Vec<usize>,
}

impl TokenCorpus {
    fn build(sources: &[SourceFile]) -> Self {
        let mut vocabulary: HashMap<&str, u64> = HashMap::new();
        let total: usize = sources.iter().map(|s| s.tokens.len() + 1).sum();
        let mut stream = Vec::with_capacity(total);
        let mut starts = Vec::with_capacity(sources.len());
        let mut lens = Vec::with_capacity(sources.len());

        for (index, source) in sources.iter().enumerate() {
            starts.push(stream.len());
            lens.push(source.tokens.len());
            for token in &source.tokens {
                let next = vocabulary.len() as u64;
                stream.push(*vocabulary.entry(token.image.as_str()).or_insert(next));
            }
            // Separators never equal a token id or each other.
            stream.push(u64::MAX - index as u64);
        }

        Self {
            stream,
            starts,
            lens,
        }
    }

    /// Bucket every window start by the hash of its `minimum` ids. Bucket
    /// entries are in ascending stream order.
    fn window_buckets(&self, minimum: usize) -> HashMap<u64, Vec<usize>> {
        let top = (1..minimum).fold(1u64, |acc, _| acc.wrapping_mul(HASH_BASE));
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();

        for (&start, &len) in self.starts.iter().zip(&self.lens) {
            if len < minimum {
                continue;
            }
            let ids = &self.stream[start..start + len];
            let mut hash = ids[..minimum]
                .iter()
                .fold(0u64, |h, &id| h.wrapping_mul(HASH_BASE).wrapping_add(id + 1));
            buckets.entry(hash).or_default().push(start);

            for i in minimum..len {
                hash = hash
                    .wrapping_sub((ids[i - minimum] + 1).wrapping_mul(top))
                    .wrapping_mul(HASH_BASE)
                    .wrapping_add(ids[i] + 1);
                buckets.entry(hash).or_default().push(start + i + 1 - minimum);
            }
        }
        buckets
    }

    /// Group left-maximal shared runs of at least `minimum` tokens by their
    /// exact id sequence.
    fn find_duplicates<'a>(
        &'a self,
        buckets: &HashMap<u64, Vec<usize>>,
        minimum: usize,
    ) -> HashMap<&'a [u64], BTreeSet<usize>> {
        let mut groups: HashMap<&[u64], BTreeSet<usize>> = HashMap::new();

        for positions in buckets.values().filter(|p| p.len() > 1) {
            for (n, &a) in positions.iter().enumerate() {
                for &b in &positions[n + 1..] {
                    if a > 0 && self.stream[a - 1] == self.stream[b - 1] {
                        continue;
                    }
                    let mut len = self.common_run(a, b);
                    if self.file_of(a) == self.file_of(b) {
                        len = len.min(b - a);
                    }
                    if len < minimum {
                        continue;
                    }
                    let run = groups.entry(&self.stream[a..a + len]).or_default();
                    run.insert(a);
                    run.insert(b);
                }
            }
        }
        groups
    }

    fn common_run(&self, a: usize, b: usize) -> usize {
        let mut len = 0;
        while b + len < self.stream.len() && self.stream[a + len] == self.stream[b + len] {
            len += 1;
        }
        len
    }

    fn file_of(&self, position: usize) -> usize {
        self.starts.partition_point(|&s| s <= position) - 1
    }

    fn tokens_at<'s>(
        &self,
        sources: &'s [SourceFile],
        position: usize,
        len: usize,
    ) -> (&'s Path, &'s [Token]) {
        let file = self.file_of(position);
        let offset = position - self.starts[file];
        let source = &sources[file];
        (&source.path, &source.tokens[offset..offset + len])
    }

    /// Turn grouped runs into matches, largest first, then by position.
    fn into_matches(
        &self,
        sources: &[SourceFile],
        groups: HashMap<&[u64], BTreeSet<usize>>,
    ) -> Vec<CloneMatch> {
        let mut ranked: Vec<(usize, usize, BTreeSet<usize>)> = groups
            .into_iter()
            .filter_map(|(run, positions)| {
                let first = *positions.iter().next()?;
                Some((run.len(), first, positions))
            })
            .collect();
        ranked.sort_by(|(la, pa, _), (lb, pb, _)| lb.cmp(la).then(pa.cmp(pb)));

        let mut reported = Coverage::default();
        let mut matches = Vec::new();
        for (len, first, positions) in ranked {
            let blocks = disjoint_blocks(&positions, len);
            if blocks.len() < 2 || blocks.iter().all(|&p| reported.contains(p, p + len)) {
                continue;
            }
            let locations = blocks
                .iter()
                .map(|&p| {
                    let (path, tokens) = self.tokens_at(sources, p, len);
                    block_location(path, tokens)
                })
                .collect();
            let (_, first_tokens) = self.tokens_at(sources, first, len);
            if let Some(found) = CloneMatch::new(len, nonempty_lines(first_tokens), locations) {
                for &p in &blocks {
                    reported.insert(p, p + len);
                }
                matches.push(found);
            }
        }
        matches
    }
}

/// Positions of a group whose blocks do not overlap an earlier kept block.
fn disjoint_blocks(positions: &BTreeSet<usize>, len: usize) -> Vec<usize> {
    let mut kept = Vec::with_capacity(positions.len());
    let mut free_from = 0;
    for &p in positions {
        if p >= free_from {
            kept.push(p);
            free_from = p + len;
        }
    }
    kept
}

/// Union of reported stream spans, stored as disjoint half-open ranges
/// keyed by start. Touching ranges are merged.
#[derive(Default)]
struct Coverage {
    spans: BTreeMap<usize, usize>,
}

impl Coverage {
    fn insert(&mut self, mut start: usize, mut end: usize) {
        if let Some((&s, &e)) = self.spans.range(..=start).next_back() {
            if e >= start {
                start = s;
                end = end.max(e);
            }
        }
        let absorbed: Vec<usize> = self.spans.range(start..=end).map(|(&s, _)| s).collect();
        for s in absorbed {
            if let Some(e) = self.spans.remove(&s) {
                end = end.max(e);
            }
        }
        self.spans.insert(start, end);
    }

    fn contains(&self, start: usize, end: usize) -> bool {
        self.spans
            .range(..=start)
            .next_back()
            .map_or(false, |(_, &e)| e >= end)
    }
}

fn block_location(path: &Path, tokens: &[Token]) -> CodeLocation {
    let (first, last) = match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return CodeLocation {
                file: path.to_string_lossy().to_string(),
                start_line: 0,
                start_col: 0,
                end_line: 0,
                end_col: 0,
            }
        }
    };
    CodeLocation {
        file: path.to_string_lossy().to_string(),
        start_line: first.start_line,
        start_col: first.start_col,
        end_line: last.end_line,
        end_col: last.end_col,
    }
}

/// Number of distinct lines that carry at least one token of the block.
fn nonempty_lines(tokens: &[Token]) -> usize {
    tokens
        .iter()
        .flat_map(|t| t.start_line..=t.end_line)
        .collect::<BTreeSet<_>>()
        .len()
}
