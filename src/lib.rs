//! scanbridge - multi-language rule checking and copy/paste detection.
//!
//! A batch request lists the files to scan per language. The orchestrator
//! runs one analyzer engine over each language in turn, aggregates progress
//! across languages, and collects findings and processing errors into a
//! single result document keyed by language.
//!
//! # Architecture
//!
//! - `request`: batch request documents and their validation
//! - `orchestrator`: runs languages sequentially, contains engine faults
//! - `engine`: the `Analyzer` trait, clone and rule engines, a scripted fake
//! - `catalog`: rule-set loading, dedup, and description normalization
//! - `parser`: tree-sitter and regex tokenizers
//! - `progress`: cross-language progress aggregation
//! - `result`: the result document model
//! - `config`, `workspace`, `report`, `cli`: the command line surface

pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod language;
pub mod orchestrator;
pub mod parser;
pub mod progress;
pub mod report;
pub mod request;
pub mod result;
pub mod workspace;

pub use catalog::{Priority, RuleCatalog, RuleDescriptor};
pub use config::Config;
pub use engine::{Analyzer, CloneAnalyzer, CloneSettings, FakeAnalyzer, RuleAnalyzer};
pub use error::{Error, Result};
pub use language::Language;
pub use orchestrator::{run_clone_detection, run_rule_checking, RunOptions, RunOrchestrator};
pub use progress::{ProgressAggregator, Weighting};
pub use request::{CloneRunRequest, LanguageRunData, RuleRunRequest};
pub use result::{BatchResult, CloneMatch, CodeLocation, LanguageRunResult, ProcessingError, Violation};
pub use workspace::Workspace;
