//! Command-line interface for scanbridge.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::catalog::RuleCatalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestrator::{run_clone_detection, run_rule_checking, RunOptions};
use crate::progress::{stdout_sink, ProgressSink};
use crate::report;
use crate::request::{read_request, CloneRunRequest, RuleRunRequest};
use crate::result::BatchResult;
use crate::workspace::Workspace;

/// Exit codes. Errors exit with [`Error::exit_code`].
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FINDINGS: i32 = 1;

/// Multi-language rule checking and copy/paste detection.
///
/// Batch requests are JSON documents listing the files to scan per
/// language. Results are written as a JSON document keyed by language,
/// while progress is reported on stdout as `[Progress]<percent>` lines.
#[derive(Parser)]
#[command(name = "scanbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            _ => "debug",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rule checking
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Copy/paste detection
    #[command(subcommand)]
    Clones(ClonesCommand),
    /// Scan a directory without writing a request
    Scan(ScanArgs),
}

#[derive(Subcommand)]
pub enum RulesCommand {
    /// Run a rule checking batch
    Run(RunArgs),
    /// Write the resolved rule catalog for some languages
    Describe(DescribeArgs),
}

#[derive(Subcommand)]
pub enum ClonesCommand {
    /// Run a clone detection batch
    Run(RunArgs),
}

/// Arguments for the batch run commands.
#[derive(Parser)]
pub struct RunArgs {
    /// Request document (JSON)
    pub request: PathBuf,

    /// Where to write the result document (`-` for stdout)
    pub output: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Do not print progress lines
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for `rules describe`.
#[derive(Parser)]
pub struct DescribeArgs {
    /// Where to write the rule catalog (`-` for stdout)
    pub output: PathBuf,

    /// Comma separated language identifiers (default: the config's rule_languages)
    #[arg(short, long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// File listing custom rule-set references, one per line
    #[arg(long)]
    pub custom_rulesets_file: Option<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Rules,
    Clones,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Rules => "rules",
            Mode::Clones => "clones",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Path to scan (file or directory)
    pub path: PathBuf,

    /// Analysis mode
    #[arg(short, long, value_enum, default_value = "rules")]
    pub mode: Mode,

    /// Rule-set reference; repeatable (default: config or standard rule-sets)
    #[arg(short, long = "ruleset")]
    pub rulesets: Vec<String>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: Format,
}

/// Dispatch a parsed command line.
pub fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Commands::Rules(RulesCommand::Run(args)) => run_rules(args),
        Commands::Rules(RulesCommand::Describe(args)) => run_describe(args),
        Commands::Clones(ClonesCommand::Run(args)) => run_clones(args),
        Commands::Scan(args) => run_scan(args),
    }
}

/// Progress lines share stdout with a `-` output, so they are only printed
/// when the result goes to a file.
fn batch_options(config: &Config, args: &RunArgs) -> RunOptions {
    let show_progress = !args.no_progress && !report::is_stdout(&args.output);
    RunOptions {
        weighting: config.progress_weighting,
        progress: show_progress.then(stdout_sink),
        config_root: Some(config.root().to_path_buf()),
    }
}

fn current_dir() -> Result<PathBuf> {
    Ok(std::env::current_dir()?)
}

/// Run the `rules run` command.
pub fn run_rules(args: &RunArgs) -> Result<i32> {
    let config = Config::load(args.config.as_deref(), &current_dir()?)?;
    let request: RuleRunRequest = read_request(&args.request)?;

    let result = run_rule_checking(&request, batch_options(&config, args))?;
    report::write_result(&args.output, &result)?;
    Ok(EXIT_SUCCESS)
}

/// Run the `clones run` command.
pub fn run_clones(args: &RunArgs) -> Result<i32> {
    let config = Config::load(args.config.as_deref(), &current_dir()?)?;
    let request: CloneRunRequest = read_request(&args.request)?;

    let result = run_clone_detection(&request, batch_options(&config, args))?;
    report::write_result(&args.output, &result)?;
    Ok(EXIT_SUCCESS)
}

/// Read custom rule-set references, one per line. Blank lines are ignored.
fn read_reference_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| Error::ReadInput {
        path: path.display().to_string(),
        source,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Run the `rules describe` command.
pub fn run_describe(args: &DescribeArgs) -> Result<i32> {
    let config = Config::load(args.config.as_deref(), &current_dir()?)?;

    let languages = if args.languages.is_empty() {
        config.rule_languages()?
    } else {
        args.languages
            .iter()
            .map(|id| crate::language::Language::resolve(id.trim()))
            .collect::<Result<Vec<_>>>()?
    };
    if languages.is_empty() {
        return Err(Error::Config(
            "no languages to describe; pass --languages or set rule_languages".to_string(),
        ));
    }

    let custom = match &args.custom_rulesets_file {
        Some(path) => read_reference_list(path)?,
        None => config.custom_rulesets.clone(),
    };

    let rules = RuleCatalog::new(config.root())
        .include_standard_rules(true)
        .resolve(&custom, &languages)?;
    info!("describing {} rule(s)", rules.len());

    report::write_rule_descriptions(&args.output, &rules)?;
    Ok(EXIT_SUCCESS)
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}% {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> Result<i32> {
    let root = args.path.canonicalize().map_err(|source| Error::ReadInput {
        path: args.path.display().to_string(),
        source,
    })?;
    let search_dir = if root.is_dir() {
        root.clone()
    } else {
        root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone())
    };
    let config = Config::load(args.config.as_deref(), &search_dir)?;

    let workspace = Workspace::scan(&root, &config.exclusions()?)?;
    let result = if workspace.is_empty() {
        warn!("no files to scan in {}", root.display());
        BatchResult::default()
    } else {
        let bar = (args.format == Format::Pretty).then(progress_bar);
        let progress = bar.clone().map(|bar| -> ProgressSink {
            Box::new(move |percent| bar.set_position(percent.round() as u64))
        });
        let options = RunOptions {
            weighting: config.progress_weighting,
            progress,
            config_root: Some(config.root().to_path_buf()),
        };

        let result = match args.mode {
            Mode::Rules => {
                let request = workspace.rule_request(&config, &args.rulesets)?;
                run_rule_checking(&request, options)
            }
            Mode::Clones => run_clone_detection(&workspace.clone_request(&config), options),
        };
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        result?
    };

    match args.format {
        Format::Json => report::write_json(Path::new("-"), &result)?,
        Format::Pretty => {
            report::write_pretty(&args.path.to_string_lossy(), args.mode.as_str(), &result)
        }
    }

    if result.finding_count() > 0 {
        Ok(EXIT_FINDINGS)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_describe_languages() {
        let cli = Cli::parse_from([
            "scanbridge",
            "rules",
            "describe",
            "out.json",
            "--languages",
            "java,xml",
        ]);
        match cli.command {
            Commands::Rules(RulesCommand::Describe(args)) => {
                assert_eq!(args.languages, vec!["java".to_string(), "xml".to_string()]);
                assert_eq!(args.output, PathBuf::from("out.json"));
            }
            _ => panic!("expected rules describe"),
        }
    }

    #[test]
    fn test_log_level_flags() {
        let cli = Cli::parse_from(["scanbridge", "-vv", "clones", "run", "req.json", "out.json"]);
        assert_eq!(cli.log_level(), "debug");
        let cli = Cli::parse_from(["scanbridge", "scan", ".", "-q", "--mode", "clones"]);
        assert_eq!(cli.log_level(), "error");
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.mode, Mode::Clones);
                assert_eq!(args.format, Format::Pretty);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_progress_silenced_when_result_goes_to_stdout() {
        let config = Config::default();
        let args = |output: &str, no_progress: bool| RunArgs {
            request: PathBuf::from("req.json"),
            output: PathBuf::from(output),
            config: None,
            no_progress,
        };

        assert!(batch_options(&config, &args("out.json", false)).progress.is_some());
        assert!(batch_options(&config, &args("out.json", true)).progress.is_none());
        assert!(batch_options(&config, &args("-", false)).progress.is_none());
    }

    #[test]
    fn test_read_reference_list_skips_blank_lines() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("refs.txt");
        fs::write(&path, "team.yaml\n\n  category/java/errorprone.yaml  \n").unwrap();
        assert_eq!(
            read_reference_list(&path).unwrap(),
            vec![
                "team.yaml".to_string(),
                "category/java/errorprone.yaml".to_string()
            ]
        );
    }
}
