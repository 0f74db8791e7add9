//! Output formatting for batch results.
//!
//! Supports two output formats:
//! - JSON: the batch result document, written to a file or stdout
//! - Pretty: colored terminal summary for the `scan` command

use colored::*;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::catalog::RuleDescriptor;
use crate::error::Result;
use crate::result::{BatchResult, CloneMatch, LanguageRunResult, ProcessingError, Violation};

// =============================================================================
// JSON Format
// =============================================================================

/// Serialize `value` as pretty JSON into `writer`, followed by a newline.
pub fn write_json_to<W: Write, T: Serialize + ?Sized>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Whether `output` names stdout.
pub fn is_stdout(output: &Path) -> bool {
    output == Path::new("-")
}

/// Write a document to `output`, or to stdout when `output` is `-`.
pub fn write_json<T: Serialize + ?Sized>(output: &Path, value: &T) -> Result<()> {
    if is_stdout(output) {
        return write_json_to(io::stdout().lock(), value);
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(output)?;
    write_json_to(io::BufWriter::new(file), value)
}

/// Write a batch result document.
pub fn write_result(output: &Path, result: &BatchResult) -> Result<()> {
    write_json(output, result)
}

/// Write a rule catalog, sorted by rule name then language.
pub fn write_rule_descriptions(output: &Path, rules: &[RuleDescriptor]) -> Result<()> {
    let mut sorted: Vec<&RuleDescriptor> = rules.iter().collect();
    sorted.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.language_id.cmp(&b.language_id))
    });
    write_json(output, &sorted)
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Print a colored summary of `result` to stdout.
pub fn write_pretty(path: &str, mode: &str, result: &BatchResult) {
    print!("{}", render_pretty(path, mode, result));
}

/// Render the colored summary.
pub fn render_pretty(path: &str, mode: &str, result: &BatchResult) -> String {
    let mut out = String::new();

    // Header
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  {} v{}",
        "scanbridge".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "  {}{}", "Scanning: ".dimmed(), path);
    let _ = writeln!(out, "  {}{}", "Mode:     ".dimmed(), mode);
    let _ = writeln!(out);

    for (language, run) in result.languages() {
        write_language(&mut out, language, run);
    }

    write_final_status(&mut out, result);
    let _ = writeln!(out);
    out
}

fn write_language(out: &mut String, language: &str, run: &LanguageRunResult) {
    let _ = writeln!(
        out,
        "  {} ({} finding{}, {} processing error{}):",
        language.bold(),
        run.findings.len(),
        plural(run.findings.len()),
        run.processing_errors.len(),
        plural(run.processing_errors.len())
    );
    let _ = writeln!(out);

    for violation in run.findings.violations() {
        write_violation(out, violation);
    }
    for clone in run.findings.matches() {
        write_clone(out, clone);
    }
    for error in &run.processing_errors {
        write_processing_error(out, error);
    }
}

fn write_violation(out: &mut String, v: &Violation) {
    let loc = &v.code_location;
    let _ = writeln!(
        out,
        "    {}   {:<18}{}{}",
        "RULE ".yellow(),
        v.rule.as_str().dimmed(),
        loc.file.blue(),
        format!(":{}:{}", loc.start_line, loc.start_col).dimmed()
    );
    // Message on next line, indented
    let _ = writeln!(out, "            {}", v.message);
    let _ = writeln!(out);
}

fn write_clone(out: &mut String, m: &CloneMatch) {
    let _ = writeln!(
        out,
        "    {}   {} tokens, {} lines, {} blocks",
        "CLONE".magenta(),
        m.num_tokens_in_block,
        m.num_nonempty_lines_in_block,
        m.num_blocks
    );
    for loc in &m.block_locations {
        let _ = writeln!(
            out,
            "            {}{}",
            loc.file.blue(),
            format!(":{}-{}", loc.start_line, loc.end_line).dimmed()
        );
    }
    let _ = writeln!(out);
}

fn write_processing_error(out: &mut String, e: &ProcessingError) {
    let tag = if e.is_terminating() {
        "FAULT".red().bold()
    } else {
        "ERROR".red()
    };
    let _ = writeln!(out, "    {}   {}", tag, e.file.blue());
    let _ = writeln!(out, "            {}", e.message);
    if let Some(detail) = &e.detail {
        let _ = writeln!(out, "            {}", format!("({})", detail).dimmed());
    }
    let _ = writeln!(out);
}

fn write_final_status(out: &mut String, result: &BatchResult) {
    let findings = result.finding_count();
    let errors = result.processing_error_count();
    let summary = format!(
        "{} finding{}, {} processing error{}",
        findings,
        plural(findings),
        errors,
        plural(errors)
    );
    if findings == 0 && errors == 0 {
        let _ = writeln!(out, "  {}  {}", "✓ CLEAN".green(), summary);
    } else if findings == 0 {
        let _ = writeln!(out, "  {}  {}", "! ERRORS".yellow(), summary);
    } else {
        let _ = writeln!(out, "  {}  {}", "✗ FINDINGS".red(), summary);
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::violation;
    use crate::result::{Findings, ResultAggregator};
    use tempfile::TempDir;

    fn sample() -> BatchResult {
        let mut aggregator = ResultAggregator::new();
        aggregator.add(
            "java",
            LanguageRunResult::new(Findings::Violations(vec![violation(
                "SystemPrintln",
                Path::new("/src/A.java"),
                4,
            )])),
        );
        let mut xml = LanguageRunResult::new(Findings::Violations(Vec::new()));
        xml.processing_errors.push(ProcessingError::for_file(
            Path::new("/src/broken.xml"),
            "could not decode",
            Some("EncodingError".to_string()),
        ));
        aggregator.add("xml", xml);
        aggregator.finish()
    }

    #[test]
    fn test_write_result_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out/nested/result.json");
        write_result(&output, &sample()).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        let parsed: BatchResult = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, sample());
        assert!(written.ends_with('\n'));
    }

    #[test]
    fn test_empty_batch_writes_empty_object() {
        let mut buf = Vec::new();
        write_json_to(&mut buf, &BatchResult::default()).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{}\n");
    }

    #[test]
    fn test_render_pretty_lists_findings_and_errors() {
        colored::control::set_override(false);
        let text = render_pretty("/src", "rules", &sample());

        assert!(text.contains("Scanning: /src"));
        assert!(text.contains("java (1 finding, 0 processing errors):"));
        assert!(text.contains("/src/A.java:4:1"));
        assert!(text.contains("ERROR   /src/broken.xml"));
        assert!(text.contains("(EncodingError)"));
        assert!(text.contains("1 finding, 1 processing error"));
    }

    #[test]
    fn test_render_pretty_clean() {
        colored::control::set_override(false);
        let text = render_pretty(".", "clones", &BatchResult::default());
        assert!(text.contains("✓ CLEAN  0 findings, 0 processing errors"));
    }
}
