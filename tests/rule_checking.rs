//! Integration tests for rule checking batches.
//!
//! These tests run the full pipeline (request validation, rule resolution,
//! the rule engine and result aggregation) against the testdata fixtures.

use std::collections::BTreeMap;
use std::path::PathBuf;

use scanbridge::error::Error;
use scanbridge::request::{LanguageRunData, RuleRunRequest};
use scanbridge::result::TERMINATING_EXCEPTION_MARKER;
use scanbridge::{run_rule_checking, RunOptions};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn options() -> RunOptions {
    RunOptions {
        config_root: Some(testdata_path()),
        ..Default::default()
    }
}

fn run_data(entries: &[(&str, Vec<PathBuf>)]) -> BTreeMap<String, LanguageRunData> {
    entries
        .iter()
        .map(|(key, files)| (key.to_string(), LanguageRunData::new(files.clone())))
        .collect()
}

fn fixture_request() -> RuleRunRequest {
    let testdata = testdata_path();
    RuleRunRequest {
        rule_set_input_file: Some("category/java/bestpractices.yaml".to_string()),
        custom_rulesets: vec![
            "rulesets/team.yaml".to_string(),
            "category/xml/errorprone.yaml".to_string(),
        ],
        include_standard_rules: false,
        selected_rules: None,
        run_data_per_language: Some(run_data(&[
            (
                "java",
                vec![
                    testdata.join("java/Inventory.java"),
                    testdata.join("java/Warehouse.java"),
                ],
            ),
            ("xml", vec![testdata.join("xml/layout.xml")]),
        ])),
    }
}

#[test]
fn test_rule_batch_over_fixtures() {
    let result = run_rule_checking(&fixture_request(), options()).expect("batch should run");

    let java = result.get("java").expect("java should have findings");
    let rules: Vec<&str> = java
        .findings
        .violations()
        .iter()
        .map(|v| v.rule.as_str())
        .collect();
    assert_eq!(rules, vec!["SystemPrintln", "AvoidPrintStackTrace"]);
    assert!(java.processing_errors.is_empty());

    // The custom rule-set wins over the standard one for the same rule.
    let println = &java.findings.violations()[0];
    assert_eq!(println.message, "Use the team logger instead of System.out");
    assert!(println.code_location.file.ends_with("Inventory.java"));
    assert_eq!(println.code_location.start_line, 23);

    let xml = result.get("xml").expect("xml should have findings");
    assert_eq!(xml.findings.violations().len(), 1);
    assert_eq!(xml.findings.violations()[0].rule, "MistypedCDATASection");
    assert_eq!(xml.findings.violations()[0].code_location.start_line, 3);
}

#[test]
fn test_rerun_is_idempotent() {
    let first = run_rule_checking(&fixture_request(), options()).unwrap();
    let second = run_rule_checking(&fixture_request(), options()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_selected_rules_filter() {
    let mut request = fixture_request();
    request.selected_rules = Some(vec!["AvoidPrintStackTrace".to_string()]);
    let result = run_rule_checking(&request, options()).unwrap();

    assert_eq!(result.len(), 1);
    let java = result.get("java").unwrap();
    assert_eq!(java.findings.len(), 1);
    assert!(java.findings.violations()[0]
        .code_location
        .file
        .ends_with("Warehouse.java"));
}

#[test]
fn test_empty_language_dropped_silently() {
    let mut request = fixture_request();
    let mut data = request.run_data_per_language.take().unwrap();
    data.insert("python".to_string(), LanguageRunData::default());
    request.run_data_per_language = Some(data);

    let result = run_rule_checking(&request, options()).unwrap();
    assert!(result.get("python").is_none());
    assert_eq!(result.len(), 2);
}

#[test]
fn test_unknown_language_names_the_string() {
    let mut request = fixture_request();
    request.run_data_per_language = Some(run_data(&[(
        "cobol",
        vec![testdata_path().join("java/Inventory.java")],
    )]));

    let err = run_rule_checking(&request, options()).unwrap_err();
    assert!(matches!(err, Error::UnknownLanguage { .. }));
    assert!(err.to_string().contains("\"cobol\""));
}

#[test]
fn test_missing_rule_set_is_batch_error() {
    let mut request = fixture_request();
    request.custom_rulesets = vec!["rulesets/does-not-exist.yaml".to_string()];

    let err = run_rule_checking(&request, options()).unwrap_err();
    match err {
        Error::RuleSetLoad { reference, .. } => {
            assert_eq!(reference, "rulesets/does-not-exist.yaml");
        }
        other => panic!("expected RuleSetLoad, got {:?}", other),
    }
}

#[test]
fn test_missing_input_file_field() {
    let mut request = fixture_request();
    request.rule_set_input_file = None;
    let err = run_rule_checking(&request, options()).unwrap_err();
    assert_eq!(err.to_string(), "The \"ruleSetInputFile\" field was not set.");
}

#[test]
fn test_missing_source_file_is_terminating_error() {
    let testdata = testdata_path();
    let mut request = fixture_request();
    request.run_data_per_language = Some(run_data(&[(
        "java",
        vec![
            testdata.join("java/Inventory.java"),
            testdata.join("java/DoesNotExist.java"),
            testdata.join("java/Warehouse.java"),
        ],
    )]));

    let result = run_rule_checking(&request, options()).unwrap();
    let java = result.get("java").unwrap();

    // The other files still contribute.
    assert_eq!(java.findings.len(), 2);
    let terminating: Vec<_> = java.terminating_errors().collect();
    assert_eq!(terminating.len(), 1);
    assert_eq!(terminating[0].detail.as_deref(), Some(TERMINATING_EXCEPTION_MARKER));
    assert!(terminating[0].message.contains("DoesNotExist.java"));
}
