//! Integration tests for clone detection batches.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use scanbridge::error::Error;
use scanbridge::request::{CloneRunRequest, LanguageRunData};
use scanbridge::{run_clone_detection, BatchResult, RunOptions, Weighting};

const SHARED: &str = "    public int totalQuantity() {
        int total = 0;
        for (Item item : items) {
            if (item.isActive()) {
                total += item.getQuantity();
            }
        }
        return total;
    }
";

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn request(files: Vec<PathBuf>, minimum_tokens: i64, skip: bool) -> CloneRunRequest {
    let mut run_data = BTreeMap::new();
    run_data.insert("java".to_string(), LanguageRunData::new(files));
    CloneRunRequest {
        run_data_per_language: Some(run_data),
        minimum_tokens: Some(minimum_tokens),
        skip_duplicate_files: skip,
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run(request: &CloneRunRequest) -> BatchResult {
    run_clone_detection(request, RunOptions::default()).expect("batch should run")
}

#[test]
fn test_fixture_pair_shares_one_clone() {
    let testdata = testdata_path();
    let inventory = testdata.join("java/Inventory.java");
    let warehouse = testdata.join("java/Warehouse.java");

    let result = run(&request(vec![inventory.clone(), warehouse.clone()], 30, false));
    let java = result.get("java").expect("java should have matches");
    let matches = java.findings.matches();

    assert_eq!(matches.len(), 1);
    let clone = &matches[0];
    assert_eq!(clone.num_blocks, 2);
    assert!(clone.num_tokens_in_block >= 40);
    let files: Vec<&str> = clone.block_locations.iter().map(|l| l.file.as_str()).collect();
    assert_eq!(
        files,
        vec![
            inventory.to_string_lossy().as_ref(),
            warehouse.to_string_lossy().as_ref()
        ]
    );
    assert!(java.processing_errors.is_empty());
}

#[test]
fn test_two_identical_files() {
    let temp = TempDir::new().unwrap();
    let content = format!("class Stock {{\n    private List<Item> items;\n\n{}}}\n", SHARED);
    let a = write(temp.path(), "A.java", &content);
    let b = write(temp.path(), "B.java", &content);

    let result = run(&request(vec![a.clone(), b.clone()], 20, false));
    let matches = result.get("java").unwrap().findings.matches().to_vec();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].block_locations[0].file, a.to_string_lossy());
    assert_eq!(matches[0].block_locations[0].start_line, 1);
    assert_eq!(matches[0].block_locations[1].file, b.to_string_lossy());
    assert_eq!(matches[0].block_locations[1].start_line, 1);

    // Byte-identical files count once when duplicates are skipped.
    let skipped = run(&request(vec![a, b], 20, true));
    assert!(skipped.is_empty());
}

#[test]
fn test_missing_file_does_not_stop_others() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path(), "A.java", &format!("class A {{\n{}}}\n", SHARED));
    let b = write(temp.path(), "B.java", &format!("class B {{\n{}}}\n", SHARED));
    let missing = temp.path().join("Gone.java");

    let result = run(&request(vec![a, missing, b], 20, false));
    let java = result.get("java").unwrap();
    assert_eq!(java.findings.len(), 1);

    let terminating: Vec<_> = java.terminating_errors().collect();
    assert_eq!(terminating.len(), 1);
    assert_eq!(terminating[0].file, "unknown");
    assert!(terminating[0].message.contains("Gone.java"));
}

#[test]
fn test_non_positive_threshold_rejected() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path(), "A.java", "class A {}");

    for threshold in [0, -5] {
        let err = run_clone_detection(&request(vec![a.clone()], threshold, false), RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::NonPositiveThreshold { ref language } if language == "java"));
    }
}

#[test]
fn test_no_languages_with_files() {
    let mut run_data = BTreeMap::new();
    run_data.insert("java".to_string(), LanguageRunData::default());
    let request = CloneRunRequest {
        run_data_per_language: Some(run_data),
        minimum_tokens: Some(100),
        skip_duplicate_files: false,
    };
    let err = run_clone_detection(&request, RunOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NoLanguages));
}

#[test]
fn test_progress_is_monotonic_and_completes() {
    let temp = TempDir::new().unwrap();
    let java_a = write(temp.path(), "A.java", &format!("class A {{\n{}}}\n", SHARED));
    let java_b = write(temp.path(), "B.java", &format!("class B {{\n{}}}\n", SHARED));
    let py = write(temp.path(), "tool.py", "def main():\n    return 1\n");

    let mut run_data = BTreeMap::new();
    run_data.insert("java".to_string(), LanguageRunData::new(vec![java_a, java_b]));
    run_data.insert("python".to_string(), LanguageRunData::new(vec![py]));
    let request = CloneRunRequest {
        run_data_per_language: Some(run_data),
        minimum_tokens: Some(20),
        skip_duplicate_files: false,
    };

    for weighting in [Weighting::Even, Weighting::FileCount] {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let target = Arc::clone(&emitted);
        let options = RunOptions {
            weighting: Some(weighting),
            progress: Some(Box::new(move |p| target.lock().unwrap().push(p))),
            config_root: None,
        };
        run_clone_detection(&request, options).unwrap();

        let emitted = emitted.lock().unwrap();
        assert!(!emitted.is_empty());
        assert!(emitted.windows(2).all(|w| w[0] <= w[1]), "{:?}", emitted);
        assert_eq!(*emitted.last().unwrap(), 100.0);
    }
}
