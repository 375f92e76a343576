//! End-to-end tests for the vatex binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn process_labeled_total_emits_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("invoice.txt");
    std::fs::write(&input, "Invoice 2026-001\nTotal Amount VAT: €134.96\n").unwrap();

    Command::cargo_bin("vatex")
        .unwrap()
        .args(["process", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("134.96"))
        .stdout(predicate::str::contains("text_pattern"));
}

#[test]
fn process_csv_uses_spreadsheet_parser() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("orders.csv");
    std::fs::write(&input, "Country,Net Total Tax\nIreland,7.55\n").unwrap();

    Command::cargo_bin("vatex")
        .unwrap()
        .args(["process", "--category", "sales", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("spreadsheet_parser"))
        .stdout(predicate::str::contains("7.55"));
}

#[test]
fn process_missing_file_fails() {
    Command::cargo_bin("vatex")
        .unwrap()
        .args(["process", "/nonexistent/invoice.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn batch_writes_summary_csv() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "Total Amount VAT: €10.00\n").unwrap();
    std::fs::write(dir.path().join("b.txt"), "Total Amount VAT: €20.00\n").unwrap();
    let out = dir.path().join("out");

    let pattern = format!("{}/*.txt", dir.path().display());
    Command::cargo_bin("vatex")
        .unwrap()
        .args([
            "batch",
            &pattern,
            "--output-dir",
            out.to_str().unwrap(),
            "--summary",
        ])
        .assert()
        .success();

    let summary = std::fs::read_to_string(out.join("summary.csv")).unwrap();
    assert!(summary.contains("a.txt"));
    assert!(summary.contains("b.txt"));
    assert!(summary.contains("success"));
}

#[test]
fn config_show_prints_defaults() {
    Command::cargo_bin("vatex")
        .unwrap()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("jurisdiction"))
        .stdout(predicate::str::contains("\"country\": \"IE\""));
}
