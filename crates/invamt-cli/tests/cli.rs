use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SENTENCE: &str =
    "The subtotal is $50.00 and the tax is $5.00, making the total amount $55.00";

/// `invamt` with an isolated config directory.
fn invamt(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("invamt").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path()).env("HOME", home.path());
    cmd
}

#[test]
fn process_text_without_oracle_falls_back_to_largest() {
    let home = TempDir::new().unwrap();

    invamt(&home)
        .args(["process", "--text", SENTENCE, "--no-oracle"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"amount_due":55.00}"#));
}

#[test]
fn process_text_report_marks_degraded() {
    let home = TempDir::new().unwrap();

    invamt(&home)
        .args(["process", "--text", SENTENCE, "--no-oracle", "--report"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"degraded""#))
        .stdout(predicate::str::contains(r#""currency":"USD""#))
        .stdout(predicate::str::contains(r#""reason":"oracle_disabled""#));
}

#[test]
fn process_text_without_amounts() {
    let home = TempDir::new().unwrap();

    invamt(&home)
        .args(["process", "--text", "Thank you for your visit", "--no-oracle"])
        .assert()
        .success()
        .stdout(predicate::str::diff("{}\n"));
}

#[test]
fn process_empty_text_is_a_client_error() {
    let home = TempDir::new().unwrap();

    invamt(&home)
        .args(["process", "--text", "  ", "--no-oracle"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains(r#""kind":"malformed_input""#))
        .stdout(predicate::str::contains(r#""status":"error""#));
}

#[test]
fn process_text_file_as_csv() {
    let home = TempDir::new().unwrap();
    let input = home.path().join("invoice.txt");
    fs::write(&input, "ACME Corp\nTel. 555-123-4567\nRazem do zapłaty: 1 234,56 zł\n").unwrap();

    invamt(&home)
        .arg("process")
        .arg(&input)
        .args(["--no-oracle", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("label,value,currency,source\n"))
        .stdout(predicate::str::contains("amount_due,1234.56,PLN"));
}

#[test]
fn process_image_without_models_is_a_recognition_failure() {
    let home = TempDir::new().unwrap();
    let models = TempDir::new().unwrap();
    let input = home.path().join("scan.png");
    fs::write(&input, b"definitely not a png").unwrap();

    invamt(&home)
        .arg("process")
        .arg(&input)
        .arg("--no-oracle")
        .arg("--model-dir")
        .arg(models.path())
        .assert()
        .code(3)
        .stdout(predicate::str::contains(r#""kind":"recognition_failure""#));
}

#[test]
fn process_writes_output_file() {
    let home = TempDir::new().unwrap();
    let output = home.path().join("out.json");

    invamt(&home)
        .args(["process", "--text", "Total due: $19.99", "--no-oracle", "-o"])
        .arg(&output)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&output).unwrap(), r#"{"amount_due":19.99}"#);
}

#[test]
fn batch_writes_outputs_and_summary() {
    let home = TempDir::new().unwrap();
    let inputs = home.path().join("in");
    let outputs = home.path().join("out");
    fs::create_dir_all(&inputs).unwrap();
    fs::write(inputs.join("a.txt"), SENTENCE).unwrap();
    fs::write(inputs.join("b.txt"), "Thank you for your visit").unwrap();

    invamt(&home)
        .arg("batch")
        .arg(format!("{}/*.txt", inputs.display()))
        .args(["--no-oracle", "--summary", "-j", "2", "-o"])
        .arg(&outputs)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 successful"));

    assert_eq!(
        fs::read_to_string(outputs.join("a.json")).unwrap(),
        r#"{"amount_due":55.00}"#
    );
    assert_eq!(fs::read_to_string(outputs.join("b.json")).unwrap(), "{}");

    let summary = fs::read_to_string(outputs.join("summary.csv")).unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert!(lines[0].starts_with("filename,status,currency,sub_total,"));
    assert!(lines[0].ends_with(",processing_time_ms,kind,error"));
    assert!(lines[1].starts_with("a.txt,degraded,USD,"));
    assert!(lines[1].contains(",55.00,"));
    assert!(lines[2].starts_with("b.txt,no_amounts_found,"));
    assert!(lines[2].ends_with(",no_amounts_found,"));
}

#[test]
fn config_set_get_with_explicit_path() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("invamt.json");

    invamt(&home)
        .arg("-c")
        .arg(&config)
        .args(["config", "set", "oracle.model", "llama3:8b"])
        .assert()
        .success();

    invamt(&home)
        .arg("-c")
        .arg(&config)
        .args(["config", "get", "oracle.model"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"llama3:8b\""));
}

#[test]
fn config_path_points_to_config_dir() {
    let home = TempDir::new().unwrap();

    invamt(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("invamt"))
        .stdout(predicate::str::contains("not created"));
}
