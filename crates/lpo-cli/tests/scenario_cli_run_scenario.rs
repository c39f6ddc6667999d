use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::path::PathBuf;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// The shipped sample scenario passes on the default market and the JSON
/// report lands where `--report` points.
#[test]
fn cli_run_sample_scenario_passes_and_writes_report() -> anyhow::Result<()> {
    let root = repo_root();
    let scenario = root.join("scenarios/deposit_borrow_repay.yaml");
    let defaults = root.join("config/defaults.yaml");
    let dir = tempfile::tempdir()?;
    let report = dir.path().join("report.json");

    let mut cmd = std::process::Command::cargo_bin("lpo")?;
    cmd.arg("run")
        .arg(&scenario)
        .arg("--config")
        .arg(&defaults)
        .arg("--report")
        .arg(&report);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("run_id="))
        .stdout(predicate::str::contains("state=REVERTED_AS_EXPECTED"))
        .stdout(predicate::str::contains("stories=4 failed=0"));

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report)?)?;
    assert!(written["run_id"].is_string());
    assert_eq!(written["stories"].as_array().map(|s| s.len()), Some(4));
    Ok(())
}

/// A failed story makes the command exit non-zero after printing the
/// per-step verdicts.
#[test]
fn cli_run_reports_failed_stories() -> anyhow::Result<()> {
    let defaults = repo_root().join("config/defaults.yaml");
    let mut scenario = tempfile::NamedTempFile::new()?;
    write!(
        scenario,
        r#"
title: wrong expectation
stories:
  - description: redeem without a deposit
    actions:
      - name: redeem
        args: {{ reserve: DAI, amount: "1", user: "0" }}
        expected: success
"#
    )?;

    let mut cmd = std::process::Command::cargo_bin("lpo")?;
    cmd.arg("run")
        .arg(scenario.path())
        .arg("--config")
        .arg(&defaults);

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("state=FAILED_ASSERTION"))
        .stdout(predicate::str::contains("ORACLE_UNEXPECTED_REVERT"))
        .stderr(predicate::str::contains("SCENARIO_FAILED: 1 of 1 stories failed"));
    Ok(())
}

#[test]
fn cli_run_rejects_unknown_config_keys() -> anyhow::Result<()> {
    let defaults = repo_root().join("config/defaults.yaml");
    let mut overlay = tempfile::NamedTempFile::new()?;
    writeln!(overlay, "oracle:\n  skip_integrity: true")?;
    let scenario = repo_root().join("scenarios/deposit_borrow_repay.yaml");

    let mut cmd = std::process::Command::cargo_bin("lpo")?;
    cmd.arg("run")
        .arg(&scenario)
        .arg("--config")
        .arg(&defaults)
        .arg("--config")
        .arg(overlay.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_INVALID"));
    Ok(())
}
