use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::path::PathBuf;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// `lpo config-hash` prints the same hash the library computes, and a later
/// layer changes it.
#[test]
fn cli_config_hash_matches_library_and_tracks_overlays() -> anyhow::Result<()> {
    let defaults = repo_root().join("config/defaults.yaml");
    let defaults_s = defaults.to_string_lossy().to_string();
    let loaded = lpo_config::load_layered_yaml(&[defaults_s.as_str()])?;

    let mut cmd = std::process::Command::cargo_bin("lpo")?;
    cmd.args(["config-hash", defaults_s.as_str()]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "config_hash={}",
            loaded.config_hash
        )));

    let mut overlay = tempfile::NamedTempFile::new()?;
    writeln!(overlay, "market:\n  origination_fee: \"0.001\"")?;
    let overlay_s = overlay.path().to_string_lossy().to_string();

    let mut cmd2 = std::process::Command::cargo_bin("lpo")?;
    cmd2.args(["config-hash", defaults_s.as_str(), overlay_s.as_str()]);
    cmd2.assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains(loaded.config_hash.as_str()).not())
        .stdout(predicate::str::contains("\"origination_fee\":\"0.001\""));

    Ok(())
}

#[test]
fn cli_config_hash_fails_on_missing_file() -> anyhow::Result<()> {
    let mut cmd = std::process::Command::cargo_bin("lpo")?;
    cmd.args(["config-hash", "does/not/exist.yaml"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to read yaml path"));
    Ok(())
}
