use assert_cmd::prelude::*;
use lpo_schemas::{Address, UserReserveSnapshot, U256};
use lpo_testkit::{PaperLedger, SnapshotSource};
use predicates::prelude::*;
use std::path::PathBuf;

fn defaults_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config/defaults.yaml")
}

fn units(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

/// Before-state of a fresh DAI reserve with one funded user.
fn request(action: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let defaults = defaults_path();
    let defaults_s = defaults.to_string_lossy().to_string();
    let cfg = lpo_config::load_layered_yaml(&[defaults_s.as_str()])?.oracle_config()?;
    let ledger = PaperLedger::from_config(&cfg)?;
    let reserve = ledger.read_reserve_snapshot("DAI")?;
    let alice = Address::from_label("alice");
    let ts = ledger.now() + 1;

    Ok(serde_json::json!({
        "reserve": reserve,
        "users": { alice.to_string(): UserReserveSnapshot::empty(units(1000)) },
        "actor": alice,
        "action": action,
        "action_ts": ts,
        "query_ts": ts,
        "tx_cost": "0",
    }))
}

/// `lpo predict` prints the expected post-supply state as JSON.
#[test]
fn cli_predict_supply_prints_expected_state() -> anyhow::Result<()> {
    let req = request(serde_json::json!({ "kind": "supply", "amount": units(100).to_string() }))?;
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("input.json");
    std::fs::write(&input, serde_json::to_string(&req)?)?;

    let mut cmd = std::process::Command::cargo_bin("lpo")?;
    cmd.arg("predict")
        .arg("--input")
        .arg(&input)
        .arg("--config")
        .arg(defaults_path());
    let out = cmd.assert().success().get_output().stdout.clone();

    let expected: serde_json::Value = serde_json::from_slice(&out)?;
    let alice = Address::from_label("alice").to_string();
    let user = &expected["users"][alice.as_str()];
    assert_eq!(user["principal_balance"], units(100).to_string());
    assert_eq!(user["wallet_balance"], units(900).to_string());
    assert_eq!(user["usage_as_collateral_enabled"], true);
    assert_eq!(
        expected["reserve"]["available_liquidity"],
        units(100).to_string()
    );
    Ok(())
}

/// An action the before-state cannot support fails with a typed reason.
#[test]
fn cli_predict_rejects_impossible_withdraw() -> anyhow::Result<()> {
    let req = request(serde_json::json!({ "kind": "withdraw", "amount": "max" }))?;
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("input.json");
    std::fs::write(&input, serde_json::to_string(&req)?)?;

    let mut cmd = std::process::Command::cargo_bin("lpo")?;
    cmd.arg("predict")
        .arg("--input")
        .arg(&input)
        .arg("--config")
        .arg(defaults_path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("PREDICTION_FAILED: withdraw on DAI"));
    Ok(())
}
