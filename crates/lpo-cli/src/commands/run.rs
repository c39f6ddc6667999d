//! `lpo run`: replay a scenario file against a fresh paper ledger.

use anyhow::{Context, Result};
use lpo_testkit::{load_scenario, PaperLedger, ScenarioRunner};
use tracing::info;

pub fn run_scenario(scenario_path: &str, config_paths: &[String], report_path: Option<&str>) -> Result<()> {
    let (loaded, cfg) = super::load_config(config_paths)?;
    let scenario = load_scenario(scenario_path)?;

    let mut ledger = PaperLedger::from_config(&cfg).context("paper ledger init failed")?;
    let runner = ScenarioRunner::new(cfg, loaded.config_hash.clone());
    let report = runner.run(&scenario, &mut ledger)?;

    println!("run_id={}", report.run_id);
    println!("config_hash={}", report.config_hash);
    println!("title={}", report.title);
    for (si, story) in report.stories.iter().enumerate() {
        for (ai, step) in story.steps.iter().enumerate() {
            println!(
                "story={si} step={ai} action={} reserve={} state={}",
                step.action,
                step.reserve,
                step.state.as_str()
            );
            if let Some(failure) = &step.failure {
                println!("story={si} step={ai} failure={failure}");
            }
        }
    }
    println!(
        "stories={} failed={}",
        report.stories.len(),
        report.failed_stories()
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report).context("serialize report failed")?;
        std::fs::write(path, json).with_context(|| format!("write report failed: {path}"))?;
        info!(path, "report written");
    }

    if !report.passed() {
        anyhow::bail!(
            "SCENARIO_FAILED: {} of {} stories failed",
            report.failed_stories(),
            report.stories.len()
        );
    }
    Ok(())
}
