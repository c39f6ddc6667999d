//! Declarative scenario files.
//!
//! A scenario is a list of stories; a story is an ordered list of actions
//! run against one shared ledger. Stories run sequentially and a story stops
//! at its first failed step. Later stories still run, on whatever state the
//! earlier ones left.
//!
//! Users are labels ("alice", "0"); each label maps to a deterministic
//! address. A literal `0x…` address is used as is.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use lpo_config::OracleConfig;
use lpo_reconcile::ReconcileContext;
use lpo_schemas::{Address, RateMode};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::collaborators::Ledger;
use crate::orchestrator::{Expectation, Orchestrator, Step, StepAction, StepReport, StepState};

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub title: String,
    /// Overrides `oracle.skip_integrity_check` for this file.
    #[serde(default)]
    pub skip_integrity_check: Option<bool>,
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Story {
    pub description: String,
    pub actions: Vec<ScenarioAction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioAction {
    pub name: String,
    pub args: ActionArgs,
    pub expected: Expectation,
    #[serde(default, rename = "revertMessage")]
    pub revert_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionArgs {
    pub reserve: Scalar,
    pub user: Scalar,
    #[serde(default)]
    pub amount: Option<Scalar>,
    #[serde(default, alias = "borrowRateMode")]
    pub rate_mode: Option<Scalar>,
    #[serde(default)]
    pub on_behalf_of: Option<Scalar>,
    #[serde(default)]
    pub send_value: Option<Scalar>,
    /// Days.
    #[serde(default)]
    pub time_travel: Option<Scalar>,
    #[serde(default)]
    pub use_as_collateral: Option<Scalar>,
    #[serde(default)]
    pub target: Option<Scalar>,
    #[serde(default)]
    pub from: Option<Scalar>,
    #[serde(default)]
    pub to: Option<Scalar>,
}

/// YAML scalar read as text, so `amount: 100` and `amount: "100"` agree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Bool(bool),
    Int(u64),
    Float(f64),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(x) => write!(f, "{x}"),
        }
    }
}

pub fn load_scenario(path: &str) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario: {path}"))?;
    parse_scenario(&raw).with_context(|| format!("invalid scenario: {path}"))
}

/// YAML or JSON.
pub fn parse_scenario(raw: &str) -> Result<Scenario> {
    let scenario: Scenario = serde_yaml::from_str(raw).context("SCENARIO_INVALID")?;
    Ok(scenario)
}

// ---------------------------------------------------------------------------
// Conversion to steps
// ---------------------------------------------------------------------------

pub fn user_address(label: &str) -> Address {
    let label = label.trim();
    label
        .parse::<Address>()
        .unwrap_or_else(|_| Address::from_label(label))
}

fn required<'a>(value: &'a Option<Scalar>, arg: &str) -> Result<&'a Scalar> {
    value
        .as_ref()
        .ok_or_else(|| anyhow!("missing argument '{arg}'"))
}

fn rate_mode(value: &Option<Scalar>) -> Result<RateMode> {
    let text = required(value, "rateMode")?.to_string();
    text.parse::<RateMode>().map_err(|e| anyhow!("{e}"))
}

fn flag(value: &Scalar) -> Result<bool> {
    match value {
        Scalar::Bool(b) => Ok(*b),
        Scalar::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => bail!("expected true or false, got '{s}'"),
        },
        other => bail!("expected true or false, got '{other}'"),
    }
}

fn days(value: &Scalar) -> Result<u64> {
    value
        .to_string()
        .trim()
        .parse::<u64>()
        .map_err(|_| anyhow!("timeTravel must be a whole number of days, got '{value}'"))
}

impl ScenarioAction {
    pub fn to_step(&self) -> Result<Step> {
        let a = &self.args;
        let amount = || required(&a.amount, "amount").map(|s| s.to_string());
        let address = |v: &Option<Scalar>, arg: &str| -> Result<Address> {
            Ok(user_address(&required(v, arg)?.to_string()))
        };

        let action = match self.name.as_str() {
            "mint" => StepAction::Mint { amount: amount()? },
            "approve" => StepAction::Approve,
            "deposit" => StepAction::Supply { amount: amount()? },
            "redeem" => StepAction::Withdraw { amount: amount()? },
            "borrow" => StepAction::Borrow {
                amount: amount()?,
                rate_mode: rate_mode(&a.rate_mode)?,
            },
            "repay" => StepAction::Repay {
                amount: amount()?,
                rate_mode: match &a.rate_mode {
                    Some(_) => rate_mode(&a.rate_mode)?,
                    None => RateMode::None,
                },
                on_behalf_of: a.on_behalf_of.as_ref().map(|v| user_address(&v.to_string())),
            },
            "setUseAsCollateral" => StepAction::SetCollateral {
                enabled: flag(required(&a.use_as_collateral, "useAsCollateral")?)?,
            },
            "swapBorrowRateMode" => StepAction::SwapRateMode {
                from_mode: rate_mode(&a.rate_mode)?,
            },
            "rebalanceStableBorrowRate" => StepAction::RebalanceStableRate {
                target: address(&a.target, "target")?,
            },
            "redirectInterestStream" => StepAction::RedirectInterest {
                to: address(&a.to, "to")?,
            },
            "redirectInterestStreamOf" => StepAction::RedirectInterestOf {
                from: address(&a.from, "from")?,
                to: address(&a.to, "to")?,
            },
            "allowInterestRedirectionTo" => StepAction::AllowInterestRedirection {
                to: a.to.as_ref().map(|v| user_address(&v.to_string())),
            },
            other => bail!("unknown action '{other}'"),
        };

        Ok(Step {
            reserve: a.reserve.to_string(),
            actor: user_address(&a.user.to_string()),
            action,
            expected: self.expected,
            revert_message: self.revert_message.clone(),
            send_value: a.send_value.as_ref().map(|v| v.to_string()),
            time_travel_days: a.time_travel.as_ref().map(days).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StoryReport {
    pub description: String,
    pub steps: Vec<StepReport>,
}

impl StoryReport {
    pub fn passed(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.state != StepState::FailedAssertion)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub title: String,
    pub config_hash: String,
    pub stories: Vec<StoryReport>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.stories.iter().all(StoryReport::passed)
    }

    pub fn failed_stories(&self) -> usize {
        self.stories.iter().filter(|s| !s.passed()).count()
    }
}

pub struct ScenarioRunner {
    config: OracleConfig,
    config_hash: String,
}

impl ScenarioRunner {
    pub fn new(config: OracleConfig, config_hash: impl Into<String>) -> Self {
        Self {
            config,
            config_hash: config_hash.into(),
        }
    }

    /// Convert every action up front, then run the stories in order.
    ///
    /// `Err` only for a malformed scenario; step failures are recorded in the
    /// report.
    pub fn run<L: Ledger>(&self, scenario: &Scenario, ledger: &mut L) -> Result<ScenarioReport> {
        let mut plan: Vec<(&Story, Vec<Step>)> = Vec::with_capacity(scenario.stories.len());
        for (si, story) in scenario.stories.iter().enumerate() {
            let mut steps = Vec::with_capacity(story.actions.len());
            for (ai, action) in story.actions.iter().enumerate() {
                let step = action.to_step().with_context(|| {
                    format!("story {si} ('{}'), action {ai} ('{}')", story.description, action.name)
                })?;
                steps.push(step);
            }
            plan.push((story, steps));
        }

        let ctx = ReconcileContext {
            skip_integrity_check: scenario
                .skip_integrity_check
                .unwrap_or(self.config.oracle.skip_integrity_check),
        };
        let orchestrator = Orchestrator::new(self.config.clone()).with_context(ctx);

        let mut report = ScenarioReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            title: scenario.title.clone(),
            config_hash: self.config_hash.clone(),
            stories: Vec::with_capacity(plan.len()),
        };
        info!(run_id = %report.run_id, title = %scenario.title, "scenario start");

        for (story, steps) in plan {
            let span = info_span!("story", description = %story.description);
            let _guard = span.enter();

            let mut story_report = StoryReport {
                description: story.description.clone(),
                steps: Vec::with_capacity(steps.len()),
            };
            for step in &steps {
                let step_report = orchestrator.execute(ledger, step);
                let failed = step_report.state == StepState::FailedAssertion;
                story_report.steps.push(step_report);
                if failed {
                    warn!("story stopped at first failed step");
                    break;
                }
            }
            report.stories.push(story_report);
        }

        info!(
            run_id = %report.run_id,
            failed_stories = report.failed_stories(),
            "scenario done"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_map_to_stable_addresses() {
        assert_eq!(user_address("alice"), Address::from_label("alice"));
        assert_eq!(user_address(" alice "), user_address("alice"));
        let literal = "0x00000000000000000000000000000000000000aa";
        assert_eq!(user_address(literal).to_string(), literal);
    }

    #[test]
    fn bare_numbers_and_strings_agree() {
        let yaml = r#"
name: deposit
args: { reserve: DAI, amount: 100, user: 0 }
expected: success
"#;
        let action: ScenarioAction = serde_yaml::from_str(yaml).unwrap();
        let step = action.to_step().unwrap();
        assert_eq!(
            step.action,
            StepAction::Supply {
                amount: "100".to_string()
            }
        );
        assert_eq!(step.actor, Address::from_label("0"));
    }

    #[test]
    fn repay_accepts_either_rate_mode_key() {
        for key in ["rateMode", "borrowRateMode"] {
            let yaml = format!(
                "name: repay\nargs: {{ reserve: DAI, amount: \"-1\", user: bob, {key}: stable, onBehalfOf: carol, sendValue: \"-1\" }}\nexpected: success\n"
            );
            let action: ScenarioAction = serde_yaml::from_str(&yaml).unwrap();
            let step = action.to_step().unwrap();
            assert_eq!(
                step.action,
                StepAction::Repay {
                    amount: "-1".to_string(),
                    rate_mode: RateMode::Stable,
                    on_behalf_of: Some(Address::from_label("carol")),
                }
            );
            assert_eq!(step.send_value.as_deref(), Some("-1"));
        }
    }

    #[test]
    fn malformed_actions_are_rejected() {
        let unknown = "name: liquidate\nargs: { reserve: DAI, user: a }\nexpected: success\n";
        let action: ScenarioAction = serde_yaml::from_str(unknown).unwrap();
        assert!(action.to_step().is_err());

        let no_mode = "name: borrow\nargs: { reserve: DAI, amount: 1, user: a }\nexpected: success\n";
        let action: ScenarioAction = serde_yaml::from_str(no_mode).unwrap();
        let err = action.to_step().unwrap_err();
        assert!(err.to_string().contains("rateMode"), "{err}");

        let bad_flag = "name: setUseAsCollateral\nargs: { reserve: DAI, user: a, useAsCollateral: maybe }\nexpected: success\n";
        let action: ScenarioAction = serde_yaml::from_str(bad_flag).unwrap();
        assert!(action.to_step().is_err());

        let typo = "name: deposit\nargs: { reserve: DAI, user: a, ammount: 1 }\nexpected: success\n";
        assert!(serde_yaml::from_str::<ScenarioAction>(typo).is_err());
    }

    #[test]
    fn time_travel_is_whole_days() {
        let yaml = "name: borrow\nargs: { reserve: DAI, amount: 1, user: a, borrowRateMode: variable, timeTravel: \"365\" }\nexpected: success\n";
        let action: ScenarioAction = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(action.to_step().unwrap().time_travel_days, Some(365));
    }
}
