use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Address;

// ---------------------------------------------------------------------------
// Rate mode
// ---------------------------------------------------------------------------

/// Interest rate mode of a borrow position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateMode {
    #[default]
    None,
    Stable,
    Variable,
}

impl RateMode {
    /// The mode a swap moves debt into.
    pub fn opposite(self) -> RateMode {
        match self {
            RateMode::Stable => RateMode::Variable,
            RateMode::Variable => RateMode::Stable,
            RateMode::None => RateMode::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RateMode::None => "NONE",
            RateMode::Stable => "STABLE",
            RateMode::Variable => "VARIABLE",
        }
    }
}

impl fmt::Display for RateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateModeParseError {
    pub input: String,
}

impl fmt::Display for RateModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid rate mode '{}': expected none|stable|variable or 0|1|2",
            self.input
        )
    }
}

impl std::error::Error for RateModeParseError {}

impl FromStr for RateMode {
    type Err = RateModeParseError;

    /// Accepts names in any case and the ledger's numeric codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(RateMode::None),
            "1" | "stable" => Ok(RateMode::Stable),
            "2" | "variable" => Ok(RateMode::Variable),
            _ => Err(RateModeParseError {
                input: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Amount request
// ---------------------------------------------------------------------------

/// Exact amount or "everything available/owed".
///
/// Serialized as a decimal string, or `"max"` for [`AmountRequest::Max`];
/// `"-1"` is accepted on input as a synonym.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountRequest {
    Exact(U256),
    Max,
}

impl AmountRequest {
    /// Value sent to the ledger: the protocol maximum for `Max`.
    pub fn wire_value(&self) -> U256 {
        match self {
            AmountRequest::Exact(v) => *v,
            AmountRequest::Max => U256::MAX,
        }
    }
}

impl fmt::Display for AmountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountRequest::Exact(v) => write!(f, "{v}"),
            AmountRequest::Max => f.write_str("max"),
        }
    }
}

impl Serialize for AmountRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AmountRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = AmountRequest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal integer string, \"max\" or \"-1\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<AmountRequest, E> {
                Ok(AmountRequest::Exact(U256::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<AmountRequest, E> {
                match v {
                    -1 => Ok(AmountRequest::Max),
                    v if v >= 0 => Ok(AmountRequest::Exact(U256::from(v as u64))),
                    v => Err(E::custom(format!("negative amount {v}"))),
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<AmountRequest, E> {
                match v.trim() {
                    "max" | "MAX" | "-1" => Ok(AmountRequest::Max),
                    other => crate::dec_u256::parse(other)
                        .map(AmountRequest::Exact)
                        .map_err(E::custom),
                }
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One mutating ledger action. The actor is supplied separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Supply {
        #[serde(with = "crate::dec_u256")]
        amount: U256,
    },
    Withdraw {
        amount: AmountRequest,
    },
    Borrow {
        #[serde(with = "crate::dec_u256")]
        amount: U256,
        rate_mode: RateMode,
    },
    Repay {
        amount: AmountRequest,
        rate_mode: RateMode,
        on_behalf_of: Address,
    },
    SetCollateral {
        enabled: bool,
    },
    /// Moves the debt currently held in `from_mode` to the other mode.
    SwapRateMode {
        from_mode: RateMode,
    },
    RebalanceStableRate {
        target: Address,
    },
    RedirectInterest {
        to: Address,
    },
    /// Caller redirects `from`'s interest under `from`'s allowance.
    RedirectInterestOf {
        from: Address,
        to: Address,
    },
    /// `None` clears the allowance.
    AllowInterestRedirection {
        to: Option<Address>,
    },
}

/// Discriminant of [`Action`], used as the predictor dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Supply,
    Withdraw,
    Borrow,
    Repay,
    SetCollateral,
    SwapRateMode,
    RebalanceStableRate,
    RedirectInterest,
    RedirectInterestOf,
    AllowInterestRedirection,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Supply,
        ActionKind::Withdraw,
        ActionKind::Borrow,
        ActionKind::Repay,
        ActionKind::SetCollateral,
        ActionKind::SwapRateMode,
        ActionKind::RebalanceStableRate,
        ActionKind::RedirectInterest,
        ActionKind::RedirectInterestOf,
        ActionKind::AllowInterestRedirection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Supply => "supply",
            ActionKind::Withdraw => "withdraw",
            ActionKind::Borrow => "borrow",
            ActionKind::Repay => "repay",
            ActionKind::SetCollateral => "set_collateral",
            ActionKind::SwapRateMode => "swap_rate_mode",
            ActionKind::RebalanceStableRate => "rebalance_stable_rate",
            ActionKind::RedirectInterest => "redirect_interest",
            ActionKind::RedirectInterestOf => "redirect_interest_of",
            ActionKind::AllowInterestRedirection => "allow_interest_redirection",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Supply { .. } => ActionKind::Supply,
            Action::Withdraw { .. } => ActionKind::Withdraw,
            Action::Borrow { .. } => ActionKind::Borrow,
            Action::Repay { .. } => ActionKind::Repay,
            Action::SetCollateral { .. } => ActionKind::SetCollateral,
            Action::SwapRateMode { .. } => ActionKind::SwapRateMode,
            Action::RebalanceStableRate { .. } => ActionKind::RebalanceStableRate,
            Action::RedirectInterest { .. } => ActionKind::RedirectInterest,
            Action::RedirectInterestOf { .. } => ActionKind::RedirectInterestOf,
            Action::AllowInterestRedirection { .. } => ActionKind::AllowInterestRedirection,
        }
    }

    /// Accounts named by the action itself, actor first, deduplicated.
    ///
    /// Previous redirection targets are state-dependent and must be added by
    /// whoever holds the before-snapshots.
    pub fn named_parties(&self, actor: Address) -> Vec<Address> {
        let mut out = vec![actor];
        let mut push = |a: Address| {
            if !out.contains(&a) {
                out.push(a);
            }
        };
        match self {
            Action::Repay { on_behalf_of, .. } => push(*on_behalf_of),
            Action::RebalanceStableRate { target } => push(*target),
            Action::RedirectInterest { to } => push(*to),
            Action::RedirectInterestOf { from, to } => {
                push(*from);
                push(*to);
            }
            Action::Supply { .. }
            | Action::Withdraw { .. }
            | Action::Borrow { .. }
            | Action::SetCollateral { .. }
            | Action::SwapRateMode { .. }
            | Action::AllowInterestRedirection { .. } => {}
        }
        out
    }

    /// The account whose position the action primarily changes.
    pub fn subject(&self, actor: Address) -> Address {
        match self {
            Action::Repay { on_behalf_of, .. } => *on_behalf_of,
            Action::RebalanceStableRate { target } => *target,
            Action::RedirectInterestOf { from, .. } => *from,
            _ => actor,
        }
    }
}
