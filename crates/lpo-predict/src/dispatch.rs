use lpo_schemas::{Action, ActionKind};

use crate::account::{
    predict_allow_interest_redirection, predict_redirect_interest, predict_redirect_interest_of,
    predict_set_collateral,
};
use crate::context::{Expected, PredictionInput};
use crate::debt::{
    predict_borrow, predict_rebalance_stable_rate, predict_repay, predict_swap_rate_mode,
};
use crate::error::PredictResult;
use crate::liquidity::{predict_supply, predict_withdraw};

/// Signature shared by every predictor.
pub type PredictorFn = fn(&Action, &PredictionInput) -> PredictResult<Expected>;

/// The single kind → predictor table.
pub trait PredictorTable {
    fn predictor(self) -> PredictorFn;
}

impl PredictorTable for ActionKind {
    fn predictor(self) -> PredictorFn {
        match self {
            ActionKind::Supply => predict_supply,
            ActionKind::Withdraw => predict_withdraw,
            ActionKind::Borrow => predict_borrow,
            ActionKind::Repay => predict_repay,
            ActionKind::SetCollateral => predict_set_collateral,
            ActionKind::SwapRateMode => predict_swap_rate_mode,
            ActionKind::RebalanceStableRate => predict_rebalance_stable_rate,
            ActionKind::RedirectInterest => predict_redirect_interest,
            ActionKind::RedirectInterestOf => predict_redirect_interest_of,
            ActionKind::AllowInterestRedirection => predict_allow_interest_redirection,
        }
    }
}

/// Predict the after-state of `action` executed by `input.actor`.
pub fn predict(action: &Action, input: &PredictionInput) -> PredictResult<Expected> {
    (action.kind().predictor())(action, input)
}
