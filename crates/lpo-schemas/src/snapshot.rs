use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{Address, RateMode};

/// Aggregate state of one reserve at an instant.
///
/// Amounts are in the asset's smallest unit; indices and rates are rays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub symbol: String,
    pub decimals: u32,
    pub a_token_address: Address,

    #[serde(with = "crate::dec_u256")]
    pub total_liquidity: U256,
    #[serde(with = "crate::dec_u256")]
    pub available_liquidity: U256,
    #[serde(with = "crate::dec_u256")]
    pub total_borrows_stable: U256,
    #[serde(with = "crate::dec_u256")]
    pub total_borrows_variable: U256,

    #[serde(with = "crate::dec_u256")]
    pub liquidity_index: U256,
    #[serde(with = "crate::dec_u256")]
    pub variable_borrow_index: U256,

    #[serde(with = "crate::dec_u256")]
    pub current_liquidity_rate: U256,
    #[serde(with = "crate::dec_u256")]
    pub current_variable_borrow_rate: U256,
    /// Rate a new stable borrow would lock right now.
    #[serde(with = "crate::dec_u256")]
    pub current_stable_borrow_rate: U256,
    #[serde(with = "crate::dec_u256")]
    pub current_average_stable_borrow_rate: U256,
    #[serde(with = "crate::dec_u256")]
    pub utilization_rate: U256,
    #[serde(with = "crate::dec_u256")]
    pub market_stable_rate: U256,

    pub last_update_timestamp: u64,
}

impl ReserveSnapshot {
    pub fn total_borrows(&self) -> U256 {
        self.total_borrows_stable
            .saturating_add(self.total_borrows_variable)
    }
}

/// One user's position in one reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReserveSnapshot {
    #[serde(with = "crate::dec_u256")]
    pub principal_balance: U256,
    #[serde(with = "crate::dec_u256")]
    pub current_balance: U256,
    /// Personal liquidity index captured at the last balance update.
    #[serde(with = "crate::dec_u256")]
    pub liquidity_index: U256,

    #[serde(with = "crate::dec_u256")]
    pub principal_stable_debt: U256,
    #[serde(with = "crate::dec_u256")]
    pub current_stable_debt: U256,
    #[serde(with = "crate::dec_u256")]
    pub principal_variable_debt: U256,
    #[serde(with = "crate::dec_u256")]
    pub current_variable_debt: U256,
    #[serde(with = "crate::dec_u256")]
    pub variable_borrow_index: U256,

    pub borrow_rate_mode: RateMode,
    /// Locked stable rate; zero without stable debt.
    #[serde(with = "crate::dec_u256")]
    pub borrow_rate: U256,
    pub stable_borrow_last_update_timestamp: u64,
    pub usage_as_collateral_enabled: bool,
    #[serde(with = "crate::dec_u256")]
    pub origination_fee: U256,

    #[serde(with = "crate::dec_u256")]
    pub redirected_balance: U256,
    pub interest_redirection_address: Option<Address>,
    #[serde(with = "crate::dec_u256")]
    pub redirection_target_redirected_balance: U256,
    pub redirection_allowance: Option<Address>,

    #[serde(with = "crate::dec_u256")]
    pub wallet_balance: U256,
}

impl UserReserveSnapshot {
    /// A user that has never touched the reserve, holding `wallet_balance`.
    pub fn empty(wallet_balance: U256) -> Self {
        Self {
            principal_balance: U256::zero(),
            current_balance: U256::zero(),
            liquidity_index: U256::zero(),
            principal_stable_debt: U256::zero(),
            current_stable_debt: U256::zero(),
            principal_variable_debt: U256::zero(),
            current_variable_debt: U256::zero(),
            variable_borrow_index: U256::zero(),
            borrow_rate_mode: RateMode::None,
            borrow_rate: U256::zero(),
            stable_borrow_last_update_timestamp: 0,
            usage_as_collateral_enabled: false,
            origination_fee: U256::zero(),
            redirected_balance: U256::zero(),
            interest_redirection_address: None,
            redirection_target_redirected_balance: U256::zero(),
            redirection_allowance: None,
            wallet_balance,
        }
    }

    pub fn is_redirecting(&self) -> bool {
        self.interest_redirection_address.is_some()
    }
}
