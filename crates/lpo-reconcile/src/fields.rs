use lpo_schemas::{Address, ReserveSnapshot, UserReserveSnapshot, U256};

use crate::FieldValue;

/// A snapshot that can be compared field by field.
///
/// `fields` lists every field in declaration order, skipped ones included;
/// two values of the same type always yield the same names in the same
/// order.
pub trait Reconcilable {
    fn fields(&self) -> Vec<(&'static str, FieldValue)>;
}

fn num(v: U256) -> FieldValue {
    FieldValue::Numeric(v)
}

fn ts(v: u64) -> FieldValue {
    FieldValue::Numeric(U256::from(v))
}

fn exact(v: impl ToString) -> FieldValue {
    FieldValue::Exact(v.to_string())
}

fn addr(v: Option<Address>) -> FieldValue {
    match v {
        Some(a) => exact(a),
        None => exact("none"),
    }
}

impl Reconcilable for ReserveSnapshot {
    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("symbol", exact(&self.symbol)),
            ("decimals", exact(self.decimals)),
            ("a_token_address", exact(self.a_token_address)),
            ("total_liquidity", num(self.total_liquidity)),
            ("available_liquidity", num(self.available_liquidity)),
            ("total_borrows_stable", num(self.total_borrows_stable)),
            ("total_borrows_variable", num(self.total_borrows_variable)),
            ("liquidity_index", num(self.liquidity_index)),
            ("variable_borrow_index", num(self.variable_borrow_index)),
            ("current_liquidity_rate", num(self.current_liquidity_rate)),
            (
                "current_variable_borrow_rate",
                num(self.current_variable_borrow_rate),
            ),
            (
                "current_stable_borrow_rate",
                num(self.current_stable_borrow_rate),
            ),
            (
                "current_average_stable_borrow_rate",
                num(self.current_average_stable_borrow_rate),
            ),
            ("utilization_rate", num(self.utilization_rate)),
            ("market_stable_rate", num(self.market_stable_rate)),
            ("last_update_timestamp", ts(self.last_update_timestamp)),
        ]
    }
}

impl Reconcilable for UserReserveSnapshot {
    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("principal_balance", num(self.principal_balance)),
            ("current_balance", num(self.current_balance)),
            ("liquidity_index", num(self.liquidity_index)),
            ("principal_stable_debt", num(self.principal_stable_debt)),
            ("current_stable_debt", num(self.current_stable_debt)),
            ("principal_variable_debt", num(self.principal_variable_debt)),
            ("current_variable_debt", num(self.current_variable_debt)),
            ("variable_borrow_index", num(self.variable_borrow_index)),
            ("borrow_rate_mode", exact(self.borrow_rate_mode)),
            ("borrow_rate", num(self.borrow_rate)),
            (
                "stable_borrow_last_update_timestamp",
                ts(self.stable_borrow_last_update_timestamp),
            ),
            (
                "usage_as_collateral_enabled",
                exact(self.usage_as_collateral_enabled),
            ),
            ("origination_fee", num(self.origination_fee)),
            ("redirected_balance", num(self.redirected_balance)),
            (
                "interest_redirection_address",
                addr(self.interest_redirection_address),
            ),
            (
                "redirection_target_redirected_balance",
                num(self.redirection_target_redirected_balance),
            ),
            ("redirection_allowance", addr(self.redirection_allowance)),
            ("wallet_balance", num(self.wallet_balance)),
        ]
    }
}
