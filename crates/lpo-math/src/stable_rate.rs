//! Principal-weighted average stable borrow rate bookkeeping.

use primitive_types::U256;

use crate::wad_ray::WadRayMath;
use crate::{add, MathResult};

/// Total stable principal and its weighted average rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StableBook {
    pub total: U256,
    pub average_rate: U256,
}

impl StableBook {
    pub fn new(total: U256, average_rate: U256) -> Self {
        Self {
            total,
            average_rate,
        }
    }

    /// Add `amount` of principal borrowed at `rate`.
    pub fn increase(self, amount: U256, rate: U256) -> MathResult<Self> {
        if amount.is_zero() {
            return Ok(self);
        }
        let total = add(self.total, amount, "stable_increase")?;
        let weighted_last = amount.wad_to_ray()?.ray_mul(rate)?;
        let weighted_previous = self.total.wad_to_ray()?.ray_mul(self.average_rate)?;
        let average_rate = add(weighted_last, weighted_previous, "stable_increase")?
            .ray_div(total.wad_to_ray()?)?;
        Ok(Self {
            total,
            average_rate,
        })
    }

    /// Remove `amount` of principal that was borrowed at `rate`.
    ///
    /// Removing the whole book (or more) empties it.
    pub fn decrease(self, amount: U256, rate: U256) -> MathResult<Self> {
        if amount.is_zero() {
            return Ok(self);
        }
        if self.total <= amount {
            return Ok(Self::default());
        }
        let total = self.total - amount;
        let weighted_last = amount.wad_to_ray()?.ray_mul(rate)?;
        let weighted_previous = self.total.wad_to_ray()?.ray_mul(self.average_rate)?;
        let average_rate = if weighted_previous <= weighted_last {
            U256::zero()
        } else {
            (weighted_previous - weighted_last).ray_div(total.wad_to_ray()?)?
        };
        Ok(Self {
            total,
            average_rate,
        })
    }

    /// Replace one position's principal/rate pair with a new one.
    pub fn restate(
        self,
        old_principal: U256,
        old_rate: U256,
        new_principal: U256,
        new_rate: U256,
    ) -> MathResult<Self> {
        self.decrease(old_principal, old_rate)?
            .increase(new_principal, new_rate)
    }
}
