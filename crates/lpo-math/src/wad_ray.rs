//! Wad (1e18) and ray (1e27) fixed-point helpers.
//!
//! Rounding is half-up on multiplication and division, matching the ledger's
//! own arithmetic; the reconcile tolerance absorbs any residual difference.

use primitive_types::U256;

use crate::{MathError, MathResult};

/// 1.0 as a wad.
pub fn wad() -> U256 {
    U256::exp10(18)
}

pub fn half_wad() -> U256 {
    wad() / U256::from(2u64)
}

/// 1.0 as a ray.
pub fn ray() -> U256 {
    U256::exp10(27)
}

pub fn half_ray() -> U256 {
    ray() / U256::from(2u64)
}

/// Scale between wad and ray precision.
pub fn wad_ray_ratio() -> U256 {
    U256::exp10(9)
}

/// Fixed-point operations on `U256`.
pub trait WadRayMath: Sized {
    fn ray_mul(self, other: U256) -> MathResult<U256>;
    fn ray_div(self, other: U256) -> MathResult<U256>;
    fn wad_mul(self, other: U256) -> MathResult<U256>;
    fn wad_div(self, other: U256) -> MathResult<U256>;
    fn wad_to_ray(self) -> MathResult<U256>;
    fn ray_to_wad(self) -> MathResult<U256>;
    /// Exponentiation by squaring with ray rounding at every step.
    fn ray_pow(self, exp: u64) -> MathResult<U256>;
}

impl WadRayMath for U256 {
    fn ray_mul(self, other: U256) -> MathResult<U256> {
        let product = self
            .checked_mul(other)
            .ok_or(MathError::Overflow { op: "ray_mul" })?;
        let rounded = product
            .checked_add(half_ray())
            .ok_or(MathError::Overflow { op: "ray_mul" })?;
        Ok(rounded / ray())
    }

    fn ray_div(self, other: U256) -> MathResult<U256> {
        if other.is_zero() {
            return Err(MathError::DivisionByZero { op: "ray_div" });
        }
        let half = other / U256::from(2u64);
        let scaled = self
            .checked_mul(ray())
            .and_then(|v| v.checked_add(half))
            .ok_or(MathError::Overflow { op: "ray_div" })?;
        Ok(scaled / other)
    }

    fn wad_mul(self, other: U256) -> MathResult<U256> {
        let product = self
            .checked_mul(other)
            .ok_or(MathError::Overflow { op: "wad_mul" })?;
        let rounded = product
            .checked_add(half_wad())
            .ok_or(MathError::Overflow { op: "wad_mul" })?;
        Ok(rounded / wad())
    }

    fn wad_div(self, other: U256) -> MathResult<U256> {
        if other.is_zero() {
            return Err(MathError::DivisionByZero { op: "wad_div" });
        }
        let half = other / U256::from(2u64);
        let scaled = self
            .checked_mul(wad())
            .and_then(|v| v.checked_add(half))
            .ok_or(MathError::Overflow { op: "wad_div" })?;
        Ok(scaled / other)
    }

    fn wad_to_ray(self) -> MathResult<U256> {
        self.checked_mul(wad_ray_ratio())
            .ok_or(MathError::Overflow { op: "wad_to_ray" })
    }

    fn ray_to_wad(self) -> MathResult<U256> {
        let half_ratio = wad_ray_ratio() / U256::from(2u64);
        let rounded = self
            .checked_add(half_ratio)
            .ok_or(MathError::Overflow { op: "ray_to_wad" })?;
        Ok(rounded / wad_ray_ratio())
    }

    fn ray_pow(self, exp: u64) -> MathResult<U256> {
        let mut x = self;
        let mut n = exp;
        let mut z = if n % 2 != 0 { x } else { ray() };

        n /= 2;
        while n != 0 {
            x = x.ray_mul(x)?;
            if n % 2 != 0 {
                z = z.ray_mul(x)?;
            }
            n /= 2;
        }
        Ok(z)
    }
}
