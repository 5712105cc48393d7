use ethnum::U256;

use crate::constants::{DECIMAL_PRECISION, NICR_PRECISION};

pub fn mul_div(x: u128, y: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let result = U256::from(x).checked_mul(U256::from(y))? / U256::from(denominator);
    u128::try_from(result).ok()
}

pub fn mul_div_up(x: u128, y: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let numerator = U256::from(x).checked_mul(U256::from(y))?;
    let d = U256::from(denominator);
    let mut result = numerator / d;
    if numerator % d != U256::ZERO {
        result = result.checked_add(U256::ONE)?;
    }
    u128::try_from(result).ok()
}

pub fn mul_div_u64(x: u64, y: u128, denominator: u128) -> Option<u64> {
    u64::try_from(mul_div(x.into(), y, denominator)?).ok()
}

pub fn dec_mul(x: u128, y: u128) -> Option<u128> {
    let prod_xy = U256::from(x).checked_mul(U256::from(y))?;
    let rounded = prod_xy.checked_add(U256::from(DECIMAL_PRECISION / 2))? / U256::from(DECIMAL_PRECISION);
    u128::try_from(rounded).ok()
}

/// USD collateral over USD debt, 1e18 scaled. No debt means infinitely healthy.
pub fn compute_cr(coll_usd: u128, debt_usd: u128) -> Option<u128> {
    if debt_usd > 0 {
        return mul_div(coll_usd, DECIMAL_PRECISION, debt_usd);
    }
    Some(u128::MAX)
}

pub fn compute_nominal_cr(coll: u128, debt: u128) -> Option<u128> {
    if debt > 0 {
        return mul_div(coll, NICR_PRECISION, debt);
    }
    Some(u128::MAX)
}
