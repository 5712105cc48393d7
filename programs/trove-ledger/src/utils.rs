use anchor_lang::prelude::*;

use crate::{
    constants::DECIMAL_PRECISION,
    errors::BorrowerOpsError,
    math::mul_div,
    state::{amount_of, TokenMap},
};

pub fn require_valid_redeem_max_fee_percentage(max_fee_percentage: u128, fee_floor: u128) -> Result<()> {
    require!(
        max_fee_percentage >= fee_floor && max_fee_percentage <= DECIMAL_PRECISION,
        BorrowerOpsError::InvalidRedeemMaxFee
    );
    Ok(())
}

pub fn require_non_zero_amount(amount: u64) -> Result<()> {
    require!(amount > 0, BorrowerOpsError::ZeroAmount);
    Ok(())
}

pub fn require_non_zero_change(change: &TokenMap) -> Result<()> {
    require!(!change.is_empty(), BorrowerOpsError::ZeroAmount);
    Ok(())
}

pub fn require_non_zero_adjustment(coll_change: &TokenMap, debt_change: &TokenMap) -> Result<()> {
    require!(
        !coll_change.is_empty() || !debt_change.is_empty(),
        BorrowerOpsError::ZeroAdjustment
    );
    Ok(())
}

pub fn require_no_coll_withdrawal(coll_change: &TokenMap, is_coll_increase: bool) -> Result<()> {
    if !is_coll_increase {
        require!(coll_change.is_empty(), BorrowerOpsError::RecoveryNoCollWithdraw);
    }
    Ok(())
}

pub fn require_new_icr_is_above_old_icr(new_icr: u128, old_icr: u128) -> Result<()> {
    require!(new_icr >= old_icr, BorrowerOpsError::NewICRLowerThanOldICR);
    Ok(())
}

pub fn require_known_tokens(amounts: &TokenMap, tokens: &[Pubkey]) -> Result<()> {
    for token in amounts.keys() {
        if !tokens.contains(token) {
            msg!("Unknown token {}", token);
            return Err(error!(BorrowerOpsError::UnknownToken).with_pubkeys((*token, *token)));
        }
    }
    Ok(())
}

/// Fee and amount in the same USD units.
pub fn require_user_accepts_fee(fee: u128, amount: u128, max_fee_percentage: u128) -> Result<()> {
    if fee == 0 {
        return Ok(());
    }
    let fee_percentage =
        mul_div(fee, DECIMAL_PRECISION, amount).ok_or(BorrowerOpsError::Calculation)?;
    require!(
        fee_percentage <= max_fee_percentage,
        BorrowerOpsError::FeeExceededMax
    );
    Ok(())
}

pub fn require_sufficient_debt_token_balance(balance: &TokenMap, payment: &TokenMap) -> Result<()> {
    for (token, amount) in payment {
        if amount_of(balance, token) < *amount {
            return Err(error!(BorrowerOpsError::InsufficientDebtTokenBalance)
                .with_values((amount_of(balance, token), *amount)));
        }
    }
    Ok(())
}
