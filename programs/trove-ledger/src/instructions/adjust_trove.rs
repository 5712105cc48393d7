use anchor_lang::prelude::*;

use crate::{
    errors::BorrowerOpsError,
    events::{Operation, TroveUpdated},
    state::{
        get_icr_of, get_nominal_icr_of, to_token_amounts, to_token_map, Ledger, PoolState,
        PoolType, PriceSnapshot, TokenAmount, TokenMap,
    },
    utils::{
        require_known_tokens, require_new_icr_is_above_old_icr, require_no_coll_withdrawal,
        require_non_zero_adjustment, require_sufficient_debt_token_balance,
    },
};

#[allow(clippy::too_many_arguments)]
pub fn adjust_trove_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    borrower: Pubkey,
    coll_change: &[TokenAmount],
    is_coll_increase: bool,
    debt_change: &[TokenAmount],
    is_debt_increase: bool,
    debt_token_balance: &[TokenAmount],
    prev_hint: Pubkey,
    next_hint: Pubkey,
) -> Result<()> {
    let coll_change = to_token_map(coll_change)?;
    let debt_change = to_token_map(debt_change)?;
    require_non_zero_adjustment(&coll_change, &debt_change)?;
    require_known_tokens(&coll_change, &ledger.config().collateral_tokens)?;
    require_known_tokens(&debt_change, &ledger.config().debt_tokens)?;

    // Check is recovery
    let is_recovery_mode = ledger.pool_state.check_recovery_mode(prices)?;

    let mut trove = ledger.take_trove(&borrower);
    trove.require_trove_active()?;

    ledger.pool_state.apply_pending_reward(&mut trove)?;

    let old_icr = trove.get_icr(prices)?;
    let (new_coll, new_debt) = trove.get_new_trove_amounts(
        &coll_change,
        is_coll_increase,
        &debt_change,
        is_debt_increase,
    )?;
    require!(!new_coll.is_empty(), BorrowerOpsError::EmptyCollateral);
    let new_icr = get_icr_of(&new_coll, &new_debt, prices)?;

    require_valid_adjustment_in_current_mode(
        &ledger.pool_state,
        is_recovery_mode,
        &coll_change,
        is_coll_increase,
        &debt_change,
        is_debt_increase,
        prices,
        old_icr,
        new_icr,
    )?;

    if !is_debt_increase && !debt_change.is_empty() {
        ledger
            .pool_state
            .require_valid_repayment(&trove.debt, &debt_change)?;
        let new_net_debt = ledger.pool_state.get_net_debt(&new_debt)?;
        ledger
            .pool_state
            .require_at_least_min_net_debt(&new_net_debt, prices)?;
        require_sufficient_debt_token_balance(&to_token_map(debt_token_balance)?, &debt_change)?;
    }

    let new_nicr = get_nominal_icr_of(&new_coll, &new_debt)?;
    trove.coll = new_coll;
    trove.debt = new_debt;
    let stake = trove.update_stake_and_total_stakes(&mut ledger.pool_state)?;

    ledger
        .sorted_troves
        .re_insert(borrower, new_nicr, prev_hint, next_hint)?;

    emit!(TroveUpdated {
        borrower,
        debt: to_token_amounts(&trove.debt),
        coll: to_token_amounts(&trove.coll),
        stake: to_token_amounts(&stake),
        operation: Operation::AdjustTrove
    });

    update_pool_state(
        &mut ledger.pool_state,
        &coll_change,
        is_coll_increase,
        &debt_change,
        is_debt_increase,
    )?;

    ledger.put_trove(trove);
    Ok(())
}

fn update_pool_state(
    pool_state: &mut PoolState,
    coll_change: &TokenMap,
    is_coll_increase: bool,
    debt_change: &TokenMap,
    is_debt_increase: bool,
) -> Result<()> {
    if is_debt_increase {
        pool_state
            .storage
            .add_values(debt_change, false, PoolType::Active)?;
    } else {
        pool_state
            .storage
            .subtract_values(debt_change, false, PoolType::Active)?;
    }

    if is_coll_increase {
        pool_state
            .storage
            .add_values(coll_change, true, PoolType::Active)
    } else {
        pool_state
            .storage
            .subtract_values(coll_change, true, PoolType::Active)
    }
}

#[allow(clippy::too_many_arguments)]
fn require_valid_adjustment_in_current_mode(
    pool_state: &PoolState,
    is_recovery_mode: bool,
    coll_change: &TokenMap,
    is_coll_increase: bool,
    debt_change: &TokenMap,
    is_debt_increase: bool,
    prices: &PriceSnapshot,
    old_icr: u128,
    new_icr: u128,
) -> Result<()> {
    if is_recovery_mode {
        require_no_coll_withdrawal(coll_change, is_coll_increase)?;
        if is_debt_increase && !debt_change.is_empty() {
            pool_state.require_icr_is_above_ccr(new_icr)?;
            require_new_icr_is_above_old_icr(new_icr, old_icr)?;
        }
    } else {
        pool_state.require_icr_is_above_mcr(new_icr)?;
        let new_tcr = pool_state.get_new_tcr_from_trove_change(
            coll_change,
            is_coll_increase,
            debt_change,
            is_debt_increase,
            prices,
        )?;
        pool_state.require_new_tcr_is_above_ccr(new_tcr)?;
    }
    Ok(())
}
