use std::cmp;

use anchor_lang::prelude::*;

use crate::{
    errors::BorrowerOpsError,
    events::{Operation, Redemption, TroveUpdated},
    math::mul_div,
    state::{
        add_amounts, amount_of, get_nominal_icr_of, sub_amounts, to_token_amounts, Ledger,
        PoolType, PriceOracle, PriceSnapshot, TokenMap, Trove, TroveStatus,
    },
    utils::{
        require_known_tokens, require_non_zero_amount, require_sufficient_debt_token_balance,
        require_user_accepts_fee, require_valid_redeem_max_fee_percentage,
    },
};

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct RedemptionTotals {
    pub remaining_debt: u64,
    pub total_debt_to_redeem: u64,
    pub total_coll_drawn: TokenMap,
    pub coll_fee: TokenMap,
    pub coll_to_send_to_redeemer: TokenMap,
    pub total_gas_to_burn: u64,
}

#[derive(Default, Clone, Debug)]
struct SingleRedemptionValues {
    debt_lot: u64,
    coll_lot: TokenMap,
    gas_to_burn: u64,
    cancelled_partial: bool,
}

/// Exchanges `amount` of `debt_token` for collateral, starting from the
/// lowest-NICR trove. `max_iterations == 0` walks the whole list.
#[allow(clippy::too_many_arguments)]
pub fn redeem_collateral_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    redeemer: Pubkey,
    debt_token: Pubkey,
    amount: u64,
    debt_token_balance: u64,
    max_fee_percentage: u128,
    max_iterations: u64,
) -> Result<RedemptionTotals> {
    let mut totals = RedemptionTotals::default();
    require_valid_redeem_max_fee_percentage(
        max_fee_percentage,
        ledger.config().redemption_fee_floor,
    )?;
    require_non_zero_amount(amount)?;
    let requested = TokenMap::from([(debt_token, amount)]);
    require_known_tokens(&requested, &ledger.config().debt_tokens)?;
    ledger.pool_state.require_tcr_over_mcr(prices)?;
    require_sufficient_debt_token_balance(
        &TokenMap::from([(debt_token, debt_token_balance)]),
        &requested,
    )?;

    totals.remaining_debt = amount;
    let mcr = ledger.config().mcr;
    let mut current = ledger.sorted_troves.get_last();
    let mut iterations = 0;
    while totals.remaining_debt > 0
        && current != Pubkey::default()
        && (max_iterations == 0 || iterations < max_iterations)
    {
        iterations += 1;
        let borrower = current;
        current = ledger.sorted_troves.get_prev(&borrower);

        if ledger.get_trove(&borrower).get_current_icr(&ledger.pool_state, prices)? < mcr {
            msg!("Skipping {}: ICR below MCR", borrower);
            continue;
        }

        let mut trove = ledger.take_trove(&borrower);
        ledger.pool_state.apply_pending_reward(&mut trove)?;
        let single_redemption = redeem_collateral_from_trove(
            ledger,
            &mut trove,
            &debt_token,
            totals.remaining_debt,
            prices,
        )?;
        ledger.put_trove(trove);

        // a partial redemption that would leave net debt under the minimum ends the walk
        if single_redemption.cancelled_partial {
            break;
        }

        totals.total_gas_to_burn = totals
            .total_gas_to_burn
            .checked_add(single_redemption.gas_to_burn)
            .ok_or(BorrowerOpsError::Calculation)?;
        totals.total_debt_to_redeem = totals
            .total_debt_to_redeem
            .checked_add(single_redemption.debt_lot)
            .ok_or(BorrowerOpsError::Calculation)?;
        add_amounts(&mut totals.total_coll_drawn, &single_redemption.coll_lot)?;
        totals.remaining_debt = totals
            .remaining_debt
            .checked_sub(single_redemption.debt_lot)
            .ok_or(BorrowerOpsError::Calculation)?;
    }
    require!(
        !totals.total_coll_drawn.is_empty(),
        BorrowerOpsError::ZeroCollDrawn
    );

    // Calculate the fee, kept by the protocol
    totals.coll_fee = ledger.pool_state.get_redemption_fee(&totals.total_coll_drawn)?;
    require_user_accepts_fee(
        prices.get_total_usd_value(&totals.coll_fee)?,
        prices.get_total_usd_value(&totals.total_coll_drawn)?,
        max_fee_percentage,
    )?;
    totals.coll_to_send_to_redeemer = totals.total_coll_drawn.clone();
    sub_amounts(&mut totals.coll_to_send_to_redeemer, &totals.coll_fee)?;

    let storage = &mut ledger.pool_state.storage;
    storage.subtract_value(&debt_token, false, PoolType::Active, totals.total_debt_to_redeem)?;
    storage.subtract_values(&totals.total_coll_drawn, true, PoolType::Active)?;

    msg!("Redeemed {} for {}", totals.total_debt_to_redeem, redeemer);
    emit!(Redemption {
        debt_token,
        attempted_amount: amount,
        actual_amount: totals.total_debt_to_redeem,
        coll_sent: to_token_amounts(&totals.coll_to_send_to_redeemer),
        coll_fee: to_token_amounts(&totals.coll_fee),
    });
    Ok(totals)
}

fn redeem_collateral_from_trove(
    ledger: &mut Ledger,
    trove: &mut Trove,
    debt_token: &Pubkey,
    max_debt_amount: u64,
    prices: &PriceSnapshot,
) -> Result<SingleRedemptionValues> {
    let mut single_redemption = SingleRedemptionValues::default();
    let gas_token = ledger.config().gas_token;
    let gas_compensation = ledger.config().gas_compensation;

    // Determine the remaining amount (lot) to be redeemed, capped by the trove's debt minus the gas reserve
    let mut redeemable = amount_of(&trove.debt, debt_token);
    if *debt_token == gas_token {
        redeemable = redeemable.saturating_sub(gas_compensation);
    }
    single_redemption.debt_lot = cmp::min(max_debt_amount, redeemable);
    if single_redemption.debt_lot == 0 {
        return Ok(single_redemption);
    }

    // Draw collateral worth the lot, split by each token's share of the trove's value
    let lot_usd = prices.get_usd_value(debt_token, single_redemption.debt_lot)?;
    let coll_usd = prices.get_total_usd_value(&trove.coll)?;
    require!(coll_usd > 0, BorrowerOpsError::Calculation);
    for (token, amount) in &trove.coll {
        let share_usd = mul_div(lot_usd, prices.get_usd_value(token, *amount)?, coll_usd)
            .ok_or(BorrowerOpsError::Calculation)?;
        let coll_lot = cmp::min(prices.get_amount_from_usd_value(token, share_usd)?, *amount);
        if coll_lot > 0 {
            single_redemption.coll_lot.insert(*token, coll_lot);
        }
    }

    let mut new_debt = trove.debt.clone();
    sub_amounts(&mut new_debt, &TokenMap::from([(*debt_token, single_redemption.debt_lot)]))?;
    let mut new_coll = trove.coll.clone();
    sub_amounts(&mut new_coll, &single_redemption.coll_lot)?;
    let new_net_debt = ledger.pool_state.get_net_debt(&new_debt)?;

    if new_net_debt.is_empty() {
        // No debt left in the Trove (except for the gas reserve), therefore the trove gets closed
        trove.remove_stake(&mut ledger.pool_state)?;
        ledger.remove_trove_owner(trove)?;
        ledger.sorted_troves.remove(&trove.borrower)?;
        trove.close_trove(TroveStatus::ClosedByRedemption)?;
        redeem_close_trove(ledger, trove, &new_coll)?;
        single_redemption.gas_to_burn = gas_compensation;

        emit!(TroveUpdated {
            borrower: trove.borrower,
            debt: vec![],
            coll: vec![],
            stake: vec![],
            operation: Operation::RedeemCollateral
        });
    } else {
        if prices.get_total_usd_value(&new_net_debt)? < ledger.config().min_net_debt {
            single_redemption.cancelled_partial = true;
            return Ok(single_redemption);
        }

        let new_nicr = get_nominal_icr_of(&new_coll, &new_debt)?;
        ledger.sorted_troves.re_insert(
            trove.borrower,
            new_nicr,
            Pubkey::default(),
            Pubkey::default(),
        )?;

        trove.coll = new_coll;
        trove.debt = new_debt;
        let stake = trove.update_stake_and_total_stakes(&mut ledger.pool_state)?;

        emit!(TroveUpdated {
            borrower: trove.borrower,
            debt: to_token_amounts(&trove.debt),
            coll: to_token_amounts(&trove.coll),
            stake: to_token_amounts(&stake),
            operation: Operation::RedeemCollateral
        });
    }

    Ok(single_redemption)
}

/// Burns the gas reserve and moves what collateral is left to the borrower's surplus.
fn redeem_close_trove(ledger: &mut Ledger, trove: &mut Trove, coll: &TokenMap) -> Result<()> {
    let gas_token = ledger.config().gas_token;
    let gas_compensation = ledger.config().gas_compensation;
    let pool_state = &mut ledger.pool_state;
    pool_state
        .storage
        .subtract_value(&gas_token, false, PoolType::Active, gas_compensation)?;
    pool_state.storage.subtract_value(
        &gas_token,
        false,
        PoolType::GasCompensation,
        gas_compensation,
    )?;

    pool_state.storage.subtract_values(coll, true, PoolType::Active)?;
    pool_state.increase_total_surplus(coll)?;
    trove.account_surplus(coll)
}
