use anchor_lang::prelude::*;

use crate::{
    events::{Operation, TroveUpdated},
    state::{to_token_map, Ledger, PoolType, PriceSnapshot, TokenAmount, TokenMap, TroveStatus},
    utils::require_sufficient_debt_token_balance,
};

/// Returns the collateral released to the borrower.
pub fn close_trove_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    borrower: Pubkey,
    debt_token_balance: &[TokenAmount],
) -> Result<TokenMap> {
    let debt_token_balance = to_token_map(debt_token_balance)?;

    let mut trove = ledger.take_trove(&borrower);
    trove.require_trove_active()?;
    ledger.require_more_than_one_trove_in_system()?;
    ledger.pool_state.require_not_in_recovery_mode(prices)?;

    ledger.pool_state.apply_pending_reward(&mut trove)?;

    let coll = trove.coll.clone();
    let debt = trove.debt.clone();

    // the gas reserve is burned from the pool, the borrower repays the rest
    let net_debt = ledger.pool_state.get_net_debt(&debt)?;
    require_sufficient_debt_token_balance(&debt_token_balance, &net_debt)?;

    let new_tcr = ledger
        .pool_state
        .get_new_tcr_from_trove_change(&coll, false, &debt, false, prices)?;
    ledger.pool_state.require_new_tcr_is_above_ccr(new_tcr)?;

    // Remove stake
    trove.remove_stake(&mut ledger.pool_state)?;

    ledger.remove_trove_owner(&trove)?;
    ledger.sorted_troves.remove(&borrower)?;

    // Update trove data
    trove.close_trove(TroveStatus::ClosedByOwner)?;

    // Update pool state
    let gas_token = ledger.config().gas_token;
    let gas_compensation = ledger.config().gas_compensation;
    let storage = &mut ledger.pool_state.storage;
    storage.subtract_values(&debt, false, PoolType::Active)?;
    storage.subtract_values(&coll, true, PoolType::Active)?;
    storage.subtract_value(&gas_token, false, PoolType::GasCompensation, gas_compensation)?;

    emit!(TroveUpdated {
        borrower,
        debt: vec![],
        coll: vec![],
        stake: vec![],
        operation: Operation::CloseTrove
    });

    ledger.put_trove(trove);
    Ok(coll)
}
