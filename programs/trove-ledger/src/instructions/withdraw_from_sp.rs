use std::cmp::min;

use anchor_lang::prelude::*;

use crate::{
    errors::StabilityPoolError,
    instructions::update_deposit,
    state::{add_amounts, to_token_map, Ledger, PriceSnapshot, TokenAmount, TokenMap},
    utils::require_known_tokens,
};

/// Returns `(withdrawn, coll_gains)`. A zero entry only pays out the gain of that pool.
pub fn withdraw_from_sp_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    depositor: Pubkey,
    amounts: &[TokenAmount],
) -> Result<(TokenMap, TokenMap)> {
    let non_zero = to_token_map(amounts)?;
    let requested: TokenMap = amounts
        .iter()
        .map(|entry| (entry.token, entry.amount))
        .collect();
    require!(!requested.is_empty(), StabilityPoolError::ZeroAmount);
    require_known_tokens(&requested, &ledger.config().debt_tokens)?;

    if !non_zero.is_empty() {
        require_no_under_collateralized_troves(ledger, prices)?;
    }

    let mut withdrawn = TokenMap::new();
    let mut coll_gains = TokenMap::new();
    for (debt_token, amount) in &requested {
        let sp_state = ledger.stability_pool_mut(debt_token)?;
        let sp_deposit = sp_state.get_deposit(&depositor);
        sp_deposit.require_user_has_deposit()?;

        let compounded_deposit = sp_deposit.get_compounded_deposit(sp_state)?;
        let to_withdraw = min(*amount, compounded_deposit);

        let (_, coll_gain) = update_deposit(sp_state, depositor, to_withdraw, false)?;
        add_amounts(&mut withdrawn, &TokenMap::from([(*debt_token, to_withdraw)]))?;
        add_amounts(&mut coll_gains, &coll_gain)?;
    }

    Ok((withdrawn, coll_gains))
}

fn require_no_under_collateralized_troves(ledger: &Ledger, prices: &PriceSnapshot) -> Result<()> {
    let lowest = ledger.sorted_troves.get_last();
    if lowest == Pubkey::default() {
        return Ok(());
    }
    let icr = ledger
        .get_trove(&lowest)
        .get_current_icr(&ledger.pool_state, prices)?;
    let mcr = ledger.config().mcr;
    if icr < mcr {
        return Err(error!(StabilityPoolError::TroveUnderColl)
            .with_pubkeys((lowest, lowest))
            .with_values((icr, mcr)));
    }
    Ok(())
}
