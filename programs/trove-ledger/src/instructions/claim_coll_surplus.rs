use anchor_lang::prelude::*;

use crate::{
    errors::BorrowerOpsError,
    state::{Ledger, TokenMap},
};

pub fn claim_coll_surplus_handler(ledger: &mut Ledger, borrower: Pubkey) -> Result<TokenMap> {
    let trove = match ledger.troves.get_mut(&borrower) {
        Some(trove) if !trove.surplus_balance.is_empty() => trove,
        _ => return Err(error!(BorrowerOpsError::NoCollSurplus).with_pubkeys((borrower, borrower))),
    };

    let amount_to_send = trove.clear_surplus();
    ledger.pool_state.decrease_total_surplus(&amount_to_send)?;
    Ok(amount_to_send)
}
