use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use ethnum::U256;

use crate::errors::BorrowerOpsError;

/// Running sum `S` of collateral gain per unit deposited, one per collateral token,
/// for a single (epoch, scale) pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpochScale {
    pub sum: BTreeMap<Pubkey, U256>,
}

impl EpochScale {
    pub fn get_sum(&self, token: &Pubkey) -> U256 {
        self.sum.get(token).copied().unwrap_or(U256::ZERO)
    }

    pub fn add_marginal_gain(&mut self, token: &Pubkey, marginal_coll_gain: U256) -> Result<U256> {
        let new_s = self
            .get_sum(token)
            .checked_add(marginal_coll_gain)
            .ok_or(BorrowerOpsError::Calculation)?;
        self.sum.insert(*token, new_s);
        Ok(new_s)
    }
}
