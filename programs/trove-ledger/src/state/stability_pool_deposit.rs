use std::collections::{BTreeMap, BTreeSet};

use anchor_lang::prelude::*;
use ethnum::U256;

use crate::{
    constants::{DECIMAL_PRECISION, SCALE_FACTOR},
    errors::{BorrowerOpsError, StabilityPoolError},
    events::DepositSnapshotUpdated,
};

use super::{EpochScale, StabilityPoolState, TokenMap};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StabilityPoolDeposit {
    pub initial_value: u64,
    pub snapshots_s: BTreeMap<Pubkey, U256>,
    pub snapshots_p: u128,
    pub snapshots_scale: u64,
    pub snapshots_epoch: u64,
}

impl StabilityPoolDeposit {
    pub fn get_depositor_coll_gain(
        &self,
        first_epoch_scale: &EpochScale,
        second_epoch_scale: &EpochScale,
    ) -> Result<TokenMap> {
        let mut coll_gain = TokenMap::new();
        if self.initial_value == 0 {
            return Ok(coll_gain);
        }

        // a token first credited after the scale change only shows up in the second sum
        let tokens: BTreeSet<&Pubkey> = first_epoch_scale
            .sum
            .keys()
            .chain(second_epoch_scale.sum.keys())
            .collect();
        for token in tokens {
            let snapshot_s = self.snapshots_s.get(token).copied().unwrap_or(U256::ZERO);
            let first_portion = first_epoch_scale
                .get_sum(token)
                .checked_sub(snapshot_s)
                .ok_or(BorrowerOpsError::Calculation)?;
            let second_portion = second_epoch_scale.get_sum(token) / U256::from(SCALE_FACTOR);

            let gain = U256::from(self.initial_value)
                .checked_mul(
                    first_portion
                        .checked_add(second_portion)
                        .ok_or(BorrowerOpsError::Calculation)?,
                )
                .ok_or(BorrowerOpsError::Calculation)?
                / U256::from(self.snapshots_p)
                / U256::from(DECIMAL_PRECISION);
            let gain = u64::try_from(gain).map_err(|_| BorrowerOpsError::Calculation)?;
            if gain > 0 {
                coll_gain.insert(*token, gain);
            }
        }
        Ok(coll_gain)
    }

    pub fn get_compounded_deposit(&self, sp_state: &StabilityPoolState) -> Result<u64> {
        if self.initial_value == 0 {
            return Ok(0);
        }

        // A deposit made before a pool-emptying event has been fully cancelled with debt
        if self.snapshots_epoch < sp_state.current_epoch {
            return Ok(0);
        }

        let scale_diff = sp_state
            .current_scale
            .checked_sub(self.snapshots_scale)
            .ok_or(BorrowerOpsError::Calculation)?;

        // More than one scale change means the deposit shrank by a factor of at least 1e-9
        let compounded_deposit = match scale_diff {
            0 => crate::math::mul_div(self.initial_value.into(), sp_state.p, self.snapshots_p),
            1 => crate::math::mul_div(self.initial_value.into(), sp_state.p, self.snapshots_p)
                .map(|deposit| deposit / SCALE_FACTOR),
            _ => Some(0),
        }
        .and_then(|deposit| u64::try_from(deposit).ok())
        .ok_or(BorrowerOpsError::Calculation)?;

        if compounded_deposit < self.initial_value / 1_000_000_000 {
            return Ok(0);
        }
        Ok(compounded_deposit)
    }

    pub fn require_user_has_deposit(&self) -> Result<()> {
        require!(self.initial_value > 0, StabilityPoolError::ZeroDeposit);
        Ok(())
    }

    pub fn update_deposit_and_snapshot(
        &mut self,
        sp_state: &StabilityPoolState,
        depositor: Pubkey,
        new_value: u64,
    ) {
        self.initial_value = new_value;
        if new_value == 0 {
            self.snapshots_p = 0;
            self.snapshots_s = BTreeMap::new();
            self.snapshots_scale = 0;
            self.snapshots_epoch = 0;
        } else {
            self.snapshots_p = sp_state.p;
            self.snapshots_s = sp_state.get_current_epoch_scale().sum;
            self.snapshots_scale = sp_state.current_scale;
            self.snapshots_epoch = sp_state.current_epoch;
        }
        emit!(DepositSnapshotUpdated {
            depositor,
            debt_token: sp_state.debt_token,
            p: self.snapshots_p,
            epoch: self.snapshots_epoch,
            scale: self.snapshots_scale,
        });
    }
}
