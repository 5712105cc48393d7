use std::collections::BTreeMap;

use anchor_lang::prelude::*;

use crate::{
    constants::DECIMAL_PRECISION,
    errors::BorrowerOpsError,
    events::{SurplusPoolCollBalanceUpdated, SurplusPoolCollSent, TotalStakesUpdated, TroveSnapshotsUpdated},
    math::{compute_cr, compute_nominal_cr, mul_div, mul_div_u64},
};

use super::{add_amounts, amount_of, sub_amounts, sum_amounts, PoolState, PriceSnapshot, TokenMap};

/// Accumulator values keyed by `(stake_token, reward_token)`.
pub type RewardMap = BTreeMap<(Pubkey, Pubkey), u128>;

#[derive(AnchorSerialize, AnchorDeserialize, Copy, Clone, PartialEq, Eq, Default, Debug)]
pub enum TroveStatus {
    #[default]
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidationNormal,
    ClosedByLiquidationRecovery,
    ClosedByRedemption,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trove {
    pub borrower: Pubkey,
    pub status: TroveStatus,
    pub array_index: u64,
    pub coll: TokenMap,
    pub debt: TokenMap,
    pub stake: TokenMap,
    pub snapshot_coll_reward: RewardMap,
    pub snapshot_debt_reward: RewardMap,
    pub surplus_balance: TokenMap,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntireDebtAndColl {
    pub debt: TokenMap,
    pub coll: TokenMap,
    pub pending_debt_reward: TokenMap,
    pub pending_coll_reward: TokenMap,
}

impl Trove {
    pub fn init(&mut self, borrower: Pubkey, coll: TokenMap, debt: TokenMap) {
        self.borrower = borrower;
        self.coll = coll;
        self.debt = debt;
        self.status = TroveStatus::Active;
        self.stake = TokenMap::new();
        self.snapshot_coll_reward = RewardMap::new();
        self.snapshot_debt_reward = RewardMap::new();
    }

    pub fn require_trove_not_active(&self) -> Result<()> {
        require!(
            self.status != TroveStatus::Active,
            BorrowerOpsError::TroveIsActive
        );
        Ok(())
    }

    pub fn require_trove_active(&self) -> Result<()> {
        if self.status != TroveStatus::Active {
            return Err(error!(BorrowerOpsError::TroveIsNotActive)
                .with_pubkeys((self.borrower, self.borrower)));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == TroveStatus::Active
    }

    pub fn get_new_trove_amounts(
        &self,
        coll_change: &TokenMap,
        is_coll_increase: bool,
        debt_change: &TokenMap,
        is_debt_increase: bool,
    ) -> Result<(TokenMap, TokenMap)> {
        let mut new_coll = self.coll.clone();
        if is_coll_increase {
            add_amounts(&mut new_coll, coll_change)?;
        } else {
            for (token, amount) in coll_change {
                require!(
                    *amount <= amount_of(&self.coll, token),
                    BorrowerOpsError::CollateralWithdrawExceedBalance
                );
            }
            sub_amounts(&mut new_coll, coll_change)?;
        }

        let mut new_debt = self.debt.clone();
        if is_debt_increase {
            add_amounts(&mut new_debt, debt_change)?;
        } else {
            for (token, amount) in debt_change {
                require!(
                    *amount <= amount_of(&self.debt, token),
                    BorrowerOpsError::InvalidRepayment
                );
            }
            sub_amounts(&mut new_debt, debt_change)?;
        }
        Ok((new_coll, new_debt))
    }

    pub fn get_icr(&self, prices: &PriceSnapshot) -> Result<u128> {
        get_icr_of(&self.coll, &self.debt, prices)
    }

    /// Initial stake: coll * total_stakes_snapshot / total_coll_snapshot, per collateral token.
    /// With no stake of `token` left (its last staker was liquidated) the stake is the coll itself.
    pub fn compute_new_stake(&self, pool_state: &PoolState, token: &Pubkey, coll: u64) -> Result<u64> {
        let total_coll_snapshot = amount_of(&pool_state.total_coll_snapshot, token);
        let total_stakes_snapshot = amount_of(&pool_state.total_stakes_snapshot, token);
        if total_coll_snapshot == 0 || total_stakes_snapshot == 0 {
            return Ok(coll);
        }
        let stake = mul_div_u64(coll, total_stakes_snapshot.into(), total_coll_snapshot.into())
            .ok_or(BorrowerOpsError::Calculation)?;
        Ok(stake)
    }

    fn get_pending_reward(&self, l_terms: &RewardMap, snapshots: &RewardMap) -> Result<TokenMap> {
        let mut pending = TokenMap::new();
        if self.status != TroveStatus::Active {
            return Ok(pending);
        }
        for ((stake_token, token), l) in l_terms {
            let stake = amount_of(&self.stake, stake_token);
            if stake == 0 {
                continue;
            }
            let snapshot = snapshots.get(&(*stake_token, *token)).copied().unwrap_or(0);
            let reward_per_unit_staked = l
                .checked_sub(snapshot)
                .ok_or(BorrowerOpsError::Calculation)?;
            if reward_per_unit_staked == 0 {
                continue;
            }
            let reward = mul_div_u64(stake, reward_per_unit_staked, DECIMAL_PRECISION)
                .ok_or(BorrowerOpsError::Calculation)?;
            add_amounts(&mut pending, &TokenMap::from([(*token, reward)]))?;
        }
        Ok(pending)
    }

    pub fn get_pending_coll_reward(&self, pool_state: &PoolState) -> Result<TokenMap> {
        self.get_pending_reward(&pool_state.l_coll, &self.snapshot_coll_reward)
    }

    pub fn get_pending_debt_reward(&self, pool_state: &PoolState) -> Result<TokenMap> {
        self.get_pending_reward(&pool_state.l_debt, &self.snapshot_debt_reward)
    }

    pub fn has_pending_rewards(&self, pool_state: &PoolState) -> bool {
        if self.status != TroveStatus::Active {
            return false;
        }
        let behind = |l_terms: &RewardMap, snapshots: &RewardMap| {
            l_terms.iter().any(|((stake_token, token), l)| {
                amount_of(&self.stake, stake_token) > 0
                    && snapshots.get(&(*stake_token, *token)).copied().unwrap_or(0) < *l
            })
        };
        behind(&pool_state.l_coll, &self.snapshot_coll_reward)
            || behind(&pool_state.l_debt, &self.snapshot_debt_reward)
    }

    pub fn get_entire_debt_coll(&self, pool_state: &PoolState) -> Result<EntireDebtAndColl> {
        let pending_debt_reward = self.get_pending_debt_reward(pool_state)?;
        let pending_coll_reward = self.get_pending_coll_reward(pool_state)?;

        let mut debt = self.debt.clone();
        let mut coll = self.coll.clone();
        add_amounts(&mut debt, &pending_debt_reward)?;
        add_amounts(&mut coll, &pending_coll_reward)?;
        Ok(EntireDebtAndColl {
            debt,
            coll,
            pending_debt_reward,
            pending_coll_reward,
        })
    }

    pub fn get_current_amounts(&self, pool_state: &PoolState) -> Result<(TokenMap, TokenMap)> {
        let entire = self.get_entire_debt_coll(pool_state)?;
        Ok((entire.coll, entire.debt))
    }

    pub fn get_nominal_icr(&self, pool_state: &PoolState) -> Result<u128> {
        let (current_coll, current_debt) = self.get_current_amounts(pool_state)?;
        get_nominal_icr_of(&current_coll, &current_debt)
    }

    pub fn get_current_icr(&self, pool_state: &PoolState, prices: &PriceSnapshot) -> Result<u128> {
        let (current_coll, current_debt) = self.get_current_amounts(pool_state)?;
        get_icr_of(&current_coll, &current_debt, prices)
    }

    pub fn close_trove(&mut self, closed_status: TroveStatus) -> Result<()> {
        require!(
            closed_status != TroveStatus::NonExistent && closed_status != TroveStatus::Active,
            BorrowerOpsError::Calculation
        );
        self.status = closed_status;
        self.coll = TokenMap::new();
        self.debt = TokenMap::new();
        self.snapshot_coll_reward = RewardMap::new();
        self.snapshot_debt_reward = RewardMap::new();
        Ok(())
    }

    pub fn update_reward_snapshot(&mut self, pool_state: &PoolState) {
        self.snapshot_coll_reward = pool_state.l_coll.clone();
        self.snapshot_debt_reward = pool_state.l_debt.clone();
        emit!(TroveSnapshotsUpdated {
            borrower: self.borrower,
        });
    }

    pub fn update_stake_and_total_stakes(&mut self, pool_state: &mut PoolState) -> Result<TokenMap> {
        let mut tokens: Vec<Pubkey> = self.stake.keys().copied().collect();
        tokens.extend(self.coll.keys().filter(|token| !self.stake.contains_key(*token)));

        for token in tokens {
            let new_stake = self.compute_new_stake(pool_state, &token, amount_of(&self.coll, &token))?;
            let old_stake = amount_of(&self.stake, &token);
            let total_stakes = amount_of(&pool_state.total_stakes, &token)
                .checked_sub(old_stake)
                .and_then(|total| total.checked_add(new_stake))
                .ok_or(BorrowerOpsError::Calculation)?;
            pool_state.total_stakes.insert(token, total_stakes);
            if new_stake == 0 {
                self.stake.remove(&token);
            } else {
                self.stake.insert(token, new_stake);
            }

            emit!(TotalStakesUpdated {
                token,
                new_total_stakes: total_stakes
            });
        }
        Ok(self.stake.clone())
    }

    pub fn remove_stake(&mut self, pool_state: &mut PoolState) -> Result<()> {
        for (token, stake) in &self.stake {
            let total_stakes = amount_of(&pool_state.total_stakes, token)
                .checked_sub(*stake)
                .ok_or(BorrowerOpsError::Calculation)?;
            pool_state.total_stakes.insert(*token, total_stakes);
            emit!(TotalStakesUpdated {
                token: *token,
                new_total_stakes: total_stakes
            });
        }
        self.stake = TokenMap::new();
        Ok(())
    }

    pub fn account_surplus(&mut self, amounts: &TokenMap) -> Result<()> {
        add_amounts(&mut self.surplus_balance, amounts)?;
        for token in amounts.keys() {
            emit!(SurplusPoolCollBalanceUpdated {
                account: self.borrower,
                token: *token,
                new_balance: amount_of(&self.surplus_balance, token)
            });
        }
        Ok(())
    }

    pub fn clear_surplus(&mut self) -> TokenMap {
        let amount = std::mem::take(&mut self.surplus_balance);

        emit!(SurplusPoolCollSent {
            amount: super::to_token_amounts(&amount),
            to: self.borrower
        });
        amount
    }
}

pub fn get_icr_of(coll: &TokenMap, debt: &TokenMap, prices: &PriceSnapshot) -> Result<u128> {
    let coll_usd = prices.get_total_usd_value(coll)?;
    let debt_usd = prices.get_total_usd_value(debt)?;
    let icr = compute_cr(coll_usd, debt_usd).ok_or(BorrowerOpsError::Calculation)?;
    Ok(icr)
}

/// Price independent ratio used as the sort key.
pub fn get_nominal_icr_of(coll: &TokenMap, debt: &TokenMap) -> Result<u128> {
    let nicr = compute_nominal_cr(sum_amounts(coll)?, sum_amounts(debt)?)
        .ok_or(BorrowerOpsError::Calculation)?;
    Ok(nicr)
}

/// Splits `amount` pro rata over `weights`; the last bucket takes the rounding remainder.
pub fn split_by_weights<K: Copy>(amount: u64, weights: &[(K, u128)]) -> Result<Vec<(K, u64)>> {
    let total_weight = weights
        .iter()
        .try_fold(0u128, |acc, (_, weight)| acc.checked_add(*weight))
        .ok_or(BorrowerOpsError::Calculation)?;
    require!(total_weight > 0, BorrowerOpsError::Calculation);

    let mut shares = Vec::with_capacity(weights.len());
    let mut remaining = amount;
    for (i, (token, weight)) in weights.iter().enumerate() {
        let share = if i + 1 == weights.len() {
            remaining
        } else {
            let share = mul_div(amount.into(), *weight, total_weight)
                .and_then(|share| u64::try_from(share).ok())
                .ok_or(BorrowerOpsError::Calculation)?;
            remaining = remaining
                .checked_sub(share)
                .ok_or(BorrowerOpsError::Calculation)?;
            share
        };
        shares.push((*token, share));
    }
    Ok(shares)
}
