use std::collections::BTreeMap;

use anchor_lang::prelude::*;

use crate::{
    constants::DECIMAL_PRECISION,
    errors::{BorrowerOpsError, StabilityPoolError},
    events::{LTermsUpdated, SystemSnapshotsUpdated},
    math::{compute_cr, mul_div, mul_div_u64},
};

use super::{
    add_amounts, amount_of, split_by_weights, sub_amounts, LiquidationTotals, LiquidationValues,
    PoolType, PriceOracle, PriceSnapshot, ProtocolConfig, RewardMap, StabilityPoolState,
    StoragePool, TokenMap, Trove,
};

#[derive(Clone, Debug, Default)]
pub struct PoolState {
    pub config: ProtocolConfig,
    pub storage: StoragePool,

    // for redistribution rewards calculation
    pub total_stakes: TokenMap,
    pub total_stakes_snapshot: TokenMap,
    pub total_coll_snapshot: TokenMap,
    pub l_coll: RewardMap,
    pub l_debt: RewardMap,
    pub last_coll_error_redistribution: RewardMap,
    pub last_debt_error_redistribution: RewardMap,

    // CollSurplus pool
    pub total_surplus: TokenMap,
}

impl PoolState {
    pub fn init(config: ProtocolConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn require_at_least_min_net_debt(&self, net_debt: &TokenMap, prices: &PriceSnapshot) -> Result<()> {
        let net_debt_usd = prices.get_total_usd_value(net_debt)?;
        require_gte!(
            net_debt_usd,
            self.config.min_net_debt,
            BorrowerOpsError::DebtLessThanMin
        );
        Ok(())
    }

    pub fn require_not_in_recovery_mode(&self, prices: &PriceSnapshot) -> Result<()> {
        require!(
            !self.check_recovery_mode(prices)?,
            BorrowerOpsError::InRecoveryMode
        );
        Ok(())
    }

    pub fn require_icr_is_above_mcr(&self, new_icr: u128) -> Result<()> {
        require!(new_icr >= self.config.mcr, BorrowerOpsError::ICRLowerThanMCR);
        Ok(())
    }

    pub fn require_icr_is_above_ccr(&self, new_icr: u128) -> Result<()> {
        require!(new_icr >= self.config.ccr, BorrowerOpsError::ICRLowerThanCCR);
        Ok(())
    }

    pub fn require_new_tcr_is_above_ccr(&self, new_tcr: u128) -> Result<()> {
        require!(new_tcr >= self.config.ccr, BorrowerOpsError::TCRLowerThanCCR);
        Ok(())
    }

    pub fn require_tcr_over_mcr(&self, prices: &PriceSnapshot) -> Result<()> {
        require!(
            self.get_tcr(prices)? >= self.config.mcr,
            BorrowerOpsError::TCRUnderMCR
        );
        Ok(())
    }

    /// Repayment may not dig into the gas reserve carried in the gas token.
    pub fn require_valid_repayment(&self, current_debt: &TokenMap, repayment: &TokenMap) -> Result<()> {
        for (token, amount) in repayment {
            let mut repayable = amount_of(current_debt, token);
            if *token == self.config.gas_token {
                repayable = repayable.saturating_sub(self.config.gas_compensation);
            }
            require!(*amount <= repayable, BorrowerOpsError::InvalidRepayment);
        }
        Ok(())
    }

    pub fn get_composite_debt(&self, debt: &TokenMap) -> Result<TokenMap> {
        let mut composite_debt = debt.clone();
        add_amounts(
            &mut composite_debt,
            &TokenMap::from([(self.config.gas_token, self.config.gas_compensation)]),
        )?;
        Ok(composite_debt)
    }

    pub fn get_net_debt(&self, debt: &TokenMap) -> Result<TokenMap> {
        let mut net_debt = debt.clone();
        sub_amounts(
            &mut net_debt,
            &TokenMap::from([(self.config.gas_token, self.config.gas_compensation)]),
        )?;
        Ok(net_debt)
    }

    pub fn get_coll_gas_compensation(&self, entire_coll: &TokenMap) -> TokenMap {
        entire_coll
            .iter()
            .map(|(token, amount)| (*token, amount / self.config.coll_gas_comp_percent_divisor))
            .filter(|(_, amount)| *amount > 0)
            .collect()
    }

    pub fn get_entire_system_coll(&self) -> Result<TokenMap> {
        self.get_entire_system_value(&self.config.collateral_tokens, true)
    }

    pub fn get_entire_system_debt(&self) -> Result<TokenMap> {
        self.get_entire_system_value(&self.config.debt_tokens, false)
    }

    fn get_entire_system_value(&self, tokens: &[Pubkey], is_coll: bool) -> Result<TokenMap> {
        let mut values = TokenMap::new();
        for token in tokens {
            let value = self.storage.get_entire_value(token, is_coll)?;
            if value > 0 {
                values.insert(*token, value);
            }
        }
        Ok(values)
    }

    pub fn get_tcr(&self, prices: &PriceSnapshot) -> Result<u128> {
        let entire_coll = prices.get_total_usd_value(&self.get_entire_system_coll()?)?;
        let entire_debt = prices.get_total_usd_value(&self.get_entire_system_debt()?)?;
        let tcr = compute_cr(entire_coll, entire_debt).ok_or(BorrowerOpsError::Calculation)?;
        Ok(tcr)
    }

    pub fn check_recovery_mode(&self, prices: &PriceSnapshot) -> Result<bool> {
        let tcr = self.get_tcr(prices)?;
        Ok(tcr < self.config.ccr)
    }

    pub fn get_new_tcr_from_trove_change(
        &self,
        coll_change: &TokenMap,
        is_coll_increase: bool,
        debt_change: &TokenMap,
        is_debt_increase: bool,
        prices: &PriceSnapshot,
    ) -> Result<u128> {
        let mut total_coll = self.get_entire_system_coll()?;
        let mut total_debt = self.get_entire_system_debt()?;

        if is_coll_increase {
            add_amounts(&mut total_coll, coll_change)?;
        } else {
            sub_amounts(&mut total_coll, coll_change)?;
        }
        if is_debt_increase {
            add_amounts(&mut total_debt, debt_change)?;
        } else {
            sub_amounts(&mut total_debt, debt_change)?;
        }

        let coll_usd = prices.get_total_usd_value(&total_coll)?;
        let debt_usd = prices.get_total_usd_value(&total_debt)?;
        let tcr = compute_cr(coll_usd, debt_usd).ok_or(BorrowerOpsError::Calculation)?;
        Ok(tcr)
    }

    /// Recovery mode liquidation of a trove with MCR <= ICR < TCR: only collateral worth
    /// `debt * MCR` leaves the trove, the rest becomes claimable surplus.
    pub fn get_capped_offset_vals(
        &self,
        entire_trove_debt: &TokenMap,
        entire_trove_coll: &TokenMap,
        icr: u128,
        prices: &PriceSnapshot,
    ) -> Result<LiquidationValues> {
        let mut single_liquidation = LiquidationValues {
            entire_trove_debt: entire_trove_debt.clone(),
            entire_trove_coll: entire_trove_coll.clone(),
            ..Default::default()
        };

        let mut capped_coll_portion = TokenMap::new();
        for (token, amount) in entire_trove_coll {
            let capped = mul_div_u64(*amount, self.config.mcr, icr)
                .ok_or(BorrowerOpsError::Calculation)?;
            capped_coll_portion.insert(*token, std::cmp::min(capped, *amount));
        }

        single_liquidation.coll_gas_compensation = self.get_coll_gas_compensation(&capped_coll_portion);
        single_liquidation.debt_gas_compensation = self.config.gas_compensation;
        single_liquidation.debt_to_offset = entire_trove_debt.clone();

        let mut coll_to_offset = capped_coll_portion.clone();
        sub_amounts(&mut coll_to_offset, &single_liquidation.coll_gas_compensation)?;
        let dust = single_liquidation.send_coll_to_stability_pools(&coll_to_offset, prices)?;

        let mut coll_surplus = entire_trove_coll.clone();
        sub_amounts(&mut coll_surplus, &capped_coll_portion)?;
        add_amounts(&mut coll_surplus, &dust)?;
        single_liquidation.coll_surplus = coll_surplus;
        Ok(single_liquidation)
    }

    pub fn increase_total_surplus(&mut self, amounts: &TokenMap) -> Result<()> {
        add_amounts(&mut self.total_surplus, amounts)
    }

    pub fn decrease_total_surplus(&mut self, amounts: &TokenMap) -> Result<()> {
        sub_amounts(&mut self.total_surplus, amounts)
    }

    pub fn move_pending_trove_rewards_to_active(&mut self, debt: &TokenMap, coll: &TokenMap) -> Result<()> {
        self.storage
            .transfer_values(debt, false, PoolType::Default, PoolType::Active)?;
        self.storage
            .transfer_values(coll, true, PoolType::Default, PoolType::Active)
    }

    pub fn move_coll_debt_from_liquidate(
        &mut self,
        sp_states: &mut BTreeMap<Pubkey, StabilityPoolState>,
        totals: &LiquidationTotals,
    ) -> Result<()> {
        self.storage.subtract_values(
            &totals.total_coll_gas_compensation,
            true,
            PoolType::Active,
        )?;
        self.storage.subtract_value(
            &self.config.gas_token,
            false,
            PoolType::GasCompensation,
            totals.total_debt_gas_compensation,
        )?;

        // offset debt is burned, the matching collateral leaves the buckets for the pools
        self.storage
            .subtract_values(&totals.total_debt_to_offset, false, PoolType::Active)?;
        for (debt_token, amount) in &totals.total_debt_to_offset {
            let coll = totals
                .total_coll_to_send_to_sp
                .get(debt_token)
                .cloned()
                .unwrap_or_default();
            self.storage.subtract_values(&coll, true, PoolType::Active)?;
            let sp_state = sp_states
                .get_mut(debt_token)
                .ok_or(StabilityPoolError::UnknownPool)?;
            sp_state.offset(*amount, &coll)?;
        }
        Ok(())
    }

    pub fn apply_pending_reward(&mut self, trove: &mut Trove) -> Result<()> {
        if trove.has_pending_rewards(self) {
            trove.require_trove_active()?;

            let pending_coll_reward = trove.get_pending_coll_reward(self)?;
            let pending_debt_reward = trove.get_pending_debt_reward(self)?;

            add_amounts(&mut trove.coll, &pending_coll_reward)?;
            add_amounts(&mut trove.debt, &pending_debt_reward)?;

            trove.update_reward_snapshot(self);

            self.move_pending_trove_rewards_to_active(&pending_debt_reward, &pending_coll_reward)?;
        }
        Ok(())
    }

    /// Stake tokens eligible to receive a redistribution, with their bucket weights.
    fn get_redistribution_weights(&self, coll: &TokenMap, prices: &PriceSnapshot) -> Result<Vec<(Pubkey, u128)>> {
        let stake_tokens: Vec<Pubkey> = self
            .config
            .collateral_tokens
            .iter()
            .filter(|token| amount_of(&self.total_stakes, token) > 0)
            .copied()
            .collect();
        require!(!stake_tokens.is_empty(), BorrowerOpsError::OnlyOneTrove);

        let mut weights = Vec::with_capacity(stake_tokens.len());
        for token in &stake_tokens {
            weights.push((*token, prices.get_usd_value(token, amount_of(coll, token))?));
        }
        if weights.iter().all(|(_, weight)| *weight == 0) {
            // Redistributed collateral is only held in tokens nobody stakes
            weights.clear();
            for token in &stake_tokens {
                let active = self.storage.get_value(token, true, PoolType::Active);
                weights.push((*token, prices.get_usd_value(token, active)?));
            }
        }
        if weights.iter().all(|(_, weight)| *weight == 0) {
            weights = stake_tokens
                .iter()
                .map(|token| (*token, amount_of(&self.total_stakes, token) as u128))
                .collect();
        }
        Ok(weights)
    }

    fn distribute_reward_per_unit_staked(
        &mut self,
        token: &Pubkey,
        amount: u64,
        weights: &[(Pubkey, u128)],
        is_coll: bool,
    ) -> Result<()> {
        for (stake_token, share) in split_by_weights(amount, weights)? {
            if share == 0 {
                continue;
            }
            let key = (stake_token, *token);
            let total_stakes = amount_of(&self.total_stakes, &stake_token) as u128;
            let (l_terms, last_errors) = if is_coll {
                (&mut self.l_coll, &mut self.last_coll_error_redistribution)
            } else {
                (&mut self.l_debt, &mut self.last_debt_error_redistribution)
            };

            let numerator = (share as u128)
                .checked_mul(DECIMAL_PRECISION)
                .and_then(|n| n.checked_add(last_errors.get(&key).copied().unwrap_or(0)))
                .ok_or(BorrowerOpsError::Calculation)?;
            let reward_per_unit_staked = numerator
                .checked_div(total_stakes)
                .ok_or(BorrowerOpsError::Calculation)?;
            let error = numerator
                .checked_sub(
                    mul_div(reward_per_unit_staked, total_stakes, 1)
                        .ok_or(BorrowerOpsError::Calculation)?,
                )
                .ok_or(BorrowerOpsError::Calculation)?;
            last_errors.insert(key, error);

            let l = l_terms.entry(key).or_insert(0);
            *l = l
                .checked_add(reward_per_unit_staked)
                .ok_or(BorrowerOpsError::Calculation)?;

            emit!(LTermsUpdated {
                stake_token,
                token: *token,
                l_coll: self.l_coll.get(&key).copied().unwrap_or(0),
                l_debt: self.l_debt.get(&key).copied().unwrap_or(0),
            });
        }
        Ok(())
    }

    pub fn redistribute_debt_and_coll(
        &mut self,
        debt: &TokenMap,
        coll: &TokenMap,
        prices: &PriceSnapshot,
    ) -> Result<()> {
        if debt.values().all(|amount| *amount == 0) && coll.values().all(|amount| *amount == 0) {
            return Ok(());
        }
        let weights = self.get_redistribution_weights(coll, prices)?;

        for (token, amount) in coll {
            self.distribute_reward_per_unit_staked(token, *amount, &weights, true)?;
        }
        for (token, amount) in debt {
            self.distribute_reward_per_unit_staked(token, *amount, &weights, false)?;
        }

        self.storage
            .transfer_values(debt, false, PoolType::Active, PoolType::Default)?;
        self.storage
            .transfer_values(coll, true, PoolType::Active, PoolType::Default)
    }

    /// Refreshed after every liquidation sequence, once collateral has left the system.
    pub fn update_system_snapshots(&mut self) -> Result<()> {
        for token in self.config.collateral_tokens.clone() {
            let total_stakes = amount_of(&self.total_stakes, &token);
            let total_coll = self.storage.get_entire_value(&token, true)?;
            self.total_stakes_snapshot.insert(token, total_stakes);
            self.total_coll_snapshot.insert(token, total_coll);

            emit!(SystemSnapshotsUpdated {
                token,
                total_stakes_snapshot: total_stakes,
                total_coll_snapshot: total_coll
            });
        }
        Ok(())
    }

    pub fn get_redemption_rate(&self) -> u128 {
        calc_redemption_rate(self.config.redemption_fee_floor)
    }

    pub fn get_redemption_fee(&self, coll_drawn: &TokenMap) -> Result<TokenMap> {
        calc_redemption_fee(self.get_redemption_rate(), coll_drawn)
    }
}

pub fn calc_redemption_rate(fee_floor: u128) -> u128 {
    std::cmp::min(fee_floor, DECIMAL_PRECISION)
}

pub fn calc_redemption_fee(redemption_rate: u128, coll_drawn: &TokenMap) -> Result<TokenMap> {
    let mut redemption_fee = TokenMap::new();
    let mut total_fee = 0u128;
    let mut total_drawn = 0u128;
    for (token, amount) in coll_drawn {
        let fee = mul_div_u64(*amount, redemption_rate, DECIMAL_PRECISION)
            .ok_or(BorrowerOpsError::Calculation)?;
        total_fee += fee as u128;
        total_drawn += *amount as u128;
        if fee > 0 {
            redemption_fee.insert(*token, fee);
        }
    }

    require!(total_fee < total_drawn, BorrowerOpsError::FeeEatUpAllColl);
    Ok(redemption_fee)
}
