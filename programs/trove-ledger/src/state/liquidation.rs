use std::collections::BTreeMap;

use anchor_lang::prelude::*;

use crate::errors::BorrowerOpsError;

use super::{add_amounts, amount_of, split_by_weights, sub_amounts, PriceOracle, PriceSnapshot, TokenMap};

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct LiquidationTotals {
    pub total_coll_in_sequence: TokenMap,
    pub total_debt_in_sequence: TokenMap,
    pub total_coll_gas_compensation: TokenMap,
    pub total_debt_gas_compensation: u64,
    pub total_debt_to_offset: TokenMap,
    // keyed by the debt token of the receiving stability pool
    pub total_coll_to_send_to_sp: BTreeMap<Pubkey, TokenMap>,
    pub total_debt_to_redistribute: TokenMap,
    pub total_coll_to_redistribute: TokenMap,
    pub total_coll_surplus: TokenMap,
    pub liquidated_troves: u64,
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct LiquidationValues {
    pub entire_trove_debt: TokenMap,
    pub entire_trove_coll: TokenMap,
    pub coll_gas_compensation: TokenMap,
    pub debt_gas_compensation: u64,
    pub debt_to_offset: TokenMap,
    pub coll_to_send_to_sp: BTreeMap<Pubkey, TokenMap>,
    pub debt_to_redistribute: TokenMap,
    pub coll_to_redistribute: TokenMap,
    pub coll_surplus: TokenMap,
}

#[derive(Default, Clone, Debug)]
pub struct LocalVariablesLiquidationSequence {
    pub remaining_debt_in_stab_pools: TokenMap,
    pub icr: u128,
    pub tcr: u128,
    pub is_recovery_mode: bool,
}

impl LiquidationValues {
    pub fn offset_and_redistribute(
        &mut self,
        coll: &TokenMap,
        debt_in_stab_pools: &TokenMap,
        prices: &PriceSnapshot,
    ) -> Result<()> {
        let mut debt_to_offset = TokenMap::new();
        for (token, debt) in &self.entire_trove_debt {
            let offset = std::cmp::min(*debt, amount_of(debt_in_stab_pools, token));
            if offset > 0 {
                debt_to_offset.insert(*token, offset);
            }
        }

        let mut debt_to_redistribute = self.entire_trove_debt.clone();
        sub_amounts(&mut debt_to_redistribute, &debt_to_offset)?;

        self.debt_to_offset = debt_to_offset;
        self.debt_to_redistribute = debt_to_redistribute;
        self.coll_to_redistribute = self.send_coll_to_stability_pools(coll, prices)?;
        Ok(())
    }

    /// Credits each pool `d` with `coll * usd(debt_to_offset[d]) / usd(entire_trove_debt)`.
    /// Returns the collateral left for redistribution.
    pub fn send_coll_to_stability_pools(
        &mut self,
        coll: &TokenMap,
        prices: &PriceSnapshot,
    ) -> Result<TokenMap> {
        self.coll_to_send_to_sp = BTreeMap::new();
        if self.debt_to_offset.is_empty() {
            return Ok(coll.clone());
        }

        let entire_debt_usd = prices.get_total_usd_value(&self.entire_trove_debt)?;
        require!(entire_debt_usd > 0, BorrowerOpsError::Calculation);

        let mut weights: Vec<(Option<Pubkey>, u128)> = Vec::new();
        let mut offset_usd = 0u128;
        for (token, amount) in &self.debt_to_offset {
            let usd = prices.get_usd_value(token, *amount)?;
            offset_usd = offset_usd
                .checked_add(usd)
                .ok_or(BorrowerOpsError::Calculation)?;
            weights.push((Some(*token), usd));
        }
        let redistributed_usd = entire_debt_usd
            .checked_sub(offset_usd)
            .ok_or(BorrowerOpsError::Calculation)?;
        if redistributed_usd > 0 {
            weights.push((None, redistributed_usd));
        }

        let mut remainder = TokenMap::new();
        for (coll_token, amount) in coll {
            for (pool, share) in split_by_weights(*amount, &weights)? {
                let target = match pool {
                    Some(debt_token) => self.coll_to_send_to_sp.entry(debt_token).or_default(),
                    None => &mut remainder,
                };
                add_amounts(target, &TokenMap::from([(*coll_token, share)]))?;
            }
        }
        Ok(remainder)
    }

    pub fn total_coll_to_send_to_sp(&self) -> Result<TokenMap> {
        let mut total = TokenMap::new();
        for coll in self.coll_to_send_to_sp.values() {
            add_amounts(&mut total, coll)?;
        }
        Ok(total)
    }
}

impl LiquidationTotals {
    pub fn add_liquidation_values(&mut self, single_liquidation: &LiquidationValues) -> Result<()> {
        add_amounts(
            &mut self.total_coll_gas_compensation,
            &single_liquidation.coll_gas_compensation,
        )?;
        self.total_debt_gas_compensation = self
            .total_debt_gas_compensation
            .checked_add(single_liquidation.debt_gas_compensation)
            .ok_or(BorrowerOpsError::Calculation)?;
        add_amounts(
            &mut self.total_debt_in_sequence,
            &single_liquidation.entire_trove_debt,
        )?;
        add_amounts(
            &mut self.total_coll_in_sequence,
            &single_liquidation.entire_trove_coll,
        )?;
        add_amounts(
            &mut self.total_debt_to_offset,
            &single_liquidation.debt_to_offset,
        )?;
        for (debt_token, coll) in &single_liquidation.coll_to_send_to_sp {
            add_amounts(self.total_coll_to_send_to_sp.entry(*debt_token).or_default(), coll)?;
        }
        add_amounts(
            &mut self.total_debt_to_redistribute,
            &single_liquidation.debt_to_redistribute,
        )?;
        add_amounts(
            &mut self.total_coll_to_redistribute,
            &single_liquidation.coll_to_redistribute,
        )?;
        add_amounts(&mut self.total_coll_surplus, &single_liquidation.coll_surplus)?;
        self.liquidated_troves += 1;
        Ok(())
    }
}

impl LocalVariablesLiquidationSequence {
    pub fn update(&mut self, single_liquidation: &LiquidationValues) -> Result<()> {
        sub_amounts(
            &mut self.remaining_debt_in_stab_pools,
            &single_liquidation.debt_to_offset,
        )
    }
}
