use std::collections::BTreeSet;

use anchor_lang::prelude::*;

use crate::{
    constants::{
        DEFAULT_CCR, DEFAULT_COLL_GAS_COMP_PERCENT_DIVISOR, DEFAULT_HINT_WALK_LIMIT, DEFAULT_MCR,
        ONE_HUNDERED_PERCENT, REDEMPTION_FEE_FLOOR,
    },
    errors::ConfigError,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub mcr: u128,
    pub ccr: u128,
    /// USD value, in the units returned by `PriceOracle::get_usd_value`.
    pub min_net_debt: u128,
    /// Amount of `gas_token` reserved in every trove's debt.
    pub gas_compensation: u64,
    pub coll_gas_comp_percent_divisor: u64,
    pub gas_token: Pubkey,
    pub collateral_tokens: Vec<Pubkey>,
    pub debt_tokens: Vec<Pubkey>,
    pub redemption_fee_floor: u128,
    // 0 = unbounded
    pub max_troves: u64,
    pub hint_walk_limit: u64,
}

impl ProtocolConfig {
    pub fn default_with_tokens(
        collateral_tokens: Vec<Pubkey>,
        debt_tokens: Vec<Pubkey>,
        gas_token: Pubkey,
        min_net_debt: u128,
        gas_compensation: u64,
    ) -> Self {
        Self {
            mcr: DEFAULT_MCR,
            ccr: DEFAULT_CCR,
            min_net_debt,
            gas_compensation,
            coll_gas_comp_percent_divisor: DEFAULT_COLL_GAS_COMP_PERCENT_DIVISOR,
            gas_token,
            collateral_tokens,
            debt_tokens,
            redemption_fee_floor: REDEMPTION_FEE_FLOOR,
            max_troves: 0,
            hint_walk_limit: DEFAULT_HINT_WALK_LIMIT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require!(
            self.mcr > ONE_HUNDERED_PERCENT && self.ccr >= self.mcr,
            ConfigError::InvalidRatios
        );
        require!(
            self.coll_gas_comp_percent_divisor > 0,
            ConfigError::InvalidDivisor
        );
        require!(
            !self.collateral_tokens.is_empty() && !self.debt_tokens.is_empty(),
            ConfigError::EmptyTokenList
        );
        require!(
            self.debt_tokens.contains(&self.gas_token),
            ConfigError::GasTokenNotDebtToken
        );
        require_no_repeats(&self.collateral_tokens)?;
        require_no_repeats(&self.debt_tokens)?;
        require!(
            self.redemption_fee_floor <= ONE_HUNDERED_PERCENT,
            ConfigError::InvalidFeeFloor
        );
        Ok(())
    }
}

fn require_no_repeats(tokens: &[Pubkey]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for token in tokens {
        if !seen.insert(*token) {
            return Err(error!(ConfigError::TokenListedTwice).with_pubkeys((*token, *token)));
        }
    }
    Ok(())
}
