use std::collections::BTreeMap;

use anchor_lang::prelude::*;

use crate::{
    constants::DECIMAL_PRECISION,
    errors::{BorrowerOpsError, PriceFeedError},
    math::mul_div,
};

use super::{ProtocolConfig, TokenMap};

/// USD prices, 1e18 scaled per whole unit of the token's smallest denomination.
pub trait PriceOracle {
    fn get_price(&self, token: &Pubkey) -> Result<u128>;

    fn get_usd_value(&self, token: &Pubkey, amount: u64) -> Result<u128> {
        if amount == 0 {
            return Ok(0);
        }
        let price = self.get_price(token)?;
        let value = mul_div(amount.into(), price, DECIMAL_PRECISION)
            .ok_or(BorrowerOpsError::Calculation)?;
        Ok(value)
    }

    fn get_amount_from_usd_value(&self, token: &Pubkey, usd_value: u128) -> Result<u64> {
        let price = self.get_price(token)?;
        require!(price > 0, PriceFeedError::ZeroPrice);
        let amount = mul_div(usd_value, DECIMAL_PRECISION, price)
            .and_then(|amount| u64::try_from(amount).ok())
            .ok_or(BorrowerOpsError::Calculation)?;
        Ok(amount)
    }
}

/// In-memory feed for simulation and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticPriceFeed {
    prices: BTreeMap<Pubkey, u128>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, token: Pubkey, new_price: u128) {
        self.prices.insert(token, new_price);
    }

    /// Normalizes a feed answer with `decimals` decimals to 1e18.
    pub fn set_price_with_decimals(&mut self, token: Pubkey, answer: u128, decimals: u32) -> Result<u128> {
        let feed_precision = 10u128
            .checked_pow(decimals)
            .ok_or(BorrowerOpsError::Calculation)?;
        let price = mul_div(answer, DECIMAL_PRECISION, feed_precision)
            .ok_or(BorrowerOpsError::Calculation)?;
        self.set_price(token, price);
        Ok(price)
    }

    pub fn remove_price(&mut self, token: &Pubkey) {
        self.prices.remove(token);
    }
}

impl PriceOracle for StaticPriceFeed {
    fn get_price(&self, token: &Pubkey) -> Result<u128> {
        match self.prices.get(token) {
            Some(price) => Ok(*price),
            None => Err(error!(PriceFeedError::PriceUnavailable).with_pubkeys((*token, *token))),
        }
    }
}

/// Prices read once at the start of an operation, before any state is written.
#[derive(Clone, Debug, Default)]
pub struct PriceSnapshot {
    prices: BTreeMap<Pubkey, u128>,
}

impl PriceSnapshot {
    pub fn fetch<O: PriceOracle + ?Sized>(oracle: &O, config: &ProtocolConfig) -> Result<Self> {
        let mut prices = BTreeMap::new();
        for token in config
            .collateral_tokens
            .iter()
            .chain(config.debt_tokens.iter())
        {
            if prices.contains_key(token) {
                continue;
            }
            let price = oracle.get_price(token)?;
            if price == 0 {
                msg!("PriceFeed: zero price for {}", token);
                return Err(error!(PriceFeedError::ZeroPrice).with_pubkeys((*token, *token)));
            }
            prices.insert(*token, price);
        }
        Ok(Self { prices })
    }

    pub fn get_total_usd_value(&self, amounts: &TokenMap) -> Result<u128> {
        let mut total = 0u128;
        for (token, amount) in amounts {
            total = total
                .checked_add(self.get_usd_value(token, *amount)?)
                .ok_or(BorrowerOpsError::Calculation)?;
        }
        Ok(total)
    }
}

impl PriceOracle for PriceSnapshot {
    fn get_price(&self, token: &Pubkey) -> Result<u128> {
        match self.prices.get(token) {
            Some(price) => Ok(*price),
            None => Err(error!(PriceFeedError::PriceUnavailable).with_pubkeys((*token, *token))),
        }
    }
}
