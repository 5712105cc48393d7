use std::collections::BTreeMap;

use anchor_lang::prelude::*;

use crate::errors::BorrowerOpsError;

/// Per-token balances. Ordered so iteration over tokens is deterministic.
pub type TokenMap = BTreeMap<Pubkey, u64>;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TokenAmount {
    pub token: Pubkey,
    pub amount: u64,
}

impl TokenAmount {
    pub fn new(token: Pubkey, amount: u64) -> Self {
        Self { token, amount }
    }
}

pub fn to_token_amounts(map: &TokenMap) -> Vec<TokenAmount> {
    map.iter()
        .map(|(token, amount)| TokenAmount::new(*token, *amount))
        .collect()
}

/// Collects a caller supplied list, rejecting repeated tokens. Zero entries are dropped.
pub fn to_token_map(amounts: &[TokenAmount]) -> Result<TokenMap> {
    let mut map = TokenMap::new();
    for entry in amounts {
        require!(
            !map.contains_key(&entry.token),
            BorrowerOpsError::DuplicateToken
        );
        map.insert(entry.token, entry.amount);
    }
    map.retain(|_, amount| *amount > 0);
    Ok(map)
}

pub fn add_amounts(into: &mut TokenMap, from: &TokenMap) -> Result<()> {
    for (token, amount) in from {
        if *amount == 0 {
            continue;
        }
        let entry = into.entry(*token).or_insert(0);
        *entry = entry
            .checked_add(*amount)
            .ok_or(BorrowerOpsError::Calculation)?;
    }
    Ok(())
}

/// Subtracts `from` out of `into`, dropping entries that reach zero.
pub fn sub_amounts(into: &mut TokenMap, from: &TokenMap) -> Result<()> {
    for (token, amount) in from {
        if *amount == 0 {
            continue;
        }
        let current = into.get(token).copied().unwrap_or(0);
        let remaining = current
            .checked_sub(*amount)
            .ok_or(BorrowerOpsError::Calculation)?;
        if remaining == 0 {
            into.remove(token);
        } else {
            into.insert(*token, remaining);
        }
    }
    Ok(())
}

pub fn sum_amounts(map: &TokenMap) -> Result<u128> {
    map.values().try_fold(0u128, |acc, amount| {
        acc.checked_add(*amount as u128)
            .ok_or(error!(BorrowerOpsError::Calculation))
    })
}

pub fn amount_of(map: &TokenMap, token: &Pubkey) -> u64 {
    map.get(token).copied().unwrap_or(0)
}
