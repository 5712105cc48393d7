use std::collections::BTreeMap;

use anchor_lang::prelude::*;

use crate::errors::{BorrowerOpsError, StorageError};

use super::TokenMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolType {
    // Balances backing open troves
    Active,
    // Redistributed balances not yet applied to a trove
    Default,
    // Gas reserves held for liquidators
    GasCompensation,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoragePool {
    balances: BTreeMap<(Pubkey, bool, PoolType), u64>,
}

impl StoragePool {
    pub fn get_value(&self, token: &Pubkey, is_coll: bool, pool_type: PoolType) -> u64 {
        self.balances
            .get(&(*token, is_coll, pool_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn add_value(
        &mut self,
        token: &Pubkey,
        is_coll: bool,
        pool_type: PoolType,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balances.entry((*token, is_coll, pool_type)).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(BorrowerOpsError::Calculation)?;
        Ok(())
    }

    pub fn subtract_value(
        &mut self,
        token: &Pubkey,
        is_coll: bool,
        pool_type: PoolType,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.get_value(token, is_coll, pool_type);
        if balance < amount {
            msg!(
                "StoragePool: {:?} balance of {} is {}, cannot subtract {}",
                pool_type,
                token,
                balance,
                amount
            );
            return Err(error!(StorageError::InsufficientBalance)
                .with_values((balance, amount)));
        }
        self.balances
            .insert((*token, is_coll, pool_type), balance - amount);
        Ok(())
    }

    pub fn transfer_between_types(
        &mut self,
        token: &Pubkey,
        is_coll: bool,
        from: PoolType,
        to: PoolType,
        amount: u64,
    ) -> Result<()> {
        self.subtract_value(token, is_coll, from, amount)?;
        self.add_value(token, is_coll, to, amount)
    }

    /// Active + Default. This is what the system ratio is computed from.
    pub fn get_entire_value(&self, token: &Pubkey, is_coll: bool) -> Result<u64> {
        let value = self
            .get_value(token, is_coll, PoolType::Active)
            .checked_add(self.get_value(token, is_coll, PoolType::Default))
            .ok_or(BorrowerOpsError::Calculation)?;
        Ok(value)
    }

    pub fn add_values(&mut self, amounts: &TokenMap, is_coll: bool, pool_type: PoolType) -> Result<()> {
        for (token, amount) in amounts {
            self.add_value(token, is_coll, pool_type, *amount)?;
        }
        Ok(())
    }

    pub fn subtract_values(
        &mut self,
        amounts: &TokenMap,
        is_coll: bool,
        pool_type: PoolType,
    ) -> Result<()> {
        for (token, amount) in amounts {
            self.subtract_value(token, is_coll, pool_type, *amount)?;
        }
        Ok(())
    }

    pub fn transfer_values(
        &mut self,
        amounts: &TokenMap,
        is_coll: bool,
        from: PoolType,
        to: PoolType,
    ) -> Result<()> {
        for (token, amount) in amounts {
            self.transfer_between_types(token, is_coll, from, to, *amount)?;
        }
        Ok(())
    }
}
