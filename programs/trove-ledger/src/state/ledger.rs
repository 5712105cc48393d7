use std::collections::BTreeMap;

use anchor_lang::prelude::*;

use crate::{
    errors::{BorrowerOpsError, StabilityPoolError},
    events::{Operation, TroveIndexUpdated, TroveUpdated},
};

use super::{
    amount_of, to_token_amounts, EntireDebtAndColl, Journal, JournaledMap, JournaledVec, PoolState,
    PriceOracle, PriceSnapshot, ProtocolConfig, SortedTroves, StabilityPoolState, TokenMap, Trove,
    TroveStatus,
};

/// The whole protocol state. Every mutating operation runs through [`Ledger::transact`].
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    pub pool_state: PoolState,
    pub sorted_troves: SortedTroves,
    pub troves: JournaledMap<Pubkey, Trove>,
    pub trove_owners: JournaledVec<Pubkey>,
    pub stability_pools: BTreeMap<Pubkey, StabilityPoolState>,
}

impl Ledger {
    pub fn new(config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        let sorted_troves = SortedTroves::new(config.max_troves, config.hint_walk_limit);
        let stability_pools = config
            .debt_tokens
            .iter()
            .map(|token| (*token, StabilityPoolState::init(*token)))
            .collect();
        Ok(Self {
            pool_state: PoolState::init(config),
            sorted_troves,
            troves: JournaledMap::default(),
            trove_owners: JournaledVec::default(),
            stability_pools,
        })
    }

    /// Runs `body` and keeps its writes only if it succeeds. Troves, list nodes, owners and
    /// deposits are journaled per key; the per-token aggregates in `pool_state` are copied.
    pub fn transact<T>(&mut self, body: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let pool_state = self.pool_state.clone();
        self.each_journal(|journal| journal.checkpoint());
        match body(self) {
            Ok(output) => {
                self.each_journal(|journal| journal.commit());
                Ok(output)
            }
            Err(err) => {
                self.each_journal(|journal| journal.rollback());
                self.pool_state = pool_state;
                Err(err)
            }
        }
    }

    fn each_journal(&mut self, mut f: impl FnMut(&mut dyn Journal)) {
        f(&mut self.troves);
        f(&mut self.trove_owners);
        f(&mut self.sorted_troves);
        for sp_state in self.stability_pools.values_mut() {
            f(sp_state);
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.pool_state.config
    }

    pub fn fetch_prices<O: PriceOracle + ?Sized>(&self, oracle: &O) -> Result<PriceSnapshot> {
        PriceSnapshot::fetch(oracle, self.config())
    }

    pub fn get_trove(&self, borrower: &Pubkey) -> Trove {
        self.troves.get(borrower).cloned().unwrap_or_default()
    }

    pub fn get_trove_status(&self, borrower: &Pubkey) -> TroveStatus {
        self.troves
            .get(borrower)
            .map(|trove| trove.status)
            .unwrap_or_default()
    }

    pub fn get_trove_owners_count(&self) -> u64 {
        self.trove_owners.len() as u64
    }

    pub fn get_trove_from_trove_owners_array(&self, index: u64) -> Option<Pubkey> {
        self.trove_owners.get(index as usize).copied()
    }

    /// Takes the trove record out of the map so it can be mutated next to `pool_state`.
    pub fn take_trove(&mut self, borrower: &Pubkey) -> Trove {
        let mut trove = self.troves.remove(borrower).unwrap_or_default();
        trove.borrower = *borrower;
        trove
    }

    pub fn put_trove(&mut self, trove: Trove) {
        self.troves.insert(trove.borrower, trove);
    }

    pub fn add_trove_owner(&mut self, trove: &mut Trove) -> u64 {
        self.trove_owners.push(trove.borrower);
        let index = self.trove_owners.len() as u64 - 1;
        trove.array_index = index;
        index
    }

    /// Swap-with-last removal; the moved owner gets its index rewritten.
    pub fn remove_trove_owner(&mut self, trove: &Trove) -> Result<()> {
        let length = self.trove_owners.len();
        let index = trove.array_index as usize;
        require!(length > 1, BorrowerOpsError::OnlyOneTrove);
        require!(
            index < length && self.trove_owners[index] == trove.borrower,
            BorrowerOpsError::Calculation
        );

        self.trove_owners.swap_remove(index);
        if let Some(moved) = self.trove_owners.get(index).copied() {
            if let Some(moved_trove) = self.troves.get_mut(&moved) {
                moved_trove.array_index = index as u64;
            }
            emit!(TroveIndexUpdated {
                borrower: moved,
                new_index: index as u64
            });
        }
        Ok(())
    }

    pub fn require_more_than_one_trove_in_system(&self) -> Result<()> {
        require!(
            self.trove_owners.len() > 1 && self.sorted_troves.get_size() > 1,
            BorrowerOpsError::OnlyOneTrove
        );
        Ok(())
    }

    pub fn apply_pending_rewards(&mut self, borrower: &Pubkey) -> Result<()> {
        let mut trove = self.take_trove(borrower);
        let had_rewards = trove.has_pending_rewards(&self.pool_state);
        let res = self.pool_state.apply_pending_reward(&mut trove);
        if res.is_ok() && had_rewards {
            emit!(TroveUpdated {
                borrower: *borrower,
                debt: to_token_amounts(&trove.debt),
                coll: to_token_amounts(&trove.coll),
                stake: to_token_amounts(&trove.stake),
                operation: Operation::ApplyPendingRewards
            });
        }
        self.put_trove(trove);
        res
    }

    pub fn get_entire_debt_and_coll(&self, borrower: &Pubkey) -> Result<EntireDebtAndColl> {
        self.get_trove(borrower).get_entire_debt_coll(&self.pool_state)
    }

    pub fn get_pending_rewards(&self, borrower: &Pubkey) -> Result<(TokenMap, TokenMap)> {
        let trove = self.get_trove(borrower);
        Ok((
            trove.get_pending_coll_reward(&self.pool_state)?,
            trove.get_pending_debt_reward(&self.pool_state)?,
        ))
    }

    pub fn has_pending_rewards(&self, borrower: &Pubkey) -> bool {
        self.get_trove(borrower).has_pending_rewards(&self.pool_state)
    }

    pub fn get_nominal_icr(&self, borrower: &Pubkey) -> Result<u128> {
        self.get_trove(borrower).get_nominal_icr(&self.pool_state)
    }

    pub fn get_current_icr<O: PriceOracle + ?Sized>(&self, oracle: &O, borrower: &Pubkey) -> Result<u128> {
        let prices = self.fetch_prices(oracle)?;
        self.get_trove(borrower)
            .get_current_icr(&self.pool_state, &prices)
    }

    pub fn get_tcr<O: PriceOracle + ?Sized>(&self, oracle: &O) -> Result<u128> {
        let prices = self.fetch_prices(oracle)?;
        self.pool_state.get_tcr(&prices)
    }

    pub fn check_recovery_mode<O: PriceOracle + ?Sized>(&self, oracle: &O) -> Result<bool> {
        let prices = self.fetch_prices(oracle)?;
        self.pool_state.check_recovery_mode(&prices)
    }

    /// Returns `(hint, diff, next_seed)`.
    pub fn get_approx_hint(&self, nicr: u128, num_trials: u64, seed: u64) -> (Pubkey, u128, u64) {
        self.sorted_troves
            .get_approx_hint(&self.trove_owners, nicr, num_trials, seed)
    }

    pub fn find_insert_position(&self, nicr: u128, prev_id: Pubkey, next_id: Pubkey) -> (Pubkey, Pubkey) {
        self.sorted_troves.find_insert_position(nicr, prev_id, next_id)
    }

    pub fn stability_pool(&self, debt_token: &Pubkey) -> Result<&StabilityPoolState> {
        match self.stability_pools.get(debt_token) {
            Some(sp_state) => Ok(sp_state),
            None => Err(error!(StabilityPoolError::UnknownPool).with_pubkeys((*debt_token, *debt_token))),
        }
    }

    pub fn stability_pool_mut(&mut self, debt_token: &Pubkey) -> Result<&mut StabilityPoolState> {
        match self.stability_pools.get_mut(debt_token) {
            Some(sp_state) => Ok(sp_state),
            None => Err(error!(StabilityPoolError::UnknownPool).with_pubkeys((*debt_token, *debt_token))),
        }
    }

    pub fn get_remaining_debt_in_stab_pools(&self) -> TokenMap {
        self.stability_pools
            .iter()
            .filter(|(_, sp_state)| sp_state.total_deposits > 0)
            .map(|(token, sp_state)| (*token, sp_state.total_deposits))
            .collect()
    }

    pub fn get_total_deposits(&self, debt_token: &Pubkey) -> Result<u64> {
        Ok(self.stability_pool(debt_token)?.total_deposits)
    }

    pub fn get_total_collateral(&self, debt_token: &Pubkey) -> Result<TokenMap> {
        Ok(self.stability_pool(debt_token)?.total_collateral.clone())
    }

    pub fn get_compounded_deposit(&self, debt_token: &Pubkey, depositor: &Pubkey) -> Result<u64> {
        self.stability_pool(debt_token)?
            .get_compounded_deposit(depositor)
    }

    pub fn get_depositor_coll_gain(&self, debt_token: &Pubkey, depositor: &Pubkey) -> Result<TokenMap> {
        self.stability_pool(debt_token)?
            .get_depositor_coll_gain(depositor)
    }

    pub fn get_coll_surplus(&self, borrower: &Pubkey) -> TokenMap {
        self.troves
            .get(borrower)
            .map(|trove| trove.surplus_balance.clone())
            .unwrap_or_default()
    }

    pub fn get_coll_surplus_of(&self, borrower: &Pubkey, token: &Pubkey) -> u64 {
        amount_of(&self.get_coll_surplus(borrower), token)
    }
}
