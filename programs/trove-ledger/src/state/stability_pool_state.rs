use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use ethnum::U256;

use crate::{
    constants::{DECIMAL_PRECISION, SCALE_FACTOR},
    errors::BorrowerOpsError,
    events::{
        EpochUpdated, PUpdated, SUpdated, ScaleUpdated, StabilityPoolBalanceUpdated,
        StabilityPoolCollBalanceUpdated,
    },
    math::mul_div,
};

use super::{
    add_amounts, amount_of, sub_amounts, EpochScale, Journal, JournaledMap, StabilityPoolDeposit,
    TokenMap,
};

/// One pool per debt token.
#[derive(Clone, Debug, Default)]
pub struct StabilityPoolState {
    pub debt_token: Pubkey,

    // State
    pub total_collateral: TokenMap,
    pub total_deposits: u64,
    pub p: u128,
    pub current_scale: u64,
    pub current_epoch: u64,
    pub last_coll_error_offset: BTreeMap<Pubkey, u128>,
    pub last_debt_error_offset: u128,

    pub epoch_to_scale_to_sum: JournaledMap<(u64, u64), EpochScale>,
    pub deposits: JournaledMap<Pubkey, StabilityPoolDeposit>,

    saved: Option<Box<PoolTotals>>,
}

#[derive(Clone, Debug)]
struct PoolTotals {
    total_collateral: TokenMap,
    total_deposits: u64,
    p: u128,
    current_scale: u64,
    current_epoch: u64,
    last_coll_error_offset: BTreeMap<Pubkey, u128>,
    last_debt_error_offset: u128,
}

impl Journal for StabilityPoolState {
    fn checkpoint(&mut self) {
        self.epoch_to_scale_to_sum.checkpoint();
        self.deposits.checkpoint();
        self.saved = Some(Box::new(PoolTotals {
            total_collateral: self.total_collateral.clone(),
            total_deposits: self.total_deposits,
            p: self.p,
            current_scale: self.current_scale,
            current_epoch: self.current_epoch,
            last_coll_error_offset: self.last_coll_error_offset.clone(),
            last_debt_error_offset: self.last_debt_error_offset,
        }));
    }

    fn commit(&mut self) {
        self.epoch_to_scale_to_sum.commit();
        self.deposits.commit();
        self.saved = None;
    }

    fn rollback(&mut self) {
        self.epoch_to_scale_to_sum.rollback();
        self.deposits.rollback();
        if let Some(totals) = self.saved.take() {
            self.total_collateral = totals.total_collateral;
            self.total_deposits = totals.total_deposits;
            self.p = totals.p;
            self.current_scale = totals.current_scale;
            self.current_epoch = totals.current_epoch;
            self.last_coll_error_offset = totals.last_coll_error_offset;
            self.last_debt_error_offset = totals.last_debt_error_offset;
        }
    }
}

impl StabilityPoolState {
    pub fn init(debt_token: Pubkey) -> Self {
        Self {
            debt_token,
            p: DECIMAL_PRECISION,
            ..Default::default()
        }
    }

    pub fn get_epoch_scale(&self, epoch: u64, scale: u64) -> EpochScale {
        self.epoch_to_scale_to_sum
            .get(&(epoch, scale))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_current_epoch_scale(&self) -> EpochScale {
        self.get_epoch_scale(self.current_epoch, self.current_scale)
    }

    /// The sums a deposit's gain is read from: its own (epoch, scale) and the scale after it.
    pub fn get_epoch_scales(&self, sp_deposit: &StabilityPoolDeposit) -> (EpochScale, EpochScale) {
        let first_epoch_scale =
            self.get_epoch_scale(sp_deposit.snapshots_epoch, sp_deposit.snapshots_scale);
        let second_epoch_scale =
            self.get_epoch_scale(sp_deposit.snapshots_epoch, sp_deposit.snapshots_scale + 1);
        (first_epoch_scale, second_epoch_scale)
    }

    pub fn get_deposit(&self, depositor: &Pubkey) -> StabilityPoolDeposit {
        self.deposits.get(depositor).cloned().unwrap_or_default()
    }

    pub fn get_compounded_deposit(&self, depositor: &Pubkey) -> Result<u64> {
        self.get_deposit(depositor).get_compounded_deposit(self)
    }

    pub fn get_depositor_coll_gain(&self, depositor: &Pubkey) -> Result<TokenMap> {
        let sp_deposit = self.get_deposit(depositor);
        let (first_epoch_scale, second_epoch_scale) = self.get_epoch_scales(&sp_deposit);
        sp_deposit.get_depositor_coll_gain(&first_epoch_scale, &second_epoch_scale)
    }

    pub fn increase_debt(&mut self, amount: u64) -> Result<()> {
        self.total_deposits = self
            .total_deposits
            .checked_add(amount)
            .ok_or(BorrowerOpsError::Calculation)?;
        emit!(StabilityPoolBalanceUpdated {
            debt_token: self.debt_token,
            new_balance: self.total_deposits
        });
        Ok(())
    }

    pub fn decrease_debt(&mut self, amount: u64) -> Result<()> {
        self.total_deposits = self
            .total_deposits
            .checked_sub(amount)
            .ok_or(BorrowerOpsError::Calculation)?;
        emit!(StabilityPoolBalanceUpdated {
            debt_token: self.debt_token,
            new_balance: self.total_deposits
        });
        Ok(())
    }

    pub fn increase_coll(&mut self, amounts: &TokenMap) -> Result<()> {
        add_amounts(&mut self.total_collateral, amounts)?;
        self.emit_coll_balances(amounts);
        Ok(())
    }

    pub fn decrease_coll(&mut self, amounts: &TokenMap) -> Result<()> {
        sub_amounts(&mut self.total_collateral, amounts)?;
        self.emit_coll_balances(amounts);
        Ok(())
    }

    fn emit_coll_balances(&self, amounts: &TokenMap) {
        for token in amounts.keys() {
            emit!(StabilityPoolCollBalanceUpdated {
                debt_token: self.debt_token,
                token: *token,
                new_balance: amount_of(&self.total_collateral, token)
            });
        }
    }

    pub fn compute_rewards_per_unit_staked(
        &mut self,
        coll_to_add: &TokenMap,
        debt_to_offset: u64,
    ) -> Result<(BTreeMap<Pubkey, u128>, u128)> {
        let total_deposits = self.total_deposits as u128;
        require!(
            debt_to_offset <= self.total_deposits && total_deposits > 0,
            BorrowerOpsError::Calculation
        );

        let debt_loss_per_unit_staked = if debt_to_offset == self.total_deposits {
            self.last_debt_error_offset = 0;
            DECIMAL_PRECISION
        } else {
            let debt_loss_numerator = (debt_to_offset as u128)
                .checked_mul(DECIMAL_PRECISION)
                .and_then(|n| n.checked_sub(self.last_debt_error_offset))
                .ok_or(BorrowerOpsError::Calculation)?;
            // Rounded up so any compounded deposit errs slightly low; exact offsets stay exact
            let mut debt_loss_per_unit_staked = debt_loss_numerator / total_deposits;
            if debt_loss_numerator % total_deposits != 0 {
                debt_loss_per_unit_staked += 1;
            }
            self.last_debt_error_offset = debt_loss_per_unit_staked
                .checked_mul(total_deposits)
                .and_then(|n| n.checked_sub(debt_loss_numerator))
                .ok_or(BorrowerOpsError::Calculation)?;
            debt_loss_per_unit_staked
        };

        let mut coll_gain_per_unit_staked = BTreeMap::new();
        for (token, amount) in coll_to_add {
            let last_error = self.last_coll_error_offset.get(token).copied().unwrap_or(0);
            let coll_numerator = (*amount as u128)
                .checked_mul(DECIMAL_PRECISION)
                .and_then(|n| n.checked_add(last_error))
                .ok_or(BorrowerOpsError::Calculation)?;
            let gain_per_unit = coll_numerator / total_deposits;
            let error = coll_numerator
                .checked_sub(
                    mul_div(gain_per_unit, total_deposits, 1).ok_or(BorrowerOpsError::Calculation)?,
                )
                .ok_or(BorrowerOpsError::Calculation)?;
            self.last_coll_error_offset.insert(*token, error);
            coll_gain_per_unit_staked.insert(*token, gain_per_unit);
        }
        Ok((coll_gain_per_unit_staked, debt_loss_per_unit_staked))
    }

    pub fn update_reward_sum_and_product(
        &mut self,
        coll_gain_per_unit_staked: &BTreeMap<Pubkey, u128>,
        debt_loss_per_unit_staked: u128,
    ) -> Result<()> {
        require!(
            debt_loss_per_unit_staked <= DECIMAL_PRECISION,
            BorrowerOpsError::Calculation
        );
        // Zero when the pool was emptied, otherwise 1 - loss per unit
        let new_product_factor = DECIMAL_PRECISION - debt_loss_per_unit_staked;

        // S first: the gain depends on deposits before this liquidation's depletion
        let current_epoch_scale = self
            .epoch_to_scale_to_sum
            .entry_or_default((self.current_epoch, self.current_scale));
        for (token, gain_per_unit) in coll_gain_per_unit_staked {
            let marginal_coll_gain = U256::from(*gain_per_unit)
                .checked_mul(U256::from(self.p))
                .ok_or(BorrowerOpsError::Calculation)?;
            current_epoch_scale.add_marginal_gain(token, marginal_coll_gain)?;
            emit!(SUpdated {
                debt_token: self.debt_token,
                token: *token,
                epoch: self.current_epoch,
                scale: self.current_scale
            });
        }

        let scaled_p = mul_div(self.p, new_product_factor, DECIMAL_PRECISION)
            .ok_or(BorrowerOpsError::Calculation)?;
        let new_p = if new_product_factor == 0 {
            self.current_epoch = self
                .current_epoch
                .checked_add(1)
                .ok_or(BorrowerOpsError::Calculation)?;
            emit!(EpochUpdated {
                debt_token: self.debt_token,
                current_epoch: self.current_epoch
            });
            self.current_scale = 0;
            emit!(ScaleUpdated {
                debt_token: self.debt_token,
                current_scale: self.current_scale
            });
            DECIMAL_PRECISION
        } else if scaled_p < SCALE_FACTOR {
            self.current_scale = self
                .current_scale
                .checked_add(1)
                .ok_or(BorrowerOpsError::Calculation)?;
            emit!(ScaleUpdated {
                debt_token: self.debt_token,
                current_scale: self.current_scale
            });
            mul_div(self.p, new_product_factor * SCALE_FACTOR, DECIMAL_PRECISION)
                .ok_or(BorrowerOpsError::Calculation)?
        } else {
            scaled_p
        };

        require!(new_p > 0, BorrowerOpsError::Calculation);
        self.p = new_p;

        emit!(PUpdated {
            debt_token: self.debt_token,
            p: self.p
        });
        Ok(())
    }

    /// Cancels `debt_to_offset` against the pool's deposits and credits the collateral.
    pub fn offset(&mut self, debt_to_offset: u64, coll_to_add: &TokenMap) -> Result<()> {
        if self.total_deposits == 0 || debt_to_offset == 0 {
            return Ok(());
        }

        let (coll_gain_per_unit_staked, debt_loss_per_unit_staked) =
            self.compute_rewards_per_unit_staked(coll_to_add, debt_to_offset)?;
        self.update_reward_sum_and_product(&coll_gain_per_unit_staked, debt_loss_per_unit_staked)?;

        self.decrease_debt(debt_to_offset)?;
        self.increase_coll(coll_to_add)
    }
}

#[cfg(test)]
pub mod stability_pool_state_test {
    use super::*;
    use proptest::prelude::*;

    fn deposit(sp_state: &mut StabilityPoolState, depositor: Pubkey, amount: u64) {
        let mut sp_deposit = sp_state.get_deposit(&depositor);
        let compounded = sp_deposit.get_compounded_deposit(sp_state).unwrap();
        sp_state.increase_debt(amount).unwrap();
        sp_deposit.update_deposit_and_snapshot(sp_state, depositor, compounded + amount);
        sp_state.deposits.insert(depositor, sp_deposit);
    }

    #[test]
    fn partial_offset_compounds_deposit() {
        let debt_token = Pubkey::new_unique();
        let coll = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let mut sp_state = StabilityPoolState::init(debt_token);
        deposit(&mut sp_state, alice, 1_000);

        sp_state.offset(400, &TokenMap::from([(coll, 50)])).unwrap();

        assert_eq!(sp_state.total_deposits, 600);
        assert_eq!(sp_state.get_compounded_deposit(&alice).unwrap(), 600);
        let gain = sp_state.get_depositor_coll_gain(&alice).unwrap();
        assert_eq!(gain, TokenMap::from([(coll, 50)]));
        assert_eq!(sp_state.current_epoch, 0);
        assert_eq!(sp_state.last_debt_error_offset, 0);
    }

    #[test]
    fn inexact_loss_rounds_against_depositors() {
        let debt_token = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let mut sp_state = StabilityPoolState::init(debt_token);
        deposit(&mut sp_state, alice, 3);

        sp_state.offset(1, &TokenMap::new()).unwrap();
        assert_eq!(sp_state.total_deposits, 2);
        // 1/3 per unit rounded up leaves P a hair under 2/3
        assert_eq!(sp_state.p, DECIMAL_PRECISION - (DECIMAL_PRECISION / 3 + 1));
        assert_eq!(sp_state.get_compounded_deposit(&alice).unwrap(), 1);
        assert_eq!(sp_state.last_debt_error_offset, 2);
    }

    #[test]
    fn gains_split_between_depositors() {
        let debt_token = Pubkey::new_unique();
        let coll = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let mut sp_state = StabilityPoolState::init(debt_token);
        deposit(&mut sp_state, alice, 3_000);
        deposit(&mut sp_state, bob, 1_000);

        sp_state.offset(2_000, &TokenMap::from([(coll, 400)])).unwrap();

        let alice_gain = amount_of(&sp_state.get_depositor_coll_gain(&alice).unwrap(), &coll);
        let bob_gain = amount_of(&sp_state.get_depositor_coll_gain(&bob).unwrap(), &coll);
        assert!(alice_gain <= 300 && alice_gain >= 299);
        assert!(bob_gain <= 100 && bob_gain >= 99);
        assert_eq!(
            sp_state.total_collateral,
            TokenMap::from([(coll, 400)])
        );
    }

    #[test]
    fn full_depletion_starts_new_epoch() {
        let debt_token = Pubkey::new_unique();
        let coll = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let mut sp_state = StabilityPoolState::init(debt_token);
        deposit(&mut sp_state, alice, 1_000);

        sp_state.offset(1_000, &TokenMap::from([(coll, 90)])).unwrap();

        assert_eq!(sp_state.current_epoch, 1);
        assert_eq!(sp_state.current_scale, 0);
        assert_eq!(sp_state.p, DECIMAL_PRECISION);
        assert_eq!(sp_state.total_deposits, 0);
        assert_eq!(sp_state.get_compounded_deposit(&alice).unwrap(), 0);
        // the gain earned in the old epoch is still claimable
        assert_eq!(
            sp_state.get_depositor_coll_gain(&alice).unwrap(),
            TokenMap::from([(coll, 90)])
        );

        // a fresh deposit lives in the new epoch
        deposit(&mut sp_state, bob, 500);
        assert_eq!(sp_state.get_compounded_deposit(&bob).unwrap(), 500);
        assert!(sp_state.get_depositor_coll_gain(&bob).unwrap().is_empty());
    }

    #[test]
    fn small_product_moves_to_next_scale() {
        let debt_token = Pubkey::new_unique();
        let coll = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let mut sp_state = StabilityPoolState::init(debt_token);
        deposit(&mut sp_state, alice, 10_000_000_000_000);

        // leaves a 1e-10 fraction, P would drop below 1e9
        sp_state
            .offset(9_999_999_999_000, &TokenMap::from([(coll, 1_000)]))
            .unwrap();
        assert_eq!(sp_state.current_scale, 1);
        assert_eq!(sp_state.current_epoch, 0);
        assert!(sp_state.p >= SCALE_FACTOR);
        assert!(sp_state.get_compounded_deposit(&alice).unwrap() <= 1_000);

        let res = sp_state.update_reward_sum_and_product(&BTreeMap::new(), DECIMAL_PRECISION + 1);
        assert_eq!(res.unwrap_err(), BorrowerOpsError::Calculation.into());
    }

    #[test]
    fn token_first_seen_after_scale_change_is_paid() {
        let debt_token = Pubkey::new_unique();
        let (first_coll, second_coll) = (Pubkey::new_unique(), Pubkey::new_unique());
        let alice = Pubkey::new_unique();
        let mut sp_state = StabilityPoolState::init(debt_token);
        deposit(&mut sp_state, alice, 10_000_000_000_000);

        sp_state
            .offset(9_999_999_999_000, &TokenMap::from([(first_coll, 1_000)]))
            .unwrap();
        assert_eq!(sp_state.current_scale, 1);
        sp_state
            .offset(500, &TokenMap::from([(second_coll, 700)]))
            .unwrap();
        assert!(sp_state.get_current_epoch_scale().sum.contains_key(&second_coll));
        assert!(!sp_state.get_epoch_scale(0, 0).sum.contains_key(&second_coll));

        let gain = sp_state.get_depositor_coll_gain(&alice).unwrap();
        assert_eq!(amount_of(&gain, &first_coll), 1_000);
        let second_gain = amount_of(&gain, &second_coll);
        assert!(second_gain > 690 && second_gain <= 700);
    }

    proptest! {
        #[test]
        fn compounded_deposits_never_exceed_pool(
            amounts in proptest::collection::vec(1u64..1_000_000, 1..6),
            offsets in proptest::collection::vec(1u64..100, 1..6),
        ) {
            let debt_token = Pubkey::new_unique();
            let coll = Pubkey::new_unique();
            let depositors: Vec<Pubkey> = amounts.iter().map(|_| Pubkey::new_unique()).collect();
            let mut sp_state = StabilityPoolState::init(debt_token);
            for (depositor, amount) in depositors.iter().zip(&amounts) {
                deposit(&mut sp_state, *depositor, *amount);
            }

            for percent in offsets {
                let debt = sp_state.total_deposits * percent / 100;
                if debt == 0 || debt == sp_state.total_deposits {
                    continue;
                }
                sp_state.offset(debt, &TokenMap::from([(coll, debt)])).unwrap();
            }

            let mut compounded_total = 0u64;
            let mut gain_total = 0u64;
            for depositor in &depositors {
                compounded_total += sp_state.get_compounded_deposit(depositor).unwrap();
                gain_total += amount_of(&sp_state.get_depositor_coll_gain(depositor).unwrap(), &coll);
            }
            prop_assert!(compounded_total <= sp_state.total_deposits);
            prop_assert!(gain_total <= amount_of(&sp_state.total_collateral, &coll));
        }
    }
}
