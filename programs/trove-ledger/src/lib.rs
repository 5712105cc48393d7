use anchor_lang::prelude::*;

pub mod constants;
pub mod errors;
pub mod events;
pub mod instructions;
pub mod math;
pub mod state;
pub mod utils;

use instructions::*;
use state::{Ledger, LiquidationTotals, PriceOracle, ProtocolConfig, TokenAmount, TokenMap};

/// Entry points. Each call fetches prices once, then runs its handler inside [`Ledger::transact`].
impl Ledger {
    pub fn open_trove<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        borrower: Pubkey,
        coll: &[TokenAmount],
        debt: &[TokenAmount],
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| {
            open_trove_handler(ledger, &prices, borrower, coll, debt, prev_hint, next_hint)
        })
    }

    pub fn add_coll<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        borrower: Pubkey,
        coll: &[TokenAmount],
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        self.adjust_trove(oracle, borrower, coll, true, &[], false, &[], prev_hint, next_hint)
    }

    pub fn withdraw_coll<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        borrower: Pubkey,
        coll: &[TokenAmount],
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        self.adjust_trove(oracle, borrower, coll, false, &[], false, &[], prev_hint, next_hint)
    }

    pub fn increase_debt<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        borrower: Pubkey,
        debt: &[TokenAmount],
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        self.adjust_trove(oracle, borrower, &[], false, debt, true, &[], prev_hint, next_hint)
    }

    pub fn repay_debt<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        borrower: Pubkey,
        debt: &[TokenAmount],
        debt_token_balance: &[TokenAmount],
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        self.adjust_trove(
            oracle,
            borrower,
            &[],
            false,
            debt,
            false,
            debt_token_balance,
            prev_hint,
            next_hint,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn adjust_trove<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        borrower: Pubkey,
        coll_change: &[TokenAmount],
        is_coll_increase: bool,
        debt_change: &[TokenAmount],
        is_debt_increase: bool,
        debt_token_balance: &[TokenAmount],
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| {
            adjust_trove_handler(
                ledger,
                &prices,
                borrower,
                coll_change,
                is_coll_increase,
                debt_change,
                is_debt_increase,
                debt_token_balance,
                prev_hint,
                next_hint,
            )
        })
    }

    pub fn close_trove<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        borrower: Pubkey,
        debt_token_balance: &[TokenAmount],
    ) -> Result<TokenMap> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| close_trove_handler(ledger, &prices, borrower, debt_token_balance))
    }

    pub fn claim_coll_surplus(&mut self, borrower: Pubkey) -> Result<TokenMap> {
        self.transact(|ledger| claim_coll_surplus_handler(ledger, borrower))
    }

    // Liquidations
    pub fn liquidate<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        liquidator: Pubkey,
        borrower: Pubkey,
    ) -> Result<LiquidationTotals> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| liquidate_trove_handler(ledger, &prices, liquidator, borrower))
    }

    pub fn batch_liquidate_troves<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        liquidator: Pubkey,
        borrowers: &[Pubkey],
    ) -> Result<LiquidationTotals> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| batch_liquidate_troves_handler(ledger, &prices, liquidator, borrowers))
    }

    pub fn liquidate_troves<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        liquidator: Pubkey,
        n: u64,
    ) -> Result<LiquidationTotals> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| liquidate_troves_handler(ledger, &prices, liquidator, n))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn redeem_collateral<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        redeemer: Pubkey,
        debt_token: Pubkey,
        amount: u64,
        debt_token_balance: u64,
        max_fee_percentage: u128,
        max_iterations: u64,
    ) -> Result<RedemptionTotals> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| {
            redeem_collateral_handler(
                ledger,
                &prices,
                redeemer,
                debt_token,
                amount,
                debt_token_balance,
                max_fee_percentage,
                max_iterations,
            )
        })
    }

    // Stability Pool
    pub fn provide_stability(&mut self, depositor: Pubkey, amounts: &[TokenAmount]) -> Result<TokenMap> {
        self.transact(|ledger| provide_to_sp_handler(ledger, depositor, amounts))
    }

    /// Returns `(withdrawn, coll_gains)`.
    pub fn withdraw_stability<O: PriceOracle + ?Sized>(
        &mut self,
        oracle: &O,
        depositor: Pubkey,
        amounts: &[TokenAmount],
    ) -> Result<(TokenMap, TokenMap)> {
        let prices = self.fetch_prices(oracle)?;
        self.transact(|ledger| withdraw_from_sp_handler(ledger, &prices, depositor, amounts))
    }

    pub fn withdraw_gains(&mut self, depositor: Pubkey) -> Result<TokenMap> {
        self.transact(|ledger| claim_from_sp_handler(ledger, depositor))
    }

    // Admin
    pub fn config_pool_state(&mut self, new_config: ProtocolConfig) -> Result<()> {
        self.transact(|ledger| config_pool_state_handler(ledger, new_config))
    }
}
