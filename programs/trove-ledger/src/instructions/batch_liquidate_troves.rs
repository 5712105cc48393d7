use anchor_lang::prelude::*;

use crate::{
    errors::LiquidationError,
    instructions::{apply_liquidation_totals, init_liquidation_sequence, liquidate_single},
    state::{Ledger, LiquidationTotals, PriceSnapshot},
};

/// Ineligible ids are skipped; the call fails only when none could be liquidated.
pub fn batch_liquidate_troves_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    liquidator: Pubkey,
    borrowers: &[Pubkey],
) -> Result<LiquidationTotals> {
    require!(!borrowers.is_empty(), LiquidationError::EmptyArray);

    let mut vars = init_liquidation_sequence(ledger, prices)?;
    let mut totals = LiquidationTotals::default();
    for borrower in borrowers {
        if let Some(single_liquidation) = liquidate_single(ledger, prices, &mut vars, *borrower)? {
            totals.add_liquidation_values(&single_liquidation)?;
        }
    }

    apply_liquidation_totals(ledger, prices, liquidator, &totals)?;
    Ok(totals)
}

/// Walks up from the riskiest trove, visiting at most `n`. In normal mode the
/// walk stops at the first healthy trove.
pub fn liquidate_troves_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    liquidator: Pubkey,
    n: u64,
) -> Result<LiquidationTotals> {
    let mut vars = init_liquidation_sequence(ledger, prices)?;
    let mut totals = LiquidationTotals::default();

    let mut current = ledger.sorted_troves.get_last();
    let mut visited = 0;
    while visited < n && current != Pubkey::default() && ledger.sorted_troves.get_size() > 1 {
        let prev = ledger.sorted_troves.get_prev(&current);
        match liquidate_single(ledger, prices, &mut vars, current)? {
            Some(single_liquidation) => totals.add_liquidation_values(&single_liquidation)?,
            None if !vars.is_recovery_mode => break,
            None => {}
        }
        current = prev;
        visited += 1;
    }

    apply_liquidation_totals(ledger, prices, liquidator, &totals)?;
    Ok(totals)
}

#[cfg(test)]
pub mod batch_liquidate_troves_test {
    use super::*;
    use crate::{
        constants::DECIMAL_PRECISION,
        state::{amount_of, PoolType, TokenMap, TroveStatus},
        utils::test_fixtures::{amounts, load_ledger, Fixture},
    };

    fn open(fixture: &mut Fixture, borrower: Pubkey, eth: u64) {
        let (eth_token, usd_token) = (fixture.eth, fixture.usd);
        fixture
            .ledger
            .open_trove(
                &fixture.feed,
                borrower,
                &amounts(&[(eth_token, eth)]),
                &amounts(&[(usd_token, 2_000)]),
                Pubkey::default(),
                Pubkey::default(),
            )
            .unwrap();
    }

    /// A is healthy, B and C fall below MCR once eth drops to 0.735.
    fn load_three_troves() -> (Fixture, [Pubkey; 3]) {
        let mut fixture = load_ledger();
        let ids = [Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique()];
        fixture.feed.set_price(fixture.eth, DECIMAL_PRECISION);
        open(&mut fixture, ids[0], 12_000);
        open(&mut fixture, ids[1], 3_000);
        open(&mut fixture, ids[2], 3_100);
        fixture
            .feed
            .set_price(fixture.eth, DECIMAL_PRECISION / 1_000 * 735);
        (fixture, ids)
    }

    #[test]
    fn batch_skips_ineligible_ids() {
        let (mut fixture, [a, b, c]) = load_three_troves();
        let eth = fixture.eth;
        let stranger = Pubkey::new_unique();

        let totals = fixture
            .ledger
            .batch_liquidate_troves(&fixture.feed, Pubkey::new_unique(), &[a, b, stranger, b])
            .unwrap();
        assert_eq!(totals.liquidated_troves, 1);
        // only B's collateral enters the sequence
        assert_eq!(totals.total_coll_in_sequence, TokenMap::from([(eth, 3_000)]));
        assert!(fixture.ledger.get_trove(&a).is_active());
        assert!(fixture.ledger.get_trove(&c).is_active());
        assert_eq!(
            fixture.ledger.get_trove_status(&b),
            TroveStatus::ClosedByLiquidationNormal
        );
    }

    #[test]
    fn batch_needs_at_least_one_liquidation() {
        let (mut fixture, [a, _, _]) = load_three_troves();
        let liquidator = Pubkey::new_unique();
        let res = fixture.ledger.batch_liquidate_troves(&fixture.feed, liquidator, &[]);
        assert_eq!(res.unwrap_err(), LiquidationError::EmptyArray.into());

        let res = fixture
            .ledger
            .batch_liquidate_troves(&fixture.feed, liquidator, &[a]);
        assert_eq!(res.unwrap_err(), LiquidationError::NoLiquidatableTrove.into());
        assert_eq!(fixture.ledger.get_trove_owners_count(), 3);
    }

    #[test]
    fn sequential_liquidation_walks_from_the_tail() {
        let (mut fixture, [a, b, c]) = load_three_troves();
        let liquidator = Pubkey::new_unique();

        let totals = fixture
            .ledger
            .liquidate_troves(&fixture.feed, liquidator, 1)
            .unwrap();
        assert_eq!(totals.liquidated_troves, 1);
        assert!(!fixture.ledger.get_trove(&b).is_active());
        assert!(fixture.ledger.get_trove(&c).is_active());

        // C picked up part of B's debt and stays below MCR
        let totals = fixture
            .ledger
            .liquidate_troves(&fixture.feed, liquidator, 10)
            .unwrap();
        assert_eq!(totals.liquidated_troves, 1);
        assert!(!fixture.ledger.get_trove(&c).is_active());
        assert!(fixture.ledger.get_trove(&a).is_active());
        assert_eq!(fixture.ledger.sorted_troves.get_size(), 1);

        let res = fixture.ledger.liquidate_troves(&fixture.feed, liquidator, 10);
        assert_eq!(res.unwrap_err(), LiquidationError::NoLiquidatableTrove.into());
    }

    /// At 0.735: A 245%, B 105%, C 126%, D 87.5%, TCR 140.9%. The pool holds 5_000 usd.
    fn load_recovery_batch() -> (Fixture, [Pubkey; 4]) {
        let mut fixture = load_ledger();
        let ids = [
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
        ];
        fixture.feed.set_price(fixture.eth, DECIMAL_PRECISION);
        for (borrower, eth) in ids.iter().zip([7_000, 3_000, 3_600, 2_500]) {
            open(&mut fixture, *borrower, eth);
        }
        fixture
            .ledger
            .provide_stability(Pubkey::new_unique(), &amounts(&[(fixture.usd, 5_000)]))
            .unwrap();
        fixture
            .feed
            .set_price(fixture.eth, DECIMAL_PRECISION / 1_000 * 735);
        assert!(fixture.ledger.check_recovery_mode(&fixture.feed).unwrap());
        (fixture, ids)
    }

    #[test]
    fn recovery_mode_holds_for_the_whole_batch() {
        let (mut fixture, [a, b, c, d]) = load_recovery_batch();
        let (eth, usd) = (fixture.eth, fixture.usd);

        // D and B alone would lift TCR past CCR, C still goes at the entry TCR
        let totals = fixture
            .ledger
            .batch_liquidate_troves(&fixture.feed, Pubkey::new_unique(), &[d, b, c])
            .unwrap();
        assert_eq!(totals.liquidated_troves, 3);
        assert!(!fixture.ledger.check_recovery_mode(&fixture.feed).unwrap());
        for borrower in [b, c, d] {
            assert_eq!(
                fixture.ledger.get_trove_status(&borrower),
                TroveStatus::ClosedByLiquidationRecovery
            );
        }
        assert!(fixture.ledger.get_trove(&a).is_active());

        assert_eq!(totals.total_debt_to_offset, TokenMap::from([(usd, 4_200)]));
        assert_eq!(totals.total_debt_to_redistribute, TokenMap::from([(usd, 2_100)]));
        assert_eq!(totals.total_coll_to_redistribute, TokenMap::from([(eth, 2_488)]));
        // C is offset at MCR: 3_600 * 110 / 126 = 3_142, the rest is claimable
        assert_eq!(totals.total_coll_surplus, TokenMap::from([(eth, 458)]));
        assert_eq!(fixture.ledger.get_coll_surplus_of(&c, &eth), 458);
        assert_eq!(fixture.ledger.get_total_deposits(&usd).unwrap(), 800);
    }

    #[test]
    fn mixed_batch_conserves_collateral_and_debt() {
        let (mut fixture, [_, b, c, d]) = load_recovery_batch();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let all_coll = 7_000 + 3_000 + 3_600 + 2_500;

        let totals = fixture
            .ledger
            .batch_liquidate_troves(&fixture.feed, Pubkey::new_unique(), &[d, b, c])
            .unwrap();
        assert_eq!(totals.total_coll_gas_compensation, TokenMap::from([(eth, 42)]));

        let pool_state = &fixture.ledger.pool_state;
        let storage = &pool_state.storage;
        let sp_coll = amount_of(&fixture.ledger.get_total_collateral(&usd).unwrap(), &eth);
        assert_eq!(sp_coll, 2_985 + 3_127);
        assert_eq!(storage.get_value(&eth, true, PoolType::Default), 2_488);
        let held = storage.get_value(&eth, true, PoolType::Active)
            + storage.get_value(&eth, true, PoolType::Default)
            + sp_coll
            + amount_of(&totals.total_coll_gas_compensation, &eth)
            + amount_of(&pool_state.total_surplus, &eth);
        assert_eq!(held, all_coll);
        assert_eq!(storage.get_value(&eth, true, PoolType::Active), 7_000);

        // offset debt is burned, the rest moves to Default, one gas reserve is left
        assert_eq!(storage.get_value(&usd, false, PoolType::Active), 2_100);
        assert_eq!(storage.get_value(&usd, false, PoolType::Default), 2_100);
        assert_eq!(storage.get_value(&usd, false, PoolType::GasCompensation), 100);
    }
}
