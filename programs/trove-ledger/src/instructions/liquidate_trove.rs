use anchor_lang::prelude::*;

use crate::{
    constants::ONE_HUNDERED_PERCENT,
    errors::LiquidationError,
    events::{Liquidation, Operation, TroveLiquidated, TroveUpdated},
    state::{
        amount_of, sub_amounts, to_token_amounts, Ledger, LiquidationTotals, LiquidationValues,
        LocalVariablesLiquidationSequence, PoolType, PriceSnapshot, TokenMap, Trove, TroveStatus,
    },
};

pub fn liquidate_trove_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    liquidator: Pubkey,
    borrower: Pubkey,
) -> Result<LiquidationTotals> {
    let mut vars = init_liquidation_sequence(ledger, prices)?;
    let mut totals = LiquidationTotals::default();

    let trove = ledger.get_trove(&borrower);
    trove.require_trove_active().map_err(|_| {
        error!(LiquidationError::NoLiquidatableTrove).with_pubkeys((borrower, borrower))
    })?;

    match liquidate_single(ledger, prices, &mut vars, borrower)? {
        Some(single_liquidation) => totals.add_liquidation_values(&single_liquidation)?,
        None => {
            return Err(
                error!(LiquidationError::NoLiquidatableTrove).with_pubkeys((borrower, borrower))
            )
        }
    }

    apply_liquidation_totals(ledger, prices, liquidator, &totals)?;
    Ok(totals)
}

/// Mode and TCR are read once, before the first trove of the sequence is touched.
pub fn init_liquidation_sequence(
    ledger: &Ledger,
    prices: &PriceSnapshot,
) -> Result<LocalVariablesLiquidationSequence> {
    let tcr = ledger.pool_state.get_tcr(prices)?;
    let is_recovery_mode = tcr < ledger.config().ccr;
    msg!(
        "Liquidation sequence in {} mode, TCR {}",
        if is_recovery_mode { "recovery" } else { "normal" },
        tcr
    );
    Ok(LocalVariablesLiquidationSequence {
        remaining_debt_in_stab_pools: ledger.get_remaining_debt_in_stab_pools(),
        icr: 0,
        tcr,
        is_recovery_mode,
    })
}

/// Liquidates `borrower` if the sequence's mode allows it, `None` otherwise.
pub fn liquidate_single(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    vars: &mut LocalVariablesLiquidationSequence,
    borrower: Pubkey,
) -> Result<Option<LiquidationValues>> {
    let trove = ledger.get_trove(&borrower);
    if !trove.is_active() {
        msg!("Skipping {}: trove is not active", borrower);
        return Ok(None);
    }
    vars.icr = trove.get_current_icr(&ledger.pool_state, prices)?;

    let single_liquidation = if vars.is_recovery_mode {
        liquidate_recovery_mode(ledger, prices, borrower, vars)?
    } else if vars.icr < ledger.config().mcr {
        Some(liquidate_normal_mode(ledger, prices, borrower, vars)?)
    } else {
        None
    };

    match &single_liquidation {
        Some(values) => vars.update(values)?,
        None => msg!("Skipping {}: ICR {} is not liquidatable", borrower, vars.icr),
    }
    Ok(single_liquidation)
}

fn liquidate_normal_mode(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    borrower: Pubkey,
    vars: &LocalVariablesLiquidationSequence,
) -> Result<LiquidationValues> {
    ledger.require_more_than_one_trove_in_system()?;
    let mut trove = ledger.take_trove(&borrower);
    let mut single_liquidation = seize_trove(ledger, &mut trove)?;

    let coll_to_liquidate = coll_after_gas_compensation(&single_liquidation)?;
    single_liquidation.offset_and_redistribute(
        &coll_to_liquidate,
        &vars.remaining_debt_in_stab_pools,
        prices,
    )?;

    close_liquidated_trove(
        ledger,
        trove,
        &single_liquidation,
        TroveStatus::ClosedByLiquidationNormal,
        Operation::LiquidateInNormalMode,
    )?;
    Ok(single_liquidation)
}

fn liquidate_recovery_mode(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    borrower: Pubkey,
    vars: &LocalVariablesLiquidationSequence,
) -> Result<Option<LiquidationValues>> {
    let icr = vars.icr;
    let mcr = ledger.config().mcr;
    let entire = ledger.get_entire_debt_and_coll(&borrower)?;
    let fully_covered = entire
        .debt
        .iter()
        .all(|(token, amount)| *amount <= amount_of(&vars.remaining_debt_in_stab_pools, token));

    // MCR <= ICR < TCR can only go through the capped offset
    if icr >= mcr && (icr >= vars.tcr || !fully_covered) {
        return Ok(None);
    }

    ledger.require_more_than_one_trove_in_system()?;
    let mut trove = ledger.take_trove(&borrower);
    let mut single_liquidation = seize_trove(ledger, &mut trove)?;

    // If ICR <= 100%, purely redistribute the Trove across all active Troves
    if icr <= ONE_HUNDERED_PERCENT {
        single_liquidation.debt_to_redistribute = single_liquidation.entire_trove_debt.clone();
        single_liquidation.coll_to_redistribute = coll_after_gas_compensation(&single_liquidation)?;

    // If 100% < ICR < MCR, offset as much as possible, and redistribute the remainder
    } else if icr < mcr {
        let coll_to_liquidate = coll_after_gas_compensation(&single_liquidation)?;
        single_liquidation.offset_and_redistribute(
            &coll_to_liquidate,
            &vars.remaining_debt_in_stab_pools,
            prices,
        )?;

    // MCR <= ICR < TCR and the pools absorb the whole debt: offset at MCR,
    // the rest of the collateral is claimable by the borrower
    } else {
        single_liquidation = ledger.pool_state.get_capped_offset_vals(
            &single_liquidation.entire_trove_debt,
            &single_liquidation.entire_trove_coll,
            icr,
            prices,
        )?;
        trove.account_surplus(&single_liquidation.coll_surplus)?;
    }

    close_liquidated_trove(
        ledger,
        trove,
        &single_liquidation,
        TroveStatus::ClosedByLiquidationRecovery,
        Operation::LiquidateInRecoveryMode,
    )?;
    Ok(Some(single_liquidation))
}

/// Pulls pending rewards into the active bucket, drops the stake and
/// carves out gas compensation.
fn seize_trove(ledger: &mut Ledger, trove: &mut Trove) -> Result<LiquidationValues> {
    let pool_state = &mut ledger.pool_state;
    let entire = trove.get_entire_debt_coll(pool_state)?;

    // moving pending debt/coll to active pool
    pool_state.move_pending_trove_rewards_to_active(
        &entire.pending_debt_reward,
        &entire.pending_coll_reward,
    )?;
    trove.remove_stake(pool_state)?;

    Ok(LiquidationValues {
        coll_gas_compensation: pool_state.get_coll_gas_compensation(&entire.coll),
        debt_gas_compensation: pool_state.config.gas_compensation,
        entire_trove_debt: entire.debt,
        entire_trove_coll: entire.coll,
        ..Default::default()
    })
}

fn coll_after_gas_compensation(single_liquidation: &LiquidationValues) -> Result<TokenMap> {
    let mut coll = single_liquidation.entire_trove_coll.clone();
    sub_amounts(&mut coll, &single_liquidation.coll_gas_compensation)?;
    Ok(coll)
}

fn close_liquidated_trove(
    ledger: &mut Ledger,
    mut trove: Trove,
    single_liquidation: &LiquidationValues,
    status: TroveStatus,
    operation: Operation,
) -> Result<()> {
    let borrower = trove.borrower;
    ledger.remove_trove_owner(&trove)?;
    ledger.sorted_troves.remove(&borrower)?;
    trove.close_trove(status)?;

    let mut liquidated_coll = single_liquidation.entire_trove_coll.clone();
    sub_amounts(&mut liquidated_coll, &single_liquidation.coll_surplus)?;
    emit!(TroveLiquidated {
        borrower,
        debt: to_token_amounts(&single_liquidation.entire_trove_debt),
        coll: to_token_amounts(&liquidated_coll),
        operation,
    });
    emit!(TroveUpdated {
        borrower,
        debt: vec![],
        coll: vec![],
        stake: vec![],
        operation,
    });

    ledger.put_trove(trove);
    Ok(())
}

/// Settles the aggregate of a liquidation sequence: offsets, redistribution,
/// surplus accounting and gas compensation.
pub fn apply_liquidation_totals(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    liquidator: Pubkey,
    totals: &LiquidationTotals,
) -> Result<()> {
    require!(
        totals.liquidated_troves > 0,
        LiquidationError::NoLiquidatableTrove
    );

    let Ledger {
        pool_state,
        stability_pools,
        ..
    } = ledger;

    // StabilityPool offset
    pool_state.move_coll_debt_from_liquidate(stability_pools, totals)?;

    pool_state.redistribute_debt_and_coll(
        &totals.total_debt_to_redistribute,
        &totals.total_coll_to_redistribute,
        prices,
    )?;

    if !totals.total_coll_surplus.is_empty() {
        pool_state
            .storage
            .subtract_values(&totals.total_coll_surplus, true, PoolType::Active)?;
        pool_state.increase_total_surplus(&totals.total_coll_surplus)?;
    }

    pool_state.update_system_snapshots()?;

    let mut liquidated_coll = totals.total_coll_in_sequence.clone();
    sub_amounts(&mut liquidated_coll, &totals.total_coll_surplus)?;
    sub_amounts(&mut liquidated_coll, &totals.total_coll_gas_compensation)?;

    emit!(Liquidation {
        liquidator,
        debt: to_token_amounts(&totals.total_debt_in_sequence),
        coll: to_token_amounts(&liquidated_coll),
        total_debt_gas_compensation: totals.total_debt_gas_compensation,
        total_coll_gas_compensation: to_token_amounts(&totals.total_coll_gas_compensation),
    });
    Ok(())
}

#[cfg(test)]
pub mod liquidate_trove_test {
    use super::*;
    use crate::{
        constants::DECIMAL_PRECISION,
        errors::BorrowerOpsError,
        state::StaticPriceFeed,
        utils::test_fixtures::{amounts, load_ledger, Fixture},
    };

    fn open(fixture: &mut Fixture, borrower: Pubkey, eth: u64, usd: u64) {
        let (eth_token, usd_token) = (fixture.eth, fixture.usd);
        fixture
            .ledger
            .open_trove(
                &fixture.feed,
                borrower,
                &amounts(&[(eth_token, eth)]),
                &amounts(&[(usd_token, usd)]),
                Pubkey::default(),
                Pubkey::default(),
            )
            .unwrap();
    }

    fn set_eth_price(feed: &mut StaticPriceFeed, eth: Pubkey, per_mille: u128) {
        feed.set_price(eth, DECIMAL_PRECISION / 1_000 * per_mille);
    }

    /// A holds 6_000 eth and B 3_000 eth, both against 2_100 usd.
    fn load_two_troves() -> (Fixture, Pubkey, Pubkey) {
        let mut fixture = load_ledger();
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        set_eth_price(&mut fixture.feed, fixture.eth, 1_000);
        open(&mut fixture, a, 6_000, 2_000);
        open(&mut fixture, b, 3_000, 2_000);
        (fixture, a, b)
    }

    #[test]
    fn normal_mode_liquidation_redistributes_to_remaining_trove() {
        let (mut fixture, a, b) = load_two_troves();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let liquidator = Pubkey::new_unique();

        // A at 210%, B at 105%, TCR 157.5%
        set_eth_price(&mut fixture.feed, eth, 735);
        assert!(!fixture.ledger.check_recovery_mode(&fixture.feed).unwrap());

        let totals = fixture.ledger.liquidate(&fixture.feed, liquidator, b).unwrap();
        assert_eq!(totals.liquidated_troves, 1);
        assert_eq!(totals.total_coll_gas_compensation, TokenMap::from([(eth, 15)]));
        assert_eq!(totals.total_debt_gas_compensation, 100);
        assert!(totals.total_debt_to_offset.is_empty());
        assert_eq!(totals.total_debt_to_redistribute, TokenMap::from([(usd, 2_100)]));
        assert_eq!(totals.total_coll_to_redistribute, TokenMap::from([(eth, 2_985)]));

        let trove_b = fixture.ledger.get_trove(&b);
        assert_eq!(trove_b.status, TroveStatus::ClosedByLiquidationNormal);
        assert!(trove_b.coll.is_empty() && trove_b.debt.is_empty() && trove_b.stake.is_empty());
        assert!(!fixture.ledger.sorted_troves.contains(&b));
        assert_eq!(fixture.ledger.trove_owners, vec![a]);
        assert_eq!(amount_of(&fixture.ledger.pool_state.total_stakes, &eth), 6_000);

        let entire = fixture.ledger.get_entire_debt_and_coll(&a).unwrap();
        assert_eq!(entire.coll, TokenMap::from([(eth, 8_985)]));
        assert_eq!(entire.debt, TokenMap::from([(usd, 4_200)]));

        let storage = &fixture.ledger.pool_state.storage;
        assert_eq!(storage.get_value(&eth, true, PoolType::Active), 6_000);
        assert_eq!(storage.get_value(&eth, true, PoolType::Default), 2_985);
        assert_eq!(storage.get_value(&usd, false, PoolType::Active), 2_100);
        assert_eq!(storage.get_value(&usd, false, PoolType::Default), 2_100);
        assert_eq!(storage.get_value(&usd, false, PoolType::GasCompensation), 100);
        assert_eq!(amount_of(&fixture.ledger.pool_state.total_coll_snapshot, &eth), 8_985);
        assert_eq!(amount_of(&fixture.ledger.pool_state.total_stakes_snapshot, &eth), 6_000);
    }

    #[test]
    fn pending_rewards_apply_once() {
        let (mut fixture, a, b) = load_two_troves();
        let (eth, usd) = (fixture.eth, fixture.usd);
        set_eth_price(&mut fixture.feed, eth, 735);
        fixture
            .ledger
            .liquidate(&fixture.feed, Pubkey::new_unique(), b)
            .unwrap();

        assert!(fixture.ledger.has_pending_rewards(&a));
        let (coll_reward, debt_reward) = fixture.ledger.get_pending_rewards(&a).unwrap();
        assert_eq!(coll_reward, TokenMap::from([(eth, 2_985)]));
        assert_eq!(debt_reward, TokenMap::from([(usd, 2_100)]));
        let entire = fixture.ledger.get_entire_debt_and_coll(&a).unwrap();
        fixture.ledger.apply_pending_rewards(&a).unwrap();
        let trove = fixture.ledger.get_trove(&a);
        assert_eq!(trove.coll, entire.coll);
        assert_eq!(trove.debt, entire.debt);
        assert!(!fixture.ledger.has_pending_rewards(&a));

        fixture.ledger.apply_pending_rewards(&a).unwrap();
        assert_eq!(fixture.ledger.get_trove(&a), trove);
        let storage = &fixture.ledger.pool_state.storage;
        assert_eq!(storage.get_value(&eth, true, PoolType::Default), 0);
        assert_eq!(storage.get_value(&eth, true, PoolType::Active), 8_985);
    }

    #[test]
    fn token_without_stakers_can_be_staked_again() {
        let mut fixture = load_ledger();
        let (eth, btc, usd) = (fixture.eth, fixture.btc, fixture.usd);
        let (a, b, c) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        set_eth_price(&mut fixture.feed, eth, 1_000);
        for (borrower, coll) in [(a, (btc, 10)), (b, (eth, 3_000)), (c, (btc, 10))] {
            fixture
                .ledger
                .open_trove(
                    &fixture.feed,
                    borrower,
                    &amounts(&[coll]),
                    &amounts(&[(usd, 2_000)]),
                    Pubkey::default(),
                    Pubkey::default(),
                )
                .unwrap();
        }

        // B was the only eth staker, its eth now sits in Default
        set_eth_price(&mut fixture.feed, eth, 735);
        fixture
            .ledger
            .liquidate(&fixture.feed, Pubkey::new_unique(), b)
            .unwrap();
        let pool_state = &fixture.ledger.pool_state;
        assert_eq!(amount_of(&pool_state.total_stakes_snapshot, &eth), 0);
        assert_eq!(amount_of(&pool_state.total_coll_snapshot, &eth), 2_985);

        fixture
            .ledger
            .add_coll(&fixture.feed, a, &amounts(&[(btc, 1)]), Pubkey::default(), Pubkey::default())
            .unwrap();
        let trove_a = fixture.ledger.get_trove(&a);
        assert!(amount_of(&trove_a.coll, &eth) > 0);
        assert_eq!(amount_of(&trove_a.stake, &eth), amount_of(&trove_a.coll, &eth));

        let d = Pubkey::new_unique();
        fixture
            .ledger
            .open_trove(
                &fixture.feed,
                d,
                &amounts(&[(eth, 3_000)]),
                &amounts(&[(usd, 1_000)]),
                Pubkey::default(),
                Pubkey::default(),
            )
            .unwrap();
        assert_eq!(amount_of(&fixture.ledger.get_trove(&d).stake, &eth), 3_000);
        assert_eq!(
            amount_of(&fixture.ledger.pool_state.total_stakes, &eth),
            3_000 + amount_of(&trove_a.stake, &eth)
        );
    }

    #[test]
    fn offset_goes_to_stability_pool_first() {
        let (mut fixture, _, b) = load_two_troves();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let depositor = Pubkey::new_unique();
        fixture
            .ledger
            .provide_stability(depositor, &amounts(&[(usd, 1_500)]))
            .unwrap();

        set_eth_price(&mut fixture.feed, eth, 735);
        let totals = fixture
            .ledger
            .liquidate(&fixture.feed, Pubkey::new_unique(), b)
            .unwrap();
        assert_eq!(totals.total_debt_to_offset, TokenMap::from([(usd, 1_500)]));
        assert_eq!(totals.total_debt_to_redistribute, TokenMap::from([(usd, 600)]));
        // 2_985 split 1_500 : 600 by USD value
        assert_eq!(totals.total_coll_to_send_to_sp[&usd], TokenMap::from([(eth, 2_132)]));
        assert_eq!(totals.total_coll_to_redistribute, TokenMap::from([(eth, 853)]));

        // the pool was emptied, so its epoch moved on
        let sp_state = fixture.ledger.stability_pool(&usd).unwrap();
        assert_eq!(sp_state.total_deposits, 0);
        assert_eq!(sp_state.current_epoch, 1);
        assert_eq!(
            fixture.ledger.get_total_collateral(&usd).unwrap(),
            TokenMap::from([(eth, 2_132)])
        );
        assert_eq!(fixture.ledger.get_compounded_deposit(&usd, &depositor).unwrap(), 0);
        let gain = fixture.ledger.get_depositor_coll_gain(&usd, &depositor).unwrap();
        assert!(amount_of(&gain, &eth) >= 2_131 && amount_of(&gain, &eth) <= 2_132);

        // every unit of collateral is accounted for
        let storage = &fixture.ledger.pool_state.storage;
        let held = storage.get_value(&eth, true, PoolType::Active)
            + storage.get_value(&eth, true, PoolType::Default)
            + amount_of(&sp_state.total_collateral, &eth)
            + amount_of(&totals.total_coll_gas_compensation, &eth);
        assert_eq!(held, 9_000);
        assert_eq!(storage.get_value(&usd, false, PoolType::Active), 2_100);
        assert_eq!(storage.get_value(&usd, false, PoolType::Default), 600);
    }

    #[test]
    fn healthy_or_missing_troves_are_not_liquidatable() {
        let (mut fixture, a, _) = load_two_troves();
        let liquidator = Pubkey::new_unique();
        let res = fixture.ledger.liquidate(&fixture.feed, liquidator, a);
        assert_eq!(res.unwrap_err(), LiquidationError::NoLiquidatableTrove.into());
        let res = fixture
            .ledger
            .liquidate(&fixture.feed, liquidator, Pubkey::new_unique());
        assert_eq!(res.unwrap_err(), LiquidationError::NoLiquidatableTrove.into());
    }

    #[test]
    fn last_trove_cannot_be_liquidated() {
        let (mut fixture, a, b) = load_two_troves();
        let eth = fixture.eth;
        let liquidator = Pubkey::new_unique();
        set_eth_price(&mut fixture.feed, eth, 735);
        fixture.ledger.liquidate(&fixture.feed, liquidator, b).unwrap();

        // A now holds 8_985 eth against 4_200 usd, 107% at 0.5
        set_eth_price(&mut fixture.feed, eth, 500);
        let res = fixture.ledger.liquidate(&fixture.feed, liquidator, a);
        assert_eq!(res.unwrap_err(), BorrowerOpsError::OnlyOneTrove.into());
        assert!(fixture.ledger.get_trove(&a).is_active());
    }

    #[test]
    fn recovery_mode_spares_troves_above_tcr() {
        let (mut fixture, a, b) = load_two_troves();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let liquidator = Pubkey::new_unique();
        fixture
            .ledger
            .provide_stability(Pubkey::new_unique(), &amounts(&[(usd, 5_000)]))
            .unwrap();

        // A at 171%, B at 85.7%, TCR 128.6%
        set_eth_price(&mut fixture.feed, eth, 600);
        assert!(fixture.ledger.check_recovery_mode(&fixture.feed).unwrap());

        let res = fixture.ledger.liquidate(&fixture.feed, liquidator, a);
        assert_eq!(res.unwrap_err(), LiquidationError::NoLiquidatableTrove.into());

        // under 100% nothing is offset, even with a funded pool
        let totals = fixture.ledger.liquidate(&fixture.feed, liquidator, b).unwrap();
        assert!(totals.total_debt_to_offset.is_empty());
        assert_eq!(totals.total_debt_to_redistribute, TokenMap::from([(usd, 2_100)]));
        assert_eq!(totals.total_coll_to_redistribute, TokenMap::from([(eth, 2_985)]));
        assert_eq!(
            fixture.ledger.get_trove_status(&b),
            TroveStatus::ClosedByLiquidationRecovery
        );
        assert_eq!(fixture.ledger.get_total_deposits(&usd).unwrap(), 5_000);
    }

    #[test]
    fn recovery_mode_caps_offset_at_mcr() {
        let mut fixture = load_ledger();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let (a, b, c) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        set_eth_price(&mut fixture.feed, eth, 1_000);
        open(&mut fixture, a, 6_000, 2_000);
        open(&mut fixture, b, 3_000, 2_000);
        open(&mut fixture, c, 3_300, 2_000);
        fixture
            .ledger
            .provide_stability(Pubkey::new_unique(), &amounts(&[(usd, 3_000)]))
            .unwrap();

        // C at 117.9%, TCR 146.4%
        set_eth_price(&mut fixture.feed, eth, 750);
        assert!(fixture.ledger.check_recovery_mode(&fixture.feed).unwrap());

        let totals = fixture
            .ledger
            .liquidate(&fixture.feed, Pubkey::new_unique(), c)
            .unwrap();
        // 3_080 eth is worth 110% of the debt
        assert_eq!(totals.total_coll_gas_compensation, TokenMap::from([(eth, 15)]));
        assert_eq!(totals.total_debt_to_offset, TokenMap::from([(usd, 2_100)]));
        assert_eq!(totals.total_coll_to_send_to_sp[&usd], TokenMap::from([(eth, 3_065)]));
        assert_eq!(totals.total_coll_surplus, TokenMap::from([(eth, 220)]));
        assert!(totals.total_debt_to_redistribute.is_empty());

        assert_eq!(fixture.ledger.get_coll_surplus(&c), TokenMap::from([(eth, 220)]));
        assert_eq!(
            fixture.ledger.pool_state.total_surplus,
            TokenMap::from([(eth, 220)])
        );
        assert_eq!(fixture.ledger.get_total_deposits(&usd).unwrap(), 900);

        let claimed = fixture.ledger.claim_coll_surplus(c).unwrap();
        assert_eq!(claimed, TokenMap::from([(eth, 220)]));
        assert!(fixture.ledger.pool_state.total_surplus.is_empty());
    }
}
