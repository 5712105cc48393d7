use anchor_lang::prelude::*;

use crate::{
    errors::BorrowerOpsError,
    events::{Operation, TroveCreated, TroveUpdated},
    state::{
        get_icr_of, get_nominal_icr_of, to_token_amounts, to_token_map, Ledger, PoolType,
        PriceSnapshot, TokenAmount,
    },
    utils::{require_known_tokens, require_non_zero_change},
};

pub fn open_trove_handler(
    ledger: &mut Ledger,
    prices: &PriceSnapshot,
    borrower: Pubkey,
    coll: &[TokenAmount],
    debt: &[TokenAmount],
    prev_hint: Pubkey,
    next_hint: Pubkey,
) -> Result<()> {
    let coll = to_token_map(coll)?;
    let debt = to_token_map(debt)?;
    require!(!coll.is_empty(), BorrowerOpsError::EmptyCollateral);
    require_non_zero_change(&debt)?;
    require_known_tokens(&coll, &ledger.config().collateral_tokens)?;
    require_known_tokens(&debt, &ledger.config().debt_tokens)?;

    let mut trove = ledger.take_trove(&borrower);
    trove.require_trove_not_active()?;

    // Check is recovery
    let is_recovery_mode = ledger.pool_state.check_recovery_mode(prices)?;

    ledger.pool_state.require_at_least_min_net_debt(&debt, prices)?;

    // ICR is based on the composite debt, i.e. the requested debt + the gas reserve
    let composite_debt = ledger.pool_state.get_composite_debt(&debt)?;
    let icr = get_icr_of(&coll, &composite_debt, prices)?;
    let nicr = get_nominal_icr_of(&coll, &composite_debt)?;

    if is_recovery_mode {
        ledger.pool_state.require_icr_is_above_ccr(icr)?;
    } else {
        ledger.pool_state.require_icr_is_above_mcr(icr)?;
        let new_tcr = ledger.pool_state.get_new_tcr_from_trove_change(
            &coll,
            true,
            &composite_debt,
            true,
            prices,
        )?; // bools: coll increase, debt increase
        ledger.pool_state.require_new_tcr_is_above_ccr(new_tcr)?;
    }

    // Set the trove struct's properties
    trove.init(borrower, coll.clone(), composite_debt.clone());
    trove.update_reward_snapshot(&ledger.pool_state);
    let stake = trove.update_stake_and_total_stakes(&mut ledger.pool_state)?;

    ledger
        .sorted_troves
        .insert(borrower, nicr, prev_hint, next_hint)?;
    let array_index = ledger.add_trove_owner(&mut trove);

    let gas_token = ledger.config().gas_token;
    let gas_compensation = ledger.config().gas_compensation;
    let storage = &mut ledger.pool_state.storage;
    storage.add_values(&coll, true, PoolType::Active)?;
    storage.add_values(&composite_debt, false, PoolType::Active)?;
    storage.add_value(&gas_token, false, PoolType::GasCompensation, gas_compensation)?;

    emit!(TroveCreated {
        borrower,
        array_index
    });
    emit!(TroveUpdated {
        borrower,
        debt: to_token_amounts(&composite_debt),
        coll: to_token_amounts(&coll),
        stake: to_token_amounts(&stake),
        operation: Operation::OpenTrove
    });

    ledger.put_trove(trove);
    Ok(())
}

#[cfg(test)]
pub mod open_trove_test {
    use super::*;
    use crate::{
        errors::SortedTrovesError,
        state::{amount_of, TokenMap, TroveStatus},
        utils::test_fixtures::{amounts, load_ledger, GAS_COMPENSATION},
    };

    #[test]
    fn open_records_composite_debt_and_gas_reserve() {
        let mut fixture = load_ledger();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let alice = Pubkey::new_unique();

        // 30 eth = 3_000 USD against 1_100 USD
        fixture
            .ledger
            .open_trove(
                &fixture.feed,
                alice,
                &amounts(&[(eth, 30)]),
                &amounts(&[(usd, 1_000)]),
                Pubkey::default(),
                Pubkey::default(),
            )
            .unwrap();

        let trove = fixture.ledger.get_trove(&alice);
        assert_eq!(trove.status, TroveStatus::Active);
        assert_eq!(trove.debt, TokenMap::from([(usd, 1_000 + GAS_COMPENSATION)]));
        assert_eq!(trove.stake, TokenMap::from([(eth, 30)]));
        assert_eq!(trove.array_index, 0);
        assert!(fixture.ledger.sorted_troves.contains(&alice));

        let storage = &fixture.ledger.pool_state.storage;
        assert_eq!(storage.get_value(&eth, true, PoolType::Active), 30);
        assert_eq!(storage.get_value(&usd, false, PoolType::Active), 1_100);
        assert_eq!(
            storage.get_value(&usd, false, PoolType::GasCompensation),
            GAS_COMPENSATION
        );
        assert_eq!(amount_of(&fixture.ledger.pool_state.total_stakes, &eth), 30);
    }

    #[test]
    fn open_rejects_bad_requests() {
        let mut fixture = load_ledger();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let alice = Pubkey::new_unique();
        let null = Pubkey::default();

        let res = fixture.ledger.open_trove(
            &fixture.feed,
            alice,
            &[],
            &amounts(&[(usd, 1_000)]),
            null,
            null,
        );
        assert_eq!(res.unwrap_err(), BorrowerOpsError::EmptyCollateral.into());

        let res = fixture.ledger.open_trove(
            &fixture.feed,
            alice,
            &amounts(&[(eth, 30)]),
            &amounts(&[(usd, 999)]),
            null,
            null,
        );
        assert_eq!(res.unwrap_err(), BorrowerOpsError::DebtLessThanMin.into());

        // 11 eth = 1_100 USD is 100% of the composite debt
        let res = fixture.ledger.open_trove(
            &fixture.feed,
            alice,
            &amounts(&[(eth, 11)]),
            &amounts(&[(usd, 1_000)]),
            null,
            null,
        );
        assert_eq!(res.unwrap_err(), BorrowerOpsError::ICRLowerThanMCR.into());

        let res = fixture.ledger.open_trove(
            &fixture.feed,
            alice,
            &amounts(&[(usd, 30)]),
            &amounts(&[(usd, 1_000)]),
            null,
            null,
        );
        assert_eq!(res.unwrap_err(), BorrowerOpsError::UnknownToken.into());

        // nothing was written by the failed attempts
        assert_eq!(fixture.ledger.get_trove_status(&alice), TroveStatus::NonExistent);
        assert!(fixture.ledger.sorted_troves.is_empty());
        assert!(fixture.ledger.pool_state.total_stakes.is_empty());

        fixture
            .ledger
            .open_trove(
                &fixture.feed,
                alice,
                &amounts(&[(eth, 30)]),
                &amounts(&[(usd, 1_000)]),
                null,
                null,
            )
            .unwrap();
        let res = fixture.ledger.open_trove(
            &fixture.feed,
            alice,
            &amounts(&[(eth, 30)]),
            &amounts(&[(usd, 1_000)]),
            null,
            null,
        );
        assert_eq!(res.unwrap_err(), BorrowerOpsError::TroveIsActive.into());
    }

    #[test]
    fn full_list_rejects_new_troves() {
        let mut fixture = load_ledger();
        let (eth, usd) = (fixture.eth, fixture.usd);
        fixture.ledger.sorted_troves = crate::state::SortedTroves::new(1, 8);
        let null = Pubkey::default();

        fixture
            .ledger
            .open_trove(
                &fixture.feed,
                Pubkey::new_unique(),
                &amounts(&[(eth, 30)]),
                &amounts(&[(usd, 1_000)]),
                null,
                null,
            )
            .unwrap();
        let res = fixture.ledger.open_trove(
            &fixture.feed,
            Pubkey::new_unique(),
            &amounts(&[(eth, 30)]),
            &amounts(&[(usd, 1_000)]),
            null,
            null,
        );
        assert_eq!(res.unwrap_err(), SortedTrovesError::ListFull.into());
    }
}
