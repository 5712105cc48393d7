use anchor_lang::prelude::*;

use crate::{
    errors::{BorrowerOpsError, StabilityPoolError},
    events::{CollGainWithdrawn, UserDepositChanged},
    state::{add_amounts, to_token_amounts, to_token_map, Ledger, StabilityPoolState, TokenAmount, TokenMap},
    utils::require_known_tokens,
};

/// Deposits into one pool per listed debt token. Returns the collateral gains paid out.
pub fn provide_to_sp_handler(
    ledger: &mut Ledger,
    depositor: Pubkey,
    amounts: &[TokenAmount],
) -> Result<TokenMap> {
    let amounts = to_token_map(amounts)?;
    require!(!amounts.is_empty(), StabilityPoolError::ZeroAmount);
    require_known_tokens(&amounts, &ledger.config().debt_tokens)?;

    let mut coll_gains = TokenMap::new();
    for (debt_token, amount) in &amounts {
        let sp_state = ledger.stability_pool_mut(debt_token)?;
        let (_, coll_gain) = update_deposit(sp_state, depositor, *amount, true)?;
        add_amounts(&mut coll_gains, &coll_gain)?;
    }
    Ok(coll_gains)
}

/// Pays out the pending gain, books the compounding loss and moves the deposit
/// by `change`. Returns the new deposit and the gain.
pub fn update_deposit(
    sp_state: &mut StabilityPoolState,
    depositor: Pubkey,
    change: u64,
    is_deposit: bool,
) -> Result<(u64, TokenMap)> {
    let mut sp_deposit = sp_state.get_deposit(&depositor);
    let depositor_coll_gain = sp_state.get_depositor_coll_gain(&depositor)?;
    let compounded_deposit = sp_deposit.get_compounded_deposit(sp_state)?;
    let debt_loss = sp_deposit.initial_value.saturating_sub(compounded_deposit);

    let new_deposit = if is_deposit {
        sp_state.increase_debt(change)?;
        compounded_deposit.checked_add(change)
    } else {
        sp_state.decrease_debt(change)?;
        compounded_deposit.checked_sub(change)
    }
    .ok_or(BorrowerOpsError::Calculation)?;

    sp_state.decrease_coll(&depositor_coll_gain)?;
    sp_deposit.update_deposit_and_snapshot(sp_state, depositor, new_deposit);
    if new_deposit == 0 {
        sp_state.deposits.remove(&depositor);
    } else {
        sp_state.deposits.insert(depositor, sp_deposit);
    }

    emit!(UserDepositChanged {
        depositor,
        debt_token: sp_state.debt_token,
        new_deposit
    });
    emit!(CollGainWithdrawn {
        depositor,
        debt_token: sp_state.debt_token,
        coll: to_token_amounts(&depositor_coll_gain),
        debt_loss
    });

    Ok((new_deposit, depositor_coll_gain))
}

#[cfg(test)]
pub mod provide_to_sp_test {
    use super::*;
    use crate::utils::test_fixtures::{amounts, load_ledger};

    #[test]
    fn deposits_land_in_their_own_pool() {
        let mut fixture = load_ledger();
        let (usd, eur) = (fixture.usd, fixture.eur);
        let alice = Pubkey::new_unique();

        let gains = fixture
            .ledger
            .provide_stability(alice, &amounts(&[(usd, 1_000), (eur, 500)]))
            .unwrap();
        assert!(gains.is_empty());
        assert_eq!(fixture.ledger.get_total_deposits(&usd).unwrap(), 1_000);
        assert_eq!(fixture.ledger.get_total_deposits(&eur).unwrap(), 500);
        assert_eq!(fixture.ledger.get_compounded_deposit(&eur, &alice).unwrap(), 500);

        fixture
            .ledger
            .provide_stability(alice, &amounts(&[(usd, 250)]))
            .unwrap();
        assert_eq!(fixture.ledger.get_compounded_deposit(&usd, &alice).unwrap(), 1_250);
    }

    #[test]
    fn top_up_pays_out_pending_gain() {
        let mut fixture = load_ledger();
        let (eth, usd) = (fixture.eth, fixture.usd);
        let alice = Pubkey::new_unique();
        fixture
            .ledger
            .provide_stability(alice, &amounts(&[(usd, 1_000)]))
            .unwrap();
        fixture
            .ledger
            .stability_pool_mut(&usd)
            .unwrap()
            .offset(400, &TokenMap::from([(eth, 50)]))
            .unwrap();

        let gains = fixture
            .ledger
            .provide_stability(alice, &amounts(&[(usd, 100)]))
            .unwrap();
        assert_eq!(gains, TokenMap::from([(eth, 50)]));
        assert_eq!(fixture.ledger.get_compounded_deposit(&usd, &alice).unwrap(), 700);
        assert!(fixture.ledger.get_depositor_coll_gain(&usd, &alice).unwrap().is_empty());
        let sp_state = fixture.ledger.stability_pool(&usd).unwrap();
        assert_eq!(sp_state.total_deposits, 700);
        assert!(sp_state.total_collateral.is_empty());
    }

    #[test]
    fn bad_deposits_are_rejected() {
        let mut fixture = load_ledger();
        let alice = Pubkey::new_unique();
        let res = fixture.ledger.provide_stability(alice, &[]);
        assert_eq!(res.unwrap_err(), StabilityPoolError::ZeroAmount.into());
        let res = fixture
            .ledger
            .provide_stability(alice, &amounts(&[(fixture.usd, 0)]));
        assert_eq!(res.unwrap_err(), StabilityPoolError::ZeroAmount.into());
        let res = fixture
            .ledger
            .provide_stability(alice, &amounts(&[(fixture.eth, 10)]));
        assert_eq!(res.unwrap_err(), BorrowerOpsError::UnknownToken.into());
    }
}
