use anchor_lang::prelude::*;

use crate::{
    errors::StabilityPoolError,
    instructions::update_deposit,
    state::{add_amounts, Ledger, TokenMap},
};

/// Pays out the gains of every pool the depositor is in. Deposits compound but stay put.
pub fn claim_from_sp_handler(ledger: &mut Ledger, depositor: Pubkey) -> Result<TokenMap> {
    let mut coll_gains = TokenMap::new();
    let mut has_deposit = false;
    for sp_state in ledger.stability_pools.values_mut() {
        if sp_state.get_deposit(&depositor).require_user_has_deposit().is_err() {
            continue;
        }
        has_deposit = true;
        let (_, coll_gain) = update_deposit(sp_state, depositor, 0, true)?;
        add_amounts(&mut coll_gains, &coll_gain)?;
    }
    require!(has_deposit, StabilityPoolError::ZeroDeposit);
    Ok(coll_gains)
}

#[cfg(test)]
pub mod claim_from_sp_test {
    use super::*;
    use crate::utils::test_fixtures::{amounts, load_ledger};

    #[test]
    fn gains_from_every_pool_are_paid() {
        let mut fixture = load_ledger();
        let (eth, btc, usd, eur) = (fixture.eth, fixture.btc, fixture.usd, fixture.eur);
        let alice = Pubkey::new_unique();
        fixture
            .ledger
            .provide_stability(alice, &amounts(&[(usd, 1_000), (eur, 1_000)]))
            .unwrap();
        fixture
            .ledger
            .stability_pool_mut(&usd)
            .unwrap()
            .offset(100, &TokenMap::from([(eth, 20)]))
            .unwrap();
        fixture
            .ledger
            .stability_pool_mut(&eur)
            .unwrap()
            .offset(100, &TokenMap::from([(btc, 2)]))
            .unwrap();

        let gains = fixture.ledger.withdraw_gains(alice).unwrap();
        assert_eq!(gains, TokenMap::from([(eth, 20), (btc, 2)]));
        assert!(fixture.ledger.get_depositor_coll_gain(&usd, &alice).unwrap().is_empty());
        assert!(fixture.ledger.get_depositor_coll_gain(&eur, &alice).unwrap().is_empty());

        assert_eq!(fixture.ledger.get_compounded_deposit(&usd, &alice).unwrap(), 900);
        assert_eq!(fixture.ledger.get_total_deposits(&usd).unwrap(), 900);

        // nothing new to collect
        let gains = fixture.ledger.withdraw_gains(alice).unwrap();
        assert!(gains.is_empty());
    }

    #[test]
    fn claim_needs_a_deposit() {
        let mut fixture = load_ledger();
        let res = fixture.ledger.withdraw_gains(Pubkey::new_unique());
        assert_eq!(res.unwrap_err(), StabilityPoolError::ZeroDeposit.into());
    }
}
