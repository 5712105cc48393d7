use anchor_lang::prelude::*;

use crate::{
    errors::ConfigError,
    state::{Ledger, ProtocolConfig},
};

/// Replaces the risk parameters. The token lists and the gas token stay as they were.
pub fn config_pool_state_handler(ledger: &mut Ledger, new_config: ProtocolConfig) -> Result<()> {
    new_config.validate()?;

    let config = ledger.config();
    require!(
        new_config.collateral_tokens == config.collateral_tokens
            && new_config.debt_tokens == config.debt_tokens
            && new_config.gas_token == config.gas_token,
        ConfigError::TokensChanged
    );

    ledger
        .sorted_troves
        .set_limits(new_config.max_troves, new_config.hint_walk_limit)?;
    msg!(
        "Pool config updated: mcr {} ccr {} min net debt {}",
        new_config.mcr,
        new_config.ccr,
        new_config.min_net_debt
    );
    ledger.pool_state.config = new_config;
    Ok(())
}
