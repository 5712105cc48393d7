pub mod journal;
pub use journal::*;

pub mod token_amount;
pub use token_amount::*;

pub mod config;
pub use config::*;

pub mod storage_pool;
pub use storage_pool::*;

pub mod price_feed;
pub use price_feed::*;

pub mod sorted_troves;
pub use sorted_troves::*;

pub mod pool_state;
pub use pool_state::*;

pub mod trove;
pub use trove::*;

pub mod stability_pool_state;
pub use stability_pool_state::*;

pub mod epoch_scale;
pub use epoch_scale::*;

pub mod stability_pool_deposit;
pub use stability_pool_deposit::*;

pub mod liquidation;
pub use liquidation::*;

pub mod ledger;
pub use ledger::*;
