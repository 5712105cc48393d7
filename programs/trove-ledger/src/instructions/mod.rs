pub mod open_trove;
pub use open_trove::*;

pub mod adjust_trove;
pub use adjust_trove::*;

pub mod close_trove;
pub use close_trove::*;

pub mod liquidate_trove;
pub use liquidate_trove::*;

pub mod batch_liquidate_troves;
pub use batch_liquidate_troves::*;

pub mod redeem_collateral;
pub use redeem_collateral::*;

pub mod provide_to_sp;
pub use provide_to_sp::*;

pub mod withdraw_from_sp;
pub use withdraw_from_sp::*;

pub mod claim_from_sp;
pub use claim_from_sp::*;

pub mod claim_coll_surplus;
pub use claim_coll_surplus::*;

pub mod config_pool_state;
pub use config_pool_state::*;
