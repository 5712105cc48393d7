use anchor_lang::prelude::{
    borsh::{BorshDeserialize, BorshSerialize},
    *,
};

use crate::state::TokenAmount;

#[event]
pub struct TroveCreated {
    pub borrower: Pubkey,
    pub array_index: u64,
}

#[event]
pub struct TroveUpdated {
    pub borrower: Pubkey,
    pub debt: Vec<TokenAmount>,
    pub coll: Vec<TokenAmount>,
    pub stake: Vec<TokenAmount>,
    pub operation: Operation,
}

#[event]
pub struct Liquidation {
    pub liquidator: Pubkey,
    pub debt: Vec<TokenAmount>,
    pub coll: Vec<TokenAmount>,
    pub total_debt_gas_compensation: u64,
    pub total_coll_gas_compensation: Vec<TokenAmount>,
}

#[event]
pub struct Redemption {
    pub debt_token: Pubkey,
    pub attempted_amount: u64,
    pub actual_amount: u64,
    pub coll_sent: Vec<TokenAmount>,
    pub coll_fee: Vec<TokenAmount>,
}

#[event]
pub struct TroveLiquidated {
    pub borrower: Pubkey,
    pub debt: Vec<TokenAmount>,
    pub coll: Vec<TokenAmount>,
    pub operation: Operation,
}

#[event]
pub struct TotalStakesUpdated {
    pub token: Pubkey,
    pub new_total_stakes: u64,
}

#[event]
pub struct SystemSnapshotsUpdated {
    pub token: Pubkey,
    pub total_stakes_snapshot: u64,
    pub total_coll_snapshot: u64,
}

#[event]
pub struct LTermsUpdated {
    pub stake_token: Pubkey,
    pub token: Pubkey,
    pub l_coll: u128,
    pub l_debt: u128,
}

#[event]
pub struct TroveSnapshotsUpdated {
    pub borrower: Pubkey,
}

#[event]
pub struct TroveIndexUpdated {
    pub borrower: Pubkey,
    pub new_index: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    OpenTrove,
    CloseTrove,
    AdjustTrove,
    ApplyPendingRewards,
    LiquidateInNormalMode,
    LiquidateInRecoveryMode,
    RedeemCollateral,
}

// SurplusPool
#[event]
pub struct SurplusPoolCollBalanceUpdated {
    pub account: Pubkey,
    pub token: Pubkey,
    pub new_balance: u64,
}

#[event]
pub struct SurplusPoolCollSent {
    pub to: Pubkey,
    pub amount: Vec<TokenAmount>,
}

// SortedTroves
#[event]
pub struct NodeAdded {
    pub owner: Pubkey,
    pub nicr: u128,
}

#[event]
pub struct NodeRemoved {
    pub owner: Pubkey,
}

// StabilityPool
#[event]
pub struct StabilityPoolBalanceUpdated {
    pub debt_token: Pubkey,
    pub new_balance: u64,
}

#[event]
pub struct StabilityPoolCollBalanceUpdated {
    pub debt_token: Pubkey,
    pub token: Pubkey,
    pub new_balance: u64,
}

#[event]
pub struct UserDepositChanged {
    pub depositor: Pubkey,
    pub debt_token: Pubkey,
    pub new_deposit: u64,
}

#[event]
pub struct CollGainWithdrawn {
    pub depositor: Pubkey,
    pub debt_token: Pubkey,
    pub coll: Vec<TokenAmount>,
    pub debt_loss: u64,
}

#[event]
pub struct DepositSnapshotUpdated {
    pub depositor: Pubkey,
    pub debt_token: Pubkey,
    pub p: u128,
    pub epoch: u64,
    pub scale: u64,
}

#[event]
pub struct SUpdated {
    pub debt_token: Pubkey,
    pub token: Pubkey,
    pub epoch: u64,
    pub scale: u64,
}

#[event]
pub struct PUpdated {
    pub debt_token: Pubkey,
    pub p: u128,
}

#[event]
pub struct EpochUpdated {
    pub debt_token: Pubkey,
    pub current_epoch: u64,
}

#[event]
pub struct ScaleUpdated {
    pub debt_token: Pubkey,
    pub current_scale: u64,
}
