use anchor_lang::prelude::*;

#[error_code]
pub enum BorrowerOpsError {
    #[msg("BorrowerOps: Trove's net debt must be greater than minimum")]
    DebtLessThanMin,
    #[msg("Calculation Error")]
    Calculation,
    #[msg("BorrowerOps: An operation that would result in ICR < MCR is not permitted")]
    ICRLowerThanMCR,
    #[msg("BorrowerOps: An operation that would result in TCR < CCR is not permitted")]
    TCRLowerThanCCR,
    #[msg("BorrowerOps: Operation must leave trove with ICR >= CCR")]
    ICRLowerThanCCR,
    #[msg("BorrowerOps: Cannot decrease your Trove's ICR in Recovery Mode")]
    NewICRLowerThanOldICR,
    #[msg("BorrowerOps: Trove is active")]
    TroveIsActive,
    #[msg("BorrowerOps: Trove does not exist or is closed")]
    TroveIsNotActive,
    #[msg("BorrowerOps: Amounts must be non-zero")]
    ZeroAmount,
    #[msg("BorrowerOps: There must be either a collateral change or a debt change")]
    ZeroAdjustment,
    #[msg("BorrowerOps: A trove must hold at least one collateral token")]
    EmptyCollateral,
    #[msg("BorrowerOps: Token is not registered for this use")]
    UnknownToken,
    #[msg("BorrowerOps: Token listed more than once")]
    DuplicateToken,
    #[msg("BorrowerOps: Collateral withdraw exceed trove coll")]
    CollateralWithdrawExceedBalance,
    #[msg("BorrowerOps: Collateral withdrawal not permitted Recovery Mode")]
    RecoveryNoCollWithdraw,
    #[msg("BorrowerOps: Amount repaid must not be larger than the Trove's debt")]
    InvalidRepayment,
    #[msg("BorrowerOps: Caller doesnt have enough debt tokens to make repayment")]
    InsufficientDebtTokenBalance,
    #[msg("BorrowerOps: Operation not permitted during Recovery Mode")]
    InRecoveryMode,
    #[msg("TroveManager: Only one trove in the system")]
    OnlyOneTrove,
    #[msg("TroveManager: Cannot redeem when TCR < MCR")]
    TCRUnderMCR,
    #[msg("TroveManager: Unable to redeem any amount")]
    ZeroCollDrawn,
    #[msg("TroveManager: Fee would eat up all returned collateral")]
    FeeEatUpAllColl,
    #[msg("Max redeem fee percentage must be between 0.5% and 100%")]
    InvalidRedeemMaxFee,
    #[msg("Fee exceeded provided maximum")]
    FeeExceededMax,
    #[msg("CollSurplusPool: No collateral available to claim")]
    NoCollSurplus,
}

#[error_code(offset = 6100)]
pub enum SortedTrovesError {
    #[msg("SortedTroves: List already contains the node")]
    AlreadyExists,
    #[msg("SortedTroves: List does not contain the node")]
    NotFound,
    #[msg("SortedTroves: NICR must be positive")]
    NICRZero,
    #[msg("SortedTroves: List is full")]
    ListFull,
    #[msg("SortedTroves: Id cannot be zero")]
    InvalidId,
}

#[error_code(offset = 6200)]
pub enum LiquidationError {
    #[msg("TroveManager: nothing to liquidate")]
    NoLiquidatableTrove,
    #[msg("TroveManager: Calldata address array must not be empty")]
    EmptyArray,
}

#[error_code(offset = 6300)]
pub enum StabilityPoolError {
    #[msg("StabilityPool: User must have a non-zero deposit")]
    ZeroDeposit,
    #[msg("StabilityPool: Cannot withdraw while there are troves with ICR < MCR")]
    TroveUnderColl,
    #[msg("StabilityPool: Amount must be non-zero")]
    ZeroAmount,
    #[msg("StabilityPool: No pool for this debt token")]
    UnknownPool,
}

#[error_code(offset = 6400)]
pub enum StorageError {
    #[msg("StoragePool: Insufficient balance in pool")]
    InsufficientBalance,
}

#[error_code(offset = 6500)]
pub enum PriceFeedError {
    #[msg("PriceFeed: No price available for token")]
    PriceUnavailable,
    #[msg("PriceFeed: Price must be positive")]
    ZeroPrice,
}

#[error_code(offset = 6600)]
pub enum ConfigError {
    #[msg("Config: MCR must exceed 100% and CCR must not be below MCR")]
    InvalidRatios,
    #[msg("Config: Collateral gas compensation divisor must be non-zero")]
    InvalidDivisor,
    #[msg("Config: Collateral and debt token lists must not be empty")]
    EmptyTokenList,
    #[msg("Config: Gas token must be one of the debt tokens")]
    GasTokenNotDebtToken,
    #[msg("Config: Token listed more than once")]
    TokenListedTwice,
    #[msg("Config: Redemption fee floor must not exceed 100%")]
    InvalidFeeFloor,
    #[msg("Config: Token lists and gas token are fixed once the ledger exists")]
    TokensChanged,
}
