pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;
pub const ONE_HUNDERED_PERCENT: u128 = DECIMAL_PRECISION;
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// Factor applied to P when it would drop below this boundary, and the
/// divisor used when reading a deposit across one scale change.
pub const SCALE_FACTOR: u128 = 1_000_000_000;

pub const DEFAULT_MCR: u128 = DECIMAL_PRECISION / 100 * 110; // 110%
pub const DEFAULT_CCR: u128 = DECIMAL_PRECISION / 100 * 150; // 150%
pub const DEFAULT_COLL_GAS_COMP_PERCENT_DIVISOR: u64 = 200; // 0.5%
pub const REDEMPTION_FEE_FLOOR: u128 = DECIMAL_PRECISION / 1000 * 5; // 0.5%

/// Steps a hinted search may walk before restarting from the head.
pub const DEFAULT_HINT_WALK_LIMIT: u64 = 64;
