//! System-wide constants for the OpenBond settlement engine.

/// Decimal places kept for bond-token amounts (whole tokens).
pub const TOKEN_PRECISION: u32 = 0;

/// Decimal places kept for reserve amounts, prices and fees.
pub const RESERVE_PRECISION: u32 = 8;

/// Largest integral exponent accepted for power-style curves.
pub const MAX_CURVE_EXPONENT: u64 = 6;

/// Maximum orders (buys + sells + swaps) held in a single batch.
pub const MAX_ORDERS_PER_BATCH: usize = 10_000;

/// Settlement reports retained for historical queries before eviction.
pub const DEFAULT_REPORT_HISTORY: usize = 10_000;

/// Shortest accepted denomination.
pub const MIN_DENOM_LEN: usize = 3;

/// Longest accepted denomination.
pub const MAX_DENOM_LEN: usize = 16;

/// Power-function parameter names.
pub const POWER_PARAMS: [&str; 3] = ["m", "n", "c"];

/// Sigmoid-function parameter names.
pub const SIGMOID_PARAMS: [&str; 3] = ["a", "b", "c"];

/// Augmented-function parameter names.
pub const AUGMENTED_PARAMS: [&str; 4] = ["d0", "p0", "theta", "kappa"];

/// Number of reserve tokens a swapper bond must have.
pub const SWAPPER_RESERVE_TOKENS: usize = 2;
