//! Protocol constants
//!
//! Prices and market values are quoted with 6 decimals. Cumulative price
//! accumulators reported by the price source are 18 decimal wad values
//! multiplied by seconds, and get rescaled when a TWAP is derived.

/// Quote asset precision
pub const QUOTE_DECIMALS: u8 = 6;

/// Fixed point one for prices (6 decimals)
pub const PRICE_SCALE: u64 = 10u64.pow(QUOTE_DECIMALS as u32);

/// Precision of cumulative price accumulators
pub const ACCUMULATOR_DECIMALS: u8 = 18;

/// Divisor that takes an accumulator delta per second down to quote precision
pub const ACCUMULATOR_TO_PRICE: u128 = 10u128.pow((ACCUMULATOR_DECIMALS - QUOTE_DECIMALS) as u32);

/// Basis point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Ring buffer capacity for TWAP observations
pub const OBSERVATION_CAPACITY: usize = 24;

/// Default number of valid observations before a TWAP is derived
pub const MIN_OBSERVATIONS: u8 = 3;

/// Default age after which the oracle is considered stale (seconds)
pub const MAX_OBSERVATION_AGE: i64 = 3_600;

/// Upper bound of the risk score scale
pub const MAX_RISK_SCORE: u16 = 10_000;

/// Deposits above this multiple of the user's average are suspicious
pub const SUSPICIOUS_SIZE_MULTIPLIER: u64 = 10;

/// Large transaction marker, 10,000 quote units
pub const LARGE_TRANSACTION_THRESHOLD: u64 = 10_000 * PRICE_SCALE;

/// Bounded registries
pub const MAX_ROLE_ASSIGNMENTS: usize = 16;
pub const MAX_DEPENDENTS: usize = 8;
pub const MAX_FLASH_LOAN_PERIODS: usize = 32;

/// PDA seeds
pub const GUARD_SEED: &[u8] = b"deposit_guard";
pub const ORACLE_SEED: &[u8] = b"twap_oracle";
pub const USER_GUARD_SEED: &[u8] = b"user_guard";
pub const DEPENDENT_SEED: &[u8] = b"dependent";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_follow_decimals() {
        assert_eq!(PRICE_SCALE, 1_000_000);
        assert_eq!(ACCUMULATOR_TO_PRICE, 1_000_000_000_000);
        // One quote unit per second in wad precision reads back as one price unit
        assert_eq!(10u128.pow(ACCUMULATOR_DECIMALS as u32) / ACCUMULATOR_TO_PRICE, PRICE_SCALE as u128);
    }
}
