//! Bounds on accepted price and market cap movements

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError};

use crate::{constants::BPS_DENOMINATOR, error::DepositGuardError};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceValidationState {
    /// Last accepted TWAP, zero until the first one
    pub last_validated_price: u64,
    pub last_validation_time: i64,
    /// Max deviation of the spot price from the last accepted price
    pub price_impact_threshold_bps: u16,
    pub max_price_change_bps: u16,
    /// Tighter change bound used in new asset mode
    pub strict_max_price_change_bps: u16,
    pub max_market_cap_growth_bps: u16,
    /// Minimum seconds between two oracle updates
    pub min_time_between_updates: i64,
}

impl Default for PriceValidationState {
    fn default() -> Self {
        Self {
            last_validated_price: 0,
            last_validation_time: 0,
            price_impact_threshold_bps: 500,
            max_price_change_bps: 2_000,
            strict_max_price_change_bps: 1_000,
            max_market_cap_growth_bps: 5_000,
            min_time_between_updates: 60,
        }
    }
}

impl PriceValidationState {
    pub const LEN: usize = 8 + 8 + 2 + 2 + 2 + 2 + 8;

    pub fn validate(&self) -> Result<(), ProgramError> {
        let bps_in_range = |bps: u16| bps > 0 && bps as u64 <= BPS_DENOMINATOR;

        if !bps_in_range(self.price_impact_threshold_bps)
            || !bps_in_range(self.max_price_change_bps)
            || !bps_in_range(self.strict_max_price_change_bps)
            || self.max_market_cap_growth_bps == 0
            || self.strict_max_price_change_bps > self.max_price_change_bps
            || self.min_time_between_updates <= 0
        {
            return Err(DepositGuardError::InvalidConfiguration.into());
        }
        Ok(())
    }

    /// Change bound in effect for the given mode
    pub fn effective_max_change_bps(&self, strict_mode: bool, max_change_bps: u16) -> u16 {
        if strict_mode {
            max_change_bps.min(self.strict_max_price_change_bps)
        } else {
            max_change_bps
        }
    }

    pub fn validate_price_change(
        &self,
        old_price: u64,
        new_price: u64,
        strict_mode: bool,
        max_change_bps: u16,
    ) -> Result<(), ProgramError> {
        let bound = self.effective_max_change_bps(strict_mode, max_change_bps);
        let change = change_bps(old_price, new_price)?;

        if change > bound as u64 {
            msg!(
                "Price change {} -> {} is {} bps (max {})",
                old_price,
                new_price,
                change,
                bound
            );
            return Err(DepositGuardError::PriceChangeTooLarge.into());
        }
        Ok(())
    }

    /// Record an accepted price
    pub fn accept(&mut self, price: u64, now: i64) {
        self.last_validated_price = price;
        self.last_validation_time = now;
    }
}

/// Absolute relative change in basis points
pub fn change_bps(old_value: u64, new_value: u64) -> Result<u64, ProgramError> {
    if old_value == 0 {
        return Err(DepositGuardError::DivisionByZero.into());
    }
    let delta = old_value.abs_diff(new_value) as u128;
    let bps = delta
        .checked_mul(BPS_DENOMINATOR as u128)
        .ok_or(DepositGuardError::ArithmeticOverflow)?
        / old_value as u128;

    Ok(u64::try_from(bps).unwrap_or(u64::MAX))
}

pub fn validate_price_impact(
    last_price: u64,
    new_price: u64,
    threshold_bps: u16,
) -> Result<(), ProgramError> {
    let impact = change_bps(last_price, new_price)?;
    if impact > threshold_bps as u64 {
        msg!(
            "Price impact {} bps against last validated {} (max {})",
            impact,
            last_price,
            threshold_bps
        );
        return Err(DepositGuardError::PriceImpactTooHigh.into());
    }
    Ok(())
}

/// Only growth is bounded; a shrinking market cap always passes.
pub fn validate_market_cap_growth(
    old_cap: u64,
    new_cap: u64,
    max_growth_bps: u16,
) -> Result<(), ProgramError> {
    if old_cap == 0 || new_cap <= old_cap {
        return Ok(());
    }
    let growth = change_bps(old_cap, new_cap)?;
    if growth > max_growth_bps as u64 {
        msg!(
            "Market cap growth {} -> {} is {} bps (max {})",
            old_cap,
            new_cap,
            growth,
            max_growth_bps
        );
        return Err(DepositGuardError::MarketCapGrowthTooHigh.into());
    }
    Ok(())
}
