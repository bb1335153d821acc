//! Time weighted price oracle
//!
//! Bootstrapping until `min_observations` valid entries exist, then Healthy
//! while updates keep arriving with enough liquidity behind them. Staleness
//! is a function of the clock alone; a fresh successful update recovers.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError};

use crate::{
    adapters::{PriceSnapshot, SupplySnapshot},
    constants::{ACCUMULATOR_TO_PRICE, MAX_OBSERVATION_AGE, MIN_OBSERVATIONS, OBSERVATION_CAPACITY},
    error::DepositGuardError,
    events::{Event, MarketCapUpdated, ObservationAdded, PriceValidated},
    guard::{FlashLoanConfig, FlashLoanWindowState},
    oracle::{
        observations::{ObservationBuffer, TwapObservation},
        price_validator::{validate_market_cap_growth, validate_price_impact, PriceValidationState},
    },
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleConfig {
    pub min_observations: u8,
    /// Seconds without an update after which the oracle is stale
    pub max_observation_age: i64,
    /// Minimum quote side reserve depth
    pub min_liquidity: u64,
    /// Market cap ceiling for deposits, zero disables it
    pub max_market_cap: u64,
    pub flash_loan: FlashLoanConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
            max_observation_age: MAX_OBSERVATION_AGE,
            min_liquidity: 10_000 * crate::constants::PRICE_SCALE,
            max_market_cap: 0,
            flash_loan: FlashLoanConfig::default(),
        }
    }
}

impl OracleConfig {
    pub const LEN: usize = 1 + 8 + 8 + 8 + FlashLoanConfig::LEN;

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.min_observations < 2
            || self.min_observations as usize > OBSERVATION_CAPACITY
            || self.max_observation_age <= 0
            || self.min_liquidity == 0
        {
            return Err(DepositGuardError::InvalidConfiguration.into());
        }
        self.flash_loan.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleStatus {
    Bootstrapping,
    Healthy,
    Stale,
    LowLiquidity,
    Emergency,
}

/// Result of an accepted update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceUpdate {
    pub observation_index: u16,
    /// `None` while bootstrapping
    pub price: Option<u64>,
    pub market_cap: u64,
    pub status: OracleStatus,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TwapOracle {
    pub config: OracleConfig,
    pub observations: ObservationBuffer,
    pub validation: PriceValidationState,
    pub flash_loan: FlashLoanWindowState,
    pub last_update_time: i64,
    pub last_update_slot: u64,
    pub cached_market_cap: u64,
    pub fallback_price: u64,
    pub emergency_mode: bool,
    pub total_updates: u64,
}

impl TwapOracle {
    pub const LEN: usize = OracleConfig::LEN
        + ObservationBuffer::LEN
        + PriceValidationState::LEN
        + FlashLoanWindowState::LEN
        + 8
        + 8
        + 8
        + 8
        + 1
        + 8;

    pub fn new(config: OracleConfig, validation: PriceValidationState, fallback_price: u64) -> Self {
        Self {
            config,
            validation,
            fallback_price,
            ..Self::default()
        }
    }

    pub fn status(&self, now: i64) -> OracleStatus {
        if self.emergency_mode {
            return OracleStatus::Emergency;
        }
        if self.observations.valid_count() < self.config.min_observations as u16 {
            return OracleStatus::Bootstrapping;
        }
        if now.saturating_sub(self.last_update_time) > self.config.max_observation_age {
            return OracleStatus::Stale;
        }
        match self.observations.newest_valid() {
            Some(newest) if newest.liquidity_snapshot >= self.config.min_liquidity => {
                OracleStatus::Healthy
            }
            _ => OracleStatus::LowLiquidity,
        }
    }

    pub fn is_healthy(&self, now: i64) -> bool {
        self.status(now) == OracleStatus::Healthy
    }

    /// TWAP between the oldest and newest valid observations, or the fallback
    /// price when fewer than two distinct points exist.
    pub fn time_weighted_price(&self) -> Result<u64, ProgramError> {
        let (oldest, newest) = match (self.observations.oldest_valid(), self.observations.newest_valid()) {
            (Some(oldest), Some(newest)) => (oldest, newest),
            _ => return Ok(self.fallback_price),
        };

        let elapsed = newest.timestamp.saturating_sub(oldest.timestamp);
        if elapsed <= 0 {
            return Ok(self.fallback_price);
        }

        let delta = newest
            .cumulative_price_a
            .checked_sub(oldest.cumulative_price_a)
            .ok_or(DepositGuardError::InvalidPrice)?;
        let price = delta / elapsed as u128 / ACCUMULATOR_TO_PRICE;

        u64::try_from(price).map_err(|_| DepositGuardError::ArithmeticOverflow.into())
    }

    /// Healthy TWAP, otherwise the fallback price
    pub fn get_current_price(&self, now: i64) -> Result<u64, ProgramError> {
        match self.status(now) {
            OracleStatus::Healthy => self.time_weighted_price(),
            status => {
                msg!("Oracle {:?}, using fallback price {}", status, self.fallback_price);
                Ok(self.fallback_price)
            }
        }
    }

    pub fn check_market_cap_limits(&self) -> Result<(), ProgramError> {
        if self.config.max_market_cap > 0 && self.cached_market_cap > self.config.max_market_cap {
            msg!(
                "Market cap {} above limit {}",
                self.cached_market_cap,
                self.config.max_market_cap
            );
            return Err(DepositGuardError::MarketCapLimitExceeded.into());
        }
        Ok(())
    }

    /// Append an observation and, once enough history exists, validate and
    /// accept the new TWAP. Any failure leaves the oracle unchanged.
    pub fn update_price(
        &mut self,
        snapshot: &PriceSnapshot,
        supply: &SupplySnapshot,
        now: i64,
        slot: u64,
        strict_mode: bool,
    ) -> Result<PriceUpdate, ProgramError> {
        if self.emergency_mode {
            msg!("Oracle in emergency mode, updates suspended");
            return Err(DepositGuardError::EmergencyModeActive.into());
        }

        let mut next = self.clone();

        // 1. spacing
        if next.total_updates > 0 {
            let elapsed = now.saturating_sub(next.last_update_time);
            if elapsed < next.validation.min_time_between_updates {
                msg!(
                    "Oracle update {}s after the previous one, minimum {}s",
                    elapsed,
                    next.validation.min_time_between_updates
                );
                return Err(DepositGuardError::UpdateTooFrequent.into());
            }
        }

        // 2. flash loan pattern
        next.flash_loan
            .check_flash_loan_activity(&next.config.flash_loan, slot)?;

        // 3. liquidity depth
        if snapshot.liquidity() < next.config.min_liquidity {
            msg!(
                "Liquidity {} below minimum {}",
                snapshot.liquidity(),
                next.config.min_liquidity
            );
            return Err(DepositGuardError::InsufficientLiquidity.into());
        }

        // 4. append
        let observation_index = next.observations.push(TwapObservation {
            cumulative_price_a: snapshot.cumulative_price_a,
            cumulative_price_b: snapshot.cumulative_price_b,
            timestamp: snapshot.timestamp,
            liquidity_snapshot: snapshot.liquidity(),
            is_valid: true,
        })?;

        next.last_update_time = now;
        next.last_update_slot = slot;
        next.total_updates = next.total_updates.saturating_add(1);

        let mut accepted_price = None;
        if next.observations.valid_count() >= next.config.min_observations as u16 {
            // 5. TWAP
            let twap = next.time_weighted_price()?;
            if twap == 0 {
                return Err(DepositGuardError::InvalidPrice.into());
            }

            // 6. price bounds against the prior accepted price
            let old_price = next.validation.last_validated_price;
            let spot_price = snapshot.spot_price()?;
            if old_price > 0 {
                next.validation.validate_price_change(
                    old_price,
                    twap,
                    strict_mode,
                    next.validation.max_price_change_bps,
                )?;
                validate_price_impact(
                    old_price,
                    spot_price,
                    next.validation.price_impact_threshold_bps,
                )?;
            }

            // 7. market cap
            let market_cap = supply.market_cap(twap)?;

            // 8. growth bound
            validate_market_cap_growth(
                next.cached_market_cap,
                market_cap,
                next.validation.max_market_cap_growth_bps,
            )?;

            next.validation.accept(twap, now);
            let old_market_cap = next.cached_market_cap;
            next.cached_market_cap = market_cap;
            accepted_price = Some((old_price, twap, spot_price, old_market_cap));
        } else {
            msg!(
                "Oracle bootstrapping: {} of {} observations",
                next.observations.valid_count(),
                next.config.min_observations
            );
        }

        // 9. commit
        *self = next;

        if let Some(observation) = self.observations.get(observation_index as usize) {
            ObservationAdded {
                index: observation_index,
                timestamp: observation.timestamp,
                cumulative_price_a: observation.cumulative_price_a,
                cumulative_price_b: observation.cumulative_price_b,
                liquidity_snapshot: observation.liquidity_snapshot,
                valid_observations: self.observations.valid_count(),
            }
            .emit();
        }

        if let Some((old_price, new_price, spot_price, old_market_cap)) = accepted_price {
            PriceValidated {
                old_price,
                new_price,
                spot_price,
                timestamp: now,
            }
            .emit();
            MarketCapUpdated {
                old_market_cap,
                new_market_cap: self.cached_market_cap,
                price: new_price,
                total_supply: supply.total_supply,
            }
            .emit();
        }

        Ok(PriceUpdate {
            observation_index,
            price: accepted_price.map(|(_, price, _, _)| price),
            market_cap: self.cached_market_cap,
            status: self.status(now),
        })
    }

    /// Governance override of the reference price. Returns the old price.
    pub fn override_price(&mut self, price: u64, now: i64) -> Result<u64, ProgramError> {
        if price == 0 {
            return Err(DepositGuardError::InvalidPrice.into());
        }
        let old = self.validation.last_validated_price;
        self.validation.accept(price, now);
        Ok(old)
    }

    pub fn set_fallback_price(&mut self, price: u64) -> Result<u64, ProgramError> {
        if price == 0 {
            return Err(DepositGuardError::InvalidPrice.into());
        }
        Ok(std::mem::replace(&mut self.fallback_price, price))
    }

    pub fn invalidate_observation(&mut self, index: u16) -> Result<u16, ProgramError> {
        self.observations.invalidate(index)
    }
}
