//! MEV guard: per-user spacing and volume limits
//!
//! Spacing and block volume are measured in slots; the per-user cap is a
//! day window in seconds.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{clock::Clock, msg, program_error::ProgramError};

use crate::{
    constants::{PRICE_SCALE, SECONDS_PER_DAY},
    error::DepositGuardError,
    window::TimeWindowAccumulator,
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MevConfig {
    /// Minimum slots between two accepted deposits of the same user
    pub min_interval_slots: u64,
    /// Cap on the sum of deposits across all users within one slot
    pub max_per_block: u64,
    /// Cap on one user's deposits within `daily_window`
    pub max_per_user: u64,
    /// Length of the per-user window in seconds
    pub daily_window: i64,
}

impl Default for MevConfig {
    fn default() -> Self {
        Self {
            min_interval_slots: 5,
            max_per_block: 50_000 * PRICE_SCALE,
            max_per_user: 10_000 * PRICE_SCALE,
            daily_window: SECONDS_PER_DAY,
        }
    }
}

impl MevConfig {
    pub const LEN: usize = 8 + 8 + 8 + 8;

    pub fn validate(&self) -> Result<(), ProgramError> {
        // A zero interval would let two deposits share a slot, which the
        // replay protection in `update_post_deposit` relies on never happening.
        if self.min_interval_slots == 0
            || self.max_per_block == 0
            || self.max_per_user == 0
            || self.daily_window <= 0
        {
            return Err(DepositGuardError::InvalidConfiguration.into());
        }
        Ok(())
    }
}

/// Per-user MEV state
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MevState {
    /// Slot of the last accepted deposit
    pub last_action_slot: Option<u64>,
    /// Volume used in the current day window
    pub daily_volume: TimeWindowAccumulator,
}

impl MevState {
    pub const LEN: usize = (1 + 8) + TimeWindowAccumulator::LEN;

    pub fn daily_volume_used(&self, now: i64, config: &MevConfig) -> u64 {
        self.daily_volume.current(now, config.daily_window)
    }

    /// Eligibility check, never mutates.
    pub fn check_pre_deposit(
        &self,
        config: &MevConfig,
        block_volume: &TimeWindowAccumulator,
        amount: u64,
        clock: &Clock,
    ) -> Result<(), ProgramError> {
        if let Some(last_slot) = self.last_action_slot {
            let elapsed = clock.slot.saturating_sub(last_slot);
            if elapsed < config.min_interval_slots {
                msg!(
                    "Deposit too frequent: {} slots since last action, minimum {}",
                    elapsed,
                    config.min_interval_slots
                );
                return Err(DepositGuardError::DepositTooFrequent.into());
            }
        }

        let block_total = block_volume.projected(clock.slot as i64, 1, amount)?;
        if block_total > config.max_per_block {
            msg!(
                "Block volume {} would exceed cap {}",
                block_total,
                config.max_per_block
            );
            return Err(DepositGuardError::BlockVolumeExceeded.into());
        }

        let user_total = self
            .daily_volume
            .projected(clock.unix_timestamp, config.daily_window, amount)?;
        if user_total > config.max_per_user {
            msg!(
                "User daily volume {} would exceed cap {}",
                user_total,
                config.max_per_user
            );
            return Err(DepositGuardError::UserDailyLimitExceeded.into());
        }

        Ok(())
    }

    /// Commit an accepted deposit. A second commit in the slot of the last
    /// accepted action is a replay and leaves every total untouched; returns
    /// false in that case.
    pub fn update_post_deposit(
        &mut self,
        config: &MevConfig,
        block_volume: &mut TimeWindowAccumulator,
        amount: u64,
        clock: &Clock,
    ) -> Result<bool, ProgramError> {
        if self.last_action_slot == Some(clock.slot) {
            msg!("Deposit already committed in slot {}, ignoring replay", clock.slot);
            return Ok(false);
        }

        // Both additions are computed before either is written
        let mut next_daily = self.daily_volume;
        let mut next_block = *block_volume;
        next_daily.add(clock.unix_timestamp, config.daily_window, amount)?;
        next_block.add(clock.slot as i64, 1, amount)?;

        self.daily_volume = next_daily;
        *block_volume = next_block;
        self.last_action_slot = Some(clock.slot);

        Ok(true)
    }
}
