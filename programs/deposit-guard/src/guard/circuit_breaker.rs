//! Protocol wide volume circuit breaker
//!
//! All mutation goes through [`CircuitBreakerState::atomic_check_and_update`]
//! (and the governance reset). The `updating` flag rejects any call that
//! arrives while a previous update has not finished.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError};

use crate::{
    constants::PRICE_SCALE,
    error::DepositGuardError,
    window::TimeWindowAccumulator,
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub triggered: bool,
    /// Time the active trigger fired, zero when not triggered
    pub trigger_time: i64,
    pub cooldown_period: i64,
    pub volume_threshold: u64,
    /// Current volume and the start of its window
    pub volume: TimeWindowAccumulator,
    pub window_duration: i64,
    /// Lifetime number of triggers, never decreases
    pub trigger_count: u64,
    /// Triggers since the last cooldown expiry
    pub consecutive_triggers: u32,
    pub last_trigger_time: i64,
    pub updating: bool,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::new(1_000_000 * PRICE_SCALE, 3_600, 3_600, 0)
    }
}

impl CircuitBreakerState {
    pub const LEN: usize = 1 + 8 + 8 + 8 + TimeWindowAccumulator::LEN + 8 + 8 + 4 + 8 + 1;

    pub fn new(volume_threshold: u64, window_duration: i64, cooldown_period: i64, now: i64) -> Self {
        Self {
            triggered: false,
            trigger_time: 0,
            cooldown_period,
            volume_threshold,
            volume: TimeWindowAccumulator::starting_at(now),
            window_duration,
            trigger_count: 0,
            consecutive_triggers: 0,
            last_trigger_time: 0,
            updating: false,
        }
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.volume_threshold == 0 || self.window_duration <= 0 || self.cooldown_period <= 0 {
            return Err(DepositGuardError::InvalidConfiguration.into());
        }
        Ok(())
    }

    pub fn current_volume(&self) -> u64 {
        self.volume.total
    }

    pub fn window_start(&self) -> i64 {
        self.volume.window_start
    }

    pub fn cooldown_elapsed(&self, now: i64) -> bool {
        now >= self.trigger_time.saturating_add(self.cooldown_period)
    }

    /// Triggered and still inside the cooldown. Read only view used by
    /// eligibility checks; an elapsed cooldown counts as inactive even before
    /// the state has been refreshed.
    pub fn is_active(&self, now: i64) -> bool {
        self.triggered && !self.cooldown_elapsed(now)
    }

    /// Clear an expired trigger. Returns true when the breaker was re-armed.
    fn expire_cooldown(&mut self, now: i64) -> bool {
        if self.triggered && self.cooldown_elapsed(now) {
            self.triggered = false;
            self.trigger_time = 0;
            self.consecutive_triggers = 0;
            self.volume.reset(now);
            return true;
        }
        false
    }

    /// Add `amount` to the protocol volume. Returns true when this call
    /// tripped the breaker. Nothing is written when an error is returned.
    pub fn atomic_check_and_update(&mut self, amount: u64, now: i64) -> Result<bool, ProgramError> {
        if self.updating {
            msg!("Circuit breaker update already in progress");
            return Err(DepositGuardError::ReentrantCall.into());
        }
        self.updating = true;

        let mut next = *self;
        let result = next.apply(amount, now);
        if result.is_ok() {
            *self = next;
        }

        self.updating = false;
        result
    }

    fn apply(&mut self, amount: u64, now: i64) -> Result<bool, ProgramError> {
        if self.expire_cooldown(now) {
            msg!("Circuit breaker cooldown elapsed, re-armed at {}", now);
        }

        if self.triggered {
            msg!(
                "Circuit breaker active until {}",
                self.trigger_time.saturating_add(self.cooldown_period)
            );
            return Err(DepositGuardError::CircuitBreakerActive.into());
        }

        if self.volume.is_expired(now, self.window_duration) {
            self.volume.reset(now);
        }
        let total = self
            .volume
            .total
            .checked_add(amount)
            .ok_or(DepositGuardError::ArithmeticOverflow)?;
        self.volume.total = total;

        if total > self.volume_threshold {
            self.triggered = true;
            self.trigger_time = now;
            self.last_trigger_time = now;
            self.trigger_count = self.trigger_count.saturating_add(1);
            self.consecutive_triggers = self.consecutive_triggers.saturating_add(1);
            msg!(
                "CIRCUIT BREAKER TRIGGERED: volume {} exceeds threshold {}",
                total,
                self.volume_threshold
            );
            return Ok(true);
        }

        Ok(false)
    }

    /// Governance reset: clears volume and trigger, keeps the audit counters.
    pub fn manual_reset(&mut self, now: i64) {
        self.triggered = false;
        self.trigger_time = 0;
        self.volume.reset(now);
    }
}
