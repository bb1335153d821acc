//! Fixed time window accumulator shared by the volume guards
//!
//! A running total bound to a window that starts at the first contribution
//! and resets once `duration` has elapsed. Points are seconds for wall clock
//! windows and slots for block scoped windows.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::program_error::ProgramError;

use crate::error::DepositGuardError;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindowAccumulator {
    /// Point at which the current window opened
    pub window_start: i64,
    /// Total accumulated inside the current window
    pub total: u64,
}

impl TimeWindowAccumulator {
    pub const LEN: usize = 8 + 8;

    pub fn starting_at(now: i64) -> Self {
        Self {
            window_start: now,
            total: 0,
        }
    }

    pub fn is_expired(&self, now: i64, duration: i64) -> bool {
        now.saturating_sub(self.window_start) >= duration
    }

    /// Total that still counts at `now`
    pub fn current(&self, now: i64, duration: i64) -> u64 {
        if self.is_expired(now, duration) {
            0
        } else {
            self.total
        }
    }

    /// Total the window would hold after adding `amount`, without mutating
    pub fn projected(&self, now: i64, duration: i64, amount: u64) -> Result<u64, ProgramError> {
        self.current(now, duration)
            .checked_add(amount)
            .ok_or_else(|| DepositGuardError::ArithmeticOverflow.into())
    }

    /// Add `amount`, opening a new window first if the old one expired.
    pub fn add(&mut self, now: i64, duration: i64, amount: u64) -> Result<u64, ProgramError> {
        let next = self.projected(now, duration, amount)?;

        if self.total == 0 || self.is_expired(now, duration) {
            self.window_start = now;
        }
        self.total = next;

        Ok(next)
    }

    pub fn reset(&mut self, now: i64) {
        self.window_start = now;
        self.total = 0;
    }
}

/// Discrete period a point falls in
pub fn period_index(point: u64, period_length: u64) -> u64 {
    if period_length == 0 {
        point
    } else {
        point / period_length
    }
}

/// Day index of a unix timestamp
pub fn day_index(timestamp: i64) -> u64 {
    (timestamp.max(0) / crate::constants::SECONDS_PER_DAY) as u64
}
