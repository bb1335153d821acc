//! Flash loan pattern detection over oracle update bursts

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError};

use crate::{
    constants::MAX_FLASH_LOAN_PERIODS,
    error::DepositGuardError,
    events::{Event, FlashLoanDetected},
    window::period_index,
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLoanConfig {
    /// Slots per detection period
    pub period_slots: u64,
    /// Updates allowed inside one period before rejecting
    pub max_updates_per_period: u32,
    /// Number of trailing periods covered by the monitoring statistic
    pub detection_window_periods: u64,
    /// Updates across the detection window above which the statistic flags risk
    pub max_updates_per_window: u32,
}

impl Default for FlashLoanConfig {
    fn default() -> Self {
        Self {
            period_slots: 150,
            max_updates_per_period: 3,
            detection_window_periods: 10,
            max_updates_per_window: 12,
        }
    }
}

impl FlashLoanConfig {
    pub const LEN: usize = 8 + 4 + 8 + 4;

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.period_slots == 0
            || self.max_updates_per_period == 0
            || self.detection_window_periods == 0
            || self.detection_window_periods > MAX_FLASH_LOAN_PERIODS as u64
            || self.max_updates_per_window < self.max_updates_per_period
        {
            return Err(DepositGuardError::InvalidConfiguration.into());
        }
        Ok(())
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodCounter {
    pub period: u64,
    pub count: u32,
}

/// Read only monitoring statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLoanStats {
    pub current_period: u64,
    pub current_period_updates: u32,
    pub window_updates: u32,
    pub window_risk_flagged: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashLoanWindowState {
    /// Counters for the trailing detection window, oldest first
    pub buckets: Vec<PeriodCounter>,
}

impl FlashLoanWindowState {
    pub const LEN: usize = 4 + MAX_FLASH_LOAN_PERIODS * (8 + 4);

    pub fn count_for(&self, period: u64) -> u32 {
        self.buckets
            .iter()
            .find(|bucket| bucket.period == period)
            .map_or(0, |bucket| bucket.count)
    }

    /// Count this update against the current period. Rejects once the period
    /// is over its limit; a rejected call leaves the counters unchanged.
    pub fn check_flash_loan_activity(
        &mut self,
        config: &FlashLoanConfig,
        slot: u64,
    ) -> Result<u32, ProgramError> {
        let period = period_index(slot, config.period_slots);
        let updates = self.count_for(period).saturating_add(1);

        if updates > config.max_updates_per_period {
            msg!(
                "Flash loan pattern: {} updates in period {} (max {})",
                updates,
                period,
                config.max_updates_per_period
            );
            FlashLoanDetected {
                slot,
                period,
                updates_in_period: updates,
                max_updates_per_period: config.max_updates_per_period,
            }
            .emit();
            return Err(DepositGuardError::TooManyUpdatesPerPeriod.into());
        }

        match self.buckets.iter_mut().find(|bucket| bucket.period == period) {
            Some(bucket) => bucket.count = updates,
            None => self.buckets.push(PeriodCounter { period, count: updates }),
        }
        self.prune(config, period);

        Ok(updates)
    }

    /// Drop counters that fell out of the detection window
    fn prune(&mut self, config: &FlashLoanConfig, current_period: u64) {
        let oldest_kept = current_period
            .saturating_add(1)
            .saturating_sub(config.detection_window_periods);
        self.buckets.retain(|bucket| bucket.period >= oldest_kept);
        while self.buckets.len() > MAX_FLASH_LOAN_PERIODS {
            self.buckets.remove(0);
        }
    }

    pub fn window_activity(&self, config: &FlashLoanConfig, slot: u64) -> FlashLoanStats {
        let current_period = period_index(slot, config.period_slots);
        let oldest = current_period
            .saturating_add(1)
            .saturating_sub(config.detection_window_periods);

        let window_updates: u32 = self
            .buckets
            .iter()
            .filter(|bucket| bucket.period >= oldest && bucket.period <= current_period)
            .map(|bucket| bucket.count)
            .fold(0u32, |acc, count| acc.saturating_add(count));

        FlashLoanStats {
            current_period,
            current_period_updates: self.count_for(current_period),
            window_updates,
            window_risk_flagged: window_updates > config.max_updates_per_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FlashLoanConfig {
        FlashLoanConfig {
            period_slots: 10,
            max_updates_per_period: 2,
            detection_window_periods: 3,
            max_updates_per_window: 4,
        }
    }

    #[test]
    fn test_rejects_burst_within_period() {
        let config = config();
        let mut state = FlashLoanWindowState::default();

        assert_eq!(state.check_flash_loan_activity(&config, 100).unwrap(), 1);
        assert_eq!(state.check_flash_loan_activity(&config, 105).unwrap(), 2);

        let before = state.clone();
        assert_eq!(
            state.check_flash_loan_activity(&config, 109),
            Err(DepositGuardError::TooManyUpdatesPerPeriod.into())
        );
        assert_eq!(state, before);

        // Next period has a fresh counter
        assert_eq!(state.check_flash_loan_activity(&config, 110).unwrap(), 1);
    }

    #[test]
    fn test_window_statistic_flags_without_blocking() {
        let config = config();
        let mut state = FlashLoanWindowState::default();

        for slot in [100, 101, 110, 111, 120] {
            state.check_flash_loan_activity(&config, slot).unwrap();
        }

        let stats = state.window_activity(&config, 120);
        assert_eq!(stats.current_period, 12);
        assert_eq!(stats.current_period_updates, 1);
        assert_eq!(stats.window_updates, 5);
        assert!(stats.window_risk_flagged);

        // Old periods age out of the window
        let later = state.window_activity(&config, 140);
        assert_eq!(later.window_updates, 1);
        assert!(!later.window_risk_flagged);
    }

    #[test]
    fn test_buckets_are_pruned() {
        let config = config();
        let mut state = FlashLoanWindowState::default();

        for period in 0..20u64 {
            state.check_flash_loan_activity(&config, period * 10).unwrap();
        }
        assert_eq!(state.buckets.len(), 3);
        assert_eq!(state.buckets[0].period, 17);
    }

    #[test]
    fn test_config_validation() {
        assert!(FlashLoanConfig::default().validate().is_ok());

        let mut inverted = config();
        inverted.max_updates_per_window = 1;
        assert!(inverted.validate().is_err());

        let mut too_wide = config();
        too_wide.detection_window_periods = MAX_FLASH_LOAN_PERIODS as u64 + 1;
        assert!(too_wide.validate().is_err());
    }
}
