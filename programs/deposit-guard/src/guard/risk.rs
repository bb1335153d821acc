//! Per-user behavioural risk scoring

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError};

use crate::{
    constants::{LARGE_TRANSACTION_THRESHOLD, MAX_RISK_SCORE, SUSPICIOUS_SIZE_MULTIPLIER},
    error::DepositGuardError,
    window::{day_index, TimeWindowAccumulator},
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskConfig {
    /// Scores strictly above this veto deposits
    pub high_risk_threshold: u16,
    /// Window for counting a user's actions (seconds)
    pub suspicious_activity_window: i64,
    pub max_transactions_per_window: u32,
    pub large_transaction_threshold: u64,
    /// Deposits above this multiple of the user's average are suspicious
    pub size_multiplier: u64,
    /// Suspicious activity reports that flag a user automatically
    pub auto_flag_threshold: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: 7_000,
            suspicious_activity_window: 3_600,
            max_transactions_per_window: 10,
            large_transaction_threshold: LARGE_TRANSACTION_THRESHOLD,
            size_multiplier: SUSPICIOUS_SIZE_MULTIPLIER,
            auto_flag_threshold: 3,
        }
    }
}

impl RiskConfig {
    pub const LEN: usize = 2 + 8 + 4 + 8 + 8 + 4;

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.high_risk_threshold == 0
            || self.high_risk_threshold > MAX_RISK_SCORE
            || self.suspicious_activity_window <= 0
            || self.max_transactions_per_window == 0
            || self.large_transaction_threshold == 0
            || self.size_multiplier < 2
            || self.auto_flag_threshold == 0
        {
            return Err(DepositGuardError::InvalidConfiguration.into());
        }
        Ok(())
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskProfile {
    /// 0 to 10,000
    pub risk_score: u16,
    pub flagged: bool,
    /// Exponentially weighted average deposit size
    pub avg_transaction_size: u64,
    /// Actions counted inside the suspicious activity window
    pub transaction_frequency: TimeWindowAccumulator,
    pub last_large_transaction_time: i64,
    pub suspicious_activity_count: u32,
    pub last_transaction_time: i64,
    pub total_transactions: u64,
}

impl RiskProfile {
    pub const LEN: usize = 2 + 1 + 8 + TimeWindowAccumulator::LEN + 8 + 4 + 8 + 8;

    pub fn check_user_risk_score(&self, config: &RiskConfig) -> Result<(), ProgramError> {
        if self.risk_score > config.high_risk_threshold {
            msg!(
                "Risk score {} above threshold {}",
                self.risk_score,
                config.high_risk_threshold
            );
            return Err(DepositGuardError::HighRiskUser.into());
        }
        Ok(())
    }

    pub fn check_suspicious_activity(
        &self,
        config: &RiskConfig,
        amount: u64,
        now: i64,
    ) -> Result<(), ProgramError> {
        if self.flagged {
            msg!("User is flagged");
            return Err(DepositGuardError::SuspiciousActivity.into());
        }

        let actions = self
            .transaction_frequency
            .projected(now, config.suspicious_activity_window, 1)?;
        if actions > config.max_transactions_per_window as u64 {
            msg!(
                "{} actions inside the activity window (max {})",
                actions,
                config.max_transactions_per_window
            );
            return Err(DepositGuardError::SuspiciousActivity.into());
        }

        if self.avg_transaction_size > 0 {
            let ceiling = self.avg_transaction_size.saturating_mul(config.size_multiplier);
            if amount > ceiling {
                msg!(
                    "Deposit {} exceeds {}x average size {}",
                    amount,
                    config.size_multiplier,
                    self.avg_transaction_size
                );
                return Err(DepositGuardError::SuspiciousActivity.into());
            }
        }

        Ok(())
    }

    /// Fold an accepted deposit into the profile and the daily aggregates.
    /// Returns whether it counted as a large transaction.
    pub fn update_user_behavior(
        &mut self,
        config: &RiskConfig,
        metrics: &mut DailyMetrics,
        amount: u64,
        now: i64,
    ) -> Result<bool, ProgramError> {
        let new_average = if self.avg_transaction_size == 0 {
            amount
        } else {
            let weighted = (self.avg_transaction_size as u128)
                .checked_mul(9)
                .and_then(|value| value.checked_add(amount as u128))
                .ok_or(DepositGuardError::ArithmeticOverflow)?;
            (weighted / 10) as u64
        };

        let mut frequency = self.transaction_frequency;
        frequency.add(now, config.suspicious_activity_window, 1)?;

        let first_today = self.total_transactions == 0
            || day_index(self.last_transaction_time) != day_index(now);
        let is_large = amount >= config.large_transaction_threshold;

        let mut next_metrics = *metrics;
        next_metrics.record(now, amount, is_large, first_today)?;

        self.avg_transaction_size = new_average;
        self.transaction_frequency = frequency;
        self.last_transaction_time = now;
        self.total_transactions = self.total_transactions.saturating_add(1);
        if is_large {
            self.last_large_transaction_time = now;
        }
        *metrics = next_metrics;

        Ok(is_large)
    }

    pub fn set_risk_score(&mut self, score: u16) -> Result<u16, ProgramError> {
        if score > MAX_RISK_SCORE {
            return Err(DepositGuardError::InvalidRiskScore.into());
        }
        let old = self.risk_score;
        self.risk_score = score;
        Ok(old)
    }

    pub fn set_flagged(&mut self, flagged: bool) -> bool {
        std::mem::replace(&mut self.flagged, flagged)
    }

    /// Returns true when this report flagged the user.
    pub fn record_suspicious_activity(&mut self, config: &RiskConfig) -> bool {
        self.suspicious_activity_count = self.suspicious_activity_count.saturating_add(1);
        if !self.flagged && self.suspicious_activity_count >= config.auto_flag_threshold {
            self.flagged = true;
            msg!(
                "User auto-flagged after {} suspicious activity reports",
                self.suspicious_activity_count
            );
            return true;
        }
        false
    }
}

/// Protocol wide daily aggregates
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyMetrics {
    pub day: u64,
    pub volume: u64,
    pub large_transaction_count: u32,
    /// Approximate: counts a user's first deposit of each day
    pub unique_users: u32,
}

impl DailyMetrics {
    pub const LEN: usize = 8 + 8 + 4 + 4;

    pub fn record(
        &mut self,
        now: i64,
        amount: u64,
        is_large: bool,
        first_today: bool,
    ) -> Result<(), ProgramError> {
        let today = day_index(now);
        if today != self.day {
            *self = DailyMetrics {
                day: today,
                ..DailyMetrics::default()
            };
        }

        self.volume = self
            .volume
            .checked_add(amount)
            .ok_or(DepositGuardError::ArithmeticOverflow)?;
        if is_large {
            self.large_transaction_count = self.large_transaction_count.saturating_add(1);
        }
        if first_today {
            self.unique_users = self.unique_users.saturating_add(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PRICE_SCALE, SECONDS_PER_DAY};

    fn config() -> RiskConfig {
        RiskConfig {
            high_risk_threshold: 7_000,
            suspicious_activity_window: 100,
            max_transactions_per_window: 3,
            large_transaction_threshold: 1_000,
            size_multiplier: 10,
            auto_flag_threshold: 2,
        }
    }

    #[test]
    fn test_high_risk_veto() {
        let config = config();
        let mut profile = RiskProfile::default();

        profile.set_risk_score(7_000).unwrap();
        assert!(profile.check_user_risk_score(&config).is_ok());

        profile.set_risk_score(7_001).unwrap();
        assert_eq!(
            profile.check_user_risk_score(&config),
            Err(DepositGuardError::HighRiskUser.into())
        );
        assert_eq!(
            profile.set_risk_score(MAX_RISK_SCORE + 1),
            Err(DepositGuardError::InvalidRiskScore.into())
        );
    }

    #[test]
    fn test_weighted_average_update() {
        let config = config();
        let mut metrics = DailyMetrics::default();
        let mut profile = RiskProfile::default();

        profile.update_user_behavior(&config, &mut metrics, 100, 10).unwrap();
        assert_eq!(profile.avg_transaction_size, 100);

        profile.update_user_behavior(&config, &mut metrics, 200, 20).unwrap();
        // (100 * 9 + 200) / 10
        assert_eq!(profile.avg_transaction_size, 110);
    }

    #[test]
    fn test_oversized_deposit_is_suspicious() {
        let config = config();
        let mut metrics = DailyMetrics::default();
        let mut profile = RiskProfile::default();

        // No average yet, any size passes
        assert!(profile.check_suspicious_activity(&config, 5_000, 0).is_ok());

        profile.update_user_behavior(&config, &mut metrics, 50, 0).unwrap();
        assert!(profile.check_suspicious_activity(&config, 500, 1).is_ok());
        assert_eq!(
            profile.check_suspicious_activity(&config, 501, 1),
            Err(DepositGuardError::SuspiciousActivity.into())
        );
    }

    #[test]
    fn test_frequency_limit() {
        let config = config();
        let mut metrics = DailyMetrics::default();
        let mut profile = RiskProfile::default();

        for now in [0, 10, 20] {
            profile.check_suspicious_activity(&config, 10, now).unwrap();
            profile.update_user_behavior(&config, &mut metrics, 10, now).unwrap();
        }
        assert_eq!(
            profile.check_suspicious_activity(&config, 10, 30),
            Err(DepositGuardError::SuspiciousActivity.into())
        );
        // Window elapsed
        assert!(profile.check_suspicious_activity(&config, 10, 100).is_ok());
    }

    #[test]
    fn test_flagging() {
        let config = config();
        let mut profile = RiskProfile::default();

        assert!(!profile.record_suspicious_activity(&config));
        assert!(profile.record_suspicious_activity(&config));
        assert!(profile.flagged);
        assert_eq!(
            profile.check_suspicious_activity(&config, 1, 0),
            Err(DepositGuardError::SuspiciousActivity.into())
        );

        assert!(profile.set_flagged(false));
        assert!(profile.check_suspicious_activity(&config, 1, 0).is_ok());
    }

    #[test]
    fn test_daily_metrics_roll_up() {
        let config = config();
        let mut metrics = DailyMetrics::default();
        let mut alice = RiskProfile::default();
        let mut bob = RiskProfile::default();
        let day = SECONDS_PER_DAY;

        alice.update_user_behavior(&config, &mut metrics, 1_500, day + 1).unwrap();
        alice.update_user_behavior(&config, &mut metrics, 20, day + 2).unwrap();
        let is_large = bob
            .update_user_behavior(&config, &mut metrics, 1_000, day + 3)
            .unwrap();

        assert!(is_large);
        assert_eq!(bob.last_large_transaction_time, day + 3);
        assert_eq!(metrics.day, 1);
        assert_eq!(metrics.volume, 2_520);
        assert_eq!(metrics.large_transaction_count, 2);
        assert_eq!(metrics.unique_users, 2);

        alice
            .update_user_behavior(&config, &mut metrics, 5, 2 * day + 1)
            .unwrap();
        assert_eq!(metrics.day, 2);
        assert_eq!(metrics.volume, 5);
        assert_eq!(metrics.unique_users, 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(RiskConfig::default().validate().is_ok());
        assert!(RiskConfig::default().large_transaction_threshold >= PRICE_SCALE);

        let mut bad = config();
        bad.high_risk_threshold = MAX_RISK_SCORE + 1;
        assert!(bad.validate().is_err());
    }
}
