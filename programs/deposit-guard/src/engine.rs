use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::Clock,
    msg,
    program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::{
    adapters::{PriceSource, SupplySource},
    auth::{require_role, Role},
    error::{rejection_reason, DepositGuardError},
    events::{
        CapabilitiesUpdated, CircuitBreakerReset, CircuitBreakerTriggered, DegradedModeChanged,
        DepositApproved, DepositReplayIgnored, DependentRegistered, Event, ObservationInvalidated,
        ParameterUpdated, PriceOverridden, RoleChanged, UserRiskUpdated,
    },
    guard::{CircuitBreakerState, FlashLoanStats},
    oracle::{OracleConfig, PriceUpdate, PriceValidationState, TwapOracle},
    state::{Capabilities, GuardConfig, GuardState, UserGuardAccount},
};

/// Outcome of an approved deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositApproval {
    pub triggered_circuit_breaker: bool,
    pub daily_volume_used: u64,
    pub circuit_breaker_volume: u64,
}

/// Deposit side thresholds adjustable by governance
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardParameter {
    MinIntervalSlots,
    MaxPerBlock,
    MaxPerUser,
    DailyWindow,
    CircuitBreakerThreshold,
    CircuitBreakerWindow,
    CircuitBreakerCooldown,
    HighRiskThreshold,
    SuspiciousActivityWindow,
    MaxTransactionsPerWindow,
    LargeTransactionThreshold,
    SuspiciousSizeMultiplier,
    AutoFlagThreshold,
}

impl GuardParameter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MinIntervalSlots => "min_interval_slots",
            Self::MaxPerBlock => "max_per_block",
            Self::MaxPerUser => "max_per_user",
            Self::DailyWindow => "daily_window",
            Self::CircuitBreakerThreshold => "circuit_breaker_volume_threshold",
            Self::CircuitBreakerWindow => "circuit_breaker_window_duration",
            Self::CircuitBreakerCooldown => "circuit_breaker_cooldown_period",
            Self::HighRiskThreshold => "high_risk_threshold",
            Self::SuspiciousActivityWindow => "suspicious_activity_window",
            Self::MaxTransactionsPerWindow => "max_transactions_per_window",
            Self::LargeTransactionThreshold => "large_transaction_threshold",
            Self::SuspiciousSizeMultiplier => "suspicious_size_multiplier",
            Self::AutoFlagThreshold => "auto_flag_threshold",
        }
    }

    fn read(&self, config: &GuardConfig, breaker: &CircuitBreakerState) -> u64 {
        match self {
            Self::MinIntervalSlots => config.mev.min_interval_slots,
            Self::MaxPerBlock => config.mev.max_per_block,
            Self::MaxPerUser => config.mev.max_per_user,
            Self::DailyWindow => config.mev.daily_window.max(0) as u64,
            Self::CircuitBreakerThreshold => breaker.volume_threshold,
            Self::CircuitBreakerWindow => breaker.window_duration.max(0) as u64,
            Self::CircuitBreakerCooldown => breaker.cooldown_period.max(0) as u64,
            Self::HighRiskThreshold => config.risk.high_risk_threshold as u64,
            Self::SuspiciousActivityWindow => config.risk.suspicious_activity_window.max(0) as u64,
            Self::MaxTransactionsPerWindow => config.risk.max_transactions_per_window as u64,
            Self::LargeTransactionThreshold => config.risk.large_transaction_threshold,
            Self::SuspiciousSizeMultiplier => config.risk.size_multiplier,
            Self::AutoFlagThreshold => config.risk.auto_flag_threshold as u64,
        }
    }

    fn write(
        &self,
        config: &mut GuardConfig,
        breaker: &mut CircuitBreakerState,
        value: u64,
    ) -> Result<(), ProgramError> {
        match self {
            Self::MinIntervalSlots => config.mev.min_interval_slots = value,
            Self::MaxPerBlock => config.mev.max_per_block = value,
            Self::MaxPerUser => config.mev.max_per_user = value,
            Self::DailyWindow => config.mev.daily_window = narrow(value)?,
            Self::CircuitBreakerThreshold => breaker.volume_threshold = value,
            Self::CircuitBreakerWindow => breaker.window_duration = narrow(value)?,
            Self::CircuitBreakerCooldown => breaker.cooldown_period = narrow(value)?,
            Self::HighRiskThreshold => config.risk.high_risk_threshold = narrow(value)?,
            Self::SuspiciousActivityWindow => {
                config.risk.suspicious_activity_window = narrow(value)?
            }
            Self::MaxTransactionsPerWindow => {
                config.risk.max_transactions_per_window = narrow(value)?
            }
            Self::LargeTransactionThreshold => config.risk.large_transaction_threshold = value,
            Self::SuspiciousSizeMultiplier => config.risk.size_multiplier = value,
            Self::AutoFlagThreshold => config.risk.auto_flag_threshold = narrow(value)?,
        }
        Ok(())
    }
}

/// Oracle thresholds adjustable by governance
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleParameter {
    MinObservations,
    MaxObservationAge,
    MinLiquidity,
    MaxMarketCap,
    FlashLoanPeriodSlots,
    MaxUpdatesPerPeriod,
    DetectionWindowPeriods,
    MaxUpdatesPerWindow,
    PriceImpactThresholdBps,
    MaxPriceChangeBps,
    StrictMaxPriceChangeBps,
    MaxMarketCapGrowthBps,
    MinTimeBetweenUpdates,
}

impl OracleParameter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MinObservations => "min_observations",
            Self::MaxObservationAge => "max_observation_age",
            Self::MinLiquidity => "min_liquidity",
            Self::MaxMarketCap => "max_market_cap",
            Self::FlashLoanPeriodSlots => "flash_loan_period_slots",
            Self::MaxUpdatesPerPeriod => "max_updates_per_period",
            Self::DetectionWindowPeriods => "detection_window_periods",
            Self::MaxUpdatesPerWindow => "max_updates_per_window",
            Self::PriceImpactThresholdBps => "price_impact_threshold_bps",
            Self::MaxPriceChangeBps => "max_price_change_bps",
            Self::StrictMaxPriceChangeBps => "strict_max_price_change_bps",
            Self::MaxMarketCapGrowthBps => "max_market_cap_growth_bps",
            Self::MinTimeBetweenUpdates => "min_time_between_updates",
        }
    }

    fn read(&self, config: &OracleConfig, validation: &PriceValidationState) -> u64 {
        match self {
            Self::MinObservations => config.min_observations as u64,
            Self::MaxObservationAge => config.max_observation_age.max(0) as u64,
            Self::MinLiquidity => config.min_liquidity,
            Self::MaxMarketCap => config.max_market_cap,
            Self::FlashLoanPeriodSlots => config.flash_loan.period_slots,
            Self::MaxUpdatesPerPeriod => config.flash_loan.max_updates_per_period as u64,
            Self::DetectionWindowPeriods => config.flash_loan.detection_window_periods,
            Self::MaxUpdatesPerWindow => config.flash_loan.max_updates_per_window as u64,
            Self::PriceImpactThresholdBps => validation.price_impact_threshold_bps as u64,
            Self::MaxPriceChangeBps => validation.max_price_change_bps as u64,
            Self::StrictMaxPriceChangeBps => validation.strict_max_price_change_bps as u64,
            Self::MaxMarketCapGrowthBps => validation.max_market_cap_growth_bps as u64,
            Self::MinTimeBetweenUpdates => validation.min_time_between_updates.max(0) as u64,
        }
    }

    fn write(
        &self,
        config: &mut OracleConfig,
        validation: &mut PriceValidationState,
        value: u64,
    ) -> Result<(), ProgramError> {
        match self {
            Self::MinObservations => config.min_observations = narrow(value)?,
            Self::MaxObservationAge => config.max_observation_age = narrow(value)?,
            Self::MinLiquidity => config.min_liquidity = value,
            Self::MaxMarketCap => config.max_market_cap = value,
            Self::FlashLoanPeriodSlots => config.flash_loan.period_slots = value,
            Self::MaxUpdatesPerPeriod => config.flash_loan.max_updates_per_period = narrow(value)?,
            Self::DetectionWindowPeriods => config.flash_loan.detection_window_periods = value,
            Self::MaxUpdatesPerWindow => config.flash_loan.max_updates_per_window = narrow(value)?,
            Self::PriceImpactThresholdBps => {
                validation.price_impact_threshold_bps = narrow(value)?
            }
            Self::MaxPriceChangeBps => validation.max_price_change_bps = narrow(value)?,
            Self::StrictMaxPriceChangeBps => {
                validation.strict_max_price_change_bps = narrow(value)?
            }
            Self::MaxMarketCapGrowthBps => validation.max_market_cap_growth_bps = narrow(value)?,
            Self::MinTimeBetweenUpdates => validation.min_time_between_updates = narrow(value)?,
        }
        Ok(())
    }
}

fn narrow<T: TryFrom<u64>>(value: u64) -> Result<T, ProgramError> {
    T::try_from(value).map_err(|_| DepositGuardError::InvalidConfiguration.into())
}

/// Deposit guard engine
pub struct DepositGuardEngine;

impl DepositGuardEngine {
    // === Deposit path ===

    /// Every deposit side check, in order. Never mutates.
    pub fn pre_deposit_check(
        guard: &GuardState,
        oracle: &TwapOracle,
        user: &UserGuardAccount,
        amount: u64,
        clock: &Clock,
    ) -> Result<(), ProgramError> {
        let now = clock.unix_timestamp;

        if amount == 0 {
            return Err(DepositGuardError::ZeroAmount.into());
        }

        if guard.emergency.degraded_mode {
            msg!("Degraded mode active, deposits blocked");
            return Err(DepositGuardError::EmergencyModeActive.into());
        }

        let status = oracle.status(now);
        if !oracle.is_healthy(now) {
            msg!("Oracle status {:?}", status);
            return Err(DepositGuardError::OracleUnhealthy.into());
        }
        oracle.check_market_cap_limits()?;

        if guard.circuit_breaker.is_active(now) {
            msg!("Circuit breaker active");
            return Err(DepositGuardError::CircuitBreakerActive.into());
        }

        user.mev
            .check_pre_deposit(&guard.config.mev, &guard.block_volume, amount, clock)?;

        if guard.capabilities.advanced_checks {
            user.risk.check_user_risk_score(&guard.config.risk)?;
            user.risk
                .check_suspicious_activity(&guard.config.risk, amount, now)?;
        }

        Ok(())
    }

    /// Advisory form of [`Self::pre_deposit_check`]
    pub fn can_user_deposit(
        guard: &GuardState,
        oracle: &TwapOracle,
        user: &UserGuardAccount,
        amount: u64,
        clock: &Clock,
    ) -> (bool, String) {
        match Self::pre_deposit_check(guard, oracle, user, amount, clock) {
            Ok(()) => (true, String::new()),
            Err(error) => (false, rejection_reason(&error)),
        }
    }

    pub fn check_circuit_breaker(
        guard: &mut GuardState,
        caller: &Pubkey,
        amount: u64,
        now: i64,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::DepositPipeline, caller)?;
        Self::apply_circuit_breaker(guard, amount, now)
    }

    fn apply_circuit_breaker(
        guard: &mut GuardState,
        amount: u64,
        now: i64,
    ) -> Result<bool, ProgramError> {
        let triggered = guard.circuit_breaker.atomic_check_and_update(amount, now)?;

        if triggered {
            let breaker = &guard.circuit_breaker;
            CircuitBreakerTriggered {
                trigger_time: breaker.trigger_time,
                current_volume: breaker.current_volume(),
                volume_threshold: breaker.volume_threshold,
                trigger_count: breaker.trigger_count,
                consecutive_triggers: breaker.consecutive_triggers,
            }
            .emit();
        }

        Ok(triggered)
    }

    /// Commit an accepted deposit. Returns false for a same slot replay,
    /// which changes nothing.
    pub fn post_deposit_update(
        guard: &mut GuardState,
        user: &mut UserGuardAccount,
        caller: &Pubkey,
        amount: u64,
        clock: &Clock,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::DepositPipeline, caller)?;
        Self::commit_deposit(guard, user, amount, clock)
    }

    fn commit_deposit(
        guard: &mut GuardState,
        user: &mut UserGuardAccount,
        amount: u64,
        clock: &Clock,
    ) -> Result<bool, ProgramError> {
        if amount == 0 {
            return Err(DepositGuardError::ZeroAmount.into());
        }

        let mut block_volume = guard.block_volume;
        let mut metrics = guard.daily_metrics;
        let mut next_user = user.clone();

        let committed = next_user.mev.update_post_deposit(
            &guard.config.mev,
            &mut block_volume,
            amount,
            clock,
        )?;
        if !committed {
            DepositReplayIgnored {
                user: user.user,
                amount,
                slot: clock.slot,
            }
            .emit();
            return Ok(false);
        }

        next_user.risk.update_user_behavior(
            &guard.config.risk,
            &mut metrics,
            amount,
            clock.unix_timestamp,
        )?;
        let total_volume = guard
            .total_volume
            .checked_add(amount)
            .ok_or(DepositGuardError::ArithmeticOverflow)?;

        guard.block_volume = block_volume;
        guard.daily_metrics = metrics;
        guard.total_volume = total_volume;
        guard.total_deposits = guard.total_deposits.saturating_add(1);
        *user = next_user;

        Ok(true)
    }

    /// Pre check, circuit breaker and commit as one step. A deposit that
    /// trips the breaker is itself accepted.
    pub fn approve_deposit(
        guard: &mut GuardState,
        oracle: &TwapOracle,
        user: &mut UserGuardAccount,
        caller: &Pubkey,
        amount: u64,
        clock: &Clock,
    ) -> Result<DepositApproval, ProgramError> {
        require_role(&guard.roles, Role::DepositPipeline, caller)?;
        Self::pre_deposit_check(guard, oracle, user, amount, clock)?;

        let mut next_guard = guard.clone();
        let mut next_user = user.clone();

        let triggered = Self::apply_circuit_breaker(&mut next_guard, amount, clock.unix_timestamp)?;
        if !Self::commit_deposit(&mut next_guard, &mut next_user, amount, clock)? {
            return Err(DepositGuardError::DepositTooFrequent.into());
        }

        *guard = next_guard;
        *user = next_user;

        let approval = DepositApproval {
            triggered_circuit_breaker: triggered,
            daily_volume_used: user
                .mev
                .daily_volume_used(clock.unix_timestamp, &guard.config.mev),
            circuit_breaker_volume: guard.circuit_breaker.current_volume(),
        };
        DepositApproved {
            user: user.user,
            amount,
            slot: clock.slot,
            daily_volume_used: approval.daily_volume_used,
            circuit_breaker_volume: approval.circuit_breaker_volume,
        }
        .emit();

        Ok(approval)
    }

    // === Oracle path ===

    pub fn update_price<P: PriceSource + ?Sized, S: SupplySource + ?Sized>(
        guard: &GuardState,
        oracle: &mut TwapOracle,
        caller: &Pubkey,
        price_source: &P,
        supply_source: &S,
        clock: &Clock,
    ) -> Result<PriceUpdate, ProgramError> {
        require_role(&guard.roles, Role::PriceUpdater, caller)?;

        let snapshot = price_source.snapshot()?;
        let supply = supply_source.supply()?;

        oracle.update_price(
            &snapshot,
            &supply,
            clock.unix_timestamp,
            clock.slot,
            guard.capabilities.new_asset_mode,
        )
    }

    pub fn is_healthy(oracle: &TwapOracle, now: i64) -> bool {
        oracle.is_healthy(now)
    }

    pub fn get_current_price(oracle: &TwapOracle, now: i64) -> Result<u64, ProgramError> {
        oracle.get_current_price(now)
    }

    pub fn check_market_cap_limits(oracle: &TwapOracle) -> Result<(), ProgramError> {
        oracle.check_market_cap_limits()
    }

    pub fn flash_loan_stats(oracle: &TwapOracle, slot: u64) -> FlashLoanStats {
        oracle
            .flash_loan
            .window_activity(&oracle.config.flash_loan, slot)
    }

    // === Emergency ===

    /// Returns false when the mode was already set.
    pub fn set_degraded_mode(
        guard: &mut GuardState,
        oracle: &mut TwapOracle,
        caller: &Pubkey,
        enabled: bool,
        now: i64,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::Emergency, caller)?;

        if guard.emergency.degraded_mode == enabled && oracle.emergency_mode == enabled {
            return Ok(false);
        }

        guard.emergency.degraded_mode = enabled;
        guard.emergency.changed_at = now;
        guard.emergency.changed_by = *caller;
        oracle.emergency_mode = enabled;

        msg!("Degraded mode {}", if enabled { "ENABLED" } else { "disabled" });
        DegradedModeChanged {
            enabled,
            changed_by: *caller,
            timestamp: now,
        }
        .emit();

        Ok(true)
    }

    // === Governance ===

    pub fn set_guard_parameter(
        guard: &mut GuardState,
        caller: &Pubkey,
        parameter: GuardParameter,
        value: u64,
    ) -> Result<u64, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let mut config = guard.config;
        let mut breaker = guard.circuit_breaker;
        let old_value = parameter.read(&config, &breaker);

        parameter.write(&mut config, &mut breaker, value)?;
        config.validate()?;
        breaker.validate()?;

        guard.config = config;
        guard.circuit_breaker = breaker;

        ParameterUpdated {
            parameter: parameter.name().to_string(),
            old_value,
            new_value: value,
            updated_by: *caller,
        }
        .emit();
        Ok(old_value)
    }

    pub fn set_oracle_parameter(
        guard: &GuardState,
        oracle: &mut TwapOracle,
        caller: &Pubkey,
        parameter: OracleParameter,
        value: u64,
    ) -> Result<u64, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let mut config = oracle.config;
        let mut validation = oracle.validation;
        let old_value = parameter.read(&config, &validation);

        parameter.write(&mut config, &mut validation, value)?;
        config.validate()?;
        validation.validate()?;

        oracle.config = config;
        oracle.validation = validation;

        ParameterUpdated {
            parameter: parameter.name().to_string(),
            old_value,
            new_value: value,
            updated_by: *caller,
        }
        .emit();
        Ok(old_value)
    }

    pub fn set_capabilities(
        guard: &mut GuardState,
        caller: &Pubkey,
        capabilities: Capabilities,
    ) -> Result<(), ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        guard.capabilities = capabilities;
        CapabilitiesUpdated {
            advanced_checks: capabilities.advanced_checks,
            new_asset_mode: capabilities.new_asset_mode,
            updated_by: *caller,
        }
        .emit();
        Ok(())
    }

    pub fn reset_circuit_breaker(
        guard: &mut GuardState,
        caller: &Pubkey,
        now: i64,
    ) -> Result<(), ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;
        if guard.circuit_breaker.updating {
            return Err(DepositGuardError::ReentrantCall.into());
        }

        guard.circuit_breaker.manual_reset(now);
        CircuitBreakerReset {
            reset_by: *caller,
            timestamp: now,
            trigger_count: guard.circuit_breaker.trigger_count,
        }
        .emit();
        Ok(())
    }

    pub fn set_fallback_price(
        guard: &GuardState,
        oracle: &mut TwapOracle,
        caller: &Pubkey,
        price: u64,
    ) -> Result<u64, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let old_value = oracle.set_fallback_price(price)?;
        ParameterUpdated {
            parameter: "fallback_price".to_string(),
            old_value,
            new_value: price,
            updated_by: *caller,
        }
        .emit();
        Ok(old_value)
    }

    pub fn override_price(
        guard: &GuardState,
        oracle: &mut TwapOracle,
        caller: &Pubkey,
        price: u64,
        now: i64,
    ) -> Result<u64, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let old_price = oracle.override_price(price, now)?;
        msg!("Validated price overridden {} -> {}", old_price, price);
        PriceOverridden {
            old_price,
            new_price: price,
            overridden_by: *caller,
        }
        .emit();
        Ok(old_price)
    }

    pub fn invalidate_observation(
        guard: &GuardState,
        oracle: &mut TwapOracle,
        caller: &Pubkey,
        index: u16,
    ) -> Result<u16, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let valid_observations = oracle.invalidate_observation(index)?;
        ObservationInvalidated {
            index,
            valid_observations,
        }
        .emit();
        Ok(valid_observations)
    }

    pub fn grant_role(
        guard: &mut GuardState,
        caller: &Pubkey,
        role: Role,
        member: Pubkey,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let changed = guard.roles.grant(role, member)?;
        if changed {
            RoleChanged {
                role,
                member,
                granted: true,
                changed_by: *caller,
            }
            .emit();
        }
        Ok(changed)
    }

    pub fn revoke_role(
        guard: &mut GuardState,
        caller: &Pubkey,
        role: Role,
        member: Pubkey,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let changed = guard.roles.revoke(role, &member)?;
        if changed {
            RoleChanged {
                role,
                member,
                granted: false,
                changed_by: *caller,
            }
            .emit();
        }
        Ok(changed)
    }

    pub fn register_dependent(
        guard: &mut GuardState,
        caller: &Pubkey,
        component: Pubkey,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let added = guard.add_dependent(component)?;
        if added {
            DependentRegistered {
                component,
                registered: true,
            }
            .emit();
        }
        Ok(added)
    }

    pub fn unregister_dependent(
        guard: &mut GuardState,
        caller: &Pubkey,
        component: Pubkey,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::Governance, caller)?;

        let removed = guard.remove_dependent(&component);
        if removed {
            DependentRegistered {
                component,
                registered: false,
            }
            .emit();
        }
        Ok(removed)
    }

    // === Monitor ===

    pub fn set_user_risk_score(
        guard: &GuardState,
        user: &mut UserGuardAccount,
        caller: &Pubkey,
        risk_score: u16,
    ) -> Result<u16, ProgramError> {
        require_role(&guard.roles, Role::Monitor, caller)?;

        let old = user.risk.set_risk_score(risk_score)?;
        Self::emit_risk_update(user, caller);
        Ok(old)
    }

    pub fn set_user_flagged(
        guard: &GuardState,
        user: &mut UserGuardAccount,
        caller: &Pubkey,
        flagged: bool,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::Monitor, caller)?;

        let was_flagged = user.risk.set_flagged(flagged);
        Self::emit_risk_update(user, caller);
        Ok(was_flagged)
    }

    /// Returns true when this report flagged the user.
    pub fn record_suspicious_activity(
        guard: &GuardState,
        user: &mut UserGuardAccount,
        caller: &Pubkey,
    ) -> Result<bool, ProgramError> {
        require_role(&guard.roles, Role::Monitor, caller)?;

        let flagged_now = user.risk.record_suspicious_activity(&guard.config.risk);
        Self::emit_risk_update(user, caller);
        Ok(flagged_now)
    }

    fn emit_risk_update(user: &UserGuardAccount, caller: &Pubkey) {
        UserRiskUpdated {
            user: user.user,
            risk_score: user.risk.risk_score,
            flagged: user.risk.flagged,
            suspicious_activity_count: user.risk.suspicious_activity_count,
            updated_by: *caller,
        }
        .emit();
    }
}
