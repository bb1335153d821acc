//! Event logging for the deposit guard
//!
//! Events are borsh encoded and written to the program log as base58 so
//! indexers can decode them without an IDL.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, pubkey::Pubkey};

use crate::auth::Role;

/// Event type discriminator
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Deposit path
    DepositApproved,
    CircuitBreakerTriggered,
    CircuitBreakerReset,
    DepositReplayIgnored,

    // Oracle path
    FlashLoanDetected,
    ObservationAdded,
    MarketCapUpdated,
    PriceValidated,
    PriceOverridden,
    ObservationInvalidated,

    // Governance and emergency
    ParameterUpdated,
    CapabilitiesUpdated,
    DegradedModeChanged,
    UserRiskUpdated,
    RoleChanged,
    DependentRegistered,
    DependentNotified,
    DependentNotificationFailed,
}

/// Base event trait
pub trait Event: BorshSerialize {
    fn event_type() -> EventType;

    fn emit(&self) {
        msg!("DEPOSIT_GUARD_EVENT");
        msg!("TYPE:{:?}", Self::event_type());

        if let Ok(data) = self.try_to_vec() {
            msg!("DATA:{}", bs58::encode(&data).into_string());
        }
    }
}

#[macro_export]
macro_rules! define_event {
    ($name:ident { $($field:ident: $type:ty),* $(,)? }) => {
        #[derive(::borsh::BorshSerialize, ::borsh::BorshDeserialize, Debug, Clone, PartialEq)]
        pub struct $name {
            $(pub $field: $type,)*
        }

        impl $crate::events::Event for $name {
            fn event_type() -> $crate::events::EventType {
                $crate::events::EventType::$name
            }
        }
    };
}

// === Deposit Events ===

define_event!(DepositApproved {
    user: Pubkey,
    amount: u64,
    slot: u64,
    daily_volume_used: u64,
    circuit_breaker_volume: u64,
});

define_event!(CircuitBreakerTriggered {
    trigger_time: i64,
    current_volume: u64,
    volume_threshold: u64,
    trigger_count: u64,
    consecutive_triggers: u32,
});

define_event!(CircuitBreakerReset {
    reset_by: Pubkey,
    timestamp: i64,
    trigger_count: u64,
});

define_event!(DepositReplayIgnored {
    user: Pubkey,
    amount: u64,
    slot: u64,
});

// === Oracle Events ===

define_event!(FlashLoanDetected {
    slot: u64,
    period: u64,
    updates_in_period: u32,
    max_updates_per_period: u32,
});

define_event!(ObservationAdded {
    index: u16,
    timestamp: i64,
    cumulative_price_a: u128,
    cumulative_price_b: u128,
    liquidity_snapshot: u64,
    valid_observations: u16,
});

define_event!(MarketCapUpdated {
    old_market_cap: u64,
    new_market_cap: u64,
    price: u64,
    total_supply: u64,
});

define_event!(PriceValidated {
    old_price: u64,
    new_price: u64,
    spot_price: u64,
    timestamp: i64,
});

define_event!(PriceOverridden {
    old_price: u64,
    new_price: u64,
    overridden_by: Pubkey,
});

define_event!(ObservationInvalidated {
    index: u16,
    valid_observations: u16,
});

// === Governance Events ===

define_event!(ParameterUpdated {
    parameter: String,
    old_value: u64,
    new_value: u64,
    updated_by: Pubkey,
});

define_event!(CapabilitiesUpdated {
    advanced_checks: bool,
    new_asset_mode: bool,
    updated_by: Pubkey,
});

define_event!(DegradedModeChanged {
    enabled: bool,
    changed_by: Pubkey,
    timestamp: i64,
});

define_event!(UserRiskUpdated {
    user: Pubkey,
    risk_score: u16,
    flagged: bool,
    suspicious_activity_count: u32,
    updated_by: Pubkey,
});

define_event!(RoleChanged {
    role: Role,
    member: Pubkey,
    granted: bool,
    changed_by: Pubkey,
});

define_event!(DependentRegistered {
    component: Pubkey,
    registered: bool,
});

define_event!(DependentNotified {
    component: Pubkey,
    degraded_mode: bool,
});

define_event!(DependentNotificationFailed {
    component: Pubkey,
    degraded_mode: bool,
    error_code: String,
});
