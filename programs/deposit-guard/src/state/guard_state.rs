use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use crate::{
    auth::RoleRegistry,
    constants::MAX_DEPENDENTS,
    error::DepositGuardError,
    guard::{CircuitBreakerState, DailyMetrics, MevConfig, RiskConfig},
    state::AccountState,
    window::TimeWindowAccumulator,
};

/// Deposit side configuration
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardConfig {
    pub mev: MevConfig,
    pub risk: RiskConfig,
}

impl GuardConfig {
    pub const LEN: usize = MevConfig::LEN + RiskConfig::LEN;

    pub fn validate(&self) -> Result<(), ProgramError> {
        self.mev.validate()?;
        self.risk.validate()
    }
}

/// Feature switches replacing separate core and advanced variants
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Risk score and suspicious activity checks on the deposit path
    pub advanced_checks: bool,
    /// Strict price change bound on oracle updates
    pub new_asset_mode: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            advanced_checks: true,
            new_asset_mode: true,
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmergencyState {
    pub degraded_mode: bool,
    pub changed_at: i64,
    pub changed_by: Pubkey,
}

impl EmergencyState {
    pub const LEN: usize = 1 + 8 + 32;
}

/// Protocol wide guard account
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct GuardState {
    pub discriminator: [u8; 8],
    pub is_initialized: bool,
    pub bump: u8,
    pub config: GuardConfig,
    pub capabilities: Capabilities,
    pub roles: RoleRegistry,
    pub emergency: EmergencyState,
    pub circuit_breaker: CircuitBreakerState,
    /// Deposits across all users in the current slot
    pub block_volume: TimeWindowAccumulator,
    pub daily_metrics: DailyMetrics,
    /// Components told about degraded mode changes
    pub dependents: Vec<Pubkey>,
    pub total_deposits: u64,
    pub total_volume: u64,
}

impl AccountState for GuardState {
    const DISCRIMINATOR: [u8; 8] = *b"DGGUARD_";
    const LEN: usize = 8
        + 1
        + 1
        + GuardConfig::LEN
        + 2
        + RoleRegistry::LEN
        + EmergencyState::LEN
        + CircuitBreakerState::LEN
        + TimeWindowAccumulator::LEN
        + DailyMetrics::LEN
        + 4
        + MAX_DEPENDENTS * 32
        + 8
        + 8;

    fn discriminator(&self) -> [u8; 8] {
        self.discriminator
    }

    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl GuardState {
    pub fn new(
        authority: Pubkey,
        bump: u8,
        config: GuardConfig,
        circuit_breaker: CircuitBreakerState,
    ) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            bump,
            config,
            capabilities: Capabilities::default(),
            roles: RoleRegistry::new(authority),
            emergency: EmergencyState::default(),
            circuit_breaker,
            block_volume: TimeWindowAccumulator::default(),
            daily_metrics: DailyMetrics::default(),
            dependents: Vec::new(),
            total_deposits: 0,
            total_volume: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        self.config.validate()?;
        self.circuit_breaker.validate()
    }

    /// Returns false if already registered.
    pub fn add_dependent(&mut self, component: Pubkey) -> Result<bool, ProgramError> {
        if self.dependents.contains(&component) {
            return Ok(false);
        }
        if self.dependents.len() >= MAX_DEPENDENTS {
            return Err(DepositGuardError::DependentCapacityExceeded.into());
        }
        self.dependents.push(component);
        Ok(true)
    }

    pub fn remove_dependent(&mut self, component: &Pubkey) -> bool {
        let before = self.dependents.len();
        self.dependents.retain(|registered| registered != component);
        self.dependents.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authority, Role};

    fn guard() -> GuardState {
        GuardState::new(
            Pubkey::new_unique(),
            255,
            GuardConfig::default(),
            CircuitBreakerState::default(),
        )
    }

    #[test]
    fn test_fully_populated_state_fits() {
        let mut state = guard();
        while state.roles.assignments.len() < crate::constants::MAX_ROLE_ASSIGNMENTS {
            state.roles.grant(Role::Monitor, Pubkey::new_unique()).unwrap();
        }
        for _ in 0..MAX_DEPENDENTS {
            state.add_dependent(Pubkey::new_unique()).unwrap();
        }

        let bytes = state.try_to_vec().unwrap();
        assert_eq!(bytes.len(), GuardState::LEN);

        let decoded = GuardState::unpack_unchecked(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_dependent_registry() {
        let mut state = guard();
        let component = Pubkey::new_unique();

        assert!(state.add_dependent(component).unwrap());
        assert!(!state.add_dependent(component).unwrap());
        assert!(state.remove_dependent(&component));
        assert!(!state.remove_dependent(&component));

        for _ in 0..MAX_DEPENDENTS {
            state.add_dependent(Pubkey::new_unique()).unwrap();
        }
        assert_eq!(
            state.add_dependent(Pubkey::new_unique()),
            Err(DepositGuardError::DependentCapacityExceeded.into())
        );
    }

    #[test]
    fn test_new_state_defaults() {
        let authority = Pubkey::new_unique();
        let state = GuardState::new(
            authority,
            1,
            GuardConfig::default(),
            CircuitBreakerState::default(),
        );

        assert!(state.validate().is_ok());
        assert!(state.roles.has_role(Role::Governance, &authority));
        assert!(state.capabilities.advanced_checks);
        assert!(!state.emergency.degraded_mode);
    }
}
