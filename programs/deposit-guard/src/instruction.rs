use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
    sysvar,
};

use crate::{
    auth::Role,
    constants::{DEPENDENT_SEED, GUARD_SEED, ORACLE_SEED, USER_GUARD_SEED},
    engine::{GuardParameter, OracleParameter},
    error::DepositGuardError,
    oracle::{OracleConfig, PriceValidationState},
    state::{Capabilities, GuardConfig},
};

/// Circuit breaker parameters supplied at initialization
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerParams {
    pub volume_threshold: u64,
    pub window_duration: i64,
    pub cooldown_period: i64,
}

/// Return data of `CanUserDeposit`
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct DepositEligibility {
    pub allowed: bool,
    pub reason: String,
}

/// Return data of `GetOracleReport`
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleReport {
    pub healthy: bool,
    pub current_price: u64,
    pub market_cap: u64,
    pub valid_observations: u16,
    pub current_period_updates: u32,
    pub window_updates: u32,
    pub window_risk_flagged: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq)]
pub enum DepositGuardInstruction {
    /// Create the guard and oracle accounts. The signer receives every role.
    /// Accounts:
    /// 0. `[signer, writable]` Authority (payer)
    /// 1. `[writable]` Guard PDA
    /// 2. `[writable]` Oracle PDA
    /// 3. `[]` Price feed account
    /// 4. `[]` Supply mint
    /// 5. `[]` System program
    /// 6. `[]` Rent sysvar
    Initialize {
        guard_config: GuardConfig,
        circuit_breaker: CircuitBreakerParams,
        oracle_config: OracleConfig,
        validation: PriceValidationState,
        fallback_price: u64,
    },

    /// Accounts:
    /// 0. `[signer, writable]` Payer
    /// 1. `[]` User
    /// 2. `[writable]` User guard PDA
    /// 3. `[]` System program
    /// 4. `[]` Rent sysvar
    InitializeUser,

    /// Fails when the deposit would be rejected. Writes nothing.
    /// Accounts:
    /// 0. `[]` Guard PDA
    /// 1. `[]` Oracle PDA
    /// 2. `[]` User
    /// 3. `[]` User guard PDA, may be uncreated
    PreDepositCheck { amount: u64 },

    /// Advisory check; the verdict is set as return data.
    /// Accounts: as `PreDepositCheck`
    CanUserDeposit { amount: u64 },

    /// Accounts:
    /// 0. `[signer]` Deposit pipeline
    /// 1. `[writable]` Guard PDA
    CheckCircuitBreaker { amount: u64 },

    /// Accounts:
    /// 0. `[signer]` Deposit pipeline
    /// 1. `[writable]` Guard PDA
    /// 2. `[]` User
    /// 3. `[writable]` User guard PDA
    PostDepositUpdate { amount: u64 },

    /// Check, circuit breaker and commit in one step.
    /// Accounts:
    /// 0. `[signer]` Deposit pipeline
    /// 1. `[writable]` Guard PDA
    /// 2. `[]` Oracle PDA
    /// 3. `[]` User
    /// 4. `[writable]` User guard PDA
    ApproveDeposit { amount: u64 },

    /// Accounts:
    /// 0. `[signer]` Price updater
    /// 1. `[]` Guard PDA
    /// 2. `[writable]` Oracle PDA
    /// 3. `[]` Price feed account
    /// 4. `[]` Supply mint
    UpdatePrice,

    /// Accounts:
    /// 0. `[]` Oracle PDA
    GetOracleReport,

    /// Accounts:
    /// 0. `[signer]` Emergency role
    /// 1. `[writable]` Guard PDA
    /// 2. `[writable]` Oracle PDA
    /// 3+. `[writable]` Dependent flag PDAs
    SetDegradedMode { enabled: bool },

    /// Accounts:
    /// 0. `[signer]` Governance
    /// 1. `[writable]` Guard PDA
    UpdateGuardParameter { parameter: GuardParameter, value: u64 },

    /// Accounts:
    /// 0. `[signer]` Governance
    /// 1. `[]` Guard PDA
    /// 2. `[writable]` Oracle PDA
    UpdateOracleParameter { parameter: OracleParameter, value: u64 },

    /// Accounts:
    /// 0. `[signer]` Governance
    /// 1. `[writable]` Guard PDA
    SetCapabilities { capabilities: Capabilities },

    /// Accounts:
    /// 0. `[signer]` Monitor
    /// 1. `[]` Guard PDA
    /// 2. `[writable]` User guard PDA
    SetUserRiskScore { risk_score: u16 },

    /// Accounts: as `SetUserRiskScore`
    SetUserFlagged { flagged: bool },

    /// Accounts: as `SetUserRiskScore`
    RecordSuspiciousActivity,

    /// Accounts:
    /// 0. `[signer]` Governance
    /// 1. `[writable]` Guard PDA
    GrantRole { role: Role, member: Pubkey },

    /// Accounts: as `GrantRole`
    RevokeRole { role: Role, member: Pubkey },

    /// Accounts:
    /// 0. `[signer, writable]` Governance (payer)
    /// 1. `[writable]` Guard PDA
    /// 2. `[writable]` Dependent flag PDA
    /// 3. `[]` System program
    /// 4. `[]` Rent sysvar
    RegisterDependent { component: Pubkey },

    /// Accounts:
    /// 0. `[signer]` Governance
    /// 1. `[writable]` Guard PDA
    UnregisterDependent { component: Pubkey },

    /// Accounts:
    /// 0. `[signer]` Governance
    /// 1. `[writable]` Guard PDA
    ResetCircuitBreaker,

    /// Accounts:
    /// 0. `[signer]` Governance
    /// 1. `[]` Guard PDA
    /// 2. `[writable]` Oracle PDA
    SetFallbackPrice { price: u64 },

    /// Accounts: as `SetFallbackPrice`
    OverridePrice { price: u64 },

    /// Accounts: as `SetFallbackPrice`
    InvalidateObservation { index: u16 },
}

impl DepositGuardInstruction {
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        Self::try_from_slice(input).map_err(|_| DepositGuardError::InvalidInstruction.into())
    }
}

// PDA helpers

pub fn guard_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[GUARD_SEED], program_id)
}

pub fn oracle_address(guard: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ORACLE_SEED, guard.as_ref()], program_id)
}

pub fn user_guard_address(user: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[USER_GUARD_SEED, user.as_ref()], program_id)
}

pub fn dependent_address(component: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[DEPENDENT_SEED, component.as_ref()], program_id)
}

// Helper functions to create instructions

#[allow(clippy::too_many_arguments)]
pub fn initialize(
    program_id: &Pubkey,
    authority: &Pubkey,
    price_feed: &Pubkey,
    supply_mint: &Pubkey,
    guard_config: GuardConfig,
    circuit_breaker: CircuitBreakerParams,
    oracle_config: OracleConfig,
    validation: PriceValidationState,
    fallback_price: u64,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (oracle, _) = oracle_address(&guard, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::Initialize {
            guard_config,
            circuit_breaker,
            oracle_config,
            validation,
            fallback_price,
        },
        vec![
            AccountMeta::new(*authority, true),
            AccountMeta::new(guard, false),
            AccountMeta::new(oracle, false),
            AccountMeta::new_readonly(*price_feed, false),
            AccountMeta::new_readonly(*supply_mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ],
    )
}

pub fn initialize_user(program_id: &Pubkey, payer: &Pubkey, user: &Pubkey) -> Instruction {
    let (user_guard, _) = user_guard_address(user, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::InitializeUser,
        vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(*user, false),
            AccountMeta::new(user_guard, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ],
    )
}

fn deposit_check(
    program_id: &Pubkey,
    user: &Pubkey,
    instruction: DepositGuardInstruction,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (oracle, _) = oracle_address(&guard, program_id);
    let (user_guard, _) = user_guard_address(user, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &instruction,
        vec![
            AccountMeta::new_readonly(guard, false),
            AccountMeta::new_readonly(oracle, false),
            AccountMeta::new_readonly(*user, false),
            AccountMeta::new_readonly(user_guard, false),
        ],
    )
}

pub fn pre_deposit_check(program_id: &Pubkey, user: &Pubkey, amount: u64) -> Instruction {
    deposit_check(program_id, user, DepositGuardInstruction::PreDepositCheck { amount })
}

pub fn can_user_deposit(program_id: &Pubkey, user: &Pubkey, amount: u64) -> Instruction {
    deposit_check(program_id, user, DepositGuardInstruction::CanUserDeposit { amount })
}

pub fn check_circuit_breaker(program_id: &Pubkey, pipeline: &Pubkey, amount: u64) -> Instruction {
    let (guard, _) = guard_address(program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::CheckCircuitBreaker { amount },
        vec![
            AccountMeta::new_readonly(*pipeline, true),
            AccountMeta::new(guard, false),
        ],
    )
}

pub fn post_deposit_update(
    program_id: &Pubkey,
    pipeline: &Pubkey,
    user: &Pubkey,
    amount: u64,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (user_guard, _) = user_guard_address(user, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::PostDepositUpdate { amount },
        vec![
            AccountMeta::new_readonly(*pipeline, true),
            AccountMeta::new(guard, false),
            AccountMeta::new_readonly(*user, false),
            AccountMeta::new(user_guard, false),
        ],
    )
}

pub fn approve_deposit(
    program_id: &Pubkey,
    pipeline: &Pubkey,
    user: &Pubkey,
    amount: u64,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (oracle, _) = oracle_address(&guard, program_id);
    let (user_guard, _) = user_guard_address(user, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::ApproveDeposit { amount },
        vec![
            AccountMeta::new_readonly(*pipeline, true),
            AccountMeta::new(guard, false),
            AccountMeta::new_readonly(oracle, false),
            AccountMeta::new_readonly(*user, false),
            AccountMeta::new(user_guard, false),
        ],
    )
}

pub fn update_price(
    program_id: &Pubkey,
    updater: &Pubkey,
    price_feed: &Pubkey,
    supply_mint: &Pubkey,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (oracle, _) = oracle_address(&guard, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::UpdatePrice,
        vec![
            AccountMeta::new_readonly(*updater, true),
            AccountMeta::new_readonly(guard, false),
            AccountMeta::new(oracle, false),
            AccountMeta::new_readonly(*price_feed, false),
            AccountMeta::new_readonly(*supply_mint, false),
        ],
    )
}

pub fn get_oracle_report(program_id: &Pubkey) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (oracle, _) = oracle_address(&guard, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::GetOracleReport,
        vec![AccountMeta::new_readonly(oracle, false)],
    )
}

pub fn set_degraded_mode(
    program_id: &Pubkey,
    emergency: &Pubkey,
    dependents: &[Pubkey],
    enabled: bool,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (oracle, _) = oracle_address(&guard, program_id);

    let mut accounts = vec![
        AccountMeta::new_readonly(*emergency, true),
        AccountMeta::new(guard, false),
        AccountMeta::new(oracle, false),
    ];
    accounts.extend(
        dependents
            .iter()
            .map(|component| AccountMeta::new(dependent_address(component, program_id).0, false)),
    );

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::SetDegradedMode { enabled },
        accounts,
    )
}

/// Governance instruction touching only the guard account
pub fn guard_admin(
    program_id: &Pubkey,
    governance: &Pubkey,
    instruction: DepositGuardInstruction,
) -> Instruction {
    let (guard, _) = guard_address(program_id);

    Instruction::new_with_borsh(
        *program_id,
        &instruction,
        vec![
            AccountMeta::new_readonly(*governance, true),
            AccountMeta::new(guard, false),
        ],
    )
}

/// Governance instruction writing the oracle account
pub fn oracle_admin(
    program_id: &Pubkey,
    governance: &Pubkey,
    instruction: DepositGuardInstruction,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (oracle, _) = oracle_address(&guard, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &instruction,
        vec![
            AccountMeta::new_readonly(*governance, true),
            AccountMeta::new_readonly(guard, false),
            AccountMeta::new(oracle, false),
        ],
    )
}

/// Monitor instruction writing one user's risk profile
pub fn user_admin(
    program_id: &Pubkey,
    monitor: &Pubkey,
    user: &Pubkey,
    instruction: DepositGuardInstruction,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (user_guard, _) = user_guard_address(user, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &instruction,
        vec![
            AccountMeta::new_readonly(*monitor, true),
            AccountMeta::new_readonly(guard, false),
            AccountMeta::new(user_guard, false),
        ],
    )
}

pub fn register_dependent(
    program_id: &Pubkey,
    governance: &Pubkey,
    component: &Pubkey,
) -> Instruction {
    let (guard, _) = guard_address(program_id);
    let (flag, _) = dependent_address(component, program_id);

    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::RegisterDependent {
            component: *component,
        },
        vec![
            AccountMeta::new(*governance, true),
            AccountMeta::new(guard, false),
            AccountMeta::new(flag, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ],
    )
}
