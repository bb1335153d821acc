use borsh::BorshSerialize;
use solana_program::{
    account_info::{next_account_info, AccountInfo},
    clock::Clock,
    entrypoint::ProgramResult,
    msg,
    program::{invoke_signed, set_return_data},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_instruction,
    sysvar::{rent::Rent, Sysvar},
};

use crate::{
    adapters::{MintSupplyAccount, PriceFeedAccount, PriceSource, SupplySource},
    auth::Role,
    constants::{DEPENDENT_SEED, GUARD_SEED, ORACLE_SEED, USER_GUARD_SEED},
    engine::{DepositGuardEngine, GuardParameter, OracleParameter},
    error::{rejection_reason, DepositGuardError},
    guard::CircuitBreakerState,
    instruction::{
        CircuitBreakerParams, DepositEligibility, DepositGuardInstruction, OracleReport,
    },
    notify::{broadcast, DependentFlagAccount},
    oracle::{OracleConfig, PriceValidationState, TwapOracle},
    state::{
        verify_pda, AccountState, Capabilities, DependentFlag, GuardConfig, GuardState,
        OracleState, UserGuardAccount,
    },
};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = DepositGuardInstruction::unpack(instruction_data)?;

        match instruction {
            DepositGuardInstruction::Initialize {
                guard_config,
                circuit_breaker,
                oracle_config,
                validation,
                fallback_price,
            } => {
                msg!("Instruction: Initialize");
                Self::process_initialize(
                    program_id,
                    accounts,
                    guard_config,
                    circuit_breaker,
                    oracle_config,
                    validation,
                    fallback_price,
                )
            }
            DepositGuardInstruction::InitializeUser => {
                msg!("Instruction: InitializeUser");
                Self::process_initialize_user(program_id, accounts)
            }
            DepositGuardInstruction::PreDepositCheck { amount } => {
                msg!("Instruction: PreDepositCheck");
                Self::process_pre_deposit_check(program_id, accounts, amount)
            }
            DepositGuardInstruction::CanUserDeposit { amount } => {
                msg!("Instruction: CanUserDeposit");
                Self::process_can_user_deposit(program_id, accounts, amount)
            }
            DepositGuardInstruction::CheckCircuitBreaker { amount } => {
                msg!("Instruction: CheckCircuitBreaker");
                Self::process_check_circuit_breaker(program_id, accounts, amount)
            }
            DepositGuardInstruction::PostDepositUpdate { amount } => {
                msg!("Instruction: PostDepositUpdate");
                Self::process_post_deposit_update(program_id, accounts, amount)
            }
            DepositGuardInstruction::ApproveDeposit { amount } => {
                msg!("Instruction: ApproveDeposit");
                Self::process_approve_deposit(program_id, accounts, amount)
            }
            DepositGuardInstruction::UpdatePrice => {
                msg!("Instruction: UpdatePrice");
                Self::process_update_price(program_id, accounts)
            }
            DepositGuardInstruction::GetOracleReport => {
                msg!("Instruction: GetOracleReport");
                Self::process_get_oracle_report(program_id, accounts)
            }
            DepositGuardInstruction::SetDegradedMode { enabled } => {
                msg!("Instruction: SetDegradedMode");
                Self::process_set_degraded_mode(program_id, accounts, enabled)
            }
            DepositGuardInstruction::UpdateGuardParameter { parameter, value } => {
                msg!("Instruction: UpdateGuardParameter");
                Self::process_update_guard_parameter(program_id, accounts, parameter, value)
            }
            DepositGuardInstruction::UpdateOracleParameter { parameter, value } => {
                msg!("Instruction: UpdateOracleParameter");
                Self::process_update_oracle_parameter(program_id, accounts, parameter, value)
            }
            DepositGuardInstruction::SetCapabilities { capabilities } => {
                msg!("Instruction: SetCapabilities");
                Self::process_set_capabilities(program_id, accounts, capabilities)
            }
            DepositGuardInstruction::SetUserRiskScore { risk_score } => {
                msg!("Instruction: SetUserRiskScore");
                Self::process_user_admin(program_id, accounts, |guard, user, caller| {
                    DepositGuardEngine::set_user_risk_score(guard, user, caller, risk_score)
                        .map(|_| ())
                })
            }
            DepositGuardInstruction::SetUserFlagged { flagged } => {
                msg!("Instruction: SetUserFlagged");
                Self::process_user_admin(program_id, accounts, |guard, user, caller| {
                    DepositGuardEngine::set_user_flagged(guard, user, caller, flagged).map(|_| ())
                })
            }
            DepositGuardInstruction::RecordSuspiciousActivity => {
                msg!("Instruction: RecordSuspiciousActivity");
                Self::process_user_admin(program_id, accounts, |guard, user, caller| {
                    DepositGuardEngine::record_suspicious_activity(guard, user, caller).map(|_| ())
                })
            }
            DepositGuardInstruction::GrantRole { role, member } => {
                msg!("Instruction: GrantRole");
                Self::process_role_change(program_id, accounts, role, member, true)
            }
            DepositGuardInstruction::RevokeRole { role, member } => {
                msg!("Instruction: RevokeRole");
                Self::process_role_change(program_id, accounts, role, member, false)
            }
            DepositGuardInstruction::RegisterDependent { component } => {
                msg!("Instruction: RegisterDependent");
                Self::process_register_dependent(program_id, accounts, component)
            }
            DepositGuardInstruction::UnregisterDependent { component } => {
                msg!("Instruction: UnregisterDependent");
                Self::process_guard_admin(program_id, accounts, |guard, caller, _| {
                    DepositGuardEngine::unregister_dependent(guard, caller, component).map(|_| ())
                })
            }
            DepositGuardInstruction::ResetCircuitBreaker => {
                msg!("Instruction: ResetCircuitBreaker");
                Self::process_guard_admin(program_id, accounts, |guard, caller, now| {
                    DepositGuardEngine::reset_circuit_breaker(guard, caller, now)
                })
            }
            DepositGuardInstruction::SetFallbackPrice { price } => {
                msg!("Instruction: SetFallbackPrice");
                Self::process_oracle_admin(program_id, accounts, |guard, oracle, caller, _| {
                    DepositGuardEngine::set_fallback_price(guard, oracle, caller, price).map(|_| ())
                })
            }
            DepositGuardInstruction::OverridePrice { price } => {
                msg!("Instruction: OverridePrice");
                Self::process_oracle_admin(program_id, accounts, |guard, oracle, caller, now| {
                    DepositGuardEngine::override_price(guard, oracle, caller, price, now)
                        .map(|_| ())
                })
            }
            DepositGuardInstruction::InvalidateObservation { index } => {
                msg!("Instruction: InvalidateObservation");
                Self::process_oracle_admin(program_id, accounts, |guard, oracle, caller, _| {
                    DepositGuardEngine::invalidate_observation(guard, oracle, caller, index)
                        .map(|_| ())
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_initialize(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        guard_config: GuardConfig,
        circuit_breaker: CircuitBreakerParams,
        oracle_config: OracleConfig,
        validation: PriceValidationState,
        fallback_price: u64,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let authority_info = next_account_info(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;
        let price_feed_info = next_account_info(account_info_iter)?;
        let mint_info = next_account_info(account_info_iter)?;
        let system_program = next_account_info(account_info_iter)?;
        let rent = &Rent::from_account_info(next_account_info(account_info_iter)?)?;

        if !authority_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }

        let guard_bump = verify_pda(guard_info, &[GUARD_SEED], program_id)?;
        let oracle_bump =
            verify_pda(oracle_info, &[ORACLE_SEED, guard_info.key.as_ref()], program_id)?;
        if !guard_info.data_is_empty() || !oracle_info.data_is_empty() {
            return Err(DepositGuardError::AlreadyInitialized.into());
        }

        if fallback_price == 0 {
            return Err(DepositGuardError::InvalidPrice.into());
        }
        oracle_config.validate()?;
        validation.validate()?;

        let clock = Clock::get()?;
        let breaker = CircuitBreakerState::new(
            circuit_breaker.volume_threshold,
            circuit_breaker.window_duration,
            circuit_breaker.cooldown_period,
            clock.unix_timestamp,
        );
        let guard = GuardState::new(*authority_info.key, guard_bump, guard_config, breaker);
        guard.validate()?;

        // Both sources must be readable before they are bound
        PriceFeedAccount::new(price_feed_info, price_feed_info.key)?.snapshot()?;
        MintSupplyAccount::new(mint_info, mint_info.key)?.supply()?;

        create_pda_account(
            authority_info,
            guard_info,
            system_program,
            rent,
            GuardState::LEN,
            &[GUARD_SEED, &[guard_bump]],
            program_id,
        )?;
        create_pda_account(
            authority_info,
            oracle_info,
            system_program,
            rent,
            OracleState::LEN,
            &[ORACLE_SEED, guard_info.key.as_ref(), &[oracle_bump]],
            program_id,
        )?;

        guard.store(guard_info)?;
        OracleState::new(
            oracle_bump,
            *price_feed_info.key,
            *mint_info.key,
            TwapOracle::new(oracle_config, validation, fallback_price),
        )
        .store(oracle_info)?;

        msg!("Deposit guard initialized, authority {}", authority_info.key);
        Ok(())
    }

    fn process_initialize_user(program_id: &Pubkey, accounts: &[AccountInfo]) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let payer_info = next_account_info(account_info_iter)?;
        let user_info = next_account_info(account_info_iter)?;
        let user_guard_info = next_account_info(account_info_iter)?;
        let system_program = next_account_info(account_info_iter)?;
        let rent = &Rent::from_account_info(next_account_info(account_info_iter)?)?;

        if !payer_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }

        let bump = verify_pda(
            user_guard_info,
            &[USER_GUARD_SEED, user_info.key.as_ref()],
            program_id,
        )?;
        if !user_guard_info.data_is_empty() {
            return Err(DepositGuardError::AlreadyInitialized.into());
        }

        create_pda_account(
            payer_info,
            user_guard_info,
            system_program,
            rent,
            UserGuardAccount::LEN,
            &[USER_GUARD_SEED, user_info.key.as_ref(), &[bump]],
            program_id,
        )?;
        UserGuardAccount::new(*user_info.key, bump).store(user_guard_info)?;

        msg!("User guard created for {}", user_info.key);
        Ok(())
    }

    fn process_pre_deposit_check(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        amount: u64,
    ) -> ProgramResult {
        let (guard, oracle_state, user) = load_deposit_accounts(program_id, accounts)?;
        let clock = Clock::get()?;

        DepositGuardEngine::pre_deposit_check(&guard, &oracle_state.oracle, &user, amount, &clock)?;

        msg!("Deposit of {} eligible", amount);
        Ok(())
    }

    fn process_can_user_deposit(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        amount: u64,
    ) -> ProgramResult {
        let clock = Clock::get()?;
        let eligibility =
            deposit_eligibility(load_deposit_accounts(program_id, accounts), amount, &clock);
        msg!(
            "Deposit of {} allowed: {} {}",
            amount,
            eligibility.allowed,
            eligibility.reason
        );

        set_return_data(
            &eligibility
                .try_to_vec()
                .map_err(|_| ProgramError::InvalidAccountData)?,
        );
        Ok(())
    }

    fn process_check_circuit_breaker(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        amount: u64,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let pipeline_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;

        let mut guard = GuardState::load(guard_info, program_id)?;
        let clock = Clock::get()?;

        let triggered = DepositGuardEngine::check_circuit_breaker(
            &mut guard,
            pipeline_info.key,
            amount,
            clock.unix_timestamp,
        )?;
        guard.store(guard_info)?;

        msg!("Circuit breaker volume {} triggered: {}", guard.circuit_breaker.current_volume(), triggered);
        Ok(())
    }

    fn process_post_deposit_update(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        amount: u64,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let pipeline_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let user_info = next_account_info(account_info_iter)?;
        let user_guard_info = next_account_info(account_info_iter)?;

        let mut guard = GuardState::load(guard_info, program_id)?;
        let mut user = load_user_guard(user_info, user_guard_info, program_id)?;
        let clock = Clock::get()?;

        let committed = DepositGuardEngine::post_deposit_update(
            &mut guard,
            &mut user,
            pipeline_info.key,
            amount,
            &clock,
        )?;
        if committed {
            guard.store(guard_info)?;
            user.store(user_guard_info)?;
        }
        Ok(())
    }

    fn process_approve_deposit(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        amount: u64,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let pipeline_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;
        let user_info = next_account_info(account_info_iter)?;
        let user_guard_info = next_account_info(account_info_iter)?;

        let mut guard = GuardState::load(guard_info, program_id)?;
        let oracle_state = OracleState::load(oracle_info, program_id)?;
        let mut user = load_user_guard(user_info, user_guard_info, program_id)?;
        let clock = Clock::get()?;

        let approval = DepositGuardEngine::approve_deposit(
            &mut guard,
            &oracle_state.oracle,
            &mut user,
            pipeline_info.key,
            amount,
            &clock,
        )?;
        guard.store(guard_info)?;
        user.store(user_guard_info)?;

        msg!(
            "Deposit of {} approved for {}, daily volume {}",
            amount,
            user.user,
            approval.daily_volume_used
        );
        Ok(())
    }

    fn process_update_price(program_id: &Pubkey, accounts: &[AccountInfo]) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let updater_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;
        let price_feed_info = next_account_info(account_info_iter)?;
        let mint_info = next_account_info(account_info_iter)?;

        let guard = GuardState::load(guard_info, program_id)?;
        let mut oracle_state = OracleState::load(oracle_info, program_id)?;
        let clock = Clock::get()?;

        let price_feed = PriceFeedAccount::new(price_feed_info, &oracle_state.price_feed)?;
        let supply_mint = MintSupplyAccount::new(mint_info, &oracle_state.supply_mint)?;

        let update = DepositGuardEngine::update_price(
            &guard,
            &mut oracle_state.oracle,
            updater_info.key,
            &price_feed,
            &supply_mint,
            &clock,
        )?;
        oracle_state.store(oracle_info)?;

        msg!(
            "Observation {} recorded, price {:?}, status {:?}",
            update.observation_index,
            update.price,
            update.status
        );
        Ok(())
    }

    fn process_get_oracle_report(program_id: &Pubkey, accounts: &[AccountInfo]) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let oracle_info = next_account_info(account_info_iter)?;

        let oracle_state = OracleState::load(oracle_info, program_id)?;
        let oracle = &oracle_state.oracle;
        let clock = Clock::get()?;
        let stats = DepositGuardEngine::flash_loan_stats(oracle, clock.slot);

        let report = OracleReport {
            healthy: DepositGuardEngine::is_healthy(oracle, clock.unix_timestamp),
            current_price: DepositGuardEngine::get_current_price(oracle, clock.unix_timestamp)?,
            market_cap: oracle.cached_market_cap,
            valid_observations: oracle.observations.valid_count(),
            current_period_updates: stats.current_period_updates,
            window_updates: stats.window_updates,
            window_risk_flagged: stats.window_risk_flagged,
        };
        set_return_data(
            &report
                .try_to_vec()
                .map_err(|_| ProgramError::InvalidAccountData)?,
        );
        Ok(())
    }

    fn process_set_degraded_mode(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        enabled: bool,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let emergency_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;
        let dependent_infos = account_info_iter.as_slice();

        let mut guard = GuardState::load(guard_info, program_id)?;
        let mut oracle_state = OracleState::load(oracle_info, program_id)?;
        let clock = Clock::get()?;

        DepositGuardEngine::set_degraded_mode(
            &mut guard,
            &mut oracle_state.oracle,
            emergency_info.key,
            enabled,
            clock.unix_timestamp,
        )?;
        guard.store(guard_info)?;
        oracle_state.store(oracle_info)?;

        // Repeating the call re-delivers to dependents that missed it
        let mut listeners =
            DependentFlagAccount::resolve(&guard.dependents, dependent_infos, program_id);
        let report = broadcast(&mut listeners, enabled, clock.unix_timestamp);
        if !report.all_delivered() {
            msg!("{} dependents not notified", report.failed.len());
        }
        Ok(())
    }

    fn process_update_guard_parameter(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        parameter: GuardParameter,
        value: u64,
    ) -> ProgramResult {
        Self::process_guard_admin(program_id, accounts, |guard, caller, _| {
            let old_value = DepositGuardEngine::set_guard_parameter(guard, caller, parameter, value)?;
            msg!("{} updated: {} -> {}", parameter.name(), old_value, value);
            Ok(())
        })
    }

    fn process_update_oracle_parameter(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        parameter: OracleParameter,
        value: u64,
    ) -> ProgramResult {
        Self::process_oracle_admin(program_id, accounts, |guard, oracle, caller, _| {
            let old_value =
                DepositGuardEngine::set_oracle_parameter(guard, oracle, caller, parameter, value)?;
            msg!("{} updated: {} -> {}", parameter.name(), old_value, value);
            Ok(())
        })
    }

    fn process_set_capabilities(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        capabilities: Capabilities,
    ) -> ProgramResult {
        Self::process_guard_admin(program_id, accounts, |guard, caller, _| {
            DepositGuardEngine::set_capabilities(guard, caller, capabilities)
        })
    }

    fn process_role_change(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        role: Role,
        member: Pubkey,
        grant: bool,
    ) -> ProgramResult {
        Self::process_guard_admin(program_id, accounts, |guard, caller, _| {
            let changed = if grant {
                DepositGuardEngine::grant_role(guard, caller, role, member)?
            } else {
                DepositGuardEngine::revoke_role(guard, caller, role, member)?
            };
            if !changed {
                msg!("Role {:?} for {} unchanged", role, member);
            }
            Ok(())
        })
    }

    fn process_register_dependent(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        component: Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let governance_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let flag_info = next_account_info(account_info_iter)?;
        let system_program = next_account_info(account_info_iter)?;
        let rent = &Rent::from_account_info(next_account_info(account_info_iter)?)?;

        let mut guard = GuardState::load(guard_info, program_id)?;
        let clock = Clock::get()?;

        DepositGuardEngine::register_dependent(&mut guard, governance_info.key, component)?;

        let bump = verify_pda(flag_info, &[DEPENDENT_SEED, component.as_ref()], program_id)?;
        if flag_info.data_is_empty() {
            create_pda_account(
                governance_info,
                flag_info,
                system_program,
                rent,
                DependentFlag::LEN,
                &[DEPENDENT_SEED, component.as_ref(), &[bump]],
                program_id,
            )?;
        }
        DependentFlag::new(
            component,
            bump,
            guard.emergency.degraded_mode,
            clock.unix_timestamp,
        )
        .store(flag_info)?;
        guard.store(guard_info)?;

        msg!("Dependent {} registered", component);
        Ok(())
    }

    /// Signer, guard; the guard is written back on success.
    fn process_guard_admin<F>(program_id: &Pubkey, accounts: &[AccountInfo], apply: F) -> ProgramResult
    where
        F: FnOnce(&mut GuardState, &Pubkey, i64) -> ProgramResult,
    {
        let account_info_iter = &mut accounts.iter();
        let caller_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;

        let mut guard = GuardState::load(guard_info, program_id)?;
        let clock = Clock::get()?;

        apply(&mut guard, caller_info.key, clock.unix_timestamp)?;
        guard.store(guard_info)
    }

    /// Signer, guard, oracle; the oracle is written back on success.
    fn process_oracle_admin<F>(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        apply: F,
    ) -> ProgramResult
    where
        F: FnOnce(&GuardState, &mut TwapOracle, &Pubkey, i64) -> ProgramResult,
    {
        let account_info_iter = &mut accounts.iter();
        let caller_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;

        let guard = GuardState::load(guard_info, program_id)?;
        let mut oracle_state = OracleState::load(oracle_info, program_id)?;
        let clock = Clock::get()?;

        apply(&guard, &mut oracle_state.oracle, caller_info.key, clock.unix_timestamp)?;
        oracle_state.store(oracle_info)
    }

    /// Signer, guard, user guard; the user guard is written back on success.
    fn process_user_admin<F>(program_id: &Pubkey, accounts: &[AccountInfo], apply: F) -> ProgramResult
    where
        F: FnOnce(&GuardState, &mut UserGuardAccount, &Pubkey) -> ProgramResult,
    {
        let account_info_iter = &mut accounts.iter();
        let caller_info = next_signer(account_info_iter)?;
        let guard_info = next_account_info(account_info_iter)?;
        let user_guard_info = next_account_info(account_info_iter)?;

        let guard = GuardState::load(guard_info, program_id)?;
        let mut user = UserGuardAccount::load(user_guard_info, program_id)?;

        apply(&guard, &mut user, caller_info.key)?;
        user.store(user_guard_info)
    }
}

fn next_signer<'a, 'info, I>(iter: &mut I) -> Result<&'a AccountInfo<'info>, ProgramError>
where
    I: Iterator<Item = &'a AccountInfo<'info>>,
    'info: 'a,
{
    let account = next_account_info(iter)?;
    if !account.is_signer {
        msg!("{} must sign", account.key);
        return Err(ProgramError::MissingRequiredSignature);
    }
    Ok(account)
}

/// User guard bound to `user`: the account must sit at the user's PDA and
/// carry the same user key.
fn load_user_guard(
    user_info: &AccountInfo,
    user_guard_info: &AccountInfo,
    program_id: &Pubkey,
) -> Result<UserGuardAccount, ProgramError> {
    verify_pda(
        user_guard_info,
        &[USER_GUARD_SEED, user_info.key.as_ref()],
        program_id,
    )?;
    let user = UserGuardAccount::load(user_guard_info, program_id)?;
    user.ensure_user(user_info.key)?;
    Ok(user)
}

/// Guard, oracle, user and user guard for the read only deposit checks. A
/// user whose PDA is not created yet is checked against a fresh profile.
fn load_deposit_accounts(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
) -> Result<(GuardState, OracleState, UserGuardAccount), ProgramError> {
    let account_info_iter = &mut accounts.iter();
    let guard_info = next_account_info(account_info_iter)?;
    let oracle_info = next_account_info(account_info_iter)?;
    let user_info = next_account_info(account_info_iter)?;
    let user_guard_info = next_account_info(account_info_iter)?;

    let guard = GuardState::load(guard_info, program_id)?;
    let oracle_state = OracleState::load(oracle_info, program_id)?;
    let user = if user_guard_info.data_is_empty() {
        let bump = verify_pda(
            user_guard_info,
            &[USER_GUARD_SEED, user_info.key.as_ref()],
            program_id,
        )?;
        UserGuardAccount::new(*user_info.key, bump)
    } else {
        load_user_guard(user_info, user_guard_info, program_id)?
    };

    Ok((guard, oracle_state, user))
}

/// Advisory verdict; accounts that fail to load are reported as a rejection
/// rather than an error.
fn deposit_eligibility(
    loaded: Result<(GuardState, OracleState, UserGuardAccount), ProgramError>,
    amount: u64,
    clock: &Clock,
) -> DepositEligibility {
    match loaded {
        Ok((guard, oracle_state, user)) => {
            let (allowed, reason) = DepositGuardEngine::can_user_deposit(
                &guard,
                &oracle_state.oracle,
                &user,
                amount,
                clock,
            );
            DepositEligibility { allowed, reason }
        }
        Err(error) => DepositEligibility {
            allowed: false,
            reason: rejection_reason(&error),
        },
    }
}

fn create_pda_account<'info>(
    payer: &AccountInfo<'info>,
    account: &AccountInfo<'info>,
    system_program: &AccountInfo<'info>,
    rent: &Rent,
    space: usize,
    signer_seeds: &[&[u8]],
    program_id: &Pubkey,
) -> ProgramResult {
    invoke_signed(
        &system_instruction::create_account(
            payer.key,
            account.key,
            rent.minimum_balance(space),
            space as u64,
            program_id,
        ),
        &[payer.clone(), account.clone(), system_program.clone()],
        &[signer_seeds],
    )
}
