use deposit_guard::{
    adapters::{PriceFeed, PriceSnapshot},
    auth::Role,
    constants::ACCUMULATOR_TO_PRICE,
    engine::GuardParameter,
    guard::{MevConfig, RiskConfig},
    instruction::{self, CircuitBreakerParams, DepositGuardInstruction},
    oracle::{OracleConfig, OracleStatus, PriceValidationState},
    state::{AccountState, DependentFlag, GuardConfig, GuardState, OracleState, UserGuardAccount},
};
use solana_program::{
    clock::Clock,
    instruction::{AccountMeta, Instruction, InstructionError},
    program_option::COption,
    program_pack::Pack,
    pubkey::Pubkey,
};
use solana_program_test::*;
use solana_sdk::{
    account::Account,
    compute_budget::ComputeBudgetInstruction,
    signature::{Keypair, Signer},
    transaction::{Transaction, TransactionError},
};

const PRICE: u64 = 1_000_000;
const SUPPLY: u64 = 10_000_000_000_000;
const START_SLOT: u64 = 1_000;
const START_TIME: i64 = 1_700_000_000;

struct TestEnv {
    context: ProgramTestContext,
    program_id: Pubkey,
    feed: Pubkey,
    mint: Pubkey,
    nonce: u32,
}

fn feed_account(timestamp: i64, price: u64) -> Account {
    let snapshot = PriceSnapshot {
        cumulative_price_a: price as u128 * ACCUMULATOR_TO_PRICE * timestamp as u128,
        cumulative_price_b: 0,
        reserve_a: 1_000_000_000_000,
        reserve_b: 1_000_000_000_000,
        base_decimals: 6,
        timestamp,
    };

    Account {
        lamports: 1_000_000_000,
        data: PriceFeed::from_snapshot(&snapshot).to_bytes(),
        owner: Pubkey::new_unique(),
        executable: false,
        rent_epoch: 0,
    }
}

fn mint_account() -> Account {
    let mut data = vec![0u8; spl_token::state::Mint::LEN];
    spl_token::state::Mint {
        mint_authority: COption::None,
        supply: SUPPLY,
        decimals: 6,
        is_initialized: true,
        freeze_authority: COption::None,
    }
    .pack_into_slice(&mut data);

    Account {
        lamports: 1_000_000_000,
        data,
        owner: spl_token::id(),
        executable: false,
        rent_epoch: 0,
    }
}

fn breaker_params() -> CircuitBreakerParams {
    CircuitBreakerParams {
        volume_threshold: 100_000,
        window_duration: 3_600,
        cooldown_period: 600,
    }
}

impl TestEnv {
    async fn start() -> Self {
        let mut env = Self::launch().await;
        env.initialize(breaker_params()).await.unwrap();
        env
    }

    /// Program loaded with price sources, guard not initialized yet.
    async fn launch() -> Self {
        let program_id = deposit_guard::id();
        let mut program_test = ProgramTest::new(
            "deposit_guard",
            program_id,
            processor!(deposit_guard::process),
        );

        let feed = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        program_test.add_account(feed, feed_account(START_TIME, PRICE));
        program_test.add_account(mint, mint_account());

        let context = program_test.start_with_context().await;
        let mut env = Self {
            context,
            program_id,
            feed,
            mint,
            nonce: 0,
        };
        env.set_clock(START_SLOT, START_TIME).await;
        env
    }

    async fn initialize(&mut self, breaker: CircuitBreakerParams) -> Result<(), BanksClientError> {
        let guard_config = GuardConfig {
            mev: MevConfig {
                min_interval_slots: 5,
                max_per_block: 1_000_000,
                max_per_user: 1_000_000,
                daily_window: 86_400,
            },
            risk: RiskConfig::default(),
        };
        let oracle_config = OracleConfig {
            min_liquidity: 1_000,
            ..OracleConfig::default()
        };
        let authority = self.authority();
        let init = instruction::initialize(
            &self.program_id,
            &authority,
            &self.feed,
            &self.mint,
            guard_config,
            breaker,
            oracle_config,
            PriceValidationState::default(),
            777_000,
        );
        self.send(&[init], &[]).await
    }

    fn authority(&self) -> Pubkey {
        self.context.payer.pubkey()
    }

    async fn set_clock(&mut self, slot: u64, unix_timestamp: i64) {
        let mut clock: Clock = self.context.banks_client.get_sysvar().await.unwrap();
        clock.slot = slot;
        clock.unix_timestamp = unix_timestamp;
        self.context.set_sysvar(&clock);
    }

    /// Each transaction gets a distinct compute limit so repeated
    /// instructions never collide on signature.
    async fn send(
        &mut self,
        instructions: &[Instruction],
        extra_signers: &[&Keypair],
    ) -> Result<(), BanksClientError> {
        self.nonce += 1;
        let mut all = vec![ComputeBudgetInstruction::set_compute_unit_limit(
            1_000_000 - self.nonce,
        )];
        all.extend_from_slice(instructions);

        let mut signers = vec![&self.context.payer];
        signers.extend_from_slice(extra_signers);
        let transaction = Transaction::new_signed_with_payer(
            &all,
            Some(&self.context.payer.pubkey()),
            &signers,
            self.context.last_blockhash,
        );
        self.context.banks_client.process_transaction(transaction).await
    }

    fn set_feed(&mut self, timestamp: i64, price: u64) {
        self.context
            .set_account(&self.feed, &feed_account(timestamp, price).into());
    }

    async fn update_price_at(&mut self, slot: u64, timestamp: i64) -> Result<(), BanksClientError> {
        self.set_clock(slot, timestamp).await;
        self.set_feed(timestamp, PRICE);
        let authority = self.authority();
        let ix = instruction::update_price(&self.program_id, &authority, &self.feed, &self.mint);
        self.send(&[ix], &[]).await
    }

    /// Three spaced updates; the oracle is healthy at `START_TIME + 300`.
    async fn bootstrap_oracle(&mut self) {
        for step in 1..=3u64 {
            self.update_price_at(START_SLOT + step * 200, START_TIME + step as i64 * 100)
                .await
                .unwrap();
        }
    }

    async fn approve(&mut self, user: &Pubkey, amount: u64) -> Result<(), BanksClientError> {
        let authority = self.authority();
        let ix = instruction::approve_deposit(&self.program_id, &authority, user, amount);
        self.send(&[ix], &[]).await
    }

    async fn create_user(&mut self) -> Pubkey {
        let user = Pubkey::new_unique();
        let authority = self.authority();
        let ix = instruction::initialize_user(&self.program_id, &authority, &user);
        self.send(&[ix], &[]).await.unwrap();
        user
    }

    async fn load<T: AccountState>(&mut self, address: Pubkey) -> T {
        let account = self
            .context
            .banks_client
            .get_account(address)
            .await
            .unwrap()
            .expect("account exists");
        T::unpack_unchecked(&account.data).unwrap()
    }

    async fn guard(&mut self) -> GuardState {
        let (guard, _) = instruction::guard_address(&self.program_id);
        self.load(guard).await
    }

    async fn oracle(&mut self) -> OracleState {
        let (guard, _) = instruction::guard_address(&self.program_id);
        let (oracle, _) = instruction::oracle_address(&guard, &self.program_id);
        self.load(oracle).await
    }
}

fn custom_error(error: BanksClientError) -> u32 {
    match error.unwrap() {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => code,
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_initialize_and_bootstrap_oracle() {
    let mut env = TestEnv::start().await;
    let authority = env.authority();

    let guard = env.guard().await;
    assert!(guard.is_initialized);
    assert_eq!(guard.circuit_breaker.volume_threshold, 100_000);
    assert_eq!(guard.roles.members(Role::Governance).next(), Some(&authority));

    env.update_price_at(START_SLOT + 200, START_TIME + 100).await.unwrap();
    env.update_price_at(START_SLOT + 400, START_TIME + 200).await.unwrap();
    let oracle = env.oracle().await;
    assert_eq!(oracle.oracle.status(START_TIME + 200), OracleStatus::Bootstrapping);
    assert_eq!(oracle.oracle.get_current_price(START_TIME + 200).unwrap(), 777_000);

    env.update_price_at(START_SLOT + 600, START_TIME + 300).await.unwrap();
    let oracle = env.oracle().await;
    assert_eq!(oracle.oracle.status(START_TIME + 300), OracleStatus::Healthy);
    assert_eq!(oracle.oracle.validation.last_validated_price, PRICE);
    assert_eq!(oracle.oracle.cached_market_cap, SUPPLY);
    assert_eq!(oracle.price_feed, env.feed);
}

#[tokio::test]
async fn test_circuit_breaker_halts_deposits() {
    let mut env = TestEnv::start().await;
    env.bootstrap_oracle().await;
    let user = env.create_user().await;

    env.set_clock(START_SLOT + 1_000, START_TIME + 310).await;
    env.approve(&user, 60_000).await.unwrap();

    env.set_clock(START_SLOT + 1_010, START_TIME + 320).await;
    env.approve(&user, 50_000).await.unwrap();

    let guard = env.guard().await;
    assert!(guard.circuit_breaker.triggered);
    assert_eq!(guard.circuit_breaker.current_volume(), 110_000);
    assert_eq!(guard.total_deposits, 2);

    env.set_clock(START_SLOT + 1_020, START_TIME + 330).await;
    let error = env.approve(&user, 1).await.unwrap_err();
    assert_eq!(custom_error(error), 13);

    // Governance reset reopens deposits
    let authority = env.authority();
    let reset = instruction::guard_admin(
        &env.program_id,
        &authority,
        DepositGuardInstruction::ResetCircuitBreaker,
    );
    env.send(&[reset], &[]).await.unwrap();
    env.approve(&user, 1).await.unwrap();

    let guard = env.guard().await;
    assert_eq!(guard.circuit_breaker.trigger_count, 1);
    assert_eq!(guard.circuit_breaker.current_volume(), 1);
}

#[tokio::test]
async fn test_rapid_second_deposit_rejected() {
    let mut env = TestEnv::start().await;
    env.bootstrap_oracle().await;
    let user = env.create_user().await;

    env.set_clock(START_SLOT + 1_000, START_TIME + 310).await;
    env.approve(&user, 100).await.unwrap();

    env.set_clock(START_SLOT + 1_002, START_TIME + 311).await;
    let error = env.approve(&user, 100).await.unwrap_err();
    assert_eq!(custom_error(error), 10);

    let (user_guard, _) = instruction::user_guard_address(&user, &env.program_id);
    let account: UserGuardAccount = env.load(user_guard).await;
    assert_eq!(account.mev.last_action_slot, Some(START_SLOT + 1_000));
    assert_eq!(account.risk.total_transactions, 1);
}

#[tokio::test]
async fn test_deposits_rejected_until_oracle_healthy() {
    let mut env = TestEnv::start().await;
    let user = env.create_user().await;

    env.set_clock(START_SLOT + 10, START_TIME + 10).await;
    let error = env.approve(&user, 100).await.unwrap_err();
    assert_eq!(custom_error(error), 19);
}

#[tokio::test]
async fn test_price_update_requires_role() {
    let mut env = TestEnv::start().await;
    let outsider = Keypair::new();

    env.set_clock(START_SLOT + 200, START_TIME + 100).await;
    let ix = instruction::update_price(&env.program_id, &outsider.pubkey(), &env.feed, &env.mint);
    let error = env.send(&[ix], &[&outsider]).await.unwrap_err();
    assert_eq!(custom_error(error), 5);

    // Granting the role lets the same key update
    let authority = env.authority();
    let grant = instruction::guard_admin(
        &env.program_id,
        &authority,
        DepositGuardInstruction::GrantRole {
            role: Role::PriceUpdater,
            member: outsider.pubkey(),
        },
    );
    env.send(&[grant], &[]).await.unwrap();

    let ix = instruction::update_price(&env.program_id, &outsider.pubkey(), &env.feed, &env.mint);
    env.send(&[ix], &[&outsider]).await.unwrap();
    assert_eq!(env.oracle().await.oracle.total_updates, 1);
}

#[tokio::test]
async fn test_flash_loan_pattern_rejected() {
    let mut env = TestEnv::start().await;

    // Three updates fit in one 150 slot period, a fourth does not
    for step in 0..3u64 {
        env.update_price_at(START_SLOT + 1_050 + step, START_TIME + 100 * (step as i64 + 1))
            .await
            .unwrap();
    }
    let error = env
        .update_price_at(START_SLOT + 1_053, START_TIME + 400)
        .await
        .unwrap_err();
    assert_eq!(custom_error(error), 15);
    assert_eq!(env.oracle().await.oracle.total_updates, 3);

    // Next period is accepted
    env.update_price_at(START_SLOT + 1_200, START_TIME + 500).await.unwrap();
}

#[tokio::test]
async fn test_degraded_mode_notifies_dependents() {
    let mut env = TestEnv::start().await;
    env.bootstrap_oracle().await;
    let user = env.create_user().await;
    let authority = env.authority();
    let component = Pubkey::new_unique();

    let register = instruction::register_dependent(&env.program_id, &authority, &component);
    env.send(&[register], &[]).await.unwrap();
    assert_eq!(env.guard().await.dependents, vec![component]);

    let degrade = instruction::set_degraded_mode(&env.program_id, &authority, &[component], true);
    env.send(&[degrade], &[]).await.unwrap();

    let (flag_address, _) = instruction::dependent_address(&component, &env.program_id);
    let flag: DependentFlag = env.load(flag_address).await;
    assert!(flag.degraded_mode);
    assert_eq!(flag.notification_count, 1);
    assert!(env.oracle().await.oracle.emergency_mode);

    env.set_clock(START_SLOT + 1_000, START_TIME + 310).await;
    let error = env.approve(&user, 100).await.unwrap_err();
    assert_eq!(custom_error(error), 18);

    // Missing dependent account does not fail the toggle
    let restore = instruction::set_degraded_mode(&env.program_id, &authority, &[], false);
    env.send(&[restore], &[]).await.unwrap();
    let flag: DependentFlag = env.load(flag_address).await;
    assert!(flag.degraded_mode);
    assert!(!env.guard().await.emergency.degraded_mode);

    env.approve(&user, 100).await.unwrap();
}

#[tokio::test]
async fn test_parameter_update_validated() {
    let mut env = TestEnv::start().await;
    let authority = env.authority();

    let update = instruction::guard_admin(
        &env.program_id,
        &authority,
        DepositGuardInstruction::UpdateGuardParameter {
            parameter: GuardParameter::MaxPerUser,
            value: 5_000,
        },
    );
    env.send(&[update], &[]).await.unwrap();
    assert_eq!(env.guard().await.config.mev.max_per_user, 5_000);

    let invalid = instruction::guard_admin(
        &env.program_id,
        &authority,
        DepositGuardInstruction::UpdateGuardParameter {
            parameter: GuardParameter::MinIntervalSlots,
            value: 0,
        },
    );
    let error = env.send(&[invalid], &[]).await.unwrap_err();
    assert_eq!(custom_error(error), 6);
    assert_eq!(env.guard().await.config.mev.min_interval_slots, 5);
}

/// Deposit check whose user guard slot holds an arbitrary account.
fn deposit_check_with(program_id: &Pubkey, user: &Pubkey, user_guard: Pubkey) -> Instruction {
    let (guard, _) = instruction::guard_address(program_id);
    let (oracle, _) = instruction::oracle_address(&guard, program_id);
    Instruction::new_with_borsh(
        *program_id,
        &DepositGuardInstruction::PreDepositCheck { amount: 100 },
        vec![
            AccountMeta::new_readonly(guard, false),
            AccountMeta::new_readonly(oracle, false),
            AccountMeta::new_readonly(*user, false),
            AccountMeta::new_readonly(user_guard, false),
        ],
    )
}

#[tokio::test]
async fn test_user_guard_bound_to_user() {
    let mut env = TestEnv::start().await;
    env.bootstrap_oracle().await;
    let flagged = env.create_user().await;
    let clean = env.create_user().await;
    let authority = env.authority();

    let flag = instruction::user_admin(
        &env.program_id,
        &authority,
        &flagged,
        DepositGuardInstruction::SetUserFlagged { flagged: true },
    );
    env.send(&[flag], &[]).await.unwrap();

    env.set_clock(START_SLOT + 1_000, START_TIME + 310).await;
    let check = instruction::pre_deposit_check(&env.program_id, &flagged, 100);
    let error = env.send(&[check], &[]).await.unwrap_err();
    assert_eq!(custom_error(error), 17);

    // Neither another user's profile nor a blank account stands in for it
    let (clean_guard, _) = instruction::user_guard_address(&clean, &env.program_id);
    let foreign = deposit_check_with(&env.program_id, &flagged, clean_guard);
    let error = env.send(&[foreign], &[]).await.unwrap_err();
    assert_eq!(custom_error(error), 4);

    let blank = deposit_check_with(&env.program_id, &flagged, Pubkey::new_unique());
    let error = env.send(&[blank], &[]).await.unwrap_err();
    assert_eq!(custom_error(error), 4);

    let mut approve = instruction::approve_deposit(&env.program_id, &authority, &flagged, 100);
    approve.accounts[4].pubkey = clean_guard;
    let error = env.send(&[approve], &[]).await.unwrap_err();
    assert_eq!(custom_error(error), 4);

    let mut post = instruction::post_deposit_update(&env.program_id, &authority, &flagged, 100);
    post.accounts[3].pubkey = clean_guard;
    let error = env.send(&[post], &[]).await.unwrap_err();
    assert_eq!(custom_error(error), 4);

    let (flagged_guard, _) = instruction::user_guard_address(&flagged, &env.program_id);
    let account: UserGuardAccount = env.load(flagged_guard).await;
    assert!(account.risk.flagged);
    let account: UserGuardAccount = env.load(clean_guard).await;
    assert_eq!(account.risk.total_transactions, 0);

    // A user with no profile yet is checked under their own key
    let newcomer = Pubkey::new_unique();
    let check = instruction::pre_deposit_check(&env.program_id, &newcomer, 100);
    env.send(&[check], &[]).await.unwrap();
}

#[tokio::test]
async fn test_advisory_check_reports_bad_accounts() {
    let mut env = TestEnv::start().await;
    env.bootstrap_oracle().await;
    let user = env.create_user().await;
    let other = env.create_user().await;

    env.set_clock(START_SLOT + 1_000, START_TIME + 310).await;
    let mut query = instruction::can_user_deposit(&env.program_id, &user, 100);
    let (other_guard, _) = instruction::user_guard_address(&other, &env.program_id);
    query.accounts[3].pubkey = other_guard;
    env.send(&[query], &[]).await.unwrap();

    // The same accounts fail the enforcing check
    let check = deposit_check_with(&env.program_id, &user, other_guard);
    let error = env.send(&[check], &[]).await.unwrap_err();
    assert_eq!(custom_error(error), 4);
}

#[tokio::test]
async fn test_initialize_validates_guard() {
    let mut env = TestEnv::launch().await;

    let error = env
        .initialize(CircuitBreakerParams {
            cooldown_period: 0,
            ..breaker_params()
        })
        .await
        .unwrap_err();
    assert_eq!(custom_error(error), 6);

    let (guard, _) = instruction::guard_address(&env.program_id);
    let account = env.context.banks_client.get_account(guard).await.unwrap();
    assert!(account.is_none());

    env.initialize(breaker_params()).await.unwrap();
    assert!(env.guard().await.is_initialized);

    let error = env.initialize(breaker_params()).await.unwrap_err();
    assert_eq!(custom_error(error), 2);
}
