// Deposit Guard: deposit risk gatekeeper and TWAP oracle
// Native Solana implementation - NO ANCHOR

use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    pubkey::Pubkey,
};

pub mod adapters;
pub mod auth;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod instruction;
pub mod notify;
pub mod oracle;
pub mod processor;
pub mod state;
pub mod window;

use crate::processor::Processor;

// Declare program ID
solana_program::declare_id!("DepGuard11111111111111111111111111111111111");

#[cfg(not(feature = "no-entrypoint"))]
solana_program::entrypoint!(process);

pub fn process(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    Processor::process(program_id, accounts, instruction_data)
}
