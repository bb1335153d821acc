pub mod dependent;
pub mod guard_state;
pub mod oracle_state;
pub mod user_guard;

pub use dependent::*;
pub use guard_state::*;
pub use oracle_state::*;
pub use user_guard::*;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    msg,
    program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::error::DepositGuardError;

/// Program owned account with a discriminator and initialized flag
pub trait AccountState: BorshSerialize + BorshDeserialize {
    const DISCRIMINATOR: [u8; 8];
    const LEN: usize;

    fn discriminator(&self) -> [u8; 8];
    fn is_initialized(&self) -> bool;

    /// Account buffers are sized for the largest state, so trailing bytes
    /// are ignored.
    fn unpack_unchecked(data: &[u8]) -> Result<Self, ProgramError> {
        let mut cursor: &[u8] = data;
        Self::deserialize(&mut cursor).map_err(|_| DepositGuardError::InvalidAccountData.into())
    }

    fn load(account: &AccountInfo, program_id: &Pubkey) -> Result<Self, ProgramError> {
        if account.owner != program_id {
            msg!("Account {} not owned by this program", account.key);
            return Err(ProgramError::IncorrectProgramId);
        }

        let state = Self::unpack_unchecked(&account.try_borrow_data()?)?;
        if state.discriminator() != Self::DISCRIMINATOR {
            return Err(DepositGuardError::InvalidAccountData.into());
        }
        if !state.is_initialized() {
            return Err(DepositGuardError::NotInitialized.into());
        }
        Ok(state)
    }

    fn store(&self, account: &AccountInfo) -> ProgramResult {
        let mut data = account.try_borrow_mut_data()?;
        self.serialize(&mut &mut data[..])
            .map_err(|_| DepositGuardError::InvalidAccountData.into())
    }
}

/// Verify `account` is the PDA for `seeds`, returning its bump.
pub fn verify_pda(
    account: &AccountInfo,
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<u8, ProgramError> {
    let (expected, bump) = Pubkey::find_program_address(seeds, program_id);
    if expected != *account.key {
        msg!("Expected PDA {}, got {}", expected, account.key);
        return Err(DepositGuardError::InvalidPda.into());
    }
    Ok(bump)
}
