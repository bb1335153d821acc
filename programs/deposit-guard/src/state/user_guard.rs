use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError, pubkey::Pubkey};

use crate::{
    error::DepositGuardError,
    guard::{MevState, RiskProfile},
    state::AccountState,
};

/// Per-user MEV and risk state, created on first interaction
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserGuardAccount {
    pub discriminator: [u8; 8],
    pub is_initialized: bool,
    pub bump: u8,
    pub user: Pubkey,
    pub mev: MevState,
    pub risk: RiskProfile,
}

impl AccountState for UserGuardAccount {
    const DISCRIMINATOR: [u8; 8] = *b"DGUSER__";
    const LEN: usize = 8 + 1 + 1 + 32 + MevState::LEN + RiskProfile::LEN;

    fn discriminator(&self) -> [u8; 8] {
        self.discriminator
    }

    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl UserGuardAccount {
    pub fn new(user: Pubkey, bump: u8) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            bump,
            user,
            mev: MevState::default(),
            risk: RiskProfile::default(),
        }
    }

    pub fn ensure_user(&self, user: &Pubkey) -> Result<(), ProgramError> {
        if self.user != *user {
            msg!("User account belongs to {}, not {}", self.user, user);
            return Err(DepositGuardError::UserMismatch.into());
        }
        Ok(())
    }
}
