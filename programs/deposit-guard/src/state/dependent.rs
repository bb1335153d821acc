use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::state::AccountState;

/// Emergency mirror read by a dependent component
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct DependentFlag {
    pub discriminator: [u8; 8],
    pub is_initialized: bool,
    pub bump: u8,
    pub component: Pubkey,
    pub degraded_mode: bool,
    pub updated_at: i64,
    pub notification_count: u64,
}

impl AccountState for DependentFlag {
    const DISCRIMINATOR: [u8; 8] = *b"DGDEPEND";
    const LEN: usize = 8 + 1 + 1 + 32 + 1 + 8 + 8;

    fn discriminator(&self) -> [u8; 8] {
        self.discriminator
    }

    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl DependentFlag {
    pub fn new(component: Pubkey, bump: u8, degraded_mode: bool, now: i64) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            bump,
            component,
            degraded_mode,
            updated_at: now,
            notification_count: 0,
        }
    }
}
