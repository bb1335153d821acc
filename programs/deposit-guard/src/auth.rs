//! Role based authorization
//!
//! Every privileged operation consults an [`Authority`] before touching
//! state. The registry lives in the guard account, separate from the data it
//! protects.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    msg,
    program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::{constants::MAX_ROLE_ASSIGNMENTS, error::DepositGuardError};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Parameter changes, resets, role management
    Governance,
    /// Risk score and flag maintenance
    Monitor,
    /// Degraded mode toggling
    Emergency,
    /// Oracle price updates
    PriceUpdater,
    /// The bonding curve / deposit pipeline committing deposits
    DepositPipeline,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Governance,
        Role::Monitor,
        Role::Emergency,
        Role::PriceUpdater,
        Role::DepositPipeline,
    ];
}

pub trait Authority {
    fn has_role(&self, role: Role, caller: &Pubkey) -> bool;
}

pub fn require_role<A: Authority + ?Sized>(
    authority: &A,
    role: Role,
    caller: &Pubkey,
) -> Result<(), ProgramError> {
    if !authority.has_role(role, caller) {
        msg!("Caller {} is missing role {:?}", caller, role);
        return Err(DepositGuardError::Unauthorized.into());
    }
    Ok(())
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role: Role,
    pub member: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRegistry {
    pub assignments: Vec<RoleAssignment>,
}

impl RoleRegistry {
    pub const LEN: usize = 4 + MAX_ROLE_ASSIGNMENTS * (1 + 32);

    /// Bootstrap registry: the initializer holds every role until governance
    /// hands them out.
    pub fn new(initial_authority: Pubkey) -> Self {
        Self {
            assignments: Role::ALL
                .iter()
                .map(|role| RoleAssignment {
                    role: *role,
                    member: initial_authority,
                })
                .collect(),
        }
    }

    /// Returns false if the member already held the role.
    pub fn grant(&mut self, role: Role, member: Pubkey) -> Result<bool, ProgramError> {
        if self.has_role(role, &member) {
            return Ok(false);
        }
        if self.assignments.len() >= MAX_ROLE_ASSIGNMENTS {
            return Err(DepositGuardError::RoleCapacityExceeded.into());
        }
        self.assignments.push(RoleAssignment { role, member });
        Ok(true)
    }

    /// Returns false if the member did not hold the role. The last governance
    /// member cannot be removed.
    pub fn revoke(&mut self, role: Role, member: &Pubkey) -> Result<bool, ProgramError> {
        if !self.has_role(role, member) {
            return Ok(false);
        }
        if role == Role::Governance && self.members(Role::Governance).count() == 1 {
            msg!("Refusing to revoke the last governance member");
            return Err(DepositGuardError::InvalidConfiguration.into());
        }
        self.assignments
            .retain(|assignment| !(assignment.role == role && assignment.member == *member));
        Ok(true)
    }

    pub fn members(&self, role: Role) -> impl Iterator<Item = &Pubkey> + '_ {
        self.assignments
            .iter()
            .filter(move |assignment| assignment.role == role)
            .map(|assignment| &assignment.member)
    }
}

impl Authority for RoleRegistry {
    fn has_role(&self, role: Role, caller: &Pubkey) -> bool {
        self.assignments
            .iter()
            .any(|assignment| assignment.role == role && assignment.member == *caller)
    }
}
