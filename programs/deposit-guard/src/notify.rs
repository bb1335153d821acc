//! Degraded mode propagation to dependent components
//!
//! Each registered component receives the new mode independently; one
//! failing recipient is logged and reported without stopping the others.

use solana_program::{
    account_info::AccountInfo,
    msg,
    program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::{
    error::{rejection_reason, DepositGuardError},
    events::{DependentNotificationFailed, DependentNotified, Event},
    instruction::dependent_address,
    state::{AccountState, DependentFlag},
};

pub trait EmergencyListener {
    fn component(&self) -> Pubkey;

    fn on_degraded_mode(&mut self, enabled: bool, now: i64) -> Result<(), ProgramError>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub notified: Vec<Pubkey>,
    pub failed: Vec<(Pubkey, ProgramError)>,
}

impl NotificationReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn broadcast<L: EmergencyListener>(
    listeners: &mut [L],
    enabled: bool,
    now: i64,
) -> NotificationReport {
    let mut report = NotificationReport::default();

    for listener in listeners.iter_mut() {
        let component = listener.component();
        match listener.on_degraded_mode(enabled, now) {
            Ok(()) => {
                DependentNotified {
                    component,
                    degraded_mode: enabled,
                }
                .emit();
                report.notified.push(component);
            }
            Err(error) => {
                msg!("Failed to notify dependent {}: {}", component, error);
                DependentNotificationFailed {
                    component,
                    degraded_mode: enabled,
                    error_code: rejection_reason(&error),
                }
                .emit();
                report.failed.push((component, error));
            }
        }
    }

    msg!(
        "Degraded mode {} delivered to {} of {} dependents",
        enabled,
        report.notified.len(),
        listeners.len()
    );
    report
}

/// Listener backed by the component's flag PDA. The account may be missing
/// from the instruction, which counts as a failed delivery.
pub struct DependentFlagAccount<'a, 'info> {
    component: Pubkey,
    account: Option<&'a AccountInfo<'info>>,
    program_id: &'a Pubkey,
}

impl<'a, 'info> DependentFlagAccount<'a, 'info> {
    pub fn address(component: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
        dependent_address(component, program_id)
    }

    /// Match each registered component with its flag account among `candidates`
    pub fn resolve(
        components: &[Pubkey],
        candidates: &'a [AccountInfo<'info>],
        program_id: &'a Pubkey,
    ) -> Vec<Self> {
        components
            .iter()
            .map(|component| {
                let (address, _) = Self::address(component, program_id);
                Self {
                    component: *component,
                    account: candidates.iter().find(|account| *account.key == address),
                    program_id,
                }
            })
            .collect()
    }
}

impl EmergencyListener for DependentFlagAccount<'_, '_> {
    fn component(&self) -> Pubkey {
        self.component
    }

    fn on_degraded_mode(&mut self, enabled: bool, now: i64) -> Result<(), ProgramError> {
        let account = self
            .account
            .ok_or(DepositGuardError::MissingDependentAccount)?;
        if !account.is_writable {
            return Err(DepositGuardError::MissingDependentAccount.into());
        }

        let mut flag = DependentFlag::load(account, self.program_id)?;
        if flag.component != self.component {
            return Err(DepositGuardError::InvalidAccountData.into());
        }

        flag.degraded_mode = enabled;
        flag.updated_at = now;
        flag.notification_count = flag.notification_count.saturating_add(1);
        flag.store(account)
    }
}
