use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use solana_program::{
    decode_error::DecodeError,
    program_error::{PrintProgramError, ProgramError},
};
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, FromPrimitive, PartialEq, Eq)]
pub enum DepositGuardError {
    #[error("Invalid instruction")]
    InvalidInstruction = 0,

    #[error("Account not initialized")]
    NotInitialized = 1,

    #[error("Account already initialized")]
    AlreadyInitialized = 2,

    #[error("Invalid account data")]
    InvalidAccountData = 3,

    #[error("Invalid PDA")]
    InvalidPda = 4,

    #[error("Caller is missing the required role")]
    Unauthorized = 5,

    #[error("Invalid configuration")]
    InvalidConfiguration = 6,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow = 7,

    #[error("Division by zero")]
    DivisionByZero = 8,

    #[error("Deposit amount must be positive")]
    ZeroAmount = 9,

    #[error("Deposit too frequent: minimum slot interval not reached")]
    DepositTooFrequent = 10,

    #[error("Block volume exceeded")]
    BlockVolumeExceeded = 11,

    #[error("User daily limit exceeded")]
    UserDailyLimitExceeded = 12,

    #[error("Circuit breaker active: deposits halted until cooldown elapses")]
    CircuitBreakerActive = 13,

    #[error("Re-entrant circuit breaker update")]
    ReentrantCall = 14,

    #[error("Too many oracle updates in the current period")]
    TooManyUpdatesPerPeriod = 15,

    #[error("High risk user")]
    HighRiskUser = 16,

    #[error("Suspicious activity")]
    SuspiciousActivity = 17,

    #[error("Emergency degraded mode active")]
    EmergencyModeActive = 18,

    #[error("Oracle unhealthy")]
    OracleUnhealthy = 19,

    #[error("Oracle update too frequent")]
    UpdateTooFrequent = 20,

    #[error("Insufficient liquidity depth")]
    InsufficientLiquidity = 21,

    #[error("Observation out of order")]
    ObservationOutOfOrder = 22,

    #[error("Price change too large")]
    PriceChangeTooLarge = 23,

    #[error("Price impact too high")]
    PriceImpactTooHigh = 24,

    #[error("Market cap growth too high")]
    MarketCapGrowthTooHigh = 25,

    #[error("Market cap limit exceeded")]
    MarketCapLimitExceeded = 26,

    #[error("Invalid price")]
    InvalidPrice = 27,

    #[error("Risk score out of range")]
    InvalidRiskScore = 28,

    #[error("Role registry full")]
    RoleCapacityExceeded = 29,

    #[error("Dependent registry full")]
    DependentCapacityExceeded = 30,

    #[error("Invalid observation index")]
    InvalidObservationIndex = 31,

    #[error("Invalid price feed account")]
    InvalidPriceFeed = 32,

    #[error("Invalid supply mint account")]
    InvalidMint = 33,

    #[error("User account does not belong to this user")]
    UserMismatch = 34,

    #[error("Dependent account missing")]
    MissingDependentAccount = 35,
}

impl DepositGuardError {
    /// Recover the guard error behind a `ProgramError::Custom` code.
    pub fn from_program_error(error: &ProgramError) -> Option<Self> {
        match error {
            ProgramError::Custom(code) => Self::from_u32(*code),
            _ => None,
        }
    }
}

impl PrintProgramError for DepositGuardError {
    fn print<E>(&self) {
        use solana_program::msg;
        msg!("DepositGuardError: {}", self);
    }
}

impl From<DepositGuardError> for ProgramError {
    fn from(e: DepositGuardError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for DepositGuardError {
    fn type_of() -> &'static str {
        "DepositGuardError"
    }
}

/// Human readable reason for a rejected request.
pub fn rejection_reason(error: &ProgramError) -> String {
    match DepositGuardError::from_program_error(error) {
        Some(guard_error) => guard_error.to_string(),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_code_round_trip() {
        let error: ProgramError = DepositGuardError::CircuitBreakerActive.into();
        assert_eq!(error, ProgramError::Custom(13));
        assert_eq!(
            DepositGuardError::from_program_error(&error),
            Some(DepositGuardError::CircuitBreakerActive)
        );
        assert!(rejection_reason(&error).starts_with("Circuit breaker"));
    }

    #[test]
    fn test_non_custom_errors_have_reason() {
        let error = ProgramError::MissingRequiredSignature;
        assert_eq!(DepositGuardError::from_program_error(&error), None);
        assert!(!rejection_reason(&error).is_empty());
    }
}
