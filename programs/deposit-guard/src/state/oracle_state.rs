use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::{oracle::TwapOracle, state::AccountState};

/// Oracle account, bound to one price feed and one supply mint
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct OracleState {
    pub discriminator: [u8; 8],
    pub is_initialized: bool,
    pub bump: u8,
    pub price_feed: Pubkey,
    pub supply_mint: Pubkey,
    pub oracle: TwapOracle,
}

impl AccountState for OracleState {
    const DISCRIMINATOR: [u8; 8] = *b"DGORACLE";
    const LEN: usize = 8 + 1 + 1 + 32 + 32 + TwapOracle::LEN;

    fn discriminator(&self) -> [u8; 8] {
        self.discriminator
    }

    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl OracleState {
    pub fn new(bump: u8, price_feed: Pubkey, supply_mint: Pubkey, oracle: TwapOracle) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            bump,
            price_feed,
            supply_mint,
            oracle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::{MAX_FLASH_LOAN_PERIODS, OBSERVATION_CAPACITY},
        guard::PeriodCounter,
        oracle::TwapObservation,
    };

    #[test]
    fn test_full_buffers_fit() {
        let mut oracle = TwapOracle::default();
        for i in 0..OBSERVATION_CAPACITY as i64 {
            oracle
                .observations
                .push(TwapObservation {
                    cumulative_price_a: i as u128,
                    cumulative_price_b: i as u128,
                    timestamp: i,
                    liquidity_snapshot: 1,
                    is_valid: true,
                })
                .unwrap();
        }
        oracle.flash_loan.buckets = (0..MAX_FLASH_LOAN_PERIODS as u64)
            .map(|period| PeriodCounter { period, count: 1 })
            .collect();

        let state = OracleState::new(7, Pubkey::new_unique(), Pubkey::new_unique(), oracle);
        let bytes = state.try_to_vec().unwrap();
        assert_eq!(bytes.len(), OracleState::LEN);

        let mut padded = bytes.clone();
        padded.resize(OracleState::LEN + 64, 0);
        assert_eq!(OracleState::unpack_unchecked(&padded).unwrap(), state);
    }
}
