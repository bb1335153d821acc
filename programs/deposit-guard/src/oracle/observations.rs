//! Fixed capacity ring buffer of TWAP observations
//!
//! Slots are read only through [`ObservationBuffer::oldest_valid`],
//! [`ObservationBuffer::newest_valid`] and the ring ordered iterator, so
//! callers never do index arithmetic themselves.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{msg, program_error::ProgramError};

use crate::{constants::OBSERVATION_CAPACITY, error::DepositGuardError};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwapObservation {
    /// Cumulative price of asset A in B (18 decimal wad seconds)
    pub cumulative_price_a: u128,
    /// Cumulative price of asset B in A (18 decimal wad seconds)
    pub cumulative_price_b: u128,
    pub timestamp: i64,
    /// Quote side reserve depth at sampling time
    pub liquidity_snapshot: u64,
    pub is_valid: bool,
}

impl TwapObservation {
    pub const LEN: usize = 16 + 16 + 8 + 8 + 1;
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationBuffer {
    observations: Vec<TwapObservation>,
    /// Slot the next observation is written to
    write_index: u16,
    valid_count: u16,
}

impl ObservationBuffer {
    pub const LEN: usize = 4 + OBSERVATION_CAPACITY * TwapObservation::LEN + 2 + 2;

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn valid_count(&self) -> u16 {
        self.valid_count
    }

    pub fn write_index(&self) -> u16 {
        self.write_index
    }

    pub fn get(&self, index: usize) -> Option<&TwapObservation> {
        self.observations.get(index)
    }

    /// Slot indices from oldest to newest
    fn ring_indices(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        let len = self.observations.len();
        let start = if len < OBSERVATION_CAPACITY {
            0
        } else {
            self.write_index as usize
        };
        (0..len).map(move |offset| (start + offset) % len)
    }

    /// Valid observations from oldest to newest
    pub fn iter_valid(&self) -> impl Iterator<Item = &TwapObservation> + '_ {
        self.ring_indices()
            .map(move |index| &self.observations[index])
            .filter(|observation| observation.is_valid)
    }

    pub fn oldest_valid(&self) -> Option<&TwapObservation> {
        self.iter_valid().next()
    }

    pub fn newest_valid(&self) -> Option<&TwapObservation> {
        self.ring_indices()
            .rev()
            .map(|index| &self.observations[index])
            .find(|observation| observation.is_valid)
    }

    /// Append an observation, overwriting the oldest slot once full.
    /// Returns the slot index written.
    pub fn push(&mut self, observation: TwapObservation) -> Result<u16, ProgramError> {
        if let Some(newest) = self.newest_valid() {
            if observation.timestamp <= newest.timestamp
                || observation.cumulative_price_a < newest.cumulative_price_a
                || observation.cumulative_price_b < newest.cumulative_price_b
            {
                msg!(
                    "Observation at {} does not follow newest valid observation at {}",
                    observation.timestamp,
                    newest.timestamp
                );
                return Err(DepositGuardError::ObservationOutOfOrder.into());
            }
        }

        let observation = TwapObservation {
            is_valid: true,
            ..observation
        };
        let index = self.write_index as usize;

        if self.observations.len() < OBSERVATION_CAPACITY {
            self.observations.push(observation);
        } else {
            if self.observations[index].is_valid {
                self.valid_count = self.valid_count.saturating_sub(1);
            }
            self.observations[index] = observation;
        }

        self.valid_count = self.valid_count.saturating_add(1);
        self.write_index = ((index + 1) % OBSERVATION_CAPACITY) as u16;

        Ok(index as u16)
    }

    /// Exclude an observation from TWAP derivation. Returns the new valid count.
    pub fn invalidate(&mut self, index: u16) -> Result<u16, ProgramError> {
        let observation = self
            .observations
            .get_mut(index as usize)
            .ok_or(DepositGuardError::InvalidObservationIndex)?;

        if !observation.is_valid {
            return Err(DepositGuardError::InvalidObservationIndex.into());
        }
        observation.is_valid = false;
        self.valid_count = self.valid_count.saturating_sub(1);

        Ok(self.valid_count)
    }
}
