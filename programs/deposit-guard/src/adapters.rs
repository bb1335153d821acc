//! Read only adapters over the price feed and supply mint accounts

use bytemuck::{Pod, Zeroable};
use solana_program::{
    account_info::AccountInfo,
    msg,
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
};

use crate::error::DepositGuardError;

/// Pool state as of the start of an oracle update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub cumulative_price_a: u128,
    pub cumulative_price_b: u128,
    /// Base asset reserve, in base units
    pub reserve_a: u64,
    /// Quote asset reserve, 6 decimals
    pub reserve_b: u64,
    pub base_decimals: u8,
    pub timestamp: i64,
}

impl PriceSnapshot {
    /// Quote side depth
    pub fn liquidity(&self) -> u64 {
        self.reserve_b
    }

    /// Instantaneous price of one whole base token in quote units
    pub fn spot_price(&self) -> Result<u64, ProgramError> {
        if self.reserve_a == 0 {
            return Err(DepositGuardError::InsufficientLiquidity.into());
        }
        let scale = 10u128
            .checked_pow(self.base_decimals as u32)
            .ok_or(DepositGuardError::ArithmeticOverflow)?;
        let price = (self.reserve_b as u128)
            .checked_mul(scale)
            .ok_or(DepositGuardError::ArithmeticOverflow)?
            / self.reserve_a as u128;

        u64::try_from(price).map_err(|_| DepositGuardError::ArithmeticOverflow.into())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplySnapshot {
    pub total_supply: u64,
    pub decimals: u8,
}

impl SupplySnapshot {
    /// `total_supply * price`, in quote units
    pub fn market_cap(&self, price: u64) -> Result<u64, ProgramError> {
        let scale = 10u128
            .checked_pow(self.decimals as u32)
            .ok_or(DepositGuardError::ArithmeticOverflow)?;
        let cap = (self.total_supply as u128)
            .checked_mul(price as u128)
            .ok_or(DepositGuardError::ArithmeticOverflow)?
            / scale;

        u64::try_from(cap).map_err(|_| DepositGuardError::ArithmeticOverflow.into())
    }
}

pub trait PriceSource {
    fn snapshot(&self) -> Result<PriceSnapshot, ProgramError>;
}

pub trait SupplySource {
    fn supply(&self) -> Result<SupplySnapshot, ProgramError>;
}

impl PriceSource for PriceSnapshot {
    fn snapshot(&self) -> Result<PriceSnapshot, ProgramError> {
        Ok(*self)
    }
}

impl SupplySource for SupplySnapshot {
    fn supply(&self) -> Result<SupplySnapshot, ProgramError> {
        Ok(*self)
    }
}

pub const PRICE_FEED_MAGIC: u64 = u64::from_le_bytes(*b"DGPFEED1");

/// Raw price feed account layout written by the pool keeper
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PriceFeed {
    pub magic: u64,
    pub cumulative_price_a_lo: u64,
    pub cumulative_price_a_hi: u64,
    pub cumulative_price_b_lo: u64,
    pub cumulative_price_b_hi: u64,
    pub reserve_a: u64,
    pub reserve_b: u64,
    pub base_decimals: u64,
    pub timestamp: i64,
}

impl PriceFeed {
    pub const LEN: usize = std::mem::size_of::<PriceFeed>();

    pub fn from_snapshot(snapshot: &PriceSnapshot) -> Self {
        Self {
            magic: PRICE_FEED_MAGIC,
            cumulative_price_a_lo: snapshot.cumulative_price_a as u64,
            cumulative_price_a_hi: (snapshot.cumulative_price_a >> 64) as u64,
            cumulative_price_b_lo: snapshot.cumulative_price_b as u64,
            cumulative_price_b_hi: (snapshot.cumulative_price_b >> 64) as u64,
            reserve_a: snapshot.reserve_a,
            reserve_b: snapshot.reserve_b,
            base_decimals: snapshot.base_decimals as u64,
            timestamp: snapshot.timestamp,
        }
    }

    pub fn to_snapshot(&self) -> Result<PriceSnapshot, ProgramError> {
        let base_decimals =
            u8::try_from(self.base_decimals).map_err(|_| DepositGuardError::InvalidPriceFeed)?;

        Ok(PriceSnapshot {
            cumulative_price_a: (self.cumulative_price_a_hi as u128) << 64
                | self.cumulative_price_a_lo as u128,
            cumulative_price_b: (self.cumulative_price_b_hi as u128) << 64
                | self.cumulative_price_b_lo as u128,
            reserve_a: self.reserve_a,
            reserve_b: self.reserve_b,
            base_decimals,
            timestamp: self.timestamp,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(self).to_vec()
    }
}

/// Price feed account bound to the oracle
pub struct PriceFeedAccount<'a, 'info> {
    account: &'a AccountInfo<'info>,
}

impl<'a, 'info> PriceFeedAccount<'a, 'info> {
    pub fn new(account: &'a AccountInfo<'info>, expected: &Pubkey) -> Result<Self, ProgramError> {
        if account.key != expected {
            msg!("Price feed {} is not the bound feed {}", account.key, expected);
            return Err(DepositGuardError::InvalidPriceFeed.into());
        }
        Ok(Self { account })
    }
}

impl PriceSource for PriceFeedAccount<'_, '_> {
    fn snapshot(&self) -> Result<PriceSnapshot, ProgramError> {
        let data = self.account.try_borrow_data()?;
        if data.len() < PriceFeed::LEN {
            msg!("Price feed account too small");
            return Err(DepositGuardError::InvalidPriceFeed.into());
        }

        let feed: PriceFeed = bytemuck::try_pod_read_unaligned(&data[..PriceFeed::LEN])
            .map_err(|_| DepositGuardError::InvalidPriceFeed)?;
        if feed.magic != PRICE_FEED_MAGIC {
            msg!("Price feed magic mismatch");
            return Err(DepositGuardError::InvalidPriceFeed.into());
        }

        feed.to_snapshot()
    }
}

/// SPL Token mint used as the supply source
pub struct MintSupplyAccount<'a, 'info> {
    account: &'a AccountInfo<'info>,
}

impl<'a, 'info> MintSupplyAccount<'a, 'info> {
    pub fn new(account: &'a AccountInfo<'info>, expected: &Pubkey) -> Result<Self, ProgramError> {
        if account.key != expected {
            msg!("Mint {} is not the bound supply mint {}", account.key, expected);
            return Err(DepositGuardError::InvalidMint.into());
        }
        if account.owner != &spl_token::id() {
            msg!("Supply mint is not owned by the token program");
            return Err(DepositGuardError::InvalidMint.into());
        }
        Ok(Self { account })
    }
}

impl SupplySource for MintSupplyAccount<'_, '_> {
    fn supply(&self) -> Result<SupplySnapshot, ProgramError> {
        let mint = spl_token::state::Mint::unpack(&self.account.try_borrow_data()?)
            .map_err(|_| DepositGuardError::InvalidMint)?;

        Ok(SupplySnapshot {
            total_supply: mint.supply,
            decimals: mint.decimals,
        })
    }
}
