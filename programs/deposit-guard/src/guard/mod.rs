//! Deposit side protections

pub mod circuit_breaker;
pub mod flash_loan;
pub mod mev;
pub mod risk;

pub use circuit_breaker::*;
pub use flash_loan::*;
pub use mev::*;
pub use risk::*;
