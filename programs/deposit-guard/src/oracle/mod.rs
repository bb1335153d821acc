//! TWAP oracle and price validation

pub mod observations;
pub mod price_validator;
pub mod twap;

pub use observations::*;
pub use price_validator::*;
pub use twap::*;
