pub mod error;
pub mod tax;
pub mod types;

#[cfg(feature = "simulation")]
pub mod entities;

#[cfg(feature = "simulation")]
pub mod repository;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use error::FlowTaxError;
pub use types::*;

/// Standard result type for all flow-tax operations
pub type FlowTaxResult<T> = Result<T, FlowTaxError>;
