pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "statements")]
pub mod input;

#[cfg(feature = "statements")]
pub mod statements;

#[cfg(feature = "valuation")]
pub mod valuation;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use error::ProFormaError;
pub use types::*;

/// Standard result type for all pro-forma operations
pub type ProFormaResult<T> = Result<T, ProFormaError>;
