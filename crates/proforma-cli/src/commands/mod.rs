pub mod monte_carlo;
pub mod statements;
pub mod valuation;
