use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProFormaError {
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations")]
    ConvergenceFailure { function: String, iterations: u32 },

    #[error("Company type '{requested}' is not supported. Available types: [{available}]")]
    UnsupportedCompanyType { requested: String, available: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ProFormaError {
    fn from(e: serde_json::Error) -> Self {
        ProFormaError::SerializationError(e.to_string())
    }
}
