use thiserror::Error;

/// Failures that abort a projection. Insolvency is not an error; the driver
/// reports it as a normal early stop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("arithmetic domain error on account '{account}': {reason}")]
    ArithmeticDomain { account: String, reason: String },

    #[error("invariant violated in {year}: {reason}")]
    InvariantViolation { year: i32, reason: String },
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::ConfigInvalid(msg.into())
    }

    pub fn domain(account: &str, reason: impl Into<String>) -> Self {
        EngineError::ArithmeticDomain {
            account: account.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invariant(year: i32, reason: impl Into<String>) -> Self {
        EngineError::InvariantViolation {
            year,
            reason: reason.into(),
        }
    }
}
