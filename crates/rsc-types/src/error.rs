use thiserror::Error;

#[derive(Error, Debug)]
pub enum RscTypeError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RscTypeError>;
