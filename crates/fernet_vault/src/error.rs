//! Error taxonomy for the encryption helper.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// No usable key at construction.
    #[error("Config error: {0}")]
    Config(String),

    /// Wrong kind of input for the call.
    #[error("Type error: {0}")]
    Type(String),

    /// Token failed authentication or is malformed.
    #[error("Invalid or corrupted encryption token")]
    InvalidToken,
}
