//! Symmetric encryption helper for protecting sensitive strings.
//!
//! Tokens use the Fernet format (AES-128-CBC + HMAC-SHA256), so they
//! interoperate with other Fernet implementations given the same key.

pub mod error;
pub mod manager;
pub mod token;

pub use error::VaultError;
pub use manager::{EncryptionManager, Payload, KEY_ENV_VAR};

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, VaultError>;
