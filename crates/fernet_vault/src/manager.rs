//! `EncryptionManager`: the string-in, token-out wrapper.

use std::time::Duration;

use crate::token::{now_secs, FernetKey};
use crate::{Result, VaultError};

/// Environment variable consulted when no key is passed explicitly.
pub const KEY_ENV_VAR: &str = "APP_ENCRYPTION_KEY";

/// Dynamically typed input, for callers whose values are not known to be
/// text or bytes until runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Float(f64),
    Null,
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
            Payload::Integer(_) => "integer",
            Payload::Float(_) => "float",
            Payload::Null => "null",
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(value.to_vec())
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Integer(value)
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Payload::Float(value)
    }
}

/// Symmetric encryption over one immutable key. Safe to share across
/// threads: no call mutates it.
#[derive(Debug, Clone)]
pub struct EncryptionManager {
    key: FernetKey,
}

impl EncryptionManager {
    /// Build from resolved key material (URL-safe base64, 32 bytes decoded).
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self> {
        let key = key.as_ref();
        if key.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(missing_key());
        }
        Ok(Self {
            key: FernetKey::decode(key)?,
        })
    }

    /// Use `key` if given, otherwise `APP_ENCRYPTION_KEY`.
    pub fn from_optional(key: Option<&[u8]>) -> Result<Self> {
        Self::resolve(key, |name| std::env::var(name).ok())
    }

    /// Read the key from `APP_ENCRYPTION_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_optional(None)
    }

    fn resolve(key: Option<&[u8]>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        match key {
            Some(explicit) => Self::new(explicit),
            None => {
                let value = lookup(KEY_ENV_VAR).ok_or_else(missing_key)?;
                Self::new(value)
            }
        }
    }

    /// Fresh, independent key material. Persist it securely.
    pub fn generate_key() -> Vec<u8> {
        FernetKey::generate()
    }

    /// Encrypt text into an opaque token. Tokens are randomized: the same
    /// plaintext encrypts differently each time.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.key.encrypt(plaintext.as_bytes())
    }

    /// Recover the text from a token.
    pub fn decrypt(&self, token: &[u8]) -> Result<String> {
        let plain = self.key.decrypt(token, None)?;
        String::from_utf8(plain).map_err(|_| VaultError::InvalidToken)
    }

    /// As [`decrypt`](Self::decrypt), also rejecting tokens older than `ttl`.
    pub fn decrypt_with_ttl(&self, token: &[u8], ttl: Duration) -> Result<String> {
        let plain = self.key.decrypt(token, Some((ttl.as_secs(), now_secs())))?;
        String::from_utf8(plain).map_err(|_| VaultError::InvalidToken)
    }

    /// Encrypt a runtime-typed value; only text is accepted.
    pub fn encrypt_payload(&self, payload: &Payload) -> Result<Vec<u8>> {
        match payload {
            Payload::Text(text) => self.encrypt(text),
            other => Err(VaultError::Type(format!(
                "Data to encrypt must be a string, got {}",
                other.kind()
            ))),
        }
    }

    /// Decrypt a runtime-typed value; only bytes are accepted.
    pub fn decrypt_payload(&self, payload: &Payload) -> Result<String> {
        match payload {
            Payload::Bytes(token) => self.decrypt(token),
            other => Err(VaultError::Type(format!(
                "Encrypted data must be bytes, got {}",
                other.kind()
            ))),
        }
    }
}

fn missing_key() -> VaultError {
    VaultError::Config(format!(
        "Encryption key not provided. Set {KEY_ENV_VAR} environment variable."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> EncryptionManager {
        EncryptionManager::new(EncryptionManager::generate_key()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_success() {
        let m = manager();
        let original = "Protect export profits";
        let token = m.encrypt(original).unwrap();
        assert_ne!(token, original.as_bytes());
        assert_eq!(m.decrypt(&token).unwrap(), original);
    }

    #[test]
    fn test_round_trip_unicode_and_empty() {
        let m = manager();
        for s in ["", "₹ 83.25 → ₹ 84.10", "line\nbreak", "x".repeat(1000).as_str()] {
            assert_eq!(m.decrypt(&m.encrypt(s).unwrap()).unwrap(), s);
        }
    }

    #[test]
    fn test_tokens_are_randomized() {
        let m = manager();
        let a = m.encrypt("FX risk").unwrap();
        let b = m.encrypt("FX risk").unwrap();
        assert_ne!(a, b);
        assert_eq!(m.decrypt(&a).unwrap(), m.decrypt(&b).unwrap());
    }

    #[test]
    fn test_encrypt_invalid_type() {
        let m = manager();
        for p in [Payload::from(12345_i64), Payload::from(1.5), Payload::Null] {
            assert!(matches!(m.encrypt_payload(&p), Err(VaultError::Type(_))));
        }
        assert!(m.encrypt_payload(&Payload::from("ok")).is_ok());
    }

    #[test]
    fn test_decrypt_invalid_type() {
        let m = manager();
        let err = m.decrypt_payload(&Payload::from("not-bytes")).unwrap_err();
        assert!(matches!(err, VaultError::Type(_)));
        assert_ne!(err, VaultError::InvalidToken);

        let token = m.encrypt("still works").unwrap();
        assert_eq!(
            m.decrypt_payload(&Payload::from(token)).unwrap(),
            "still works"
        );
    }

    #[test]
    fn test_decrypt_tampered_data() {
        let m = manager();
        let token = m.encrypt("FX risk").unwrap();

        let mut tampered = token.clone();
        *tampered.last_mut().unwrap() = b'0';
        assert_eq!(m.decrypt(&tampered), Err(VaultError::InvalidToken));
    }

    #[test]
    fn test_every_single_byte_flip_is_rejected() {
        let m = manager();
        let token = m.encrypt("hedge 15 days").unwrap();
        for i in 0..token.len() {
            let mut flipped = token.clone();
            flipped[i] ^= 0x01;
            assert_eq!(
                m.decrypt(&flipped),
                Err(VaultError::InvalidToken),
                "flip at byte {i} was accepted"
            );
        }
    }

    #[test]
    fn test_truncation_is_rejected() {
        let m = manager();
        let token = m.encrypt("hedge 15 days").unwrap();
        for len in [0, 1, 10, token.len() / 2, token.len() - 4, token.len() - 1] {
            assert_eq!(
                m.decrypt(&token[..len]),
                Err(VaultError::InvalidToken),
                "truncation to {len} bytes was accepted"
            );
        }
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = manager().encrypt("secret").unwrap();
        assert_eq!(manager().decrypt(&token), Err(VaultError::InvalidToken));
    }

    #[test]
    fn test_ttl() {
        let m = manager();
        let token = m.encrypt("fresh").unwrap();
        assert_eq!(
            m.decrypt_with_ttl(&token, Duration::from_secs(300)).unwrap(),
            "fresh"
        );
    }

    #[test]
    fn test_generate_key_independent() {
        let k1 = EncryptionManager::generate_key();
        let k2 = EncryptionManager::generate_key();
        assert_ne!(k1, k2);

        let m1 = EncryptionManager::new(&k1).unwrap();
        let m2 = EncryptionManager::new(&k2).unwrap();
        assert_eq!(m1.decrypt(&m1.encrypt("a").unwrap()).unwrap(), "a");
        assert_eq!(m2.decrypt(&m2.encrypt("b").unwrap()).unwrap(), "b");
    }

    #[test]
    fn test_key_resolution() {
        let key = EncryptionManager::generate_key();
        let env_key = String::from_utf8(key.clone()).unwrap();

        // Explicit key wins without consulting the environment.
        assert!(EncryptionManager::resolve(Some(key.as_slice()), |_| None).is_ok());

        // Falls back to the environment variable.
        let from_env = EncryptionManager::resolve(None, |name| {
            (name == KEY_ENV_VAR).then(|| env_key.clone())
        });
        assert!(from_env.is_ok());

        // Neither present.
        assert!(matches!(
            EncryptionManager::resolve(None, |_| None),
            Err(VaultError::Config(_))
        ));
        assert!(matches!(
            EncryptionManager::resolve(None, |_| Some(String::new())),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_key_is_config_error() {
        assert!(matches!(
            EncryptionManager::new("too-short"),
            Err(VaultError::Config(_))
        ));
    }
}
