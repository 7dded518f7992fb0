//! Fernet token codec.
//!
//! Token layout before base64url encoding:
//! `0x80 | timestamp (u64 BE) | IV (16) | AES-128-CBC ciphertext | HMAC-SHA256 (32)`.
//! The HMAC covers everything before it.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::{Result, VaultError};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

pub const VERSION: u8 = 0x80;
pub const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const HMAC_LEN: usize = 32;
const HEADER_LEN: usize = 1 + 8 + IV_LEN;
/// Tokens stamped further than this into the future fail a TTL check.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

/// Split signing / encryption key pair.
#[derive(Clone)]
pub struct FernetKey {
    signing: [u8; 16],
    encryption: [u8; 16],
}

impl std::fmt::Debug for FernetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FernetKey")
            .field("signing", &"<redacted>")
            .field("encryption", &"<redacted>")
            .finish()
    }
}

/// TTL policy for a decrypt call: `(ttl_secs, now_secs)`.
pub type TimeCheck = (u64, u64);

impl FernetKey {
    /// Decode a 32-byte key from URL-safe base64.
    pub fn decode(encoded: &[u8]) -> Result<Self> {
        let raw = URL_SAFE
            .decode(trim_ascii(encoded))
            .map_err(|_| VaultError::Config("Fernet key must be URL-safe base64".into()))?;
        if raw.len() != KEY_LEN {
            return Err(VaultError::Config(format!(
                "Fernet key must decode to {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let mut signing = [0u8; 16];
        let mut encryption = [0u8; 16];
        signing.copy_from_slice(&raw[..16]);
        encryption.copy_from_slice(&raw[16..]);
        Ok(Self {
            signing,
            encryption,
        })
    }

    /// Fresh key from the OS RNG, URL-safe base64 encoded.
    pub fn generate() -> Vec<u8> {
        let mut raw = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut raw);
        URL_SAFE.encode(raw).into_bytes()
    }

    /// Encrypt with an explicit timestamp and IV.
    pub fn encrypt_at(&self, plaintext: &[u8], timestamp: u64, iv: [u8; IV_LEN]) -> Result<Vec<u8>> {
        let ciphertext = Aes128CbcEnc::new(&self.encryption.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut data = Vec::with_capacity(HEADER_LEN + ciphertext.len() + HMAC_LEN);
        data.push(VERSION);
        data.extend_from_slice(&timestamp.to_be_bytes());
        data.extend_from_slice(&iv);
        data.extend_from_slice(&ciphertext);

        let mut mac = self.mac()?;
        mac.update(&data);
        data.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE.encode(data).into_bytes())
    }

    /// Encrypt with the current time and a random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        self.encrypt_at(plaintext, now_secs(), iv)
    }

    /// Authenticate and decrypt. Every failure is `InvalidToken`.
    pub fn decrypt(&self, token: &[u8], time_check: Option<TimeCheck>) -> Result<Vec<u8>> {
        let data = URL_SAFE
            .decode(token)
            .map_err(|_| VaultError::InvalidToken)?;
        if data.len() < HEADER_LEN + BLOCK_LEN + HMAC_LEN || data[0] != VERSION {
            return Err(VaultError::InvalidToken);
        }

        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&data[1..9]);
        let timestamp = u64::from_be_bytes(ts_bytes);
        if let Some((ttl, now)) = time_check {
            if timestamp.saturating_add(ttl) < now {
                return Err(VaultError::InvalidToken);
            }
            if now.saturating_add(MAX_CLOCK_SKEW_SECS) < timestamp {
                return Err(VaultError::InvalidToken);
            }
        }

        let (signed, tag) = data.split_at(data.len() - HMAC_LEN);
        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(tag).map_err(|_| VaultError::InvalidToken)?;

        let ciphertext = &signed[HEADER_LEN..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(VaultError::InvalidToken);
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&signed[9..HEADER_LEN]);

        Aes128CbcDec::new(&self.encryption.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| VaultError::InvalidToken)
    }

    fn mac(&self) -> Result<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.signing)
            .map_err(|_| VaultError::Config("invalid signing key length".into()))
    }
}

pub fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Published Fernet test vector.
    const SECRET: &[u8] = b"cw_0x689RpI-jtRR7oE8h_eQsKImvJapLeSbXpwF4e4=";
    const TOKEN: &[u8] = b"gAAAAAAdwJ6wAAECAwQFBgcICQoLDA0ODy021cpGVWKZ_eEwCGM4BLLF_5CV9dOPmrhuVUPgJobwOz7JcbmrR64jVmpU4IwqDA==";
    const NOW: u64 = 499_162_800;

    fn iv() -> [u8; 16] {
        let mut iv = [0u8; 16];
        for (i, b) in iv.iter_mut().enumerate() {
            *b = i as u8;
        }
        iv
    }

    #[test]
    fn test_generate_matches_vector() {
        let key = FernetKey::decode(SECRET).unwrap();
        let token = key.encrypt_at(b"hello", NOW, iv()).unwrap();
        assert_eq!(token, TOKEN);
    }

    #[test]
    fn test_decrypt_vector() {
        let key = FernetKey::decode(SECRET).unwrap();
        assert_eq!(key.decrypt(TOKEN, None).unwrap(), b"hello");
        assert_eq!(
            key.decrypt(TOKEN, Some((60, NOW + 30))).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_ttl_expired_and_future_skew() {
        let key = FernetKey::decode(SECRET).unwrap();
        assert_eq!(
            key.decrypt(TOKEN, Some((60, NOW + 61))),
            Err(VaultError::InvalidToken)
        );
        assert_eq!(
            key.decrypt(TOKEN, Some((60, NOW - MAX_CLOCK_SKEW_SECS - 1))),
            Err(VaultError::InvalidToken)
        );
    }

    #[test]
    fn test_bad_version_and_short_token() {
        let key = FernetKey::decode(SECRET).unwrap();
        let mut raw = URL_SAFE.decode(TOKEN).unwrap();
        raw[0] = 0x81;
        assert!(key.decrypt(URL_SAFE.encode(&raw).as_bytes(), None).is_err());
        assert!(key.decrypt(URL_SAFE.encode([VERSION; 40]).as_bytes(), None).is_err());
        assert!(key.decrypt(b"", None).is_err());
    }

    #[test]
    fn test_key_decode_errors() {
        assert!(matches!(
            FernetKey::decode(b"not base64!"),
            Err(VaultError::Config(_))
        ));
        assert!(matches!(
            FernetKey::decode(URL_SAFE.encode([0u8; 16]).as_bytes()),
            Err(VaultError::Config(_))
        ));
        let with_newline = [SECRET, &b"\n"[..]].concat();
        assert!(FernetKey::decode(&with_newline).is_ok());
    }

    #[test]
    fn test_generated_key_shape() {
        let key = FernetKey::generate();
        assert_eq!(key.len(), 44);
        assert!(FernetKey::decode(&key).is_ok());
    }
}
