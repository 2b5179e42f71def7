//! Passphrase key derivation
//!
//! A profile's store key is wrapped by a key derived from the wallet passphrase
//! with Argon2id. The derivation parameters travel with the profile as a
//! key-method string:
//!
//!   `kdf:argon2id:<level>?salt=<32 hex chars>`
//!
//! where `<level>` is `mod` (moderate, the default) or `int` (interactive).

use std::fmt;
use std::str::FromStr;

use argon2::{Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

pub const SALT_LEN: usize = 16;
const METHOD_PREFIX: &str = "kdf:argon2id:";

/// 32-byte key derived from a wallet passphrase. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct PassKey(pub(crate) [u8; 32]);

/// Argon2id cost level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfLevel {
    #[default]
    #[serde(rename = "mod")]
    Moderate,
    #[serde(rename = "int")]
    Interactive,
}

impl KdfLevel {
    fn params(self) -> Result<Params, CryptoError> {
        let (m_cost, t_cost) = match self {
            KdfLevel::Moderate => (64 * 1024, 3),
            KdfLevel::Interactive => (32 * 1024, 2),
        };
        Params::new(m_cost, t_cost, 1, Some(32))
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KdfLevel::Moderate => "mod",
            KdfLevel::Interactive => "int",
        }
    }
}

impl FromStr for KdfLevel {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mod" => Ok(KdfLevel::Moderate),
            "int" => Ok(KdfLevel::Interactive),
            other => Err(CryptoError::UnsupportedKeyMethod(format!("kdf level '{other}'"))),
        }
    }
}

/// Parsed key-method descriptor stored alongside each wrapped profile key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMethod {
    pub level: KdfLevel,
    pub salt: [u8; SALT_LEN],
}

impl KeyMethod {
    /// New descriptor with a fresh random salt.
    pub fn generate(level: KdfLevel) -> Self {
        Self { level, salt: generate_salt() }
    }

    /// Derive the wrapping key for `passphrase` under this method.
    pub fn derive(&self, passphrase: &str) -> Result<PassKey, CryptoError> {
        derive_from_passphrase(passphrase, self)
    }
}

impl fmt::Display for KeyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{METHOD_PREFIX}{}?salt={}",
            self.level.as_str(),
            hex::encode(self.salt)
        )
    }
}

impl FromStr for KeyMethod {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(METHOD_PREFIX)
            .ok_or_else(|| CryptoError::UnsupportedKeyMethod(s.to_string()))?;
        let (level, query) = rest
            .split_once('?')
            .ok_or_else(|| CryptoError::UnsupportedKeyMethod(s.to_string()))?;
        let salt_hex = query
            .strip_prefix("salt=")
            .ok_or_else(|| CryptoError::UnsupportedKeyMethod(s.to_string()))?;
        let salt: [u8; SALT_LEN] = hex::decode(salt_hex)?
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("salt must be 16 bytes".into()))?;
        Ok(Self { level: level.parse()?, salt })
    }
}

/// Derive a pass key from a wallet passphrase and key method.
pub fn derive_from_passphrase(passphrase: &str, method: &KeyMethod) -> Result<PassKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, method.level.params()?);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), &method.salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(PassKey(output))
}

/// Generate a fresh random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
