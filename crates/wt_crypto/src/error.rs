use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch: wrong key or tampered record)")]
    AeadDecrypt,

    #[error("Store key unwrap failed: passphrase does not match this profile")]
    Authentication,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Unsupported key method: {0}")]
    UnsupportedKeyMethod(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
