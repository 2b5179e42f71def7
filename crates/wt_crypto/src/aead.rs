//! Authenticated Encryption with Associated Data
//!
//! Uses XChaCha20-Poly1305 (192-bit nonce).
//! Key size: 32 bytes.  Nonce: 24 bytes.  Tag: 16 bytes.
//!
//! Ciphertext wire format (both modes):
//!   [ nonce (24 bytes) | ciphertext + tag ]
//!
//! Two nonce modes are offered:
//! - `encrypt`: random nonce, for record values.
//! - `encrypt_searchable`: nonce = HMAC-SHA256(hmac_key, plaintext)[..24], so equal
//!   plaintexts under the same keys give equal ciphertexts. Used for category,
//!   name and tag columns that need equality lookups and unique indexes.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` with a 32-byte key, prepending a random 24-byte nonce.
/// `aad`: additional associated data (authenticated but not encrypted).
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
    seal(key, &nonce, plaintext, aad)
}

/// Deterministic encryption: the nonce is derived from the plaintext with `hmac_key`.
pub fn encrypt_searchable(
    key: &[u8; 32],
    hmac_key: &[u8; 32],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(hmac_key)
        .map_err(|_| CryptoError::AeadEncrypt)?;
    mac.update(plaintext);
    let digest = mac.finalize().into_bytes();
    let nonce = XNonce::clone_from_slice(&digest[..NONCE_LEN]);
    seal(key, &nonce, plaintext, &[])
}

fn seal(key: &[u8; 32], nonce: &XNonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag).
pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| CryptoError::AeadDecrypt)?;

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}

/// Decrypt a column written by `encrypt_searchable`.
pub fn decrypt_searchable(key: &[u8; 32], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    decrypt(key, data, &[])
}
