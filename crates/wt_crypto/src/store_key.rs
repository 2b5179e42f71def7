//! Profile store key
//!
//! Each profile owns one `StoreKey`: six independent 32-byte keys used for the
//! different record columns. The store key is persisted only in wrapped form
//! (XChaCha20-Poly1305 under the passphrase-derived `PassKey`).
//!
//! Column encryption:
//! - category, name, tag names, encrypted tag values: searchable (HMAC nonce)
//! - value: random nonce, AAD = kind || category || name
//! - plaintext tag values: stored as UTF-8 bytes

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::aead;
use crate::entry::{EncryptedEntry, EncryptedTag, Entry, EntryKind, EntryTag, TagKind};
use crate::error::CryptoError;
use crate::kdf::PassKey;

const WRAP_AAD: &[u8] = b"wt-store-key-v1";
const KEY_COUNT: usize = 6;
const SERIALIZED_LEN: usize = KEY_COUNT * 32;

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StoreKey {
    category_key: [u8; 32],
    name_key: [u8; 32],
    value_key: [u8; 32],
    tag_name_key: [u8; 32],
    tag_value_key: [u8; 32],
    hmac_key: [u8; 32],
}

impl StoreKey {
    /// Fresh random store key.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let mut key = Self {
            category_key: [0u8; 32],
            name_key: [0u8; 32],
            value_key: [0u8; 32],
            tag_name_key: [0u8; 32],
            tag_value_key: [0u8; 32],
            hmac_key: [0u8; 32],
        };
        for part in key.parts_mut() {
            rng.fill_bytes(part);
        }
        key
    }

    fn parts_mut(&mut self) -> [&mut [u8; 32]; KEY_COUNT] {
        [
            &mut self.category_key,
            &mut self.name_key,
            &mut self.value_key,
            &mut self.tag_name_key,
            &mut self.tag_value_key,
            &mut self.hmac_key,
        ]
    }

    fn parts(&self) -> [&[u8; 32]; KEY_COUNT] {
        [
            &self.category_key,
            &self.name_key,
            &self.value_key,
            &self.tag_name_key,
            &self.tag_value_key,
            &self.hmac_key,
        ]
    }

    /// Encrypt this key under `pass_key` for storage in a profile row.
    pub fn wrap(&self, pass_key: &PassKey) -> Result<Vec<u8>, CryptoError> {
        let mut raw = Zeroizing::new(Vec::with_capacity(SERIALIZED_LEN));
        for part in self.parts() {
            raw.extend_from_slice(part);
        }
        aead::encrypt(&pass_key.0, &raw, WRAP_AAD)
    }

    /// Recover a store key from its wrapped form.
    ///
    /// Any AEAD failure is reported as `CryptoError::Authentication`: a wrong
    /// passphrase and a corrupted envelope are indistinguishable here.
    pub fn unwrap(wrapped: &[u8], pass_key: &PassKey) -> Result<Self, CryptoError> {
        let raw = aead::decrypt(&pass_key.0, wrapped, WRAP_AAD)
            .map_err(|_| CryptoError::Authentication)?;
        if raw.len() != SERIALIZED_LEN {
            return Err(CryptoError::InvalidKey("Unwrapped store key wrong length".into()));
        }
        let mut key = Self {
            category_key: [0u8; 32],
            name_key: [0u8; 32],
            value_key: [0u8; 32],
            tag_name_key: [0u8; 32],
            tag_value_key: [0u8; 32],
            hmac_key: [0u8; 32],
        };
        for (part, chunk) in key.parts_mut().into_iter().zip(raw.chunks_exact(32)) {
            part.copy_from_slice(chunk);
        }
        Ok(key)
    }

    pub fn encrypt_entry(&self, entry: &Entry) -> Result<EncryptedEntry, CryptoError> {
        let category = aead::encrypt_searchable(&self.category_key, &self.hmac_key, entry.category.as_bytes())?;
        let name = aead::encrypt_searchable(&self.name_key, &self.hmac_key, entry.name.as_bytes())?;
        let aad = value_aad(entry.kind, &entry.category, &entry.name);
        let value = aead::encrypt(&self.value_key, &entry.value, &aad)?;

        let tags = entry
            .tags
            .iter()
            .map(|tag| self.encrypt_tag(tag))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EncryptedEntry {
            kind: entry.kind,
            category,
            name,
            value,
            tags,
            expiry: entry.expiry,
        })
    }

    pub fn decrypt_entry(&self, enc: &EncryptedEntry) -> Result<Entry, CryptoError> {
        let category = self.decrypt_category(&enc.category)?;
        let name = self.decrypt_name(&enc.name)?;
        let aad = value_aad(enc.kind, &category, &name);
        let value = aead::decrypt(&self.value_key, &enc.value, &aad)?;

        let tags = enc
            .tags
            .iter()
            .map(|tag| self.decrypt_tag(tag))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Entry {
            kind: enc.kind,
            category: category.to_string(),
            name: name.to_string(),
            value: value.to_vec(),
            tags,
            expiry: enc.expiry,
        })
    }

    pub fn decrypt_category(&self, data: &[u8]) -> Result<Zeroizing<String>, CryptoError> {
        utf8(aead::decrypt_searchable(&self.category_key, data)?, "category")
    }

    pub fn decrypt_name(&self, data: &[u8]) -> Result<Zeroizing<String>, CryptoError> {
        utf8(aead::decrypt_searchable(&self.name_key, data)?, "name")
    }

    fn encrypt_tag(&self, tag: &EntryTag) -> Result<EncryptedTag, CryptoError> {
        let name = aead::encrypt_searchable(&self.tag_name_key, &self.hmac_key, tag.name.as_bytes())?;
        let value = match tag.kind {
            TagKind::Encrypted => {
                aead::encrypt_searchable(&self.tag_value_key, &self.hmac_key, tag.value.as_bytes())?
            }
            TagKind::Plaintext => tag.value.as_bytes().to_vec(),
        };
        Ok(EncryptedTag { kind: tag.kind, name, value })
    }

    fn decrypt_tag(&self, tag: &EncryptedTag) -> Result<EntryTag, CryptoError> {
        let name = utf8(aead::decrypt_searchable(&self.tag_name_key, &tag.name)?, "tag name")?;
        let value = match tag.kind {
            TagKind::Encrypted => utf8(
                aead::decrypt_searchable(&self.tag_value_key, &tag.value)?,
                "tag value",
            )?,
            TagKind::Plaintext => utf8(Zeroizing::new(tag.value.clone()), "tag value")?,
        };
        Ok(EntryTag {
            kind: tag.kind,
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

fn value_aad(kind: EntryKind, category: &str, name: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(5 + category.len() + name.len());
    aad.push(kind.code() as u8);
    aad.extend_from_slice(&(category.len() as u32).to_be_bytes());
    aad.extend_from_slice(category.as_bytes());
    aad.extend_from_slice(name.as_bytes());
    aad
}

fn utf8(bytes: Zeroizing<Vec<u8>>, field: &str) -> Result<Zeroizing<String>, CryptoError> {
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| CryptoError::MalformedRecord(format!("{field} is not valid UTF-8")))?;
    Ok(Zeroizing::new(text.to_owned()))
}
