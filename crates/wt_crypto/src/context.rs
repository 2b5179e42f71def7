//! Key context: the unlocked key material of one profile.
//!
//! A `KeyContext` is created when a migration starts working on a profile and
//! dropped when it finishes. The store key inside is zeroized on drop, so every
//! exit path (success, error, task cancellation) releases it.

use zeroize::Zeroizing;

use crate::entry::{EncryptedEntry, Entry};
use crate::error::CryptoError;
use crate::kdf::{KdfLevel, KeyMethod};
use crate::store_key::StoreKey;

/// Persistable wrapped-key envelope for a profile row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEnvelope {
    pub key_method: String,
    pub wrapped_key: Vec<u8>,
}

pub struct KeyContext {
    method: KeyMethod,
    store_key: StoreKey,
}

impl KeyContext {
    /// Unwrap an existing profile's store key with the wallet passphrase.
    pub fn unlock(passphrase: &str, key_method: &str, wrapped_key: &[u8]) -> Result<Self, CryptoError> {
        let method: KeyMethod = key_method.parse()?;
        let pass_key = method.derive(passphrase)?;
        let store_key = StoreKey::unwrap(wrapped_key, &pass_key)?;
        Ok(Self { method, store_key })
    }

    /// Fresh store key for a new profile, wrapped by `passphrase` under a new salt.
    pub fn generate(passphrase: &str, level: KdfLevel) -> Result<(Self, KeyEnvelope), CryptoError> {
        let method = KeyMethod::generate(level);
        let pass_key = method.derive(passphrase)?;
        let store_key = StoreKey::generate();
        let envelope = KeyEnvelope {
            key_method: method.to_string(),
            wrapped_key: store_key.wrap(&pass_key)?,
        };
        Ok((Self { method, store_key }, envelope))
    }

    pub fn key_method(&self) -> &KeyMethod {
        &self.method
    }

    pub fn encrypt_entry(&self, entry: &Entry) -> Result<EncryptedEntry, CryptoError> {
        self.store_key.encrypt_entry(entry)
    }

    pub fn decrypt_entry(&self, enc: &EncryptedEntry) -> Result<Entry, CryptoError> {
        self.store_key.decrypt_entry(enc)
    }

    /// Decrypt only the identifying columns of a record.
    pub fn decrypt_identity(
        &self,
        category: &[u8],
        name: &[u8],
    ) -> Result<(Zeroizing<String>, Zeroizing<String>), CryptoError> {
        Ok((
            self.store_key.decrypt_category(category)?,
            self.store_key.decrypt_name(name)?,
        ))
    }
}

impl std::fmt::Debug for KeyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyContext")
            .field("method", &self.method.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryKind, EntryTag};

    #[test]
    fn generated_context_unlocks_with_same_passphrase_only() {
        let (ctx, envelope) = KeyContext::generate("k1", KdfLevel::Interactive).unwrap();
        assert!(envelope.key_method.starts_with("kdf:argon2id:int?salt="));

        let entry = Entry::new(EntryKind::Kms, "ed25519", "did:sov:abc", b"secret".to_vec(), vec![
            EntryTag::plaintext("~verkey", "abc"),
        ]);
        let enc = ctx.encrypt_entry(&entry).unwrap();

        let reopened = KeyContext::unlock("k1", &envelope.key_method, &envelope.wrapped_key).unwrap();
        assert_eq!(reopened.decrypt_entry(&enc).unwrap(), entry);

        let err = KeyContext::unlock("k2", &envelope.key_method, &envelope.wrapped_key).unwrap_err();
        assert!(matches!(err, CryptoError::Authentication));
    }

    #[test]
    fn two_generated_contexts_use_different_salts() {
        let (a, _) = KeyContext::generate("k1", KdfLevel::Interactive).unwrap();
        let (b, _) = KeyContext::generate("k1", KdfLevel::Interactive).unwrap();
        assert_ne!(a.key_method().salt, b.key_method().salt);
    }

    #[test]
    fn debug_output_carries_only_the_key_method() {
        let (ctx, envelope) = KeyContext::generate("k1", KdfLevel::Interactive).unwrap();
        let shown = format!("{ctx:?}");
        assert!(shown.contains(&envelope.key_method));
        assert!(!shown.contains("store_key"));
    }
}
