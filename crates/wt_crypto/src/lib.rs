//! wt_crypto: Wallet Tools key context and record encryption
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - The raw store key never leaves a `KeyContext`.
//!
//! # Module layout
//! - `aead`: XChaCha20-Poly1305 helpers (random and searchable nonces)
//! - `kdf`: Argon2id passphrase derivation + key-method descriptors
//! - `store_key`: per-profile store key: generate / wrap / unwrap, column encryption
//! - `context`: `KeyContext`, the scoped owner of an unlocked store key
//! - `entry`: plaintext and encrypted record shapes
//! - `error`: unified error type

pub mod aead;
pub mod context;
pub mod entry;
pub mod error;
pub mod kdf;
pub mod store_key;

pub use context::{KeyContext, KeyEnvelope};
pub use entry::{EncryptedEntry, EncryptedTag, Entry, EntryKind, EntryTag, TagKind};
pub use error::CryptoError;
pub use kdf::{KdfLevel, KeyMethod};
pub use store_key::StoreKey;
