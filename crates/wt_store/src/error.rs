use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unsupported store URI scheme '{0}' (expected sqlite:// or postgres://)")]
    UnsupportedScheme(String),

    #[error("Invalid store URI: {0}")]
    InvalidUri(String),

    #[error("Could not connect to store {uri}: {source}")]
    Connection {
        uri: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] wt_crypto::CryptoError),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Destination already holds a profile named '{0}'")]
    DestinationExists(String),

    #[error("Duplicate {kind} in profile '{profile}'")]
    Duplicate { profile: String, kind: wt_crypto::EntryKind },

    #[error("Profile '{0}' has no wrapped key")]
    MissingProfileKey(String),

    #[error("Store is not writable in this mode: {0}")]
    ReadOnly(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Profile '{profile}' changed while being read: expected {expected} records, found {found}")]
    Changed { profile: String, expected: usize, found: usize },
}

impl StoreError {
    /// Map a sqlx error from an insert, turning unique violations into `Duplicate`.
    pub(crate) fn on_insert(err: sqlx::Error, profile: &str, kind: wt_crypto::EntryKind) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate {
                profile: profile.to_string(),
                kind,
            },
            _ => StoreError::Database(err),
        }
    }

    /// Map a sqlx error from a profile insert, turning unique violations into `DestinationExists`.
    pub(crate) fn on_profile_insert(err: sqlx::Error, profile: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DestinationExists(profile.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}
