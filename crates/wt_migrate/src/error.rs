use std::fmt;

use serde::Serialize;
use thiserror::Error;
use wt_crypto::CryptoError;
use wt_store::StoreError;

/// Per-wallet migration stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    OpenSource,
    UnwrapSourceKey,
    CreateDest,
    GenerateDestKey,
    Migrate,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::OpenSource => "open_source",
            Stage::UnwrapSourceKey => "unwrap_source_key",
            Stage::CreateDest => "create_dest",
            Stage::GenerateDestKey => "generate_dest_key",
            Stage::Migrate => "migrate",
            Stage::Commit => "commit",
        })
    }
}

/// Why one wallet's migration failed.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("connection failed: {0}")]
    Connection(#[source] StoreError),

    #[error("authentication failed: passphrase does not unwrap the store key")]
    Authentication,

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("destination profile '{0}' already exists")]
    DestinationExists(String),

    #[error("storage error: {0}")]
    Store(#[source] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[source] CryptoError),
}

impl StageError {
    /// Stable short name of the failure class, used in reports.
    pub fn cause(&self) -> &'static str {
        match self {
            StageError::Connection(_) => "connection",
            StageError::Authentication => "authentication",
            StageError::Integrity(_) => "integrity",
            StageError::DestinationExists(_) => "destination_exists",
            StageError::Store(_) => "storage",
            StageError::Crypto(_) => "crypto",
        }
    }
}

impl From<StoreError> for StageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection { .. } => StageError::Connection(err),
            StoreError::DestinationExists(name) => StageError::DestinationExists(name),
            StoreError::Duplicate { .. } | StoreError::Changed { .. } => {
                StageError::Integrity(err.to_string())
            }
            StoreError::Crypto(e) => StageError::from(e),
            other => StageError::Store(other),
        }
    }
}

impl From<CryptoError> for StageError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Authentication => StageError::Authentication,
            CryptoError::AeadDecrypt | CryptoError::MalformedRecord(_) => {
                StageError::Integrity(err.to_string())
            }
            other => StageError::Crypto(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrateError {
    /// Bad input; nothing was touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// The shared destination could not be opened; no wallet was attempted.
    #[error("cannot open destination store: {0}")]
    Destination(#[source] StoreError),

    #[error("wallet '{wallet}' failed during {stage}: {source}")]
    Wallet {
        wallet: String,
        stage: Stage,
        #[source]
        source: StageError,
    },

    /// One or more wallets of a batch failed; details are in the report.
    #[error("{failed} of {total} wallet migrations failed")]
    Incomplete { failed: usize, total: usize },
}

impl MigrateError {
    pub fn wallet(wallet: &str, stage: Stage, source: impl Into<StageError>) -> Self {
        MigrateError::Wallet { wallet: wallet.to_string(), stage, source: source.into() }
    }

    /// Whether running again with the same input can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MigrateError::Config(_) | MigrateError::Incomplete { .. } => false,
            MigrateError::Destination(_) => true,
            MigrateError::Wallet { source, .. } => matches!(
                source,
                StageError::Connection(_) | StageError::Store(_)
            ),
        }
    }
}

impl From<StoreError> for MigrateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnsupportedScheme(_) | StoreError::InvalidUri(_) => {
                MigrateError::Config(err.to_string())
            }
            other => MigrateError::Config(format!("unexpected store error: {other}")),
        }
    }
}
