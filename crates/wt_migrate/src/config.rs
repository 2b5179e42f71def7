//! Migration configuration, validated before any connection is made.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use wt_crypto::KdfLevel;
use wt_store::{StoreUri, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use zeroize::Zeroizing;

use crate::error::MigrateError;

/// Prefix of sub-wallet profile names in a multi-tenant destination.
pub const DEFAULT_SUB_WALLET_BASE: &str = "multitenant_sub_wallet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One database-per-wallet wallet into a fresh standalone store.
    Export,
    /// Many database-per-wallet wallets into sub-wallets of one shared store.
    #[serde(rename = "mt-convert-to-mw")]
    MultiWalletConvert,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Export => "export",
            Strategy::MultiWalletConvert => "mt-convert-to-mw",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "export" => Ok(Strategy::Export),
            "mt-convert-to-mw" | "multi-wallet-convert" => Ok(Strategy::MultiWalletConvert),
            other => Err(MigrateError::Config(format!("unknown strategy '{other}'"))),
        }
    }
}

/// What the converter does when a sub-wallet name is already taken in the
/// destination. Other wallet failures never stop the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Report the colliding wallet and go on with the rest.
    #[default]
    Continue,
    /// Skip every wallet after the first collision; wallets already
    /// committed stay.
    Abort,
}

impl FromStr for CollisionPolicy {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(CollisionPolicy::Continue),
            "abort" => Ok(CollisionPolicy::Abort),
            other => Err(MigrateError::Config(format!("unknown collision policy '{other}'"))),
        }
    }
}

/// A wallet name and its passphrase. The passphrase is wiped on drop.
#[derive(Clone)]
pub struct WalletCredentials {
    pub name: String,
    pub key: Zeroizing<String>,
}

impl WalletCredentials {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self { name: name.into(), key: Zeroizing::new(key.into()) }
    }
}

impl fmt::Debug for WalletCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredentials")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub strategy: Strategy,
    pub source: StoreUri,
    pub destination: StoreUri,
    pub wallets: Vec<WalletCredentials>,
    pub sub_wallet_base: String,
    pub on_collision: CollisionPolicy,
    /// KDF cost used to wrap destination store keys.
    pub kdf_level: KdfLevel,
    pub page_size: usize,
}

impl MigrationConfig {
    /// Parse both store URIs; everything else starts at its default.
    pub fn new(strategy: Strategy, source: &str, destination: &str) -> Result<Self, MigrateError> {
        Ok(Self {
            strategy,
            source: source.parse()?,
            destination: destination.parse()?,
            wallets: Vec::new(),
            sub_wallet_base: DEFAULT_SUB_WALLET_BASE.to_string(),
            on_collision: CollisionPolicy::default(),
            kdf_level: KdfLevel::default(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_wallet(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.wallets.push(WalletCredentials::new(name, key));
        self
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.wallets.is_empty() {
            return Err(MigrateError::Config("at least one wallet name is required".into()));
        }
        for wallet in &self.wallets {
            if wallet.name.trim().is_empty() {
                return Err(MigrateError::Config("wallet name must not be empty".into()));
            }
            if wallet.key.is_empty() {
                return Err(MigrateError::Config(format!("wallet '{}' has no key", wallet.name)));
            }
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(MigrateError::Config(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        match self.strategy {
            Strategy::Export => {
                if self.wallets.len() != 1 {
                    return Err(MigrateError::Config(format!(
                        "export takes exactly one wallet, got {}",
                        self.wallets.len()
                    )));
                }
                if self.source == self.destination {
                    return Err(MigrateError::Config(
                        "export destination must differ from the source".into(),
                    ));
                }
            }
            Strategy::MultiWalletConvert => {
                if self.destination.backend() != "postgres" {
                    return Err(MigrateError::Config(format!(
                        "{} requires a multi-tenant (postgres) destination",
                        self.strategy
                    )));
                }
                if self.sub_wallet_base.trim().is_empty() {
                    return Err(MigrateError::Config("sub-wallet base name must not be empty".into()));
                }
                for wallet in &self.wallets {
                    self.source.for_wallet(&wallet.name)?;
                }
            }
        }
        Ok(())
    }

    /// Destination profile name for `wallet` under this strategy.
    pub fn destination_profile(&self, wallet: &str) -> String {
        match self.strategy {
            Strategy::Export => wallet.to_string(),
            Strategy::MultiWalletConvert => format!("{}_{}", self.sub_wallet_base, wallet),
        }
    }
}
