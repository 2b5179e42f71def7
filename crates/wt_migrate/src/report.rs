//! Outcome of one invocation, per wallet.

use serde::Serialize;

use crate::config::Strategy;
use crate::error::{MigrateError, Stage};
use crate::record::MigrationCounts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletOutcome {
    Done {
        #[serde(flatten)]
        counts: MigrationCounts,
    },
    Failed {
        stage: Stage,
        cause: &'static str,
        error: String,
        retryable: bool,
    },
    /// Not attempted because an earlier wallet failed under the abort policy.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletReport {
    pub wallet: String,
    pub profile: String,
    #[serde(flatten)]
    pub outcome: WalletOutcome,
}

impl WalletReport {
    pub(crate) fn done(wallet: &str, profile: &str, counts: MigrationCounts) -> Self {
        Self {
            wallet: wallet.to_string(),
            profile: profile.to_string(),
            outcome: WalletOutcome::Done { counts },
        }
    }

    pub(crate) fn failed(wallet: &str, profile: &str, err: &MigrateError) -> Self {
        let outcome = match err {
            MigrateError::Wallet { stage, source, .. } => WalletOutcome::Failed {
                stage: *stage,
                cause: source.cause(),
                error: err.to_string(),
                retryable: err.is_retryable(),
            },
            other => WalletOutcome::Failed {
                stage: Stage::OpenSource,
                cause: "configuration",
                error: other.to_string(),
                retryable: other.is_retryable(),
            },
        };
        Self { wallet: wallet.to_string(), profile: profile.to_string(), outcome }
    }

    pub(crate) fn skipped(wallet: &str, profile: &str) -> Self {
        Self { wallet: wallet.to_string(), profile: profile.to_string(), outcome: WalletOutcome::Skipped }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.outcome, WalletOutcome::Done { .. })
    }

    pub fn counts(&self) -> Option<MigrationCounts> {
        match self.outcome {
            WalletOutcome::Done { counts } => Some(counts),
            _ => None,
        }
    }

    /// `cause` of a failed wallet, e.g. `"authentication"`.
    pub fn cause(&self) -> Option<&'static str> {
        match self.outcome {
            WalletOutcome::Failed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub strategy: Strategy,
    pub source: String,
    pub destination: String,
    pub wallets: Vec<WalletReport>,
}

impl MigrationReport {
    pub(crate) fn new(strategy: Strategy, source: String, destination: String) -> Self {
        Self { strategy, source, destination, wallets: Vec::new() }
    }

    /// True only if every requested wallet was committed.
    pub fn is_success(&self) -> bool {
        !self.wallets.is_empty() && self.wallets.iter().all(WalletReport::is_done)
    }

    pub fn failures(&self) -> impl Iterator<Item = &WalletReport> {
        self.wallets.iter().filter(|w| !w.is_done())
    }

    pub fn wallet(&self, name: &str) -> Option<&WalletReport> {
        self.wallets.iter().find(|w| w.wallet == name)
    }

    /// `Err(Incomplete)` unless every wallet was committed.
    pub fn into_result(self) -> Result<Self, MigrateError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(MigrateError::Incomplete {
                failed: self.failures().count(),
                total: self.wallets.len(),
            })
        }
    }
}
