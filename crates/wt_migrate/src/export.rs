//! Exporter: one wallet of a database-per-wallet store into a freshly created
//! standalone store.
//!
//! The destination profile keeps the wallet name. Its store key is new and is
//! wrapped by the same wallet passphrase under a new salt. The destination
//! store is not opened until the source is open and its key unwrapped.

use tracing::info;
use wt_store::Connector;

use crate::config::{MigrationConfig, Strategy, WalletCredentials};
use crate::error::MigrateError;
use crate::record::MigrationCounts;
use crate::report::{MigrationReport, WalletReport};
use crate::wallet::{Destination, WalletMigration};

pub struct Exporter<'a> {
    config: &'a MigrationConfig,
    connector: &'a dyn Connector,
}

impl<'a> Exporter<'a> {
    pub fn new(config: &'a MigrationConfig, connector: &'a dyn Connector) -> Self {
        Self { config, connector }
    }

    /// Validate, then export the configured wallet. Wallet-level failures
    /// are recorded in the report; only bad configuration is an `Err`.
    pub async fn run(&self) -> Result<MigrationReport, MigrateError> {
        if self.config.strategy != Strategy::Export {
            return Err(MigrateError::Config(format!(
                "exporter cannot run strategy '{}'",
                self.config.strategy
            )));
        }
        self.config.validate()?;
        let wallet = self
            .config
            .wallets
            .first()
            .ok_or_else(|| MigrateError::Config("no wallet to export".into()))?;
        let profile = self.config.destination_profile(&wallet.name);

        let mut report = MigrationReport::new(
            Strategy::Export,
            self.config.source.redacted(),
            self.config.destination.redacted(),
        );
        let entry = match self.export(wallet, &profile).await {
            Ok(counts) => WalletReport::done(&wallet.name, &profile, counts),
            Err(err) => WalletReport::failed(&wallet.name, &profile, &err),
        };
        report.wallets.push(entry);
        Ok(report)
    }

    async fn export(&self, wallet: &WalletCredentials, profile: &str) -> Result<MigrationCounts, MigrateError> {
        info!(wallet = %wallet.name, destination = %self.config.destination, "exporting wallet");
        let job = WalletMigration {
            wallet,
            source_uri: self.config.source.clone(),
            profile: profile.to_string(),
            kdf_level: self.config.kdf_level,
            page_size: self.config.page_size,
        };
        // The destination store is created only once the source key unlocks.
        job.run(self.connector, Destination::Deferred(&self.config.destination)).await
    }
}
