//! Multi-Wallet Converter: N database-per-wallet stores into sub-wallet
//! profiles of one shared multi-tenant store.
//!
//! Wallets are migrated one after another against a single destination
//! session. Each wallet commits on its own; a later failure never touches a
//! wallet that already committed.

use tracing::{info, warn};
use wt_store::{Connector, OpenMode, StorageSession};

use crate::config::{CollisionPolicy, MigrationConfig, Strategy};
use crate::error::{MigrateError, StageError};
use crate::report::{MigrationReport, WalletReport};
use crate::wallet::{Destination, WalletMigration};

pub struct MultiWalletConverter<'a> {
    config: &'a MigrationConfig,
    connector: &'a dyn Connector,
}

impl<'a> MultiWalletConverter<'a> {
    pub fn new(config: &'a MigrationConfig, connector: &'a dyn Connector) -> Self {
        Self { config, connector }
    }

    /// Validate, open the shared destination, then convert every wallet in
    /// the configured order. `Err` means nothing was attempted.
    pub async fn run(&self) -> Result<MigrationReport, MigrateError> {
        if self.config.strategy != Strategy::MultiWalletConvert {
            return Err(MigrateError::Config(format!(
                "converter cannot run strategy '{}'",
                self.config.strategy
            )));
        }
        self.config.validate()?;

        let destination = self
            .connector
            .connect(&self.config.destination, OpenMode::Destination)
            .await
            .map_err(MigrateError::Destination)?;
        let report = self.convert_all(destination.as_ref()).await;
        destination.close().await;
        Ok(report)
    }

    async fn convert_all(&self, destination: &dyn StorageSession) -> MigrationReport {
        let mut report = MigrationReport::new(
            Strategy::MultiWalletConvert,
            self.config.source.redacted(),
            self.config.destination.redacted(),
        );
        let mut aborted = false;

        for wallet in &self.config.wallets {
            let profile = self.config.destination_profile(&wallet.name);
            if aborted {
                report.wallets.push(WalletReport::skipped(&wallet.name, &profile));
                continue;
            }

            let result = match self.config.source.for_wallet(&wallet.name) {
                Ok(source_uri) => {
                    let job = WalletMigration {
                        wallet,
                        source_uri,
                        profile: profile.clone(),
                        kdf_level: self.config.kdf_level,
                        page_size: self.config.page_size,
                    };
                    job.run(self.connector, Destination::Shared(destination)).await
                }
                Err(err) => Err(MigrateError::from(err)),
            };

            match result {
                Ok(counts) => report.wallets.push(WalletReport::done(&wallet.name, &profile, counts)),
                Err(err) => {
                    report.wallets.push(WalletReport::failed(&wallet.name, &profile, &err));
                    if self.config.on_collision == CollisionPolicy::Abort && is_collision(&err) {
                        warn!(wallet = %wallet.name, profile = %profile, "sub-wallet exists, aborting remaining wallets");
                        aborted = true;
                    }
                }
            }
        }

        info!(
            wallets = report.wallets.len(),
            failed = report.failures().count(),
            "multi-wallet conversion finished"
        );
        report
    }
}

fn is_collision(err: &MigrateError) -> bool {
    matches!(err, MigrateError::Wallet { source: StageError::DestinationExists(_), .. })
}
