//! wt_migrate: wallet migration engine
//!
//! Two strategies over the `wt_store` session contract:
//! - `Exporter`: one wallet of a database-per-wallet store into a new
//!   standalone store.
//! - `MultiWalletConverter`: many database-per-wallet wallets into sub-wallet
//!   profiles of one multi-tenant store.
//!
//! Both drive the same per-wallet state machine and hand the record copy to
//! `RecordMigrator`. Plaintext exists only inside the migrator, one record at
//! a time, between decrypting under the source key and encrypting under the
//! destination key.

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod record;
pub mod report;
mod wallet;

pub use config::{CollisionPolicy, MigrationConfig, Strategy, WalletCredentials, DEFAULT_SUB_WALLET_BASE};
pub use convert::MultiWalletConverter;
pub use error::{MigrateError, Stage, StageError};
pub use export::Exporter;
pub use record::{MigrationCounts, RecordMigrator};
pub use report::{MigrationReport, WalletOutcome, WalletReport};

use wt_store::Connector;

/// Run the strategy named in `config`.
pub async fn run(config: &MigrationConfig, connector: &dyn Connector) -> Result<MigrationReport, MigrateError> {
    match config.strategy {
        Strategy::Export => Exporter::new(config, connector).run().await,
        Strategy::MultiWalletConvert => MultiWalletConverter::new(config, connector).run().await,
    }
}
