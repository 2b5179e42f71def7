//! Per-wallet state machine shared by both strategies:
//!
//! `OpenSource -> UnwrapSourceKey -> CreateDest -> GenerateDestKey -> Migrate -> Commit`
//!
//! ending in `Done` or `Failed`. Once the destination profile exists, any
//! failure discards it before the error is returned, so a wallet is either
//! fully committed or absent.

use tracing::{info, warn, Instrument};
use wt_crypto::{KdfLevel, KeyContext};
use wt_store::{Connector, OpenMode, ProfileHandle, ProfileWriter, StorageSession, StoreUri};

use crate::config::WalletCredentials;
use crate::error::{MigrateError, Stage, StageError};
use crate::record::{MigrationCounts, RecordMigrator};

/// Where the destination profile is created.
#[derive(Clone, Copy)]
pub(crate) enum Destination<'a> {
    /// Session opened once by the caller and shared by every wallet.
    Shared(&'a dyn StorageSession),
    /// Store opened only after the source key is unlocked, closed when the
    /// wallet finishes.
    Deferred(&'a StoreUri),
}

pub(crate) struct WalletMigration<'a> {
    pub wallet: &'a WalletCredentials,
    pub source_uri: StoreUri,
    pub profile: String,
    pub kdf_level: KdfLevel,
    pub page_size: usize,
}

impl WalletMigration<'_> {
    pub(crate) async fn run(
        &self,
        connector: &dyn Connector,
        destination: Destination<'_>,
    ) -> Result<MigrationCounts, MigrateError> {
        let span = tracing::info_span!("wallet", wallet = %self.wallet.name, profile = %self.profile);
        async {
            info!(stage = %Stage::OpenSource, source = %self.source_uri, "starting wallet");
            let source = connector
                .connect(&self.source_uri, OpenMode::Source)
                .await
                .map_err(|e| self.fail(Stage::OpenSource, e))?;
            let result = self.run_with_source(connector, source.as_ref(), destination).await;
            source.close().await;
            match &result {
                Ok(counts) => info!(items = counts.items, key_entries = counts.key_entries, "wallet done"),
                Err(err) => warn!(error = %err, "wallet failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_with_source(
        &self,
        connector: &dyn Connector,
        source: &dyn StorageSession,
        destination: Destination<'_>,
    ) -> Result<MigrationCounts, MigrateError> {
        let profile = source
            .open_profile(&self.wallet.name)
            .await
            .map_err(|e| self.fail(Stage::OpenSource, e))?;

        info!(stage = %Stage::UnwrapSourceKey, key_method = %profile.key_method);
        let source_key = KeyContext::unlock(&self.wallet.key, &profile.key_method, &profile.wrapped_key)
            .map_err(|e| self.fail(Stage::UnwrapSourceKey, e))?;

        match destination {
            Destination::Shared(session) => self.write(source, &profile, &source_key, session).await,
            Destination::Deferred(uri) => {
                info!(stage = %Stage::CreateDest, destination = %uri, "opening destination store");
                let session = connector
                    .connect(uri, OpenMode::Destination)
                    .await
                    .map_err(|e| self.fail(Stage::CreateDest, e))?;
                let result = self.write(source, &profile, &source_key, session.as_ref()).await;
                session.close().await;
                result
            }
        }
    }

    async fn write(
        &self,
        source: &dyn StorageSession,
        profile: &ProfileHandle,
        source_key: &KeyContext,
        destination: &dyn StorageSession,
    ) -> Result<MigrationCounts, MigrateError> {
        info!(stage = %Stage::CreateDest, backend = destination.backend());
        let mut writer = destination
            .create_profile(&self.profile)
            .await
            .map_err(|e| self.fail(Stage::CreateDest, e))?;

        let counts = match self.populate(source, profile, source_key, writer.as_mut()).await {
            Ok(counts) => counts,
            Err(err) => {
                self.discard(writer).await;
                return Err(err);
            }
        };

        info!(stage = %Stage::Commit, destination_profile = writer.profile_name(), records = counts.total());
        writer.commit().await.map_err(|e| self.fail(Stage::Commit, e))?;
        Ok(counts)
    }

    async fn populate(
        &self,
        source: &dyn StorageSession,
        profile: &ProfileHandle,
        source_key: &KeyContext,
        writer: &mut dyn ProfileWriter,
    ) -> Result<MigrationCounts, MigrateError> {
        info!(stage = %Stage::GenerateDestKey, level = self.kdf_level.as_str());
        let (dest_key, envelope) = KeyContext::generate(&self.wallet.key, self.kdf_level)
            .map_err(|e| self.fail(Stage::GenerateDestKey, e))?;
        writer
            .store_profile_key(&envelope)
            .await
            .map_err(|e| self.fail(Stage::GenerateDestKey, e))?;

        info!(stage = %Stage::Migrate);
        RecordMigrator::new(source, profile, source_key, &dest_key, self.page_size)
            .migrate(writer)
            .await
            .map_err(|e| self.fail(Stage::Migrate, e))
    }

    async fn discard(&self, writer: Box<dyn ProfileWriter>) {
        let name = writer.profile_name().to_string();
        match writer.discard().await {
            Ok(()) => warn!(destination_profile = %name, "destination profile discarded"),
            // The drop path of the writer still releases the staged profile.
            Err(err) => warn!(destination_profile = %name, error = %err, "discarding destination profile failed"),
        }
    }

    fn fail(&self, stage: Stage, err: impl Into<StageError>) -> MigrateError {
        MigrateError::wallet(&self.wallet.name, stage, err)
    }
}
