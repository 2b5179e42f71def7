use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::debug;
use wt_crypto::KdfLevel;
use wt_migrate::{
    CollisionPolicy, MigrationConfig, MigrationReport, Strategy, WalletOutcome, DEFAULT_SUB_WALLET_BASE,
};
use wt_store::{Backends, DEFAULT_PAGE_SIZE};

#[derive(Parser)]
#[command(name = "wallet-tools")]
#[command(about = "Migrate encrypted wallet stores between layouts and backends", long_about = None)]
struct Cli {
    /// Migration to run
    #[arg(long, value_enum)]
    strategy: StrategyArg,

    /// Source store; for mt-convert-to-mw the root holding one store per wallet
    #[arg(long)]
    uri: String,

    /// Destination store
    #[arg(long = "dest-uri")]
    dest_uri: String,

    /// Wallet to migrate (repeatable, pairs with --wallet-key by position)
    #[arg(long = "wallet-name", required = true)]
    wallet_names: Vec<String>,

    /// Wallet passphrase (repeatable)
    #[arg(long = "wallet-key", env = "WALLET_KEY", hide_env_values = true)]
    wallet_keys: Vec<String>,

    /// Prefix of sub-wallet profile names in the multi-tenant destination
    #[arg(long = "multitenant-sub-wallet-name", default_value = DEFAULT_SUB_WALLET_BASE)]
    sub_wallet_base: String,

    /// What to do when a wallet's sub-wallet already exists in the destination
    #[arg(long, value_enum, default_value_t = CollisionArg::Continue)]
    on_collision: CollisionArg,

    /// Argon2id cost for the destination key wrap
    #[arg(long, value_enum, default_value_t = KdfArg::Mod)]
    kdf_level: KdfArg,

    /// Records fetched per page (at most 1000)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Export,
    #[value(name = "mt-convert-to-mw", alias = "multi-wallet-convert")]
    MtConvertToMw,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum CollisionArg {
    Continue,
    Abort,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum KdfArg {
    Mod,
    Int,
}

impl Cli {
    fn into_config(self) -> Result<MigrationConfig> {
        if self.wallet_keys.len() != self.wallet_names.len() {
            bail!(
                "got {} wallet name(s) but {} wallet key(s); pass one --wallet-key per --wallet-name",
                self.wallet_names.len(),
                self.wallet_keys.len()
            );
        }
        let strategy = match self.strategy {
            StrategyArg::Export => Strategy::Export,
            StrategyArg::MtConvertToMw => Strategy::MultiWalletConvert,
        };

        let mut config = MigrationConfig::new(strategy, &self.uri, &self.dest_uri)?;
        for (name, key) in self.wallet_names.into_iter().zip(self.wallet_keys) {
            config = config.with_wallet(name, key);
        }
        config.sub_wallet_base = self.sub_wallet_base;
        config.on_collision = match self.on_collision {
            CollisionArg::Continue => CollisionPolicy::Continue,
            CollisionArg::Abort => CollisionPolicy::Abort,
        };
        config.kdf_level = match self.kdf_level {
            KdfArg::Mod => KdfLevel::Moderate,
            KdfArg::Int => KdfLevel::Interactive,
        };
        config.page_size = self.page_size;
        config.validate()?;
        Ok(config)
    }
}

fn print_report(report: &MigrationReport) {
    for wallet in &report.wallets {
        match &wallet.outcome {
            WalletOutcome::Done { counts } => println!(
                "{} -> {}: done ({} items, {} key entries)",
                wallet.wallet, wallet.profile, counts.items, counts.key_entries
            ),
            WalletOutcome::Failed { error, .. } => eprintln!("{}: {error}", wallet.wallet),
            WalletOutcome::Skipped => eprintln!("{}: skipped after an earlier failure", wallet.wallet),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let config = cli.into_config().context("invalid arguments")?;
    debug!(strategy = %config.strategy, wallets = config.wallets.len(), "configuration validated");

    let report = wt_migrate::run(&config, &Backends).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if report.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
