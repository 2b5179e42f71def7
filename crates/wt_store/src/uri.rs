//! Store connection URIs.
//!
//! The scheme selects the backend adapter:
//! - `sqlite://<path>`: single-tenant file store
//! - `postgres://` or `postgresql://`: multi-tenant relational store
//!
//! Parsing happens before any I/O so an unknown scheme is a configuration error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

use crate::error::StoreError;

/// File name of a database-per-wallet SQLite store inside its wallet directory.
pub const SQLITE_WALLET_FILE: &str = "sqlite.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUri {
    Sqlite { path: PathBuf },
    Postgres { url: Url },
}

impl StoreUri {
    pub fn backend(&self) -> &'static str {
        match self {
            StoreUri::Sqlite { .. } => "sqlite",
            StoreUri::Postgres { .. } => "postgres",
        }
    }

    /// Resolve the database-per-wallet store of `wallet_name` under this root.
    ///
    /// SQLite: `<root>/<wallet_name>/sqlite.db`.
    /// Postgres: same server and credentials, database named after the wallet.
    pub fn for_wallet(&self, wallet_name: &str) -> Result<StoreUri, StoreError> {
        if wallet_name.is_empty()
            || wallet_name.contains(['/', '\\'])
            || wallet_name == "."
            || wallet_name == ".."
        {
            return Err(StoreError::InvalidUri(format!(
                "wallet name '{wallet_name}' cannot be used as a store location"
            )));
        }
        match self {
            StoreUri::Sqlite { path } => Ok(StoreUri::Sqlite {
                path: path.join(wallet_name).join(SQLITE_WALLET_FILE),
            }),
            StoreUri::Postgres { url } => {
                let mut url = url.clone();
                url.set_path(&format!("/{wallet_name}"));
                Ok(StoreUri::Postgres { url })
            }
        }
    }

    pub fn sqlite_path(&self) -> Option<&Path> {
        match self {
            StoreUri::Sqlite { path } => Some(path),
            StoreUri::Postgres { .. } => None,
        }
    }

    /// URI safe for logs and error messages (password removed).
    pub fn redacted(&self) -> String {
        match self {
            StoreUri::Sqlite { path } => format!("sqlite://{}", path.display()),
            StoreUri::Postgres { url } => {
                let mut url = url.clone();
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
        }
    }
}

impl FromStr for StoreUri {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| StoreError::InvalidUri(format!("'{s}' has no scheme")))?;
        match scheme {
            "sqlite" => {
                if rest.is_empty() {
                    return Err(StoreError::InvalidUri("sqlite URI has an empty path".into()));
                }
                // Drop any query string (e.g. `?mode=rwc`); options are set by the adapter.
                let path = rest.split('?').next().unwrap_or(rest);
                Ok(StoreUri::Sqlite { path: PathBuf::from(path) })
            }
            "postgres" | "postgresql" => {
                let url = Url::parse(s).map_err(|e| StoreError::InvalidUri(e.to_string()))?;
                if url.host_str().map_or(true, str::is_empty) {
                    return Err(StoreError::InvalidUri("postgres URI has no host".into()));
                }
                Ok(StoreUri::Postgres { url })
            }
            other => Err(StoreError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_schemes() {
        let uri: StoreUri = "sqlite:///tmp/w1.db".parse().unwrap();
        assert_eq!(uri.sqlite_path(), Some(Path::new("/tmp/w1.db")));

        let uri: StoreUri = "postgres://user:pw@localhost:5432/wallets".parse().unwrap();
        assert_eq!(uri.backend(), "postgres");
        assert!(!uri.redacted().contains("pw"));
    }

    #[test]
    fn unknown_scheme_is_rejected_before_io() {
        let err = "mysql://localhost/db".parse::<StoreUri>().unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedScheme(s) if s == "mysql"));
        assert!(matches!("just-a-path".parse::<StoreUri>(), Err(StoreError::InvalidUri(_))));
    }

    #[test]
    fn wallet_resolution_per_backend() {
        let root: StoreUri = "sqlite:///data/wallets".parse().unwrap();
        let w1 = root.for_wallet("w1").unwrap();
        assert_eq!(w1.sqlite_path(), Some(Path::new("/data/wallets/w1/sqlite.db")));

        let pg: StoreUri = "postgres://u:p@db:5432/postgres?sslmode=disable".parse().unwrap();
        match pg.for_wallet("w2").unwrap() {
            StoreUri::Postgres { url } => {
                assert_eq!(url.path(), "/w2");
                assert_eq!(url.query(), Some("sslmode=disable"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(root.for_wallet("../escape").is_err());
    }
}
