// Run Configuration
//
// *La Configuration* (The Configuration) - Database and search settings from flags, environment, and file

use clap::Args;
use lestockage::{Backend, StoreConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "lecanard.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown backend name
    #[error("Unknown database type {0:?}; expected duckdb, sqlite, or postgres")]
    UnknownBackend(String),

    /// Config file could not be read
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of `lecanard.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Database connection settings
    pub database: DatabaseSection,

    /// Search defaults
    pub search: SearchSection,
}

/// `[database]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Backend name
    pub db_type: Option<String>,
    /// Database file for the embedded backends
    pub db_path: Option<PathBuf>,
    /// Postgres database name
    pub db_name: Option<String>,
    /// Postgres user
    pub db_user: Option<String>,
    /// Postgres host
    pub db_host: Option<String>,
    /// Postgres port
    pub db_port: Option<u16>,
    /// Postgres password
    pub db_password: Option<String>,
}

/// `[search]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Results per query
    pub hits: Option<usize>,
    /// RRF smoothing constant
    pub rrf_k: Option<u32>,
}

impl FileConfig {
    /// Load the configuration file
    ///
    /// An explicit path must exist. Without one, `lecanard.toml` in the
    /// working directory is read when present and defaults apply otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(FileConfig::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }
}

/// Database flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct DbArgs {
    /// Database backend: duckdb, sqlite, or postgres
    #[arg(global = true, long = "db-type", env = "LECANARD_DB_TYPE")]
    pub db_type: Option<String>,

    /// Database file for duckdb and sqlite
    #[arg(global = true, long = "db-path", env = "LECANARD_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Postgres database name
    #[arg(global = true, long = "db-name", env = "LECANARD_DB_NAME")]
    pub db_name: Option<String>,

    /// Postgres user
    #[arg(global = true, long = "db-user", env = "LECANARD_DB_USER")]
    pub db_user: Option<String>,

    /// Postgres host
    #[arg(global = true, long = "db-host", env = "LECANARD_DB_HOST")]
    pub db_host: Option<String>,

    /// Postgres port
    #[arg(global = true, long = "db-port", env = "LECANARD_DB_PORT")]
    pub db_port: Option<u16>,

    /// Postgres password
    #[arg(global = true, long = "db-password", env = "LECANARD_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,
}

impl DbArgs {
    /// Merge flags (or their environment variables) over the file over defaults
    pub fn resolve(&self, file: &FileConfig) -> Result<StoreConfig, ConfigError> {
        let db = &file.database;
        let defaults = StoreConfig::default();

        let backend = match self.db_type.as_ref().or(db.db_type.as_ref()) {
            Some(name) => {
                Backend::from_str_name(name).ok_or_else(|| ConfigError::UnknownBackend(name.clone()))?
            }
            None => defaults.backend,
        };

        Ok(StoreConfig {
            backend,
            db_path: self
                .db_path
                .clone()
                .or_else(|| db.db_path.clone())
                .unwrap_or(defaults.db_path),
            db_name: self
                .db_name
                .clone()
                .or_else(|| db.db_name.clone())
                .unwrap_or(defaults.db_name),
            db_user: self
                .db_user
                .clone()
                .or_else(|| db.db_user.clone())
                .unwrap_or(defaults.db_user),
            db_host: self
                .db_host
                .clone()
                .or_else(|| db.db_host.clone())
                .unwrap_or(defaults.db_host),
            db_port: self.db_port.or(db.db_port),
            db_password: self.db_password.clone().or_else(|| db.db_password.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_flags_or_file() {
        let config = DbArgs::default().resolve(&FileConfig::default()).unwrap();
        assert_eq!(config.backend, Backend::DuckDb);
        assert_eq!(config.db_path, PathBuf::from("database.db"));
        assert_eq!(config.db_name, "quackir");
        assert_eq!(config.db_user, "postgres");
        assert_eq!(config.db_host, "localhost");
    }

    #[test]
    fn test_flags_override_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [database]
            db_type = "postgres"
            db_name = "bench"
            db_host = "db.internal"

            [search]
            hits = 100
            "#,
        )
        .unwrap();
        let args = DbArgs {
            db_host: Some("127.0.0.1".to_string()),
            ..DbArgs::default()
        };

        let config = args.resolve(&file).unwrap();
        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.db_name, "bench");
        assert_eq!(config.db_host, "127.0.0.1");
        assert_eq!(file.search.hits, Some(100));
    }

    #[test]
    fn test_unknown_backend() {
        let args = DbArgs {
            db_type: Some("oracle".to_string()),
            ..DbArgs::default()
        };
        assert!(matches!(
            args.resolve(&FileConfig::default()),
            Err(ConfigError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[database]\ndb_type = \"sqlite\"\ndb_path = \"ir.sqlite\"\n").unwrap();

        let file = FileConfig::load(Some(&path)).unwrap();
        assert_eq!(file.database.db_type.as_deref(), Some("sqlite"));
        assert_eq!(file.database.db_path, Some(PathBuf::from("ir.sqlite")));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(FileConfig::load(Some(&missing)), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[database\n").unwrap();
        assert!(matches!(FileConfig::load(Some(&path)), Err(ConfigError::Parse { .. })));
    }
}
