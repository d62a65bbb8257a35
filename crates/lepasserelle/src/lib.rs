// lepasserelle - Command-Line Bridge
//
// *La Passerelle* (The Bridge) - The `lecanard` command over storage and search

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

//! Index, search, and tokenize subcommands with layered configuration.

/// Command-line interface.
pub mod cli;
/// Configuration file and database flags.
pub mod config;

pub use cli::{Cli, Commands, IndexType};
pub use config::{ConfigError, DbArgs, FileConfig, DEFAULT_CONFIG_FILE};
