use std::fmt;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Parser)]
#[command(name = "cortex")]
#[command(about = "Memory and knowledge service for coding agents", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a cortex.toml configuration file. When absent, `db_path` and
    /// `diagnostics_db_path` default to files under `data_dir`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the default event/graph/diagnostics stores when
    /// `--config` is not given.
    #[arg(long, default_value = "~/.cortex", global = true)]
    pub data_dir: String,

    #[arg(long, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file to the given path.
    Init {
        /// Where to write cortex.toml. Defaults to ./cortex.toml.
        #[arg(long, default_value = "cortex.toml")]
        path: PathBuf,
    },

    /// Run the JSON-RPC (MCP) server over stdio.
    Serve,

    /// Invoke a single dispatch-table tool and print its JSON result.
    Call {
        /// Tool name, e.g. `context_save` or `diagnostics_ingest`.
        tool: String,

        /// Tool parameters as a JSON object. Defaults to `{}`.
        #[arg(long, default_value = "{}")]
        params: String,
    },
}
