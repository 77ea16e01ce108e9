use std::net::{AddrParseError, SocketAddr};

use cashbook_core::{DateError, DisplayZone};
use clap::{Parser, Subcommand};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "cashbook", about = "Cash movements and work orders, one business day at a time")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "cashbook.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// PostgreSQL connection string; selects the postgres backend
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print the report for one business day
    Report {
        /// Day to report on, YYYY-MM-DD or DD/MM/YYYY; defaults to today
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Open the storage backend and print record counts
    Check,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub dates: DatesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sqlite,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// SQLite file, or `:memory:`
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// PostgreSQL connection string
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatesConfig {
    /// Offset of the business timezone, e.g. `-03:00`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,

    /// When true, a write without a date is recorded on today's date.
    #[serde(default)]
    pub allow_missing_date: bool,
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Sqlite
}

fn default_sqlite_path() -> String {
    "cashbook.db".to_string()
}

fn default_utc_offset() -> String {
    "-03:00".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_backend(),
            path: default_sqlite_path(),
            url: None,
        }
    }
}

impl Default for DatesConfig {
    fn default() -> Self {
        DatesConfig {
            utc_offset: default_utc_offset(),
            allow_missing_date: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            storage: StorageConfig::default(),
            dates: DatesConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref url) = cli.database_url {
            config.storage.backend = BackendKind::Postgres;
            config.storage.url = Some(url.clone());
        }

        config
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    pub fn display_zone(&self) -> Result<DisplayZone, DateError> {
        DisplayZone::parse(&self.dates.utc_offset)
    }
}
