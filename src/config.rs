use std::net::{AddrParseError, SocketAddr};

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "expensedb", about = "expensedb - personal expense tracker API")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "expensedb.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Also append log output to this file (overrides config file)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Storage backend: memory, sqlite or postgres (overrides config file)
    #[arg(short, long)]
    pub storage: Option<StorageKind>,

    /// SQLite path or PostgreSQL URL, depending on the backend (overrides config file)
    #[arg(short, long)]
    pub database: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Log lines are appended here as well as written to stdout.
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Sqlite,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageKind,

    /// SQLite database file; `:memory:` keeps it in process.
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// PostgreSQL connection string.
    #[serde(default)]
    pub url: Option<String>,
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
        file: None,
    }
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        backend: default_backend(),
        path: default_sqlite_path(),
        url: None,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> StorageKind {
    StorageKind::Sqlite
}

fn default_sqlite_path() -> String {
    "expenses.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            storage: default_storage(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file {}: {}", cli.config, e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };
        config.with_overrides(cli)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn with_overrides(mut self, cli: &CliArgs) -> Self {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            self.logging.level = level.clone();
        }
        if let Some(ref file) = cli.log_file {
            self.logging.file = Some(file.clone());
        }
        if let Some(backend) = cli.storage {
            self.storage.backend = backend;
        }
        if let Some(ref database) = cli.database {
            match self.storage.backend {
                StorageKind::Postgres => self.storage.url = Some(database.clone()),
                StorageKind::Sqlite | StorageKind::Memory => self.storage.path = database.clone(),
            }
        }
        self
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
