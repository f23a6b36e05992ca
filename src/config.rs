//! Process-level configuration: CLI flags layered over an optional TOML file.
//!
//! Recognized options mirror the external interface exactly: `filePath`,
//! `port` (surfaced here as a full bind address), `indexGranularity`, and
//! `indexPath`. Config errors are fatal at startup — they never reach a
//! connected client.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_GRANULARITY: u64 = 1000;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("filePath is required (pass --file-path or set it in the config file)")]
    MissingFilePath,
}

/// Fields accepted from an optional TOML file. CLI flags always win over
/// whatever is present here.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    file_path: Option<PathBuf>,
    bind_addr: Option<String>,
    index_granularity: Option<u64>,
    index_path: Option<PathBuf>,
}

/// Command-line surface. `--config` points at an optional TOML file whose
/// values are used as defaults for anything not passed explicitly.
#[derive(Debug, Parser)]
#[command(name = "rowtable-server", version, about = "Viewport server for huge delimited row files")]
struct Cli {
    /// Optional TOML file providing defaults for the options below.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the append-only data file to serve.
    #[arg(long = "file-path")]
    file_path: Option<PathBuf>,

    /// Address to bind the WebSocket listener to.
    #[arg(long = "bind-addr")]
    bind_addr: Option<String>,

    /// Records between successive index anchors.
    #[arg(long = "index-granularity")]
    index_granularity: Option<u64>,

    /// Optional cached-index location (defaults to `<file_path>.idx`).
    #[arg(long = "index-path")]
    index_path: Option<PathBuf>,
}

/// Fully resolved configuration used by the rest of the server.
#[derive(Debug, Clone)]
pub struct Config {
    pub file_path: PathBuf,
    pub bind_addr: String,
    pub index_granularity: u64,
    pub index_path: PathBuf,
}

impl Config {
    /// Parses CLI arguments (and an optional `--config` TOML file) into a
    /// resolved `Config`. Fatal on any error — the caller should log and
    /// exit the process.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = Cli::parse();
        Self::from_cli(cli)
    }

    /// Builds a `Config` directly, bypassing CLI/file parsing. Used by
    /// embedders and tests that already know the resolved values.
    pub fn new(
        file_path: PathBuf,
        bind_addr: String,
        index_granularity: u64,
        index_path: Option<PathBuf>,
    ) -> Self {
        let index_path = index_path.unwrap_or_else(|| default_index_path(&file_path));
        Config {
            file_path,
            bind_addr,
            index_granularity,
            index_path,
        }
    }

    fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file_cfg = match &cli.config {
            Some(path) => read_file_config(path)?,
            None => FileConfig::default(),
        };

        let file_path = cli
            .file_path
            .or(file_cfg.file_path)
            .ok_or(ConfigError::MissingFilePath)?;

        let bind_addr = cli
            .bind_addr
            .or(file_cfg.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let index_granularity = cli
            .index_granularity
            .or(file_cfg.index_granularity)
            .unwrap_or(DEFAULT_GRANULARITY);

        let index_path = cli
            .index_path
            .or(file_cfg.index_path)
            .unwrap_or_else(|| default_index_path(&file_path));

        Ok(Config {
            file_path,
            bind_addr,
            index_granularity,
            index_path,
        })
    }
}

fn default_index_path(file_path: &Path) -> PathBuf {
    let mut s = file_path.as_os_str().to_os_string();
    s.push(".idx");
    PathBuf::from(s)
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_path_appends_suffix() {
        assert_eq!(
            default_index_path(Path::new("/data/weather.csv")),
            PathBuf::from("/data/weather.csv.idx")
        );
    }
}
