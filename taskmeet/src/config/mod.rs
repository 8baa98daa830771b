//! Configuration system for the `taskmeet` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskmeet/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    call: CallFileConfig,
    board: BoardFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    relay_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    join_timeout_secs: Option<u64>,
}

/// `[call]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CallFileConfig {
    display_name: Option<String>,
    room: Option<String>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    identity: Option<String>,
    columns: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// Relay server WebSocket URL.
    pub relay_url: String,
    /// Timeout for opening the relay connection.
    pub connect_timeout: Duration,
    /// Timeout for the relay to confirm a join.
    pub join_timeout: Duration,

    // -- Call --
    /// Name shown to other participants.
    pub display_name: Option<String>,
    /// Room to join.
    pub room: Option<String>,

    // -- Board --
    /// Identity used for card ownership checks.
    pub board_identity: String,
    /// Extra columns shown after the defaults.
    pub board_columns: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:9000/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(5),
            display_name: None,
            room: None,
            board_identity: "admin".to_string(),
            board_columns: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let call = match &cli.command {
            Some(Command::Call(args)) => Some(args),
            _ => None,
        };
        let board = match &cli.command {
            Some(Command::Board(args)) => Some(args),
            _ => None,
        };

        let mut board_columns = file.board.columns.clone().unwrap_or_default();
        if let Some(args) = board {
            board_columns.extend(args.columns.iter().cloned());
        }

        Self {
            relay_url: cli
                .relay_url
                .clone()
                .or_else(|| file.network.relay_url.clone())
                .unwrap_or(defaults.relay_url),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            join_timeout: file
                .network
                .join_timeout_secs
                .map_or(defaults.join_timeout, Duration::from_secs),
            display_name: call
                .and_then(|a| a.name.clone())
                .or_else(|| file.call.display_name.clone()),
            room: call
                .and_then(|a| a.room.clone())
                .or_else(|| file.call.room.clone()),
            board_identity: board
                .and_then(|a| a.identity.clone())
                .or_else(|| file.board.identity.clone())
                .unwrap_or(defaults.board_identity),
            board_columns,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board and call rooms")]
pub struct CliArgs {
    /// WebSocket URL of the relay server.
    #[arg(long, global = true, env = "TASKMEET_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Path to config file (default: `~/.config/taskmeet/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "TASKMEET_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskmeet.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Join a call room and relay chat from stdin.
    Call(CallArgs),
    /// Run the board demo against an in-memory task store.
    Board(BoardArgs),
}

/// Arguments for `taskmeet call`.
#[derive(clap::Args, Debug, Default)]
pub struct CallArgs {
    /// Room to join.
    #[arg(short, long)]
    pub room: Option<String>,

    /// Display name shown to others.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Start with the microphone on.
    #[arg(long)]
    pub audio: bool,

    /// Start with the camera on.
    #[arg(long)]
    pub video: bool,
}

/// Arguments for `taskmeet board`.
#[derive(clap::Args, Debug, Default)]
pub struct BoardArgs {
    /// Identity used for card ownership checks.
    #[arg(long)]
    pub identity: Option<String>,

    /// Restrict moves to cards assigned to `--identity`.
    #[arg(long)]
    pub employee: bool,

    /// Extra column to show (repeatable).
    #[arg(long = "column")]
    pub columns: Vec<String>,
}

/// Reads the config file.
///
/// An explicit path must exist. Without one, `<config dir>/taskmeet/config.toml`
/// is tried and an absent file yields an empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let (path, required) = match explicit_path {
        Some(p) => (p.to_path_buf(), true),
        None => match dirs::config_dir() {
            Some(dir) => (dir.join("taskmeet").join("config.toml"), false),
            None => return Ok(ConfigFile::default()),
        },
    };

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ConfigFile::default());
        }
        Err(source) => return Err(ConfigError::ReadFile { path, source }),
    };
    Ok(toml::from_str(&contents)?)
}
