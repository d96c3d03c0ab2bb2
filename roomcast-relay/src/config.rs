//! Relay server configuration.
//!
//! Settings come from three layers, highest priority first: command
//! line flags (with env fallbacks via clap), a TOML file, and compiled
//! defaults. The file lives at `~/.config/roomcast-relay/config.toml`
//! unless `--config` points elsewhere; a missing file at the default
//! location is treated as empty, an explicitly named one must exist.

use std::path::{Path, PathBuf};

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Command line surface of the relay binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Roomcast signaling relay server")]
pub struct RelayCliArgs {
    /// Address to listen on, e.g. 0.0.0.0:5001.
    #[arg(short, long, env = "ROOMCAST_ADDR")]
    pub bind: Option<String>,

    /// Read settings from this file instead of the default location.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest accepted inbound frame, in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Log filter (trace, debug, info, warn, error).
    #[arg(long, env = "ROOMCAST_LOG")]
    pub log_level: Option<String>,
}

/// On-disk settings. Every field is optional so a file can override a
/// single knob and leave the rest layered.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FileSettings {
    server: ServerSettings,
}

/// `[server]` table of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSettings {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
    log_level: Option<String>,
}

/// Settings the relay actually runs with.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Largest accepted inbound frame, in bytes.
    pub max_payload_size: usize,
    /// Log filter string handed to the tracing subscriber.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5001".to_string(),
            max_payload_size: 64 * 1024,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Resolves the running configuration from all three layers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read (when
    /// named explicitly) or does not parse.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = read_settings(cli.config.as_deref())?;
        Ok(Self::merge(cli, &file))
    }

    fn merge(cli: &RelayCliArgs, file: &FileSettings) -> Self {
        let base = Self::default();
        Self {
            bind_addr: pick(cli.bind.clone(), file.server.bind_addr.clone(), base.bind_addr),
            max_payload_size: pick(
                cli.max_payload_size,
                file.server.max_payload_size,
                base.max_payload_size,
            ),
            log_level: pick(
                cli.log_level.clone(),
                file.server.log_level.clone(),
                base.log_level,
            ),
        }
    }
}

/// One layered knob: CLI beats file beats default.
fn pick<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

/// Reads and parses the settings file for the given path, or the
/// default location when none is given.
fn read_settings(explicit: Option<&Path>) -> Result<FileSettings, ConfigError> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(dir) = dirs::config_dir() else {
        return Ok(FileSettings::default());
    };
    let path = dir.join("roomcast-relay").join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileSettings::default()),
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}
