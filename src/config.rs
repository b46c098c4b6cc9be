//! Bridge configuration loading.
//!
//! Reads `mcp-bridge.yaml` and resolves environment variables. Every field
//! has a default, so a missing file yields a usable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::bridge::invoker::TransportKind;
use crate::bridge::request::DEFAULT_PROTOCOL_VERSION;

/// File name searched for when no explicit config path is given.
pub const CONFIG_FILE_NAME: &str = "mcp-bridge.yaml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MCP_BRIDGE_CONFIG";

/// Errors while loading the bridge's own configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Runtime configuration of the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Settings document holding `mcpServers`.
    pub settings_path: PathBuf,
    /// Server names that may be invoked. Absent means every configured server.
    pub allowed_servers: Option<Vec<String>>,
    /// How the request batch reaches the server process.
    pub transport: TransportKind,
    /// Upper bound for one server run, in seconds.
    pub timeout_secs: u64,
    /// MCP protocol revision sent in the handshake.
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
    /// Directory for FileRedirect batch files (system temp dir when absent).
    pub temp_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            allowed_servers: None,
            transport: TransportKind::default(),
            timeout_secs: 30,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            temp_dir: None,
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "timeout_secs must be at least 1".into(),
            });
        }
        if self.protocol_version.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "protocol_version must not be empty".into(),
            });
        }
        if let Some(names) = &self.allowed_servers {
            if names.iter().any(|n| n.trim().is_empty()) {
                return Err(ConfigError::Invalid {
                    reason: "allowed_servers contains an empty name".into(),
                });
            }
        }
        Ok(())
    }
}

/// Default settings document: `<data dir>/settings.json`.
pub fn default_settings_path() -> PathBuf {
    crate::data_dir().join("settings.json")
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `MCP_BRIDGE_CONFIG` first, then searches upward from `start` for
/// `mcp-bridge.yaml`. Returns `None` when neither exists.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points to a missing file");
    }

    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.exists())
}

/// Load and parse a config file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let mut config: BridgeConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    config.settings_path = PathBuf::from(expand_tilde(&config.settings_path.to_string_lossy()));
    config.validate()?;
    Ok(config)
}

/// Load from an explicit path, the discovered path, or fall back to defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let cwd = std::env::current_dir().unwrap_or_default();
    match find_config_path(&cwd) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loaded bridge config");
            load_config(&path)
        }
        None => {
            tracing::debug!("no bridge config file found, using defaults");
            Ok(BridgeConfig::default())
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
///
/// An unterminated `${` is kept as literal text.
pub fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&resolve_var_expr(&after[..end]));
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
        _ => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
