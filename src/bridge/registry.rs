//! Server registry: resolves a server name to its launch configuration.
//!
//! The settings document is re-read on every lookup so edits made through the
//! dashboard apply to the next invocation without a restart.

use std::path::{Path, PathBuf};

use super::errors::BridgeError;
use super::types::{ServerConfig, SettingsDocument};

/// Source of server launch configurations.
pub trait ServerRegistry: Send + Sync {
    /// Load the configuration for `server_name`.
    fn load(&self, server_name: &str) -> Result<ServerConfig, BridgeError>;
}

/// Registry backed by a JSON settings file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole settings document.
    pub fn read_document(&self) -> Result<SettingsDocument, BridgeError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| BridgeError::ConfigNotFound {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&raw).map_err(|e| BridgeError::ConfigInvalid {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Sorted names of all configured servers.
    pub fn list(&self) -> Result<Vec<String>, BridgeError> {
        let mut names: Vec<String> = self.read_document()?.mcp_servers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl ServerRegistry for JsonFileRegistry {
    fn load(&self, server_name: &str) -> Result<ServerConfig, BridgeError> {
        let mut doc = self.read_document()?;

        let mut config = doc
            .take_server(server_name)
            .ok_or_else(|| BridgeError::ServerNotFound {
                name: server_name.to_string(),
            })?
            .map_err(|e| BridgeError::ConfigInvalid {
                path: self.path.display().to_string(),
                reason: format!("server '{server_name}': {e}"),
            })?;

        for value in config.env.values_mut() {
            *value = crate::config::interpolate_env_vars(value);
        }

        tracing::debug!(
            server = server_name,
            path = %self.path.display(),
            "loaded server config"
        );
        Ok(config)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_server() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(
            &tmp,
            r#"{"mcpServers": {"fs": {"command": "fs-server", "args": ["--stdio"]}}}"#,
        );
        let registry = JsonFileRegistry::new(path);

        let config = registry.load("fs").unwrap();
        assert_eq!(config.name, "fs");
        assert_eq!(config.command, "fs-server");
        assert_eq!(config.args, vec!["--stdio"]);
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let tmp = TempDir::new().unwrap();
        let registry = JsonFileRegistry::new(tmp.path().join("nope.json"));
        let err = registry.load("fs").unwrap_err();
        assert!(matches!(err, BridgeError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_malformed_file_is_config_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(&tmp, "{ not json");
        let err = JsonFileRegistry::new(path).load("fs").unwrap_err();
        assert!(matches!(err, BridgeError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_wrong_shape_is_config_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(&tmp, r#"{"mcpServers": {"fs": {"args": []}}}"#);
        let err = JsonFileRegistry::new(path).load("fs").unwrap_err();
        assert!(matches!(err, BridgeError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_bad_entry_does_not_break_other_servers() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(
            &tmp,
            r#"{"mcpServers": {
                "fs": {"command": "fs-server"},
                "other": {"command": "x", "env": {"PORT": 8080}},
                "headless": {"args": []}
            }}"#,
        );
        let registry = JsonFileRegistry::new(path);

        assert_eq!(registry.load("fs").unwrap().command, "fs-server");
        for name in ["other", "headless"] {
            match registry.load(name).unwrap_err() {
                BridgeError::ConfigInvalid { reason, .. } => {
                    assert!(reason.contains(&format!("'{name}'")), "{reason}");
                }
                other => panic!("expected ConfigInvalid, got {other:?}"),
            }
        }
        assert_eq!(registry.list().unwrap(), vec!["fs", "headless", "other"]);
    }

    #[test]
    fn test_servers_not_an_object_is_config_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(&tmp, r#"{"mcpServers": ["fs"]}"#);
        let err = JsonFileRegistry::new(path).load("fs").unwrap_err();
        assert!(matches!(err, BridgeError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_absent_server_is_server_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(&tmp, r#"{"mcpServers": {"fs": {"command": "x"}}}"#);
        let err = JsonFileRegistry::new(path).load("github").unwrap_err();
        match err {
            BridgeError::ServerNotFound { name } => assert_eq!(name, "github"),
            other => panic!("expected ServerNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_edits_apply_without_reload() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(&tmp, r#"{"mcpServers": {"fs": {"command": "old"}}}"#);
        let registry = JsonFileRegistry::new(&path);
        assert_eq!(registry.load("fs").unwrap().command, "old");

        std::fs::write(&path, r#"{"mcpServers": {"fs": {"command": "new"}}}"#).unwrap();
        assert_eq!(registry.load("fs").unwrap().command, "new");
    }

    #[test]
    fn test_env_values_are_interpolated() {
        std::env::set_var("__TEST_REGISTRY_TOKEN__", "s3cret");
        std::env::remove_var("__TEST_REGISTRY_MISSING__");
        let tmp = TempDir::new().unwrap();
        let path = write_settings(
            &tmp,
            r#"{"mcpServers": {"gh": {"command": "gh-mcp", "env": {
                "TOKEN": "${__TEST_REGISTRY_TOKEN__}",
                "REGION": "${__TEST_REGISTRY_MISSING__:-eu}"
            }}}}"#,
        );
        let config = JsonFileRegistry::new(path).load("gh").unwrap();
        assert_eq!(config.env["TOKEN"], "s3cret");
        assert_eq!(config.env["REGION"], "eu");
        std::env::remove_var("__TEST_REGISTRY_TOKEN__");
    }

    #[test]
    fn test_list_sorted() {
        let tmp = TempDir::new().unwrap();
        let path = write_settings(
            &tmp,
            r#"{"mcpServers": {"zeta": {"command": "z"}, "alpha": {"command": "a"}}}"#,
        );
        assert_eq!(JsonFileRegistry::new(path).list().unwrap(), vec!["alpha", "zeta"]);
    }
}
