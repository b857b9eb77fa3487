//! Backend registry configuration
//!
//! The registry file is the one piece of persisted state: a JSON document
//! of the form `{servers: [...], log_level}`. When the file is absent a
//! default pointing at the bundled database backend is synthesized and
//! written back, so hand-edited configs from earlier runs keep working.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};

/// Default location of the registry file
pub const DEFAULT_CONFIG_PATH: &str = "config/mcp.json";

/// Descriptor for one tool backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    /// Launch spec: a `.py` path runs under `python`, anything else is
    /// executed directly.
    pub script_path: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-operation channel timeout, seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_health_check_interval() -> u64 {
    60
}

impl ServerConfig {
    /// Resolve the command and arguments used to spawn this backend.
    pub fn launch_command(&self) -> (String, Vec<String>) {
        if self.script_path.ends_with(".py") {
            ("python".to_string(), vec![self.script_path.clone()])
        } else {
            (self.script_path.clone(), Vec::new())
        }
    }
}

/// The persisted registry document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    pub servers: Vec<ServerConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RegistryFile {
    fn default() -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            "description".to_string(),
            Value::String("SQLite database MCP server".to_string()),
        );
        metadata.insert("version".to_string(), Value::String("1.0.0".to_string()));

        Self {
            servers: vec![ServerConfig {
                name: "sqlite-database".to_string(),
                script_path: "dbchat-server".to_string(),
                enabled: true,
                timeout: 30,
                max_retries: 3,
                health_check_interval: 60,
                metadata,
            }],
            log_level: default_log_level(),
        }
    }
}

/// Load the registry from `path`, synthesizing and persisting the default
/// document when the file does not exist. A file that exists but does not
/// parse is a fatal configuration error; no safe default can be inferred
/// from a corrupt registry.
pub fn load_or_init(path: &Path) -> Result<RegistryFile> {
    if path.exists() {
        info!(path = %path.display(), "loading backend registry");
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("malformed registry {}: {}", path.display(), e)))
    } else {
        info!(path = %path.display(), "creating default backend registry");
        let registry = RegistryFile::default();
        write_registry(path, &registry)?;
        Ok(registry)
    }
}

fn write_registry(path: &Path, registry: &RegistryFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
    }
    let content = serde_json::to_string_pretty(registry)?;
    std::fs::write(path, content)
        .map_err(|e| Error::Config(format!("failed to write {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_points_at_bundled_backend() {
        let registry = RegistryFile::default();
        assert_eq!(registry.servers.len(), 1);

        let server = &registry.servers[0];
        assert_eq!(server.name, "sqlite-database");
        assert_eq!(server.script_path, "dbchat-server");
        assert!(server.enabled);
        assert_eq!(server.timeout, 30);
        assert_eq!(server.max_retries, 3);
        assert_eq!(server.health_check_interval, 60);
        assert_eq!(registry.log_level, "info");
    }

    #[test]
    fn absent_file_synthesizes_and_persists_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("mcp.json");

        let registry = load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(registry, RegistryFile::default());

        // Round-trip: the persisted file parses back to the same value.
        let reloaded = load_or_init(&path).unwrap();
        assert_eq!(reloaded, registry);
    }

    #[test]
    fn load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.json");
        std::fs::write(
            &path,
            r#"{"servers": [{"name": "custom", "script_path": "/opt/backend"}], "log_level": "debug"}"#,
        )
        .unwrap();

        let first = load_or_init(&path).unwrap();
        let second = load_or_init(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.servers[0].name, "custom");
        assert_eq!(first.log_level, "debug");
    }

    #[test]
    fn omitted_fields_take_documented_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.json");
        std::fs::write(
            &path,
            r#"{"servers": [{"name": "bare", "script_path": "backend"}]}"#,
        )
        .unwrap();

        let registry = load_or_init(&path).unwrap();
        let server = &registry.servers[0];
        assert!(server.enabled);
        assert_eq!(server.timeout, 30);
        assert_eq!(server.max_retries, 3);
        assert_eq!(server.health_check_interval, 60);
        assert!(server.metadata.is_empty());
        assert_eq!(registry.log_level, "info");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_or_init(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn python_scripts_launch_under_python() {
        let mut server = RegistryFile::default().servers.remove(0);
        server.script_path = "servers/backend.py".to_string();
        assert_eq!(
            server.launch_command(),
            (
                "python".to_string(),
                vec!["servers/backend.py".to_string()]
            )
        );

        server.script_path = "dbchat-server".to_string();
        assert_eq!(
            server.launch_command(),
            ("dbchat-server".to_string(), Vec::new())
        );
    }
}
