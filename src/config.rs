use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;
use crate::irc::session::QUEUE_SIZE;
use crate::maps::MapProvider;

/// Top-level gateway configuration, loaded from whapp-irc.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub storage: StorageSection,
    pub bridge: BridgeSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub irc_address: String,
    /// Where the stored media files are served over HTTP.
    pub web_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            irc_address: "0.0.0.0:6060".into(),
            web_address: "0.0.0.0:3000".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:whapp-irc.db?mode=rwc".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub file_dir: String,
    /// Public URL prefix of `file_dir`, as linked in relayed messages.
    pub file_base_url: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            file_dir: "files".into(),
            file_base_url: "http://localhost:3000/files".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub map_provider: MapProvider,
    /// Capacity of each session's inbound IRC command queue.
    pub inbound_queue_size: usize,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            map_provider: MapProvider::default(),
            inbound_queue_size: QUEUE_SIZE,
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("IRC_ADDRESS") {
            self.server.irc_address = v;
        }
        if let Ok(v) = std::env::var("WEB_ADDRESS") {
            self.server.web_address = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("FILE_DIR") {
            self.storage.file_dir = v;
        }
        if let Ok(v) = std::env::var("FILE_BASE_URL") {
            self.storage.file_base_url = v;
        }
        if let Ok(v) = std::env::var("MAP_PROVIDER")
            && let Ok(provider) = v.parse()
        {
            self.bridge.map_provider = provider;
        }
        if let Ok(v) = std::env::var("INBOUND_QUEUE_SIZE")
            && let Ok(size) = v.parse()
        {
            self.bridge.inbound_queue_size = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: [&str; 7] = [
        "IRC_ADDRESS",
        "WEB_ADDRESS",
        "DATABASE_URL",
        "FILE_DIR",
        "FILE_BASE_URL",
        "MAP_PROVIDER",
        "INBOUND_QUEUE_SIZE",
    ];

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _lock = ENV_LOCK.lock().unwrap();

        let originals: Vec<_> = KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for key in &KEYS {
            unsafe { std::env::remove_var(key); }
        }

        for (k, v) in vars {
            unsafe { std::env::set_var(k, v); }
        }

        f();

        for (k, v) in originals {
            match v {
                Some(val) => unsafe { std::env::set_var(k, val) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whapp-irc.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path.to_string_lossy().into_owned())
    }

    #[test]
    fn test_defaults_when_no_file() {
        with_env(&[], || {
            let config = GatewayConfig::load("/nonexistent/whapp-irc.toml").unwrap();
            assert_eq!(config.server.irc_address, "0.0.0.0:6060");
            assert_eq!(config.server.web_address, "0.0.0.0:3000");
            assert_eq!(config.database.url, "sqlite:whapp-irc.db?mode=rwc");
            assert_eq!(config.storage.file_dir, "files");
            assert_eq!(config.storage.file_base_url, "http://localhost:3000/files");
            assert_eq!(config.bridge.map_provider, MapProvider::OpenStreetMap);
            assert_eq!(config.bridge.inbound_queue_size, 10);
        });
    }

    #[test]
    fn test_file_values_with_partial_sections() {
        let (_dir, path) = write_config(
            r#"
[server]
irc_address = "127.0.0.1:6667"

[bridge]
map_provider = "google-maps"
"#,
        );
        with_env(&[], || {
            let config = GatewayConfig::load(&path).unwrap();
            assert_eq!(config.server.irc_address, "127.0.0.1:6667");
            assert_eq!(config.server.web_address, "0.0.0.0:3000");
            assert_eq!(config.bridge.map_provider, MapProvider::GoogleMaps);
            assert_eq!(config.bridge.inbound_queue_size, 10);
        });
    }

    #[test]
    fn test_env_overrides_file() {
        let (_dir, path) = write_config("[storage]\nfile_dir = \"/srv/files\"\n");
        with_env(
            &[
                ("FILE_DIR", "/var/lib/whapp-irc"),
                ("MAP_PROVIDER", "apple-maps"),
                ("INBOUND_QUEUE_SIZE", "32"),
            ],
            || {
                let config = GatewayConfig::load(&path).unwrap();
                assert_eq!(config.storage.file_dir, "/var/lib/whapp-irc");
                assert_eq!(config.bridge.map_provider, MapProvider::AppleMaps);
                assert_eq!(config.bridge.inbound_queue_size, 32);
            },
        );
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        with_env(
            &[("MAP_PROVIDER", "bing"), ("INBOUND_QUEUE_SIZE", "lots")],
            || {
                let config = GatewayConfig::load("/nonexistent/whapp-irc.toml").unwrap();
                assert_eq!(config.bridge.map_provider, MapProvider::OpenStreetMap);
                assert_eq!(config.bridge.inbound_queue_size, 10);
            },
        );
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let (_dir, path) = write_config("[server\nirc_address = ");
        with_env(&[], || {
            let err = GatewayConfig::load(&path).unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
        });
    }
}
