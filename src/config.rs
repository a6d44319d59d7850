//! Configuration management for Board.
//!
//! This module handles loading and saving application configuration to/from
//! a JSON file in a caller-supplied directory.
//!
//! Includes the connection configuration the adapters need:
//! - store_url: base URL of the board server (absent = HTTP adapters refuse
//!   to construct; data operations cannot proceed without it)
//! - api_key: optional bearer token sent with every request
//! - client_id: UUID7 identifying this client (generated on first run)
//! - client_name: human-readable client name

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BoardError, BoardResult};
use crate::validation::validate_client_id;

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_server_port() -> u16 {
    8460
}

fn generate_client_id() -> String {
    Uuid::now_v7().simple().to_string()
}

fn default_client_name() -> String {
    "Board client".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigData {
    /// Base URL of the board server (e.g. "http://localhost:8460")
    #[serde(default)]
    pub store_url: Option<String>,
    /// Bearer token sent with every request, if the server requires one
    #[serde(default)]
    pub api_key: Option<String>,
    /// Client ID (UUID7 hex)
    #[serde(default = "generate_client_id")]
    pub client_id: String,
    /// Human-readable client name
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Change-feed polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Port the board server listens on
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Directory where the board server persists uploaded files
    #[serde(default)]
    pub files_dir: Option<String>,
    /// Public base URL used in file links handed back to clients
    /// (defaults to http://localhost:<server_port>)
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            store_url: None,
            api_key: None,
            client_id: generate_client_id(),
            client_name: default_client_name(),
            poll_interval_ms: default_poll_interval_ms(),
            server_port: default_server_port(),
            files_dir: None,
            public_url: None,
        }
    }
}

/// Configuration manager
pub struct Config {
    config_dir: PathBuf,
    config_file: PathBuf,
    data: ConfigData,
}

impl Config {
    /// Create a new configuration manager rooted at `config_dir`.
    ///
    /// Loads config.json when present; otherwise writes one with defaults.
    /// An unreadable or malformed file falls back to defaults rather than
    /// failing startup.
    pub fn new(config_dir: impl Into<PathBuf>) -> BoardResult<Self> {
        let config_dir = config_dir.into();
        fs::create_dir_all(&config_dir)?;
        let config_file = config_dir.join("config.json");

        let data = if config_file.exists() {
            match fs::read_to_string(&config_file) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => ConfigData::default(),
            }
        } else {
            ConfigData::default()
        };

        let config = Self {
            config_dir,
            config_file,
            data,
        };

        if !config.config_file.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> BoardResult<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Base URL of the board server, if configured
    pub fn store_url(&self) -> Option<&str> {
        self.data.store_url.as_deref()
    }

    /// Set the board server base URL
    pub fn set_store_url(&mut self, url: &str) -> BoardResult<()> {
        self.data.store_url = Some(url.trim_end_matches('/').to_string());
        self.save()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.data.api_key.as_deref()
    }

    pub fn set_api_key(&mut self, key: &str) -> BoardResult<()> {
        self.data.api_key = Some(key.to_string());
        self.save()
    }

    /// Get the client ID as a UUID
    pub fn client_id(&self) -> BoardResult<Uuid> {
        Uuid::parse_str(&self.data.client_id)
            .map_err(|e| BoardError::Config(format!("Invalid client_id: {}", e)))
    }

    /// Get the client ID as a hex string
    pub fn client_id_hex(&self) -> &str {
        &self.data.client_id
    }

    pub fn client_name(&self) -> &str {
        &self.data.client_name
    }

    pub fn set_client_name(&mut self, name: &str) -> BoardResult<()> {
        self.data.client_name = name.to_string();
        self.save()
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.data.poll_interval_ms
    }

    pub fn server_port(&self) -> u16 {
        self.data.server_port
    }

    pub fn set_server_port(&mut self, port: u16) -> BoardResult<()> {
        self.data.server_port = port;
        self.save()
    }

    /// Directory where the server persists uploaded files
    pub fn files_dir(&self) -> Option<&str> {
        self.data.files_dir.as_deref()
    }

    pub fn set_files_dir(&mut self, path: &str) -> BoardResult<()> {
        self.data.files_dir = Some(path.to_string());
        self.save()
    }

    /// Public base URL for file links
    pub fn public_url(&self) -> String {
        match &self.data.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.data.server_port),
        }
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "store_url" => self.data.store_url.clone(),
            "api_key" => self.data.api_key.clone(),
            "client_id" => Some(self.data.client_id.clone()),
            "client_name" => Some(self.data.client_name.clone()),
            "files_dir" => self.data.files_dir.clone(),
            "public_url" => self.data.public_url.clone(),
            _ => None,
        }
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> BoardResult<()> {
        match key {
            "store_url" => self.data.store_url = Some(value.trim_end_matches('/').to_string()),
            "api_key" => self.data.api_key = Some(value.to_string()),
            "client_id" => {
                validate_client_id(value)?;
                self.data.client_id = value.to_string();
            }
            "client_name" => self.data.client_name = value.to_string(),
            "files_dir" => self.data.files_dir = Some(value.to_string()),
            "public_url" => self.data.public_url = Some(value.to_string()),
            _ => return Err(BoardError::Config(format!("Unknown config key: {}", key))),
        }
        self.save()
    }
}
