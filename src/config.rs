// Node configuration: one field per YAML key, loaded with serde_yaml.

use serde::{Deserialize, Serialize};

use crate::crypto::keys::Curve;

pub const DATA_DIR: &str = ".ironledger/mainnet";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("could not parse config file {path}: {source}")]
    Parse { path: String, source: serde_yaml::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NodeConfig {
    pub curve: Curve,
    pub mining_threads: usize,
    pub broadcast_queue_len: usize,
    pub mining_capacity: usize,
    pub mining_interval: u64,
    pub mining_ttl: u64,
    pub protocol: String,
    pub max_neighbors: usize,
    pub update_time_base: u64,
    pub update_time_rand: u64,
    pub register_address: String,
    pub register_protocol: String,
    pub listener_port: u16,
    pub debug_path: Option<String>,
    pub info_path: Option<String>,
    pub local_mode: bool,
    pub ui_port: Option<u16>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            curve: Curve::P224,
            mining_threads: 4,
            broadcast_queue_len: 256,
            mining_capacity: 200,
            mining_interval: 10,
            mining_ttl: 3600,
            protocol: "http".to_string(),
            max_neighbors: 12,
            update_time_base: 30,
            update_time_rand: 10,
            register_address: "registry.ironledger.example:9999".to_string(),
            register_protocol: "http".to_string(),
            listener_port: 9000,
            debug_path: None,
            info_path: None,
            local_mode: false,
            ui_port: None,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_string(), source })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
    }

    pub fn data_dir() -> std::path::PathBuf {
        std::path::PathBuf::from(resolve_home_dir()).join(DATA_DIR)
    }
}

fn resolve_home_dir() -> String {
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return home;
        }
    }
    #[cfg(windows)]
    {
        if let Ok(home) = std::env::var("USERPROFILE") {
            if !home.trim().is_empty() {
                return home;
            }
        }
        let drive = std::env::var("HOMEDRIVE").unwrap_or_default();
        let path = std::env::var("HOMEPATH").unwrap_or_default();
        if !drive.is_empty() || !path.is_empty() {
            return format!("{drive}{path}");
        }
    }
    ".".to_string()
}
