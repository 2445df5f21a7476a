// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use config::{Config, ConfigError, Environment, File};
use lazy_static::lazy_static;
use log::error;
use serde::{Deserialize, Serialize};
use std::fs::{metadata, File as FsFile};
use std::io::Write;
use std::path::PathBuf;

lazy_static! {
    pub static ref SETTINGS: Settings = Settings::new().unwrap();
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Node settings.
    pub node: Node,

    /// RPC settings.
    pub rpc: Rpc,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Node {
    /// Network to run on. One of `main`, `test`, `signet`, `regtest`.
    pub network_name: String,

    /// Data directory. Defaults to the platform data dir.
    pub data_dir: String,

    /// Maintain the deadpool index
    pub deadpool_index: bool,

    /// Announcement database cache size in MiB
    pub announce_db_cache_mb: u64,
}

impl Default for Node {
    fn default() -> Self {
        let mut data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        data_dir.push("Factorn");

        Self {
            network_name: "main".to_owned(),
            data_dir: data_dir.to_str().unwrap_or(".").to_owned(),
            deadpool_index: true,
            announce_db_cache_mb: 16,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Rpc {
    /// Enable the RPC server
    pub rpc_enabled: bool,

    /// RPC listen address
    pub rpc_listen: String,

    /// RPC username
    pub rpc_username: String,

    /// RPC password
    pub rpc_password: String,
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            rpc_enabled: true,
            rpc_listen: "127.0.0.1:30032".to_owned(),
            rpc_username: "factorn".to_owned(),
            rpc_password: "factorn".to_owned(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut config_path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_path.push("Factorn");
        let config_dir = config_path.clone();
        config_path.push("config.toml");

        if metadata(&config_path).is_err() {
            // Write a default configuration for discoverability. If
            // this fails we fall back to environment variables.
            let default_settings = Settings::default();
            let settings_str = toml::ser::to_string_pretty(&default_settings).unwrap();

            let _ = std::fs::create_dir_all(&config_dir);
            match FsFile::create(&config_path) {
                Ok(mut file) => {
                    file.write_all(settings_str.as_bytes()).unwrap_or(());
                }
                Err(err) => {
                    error!("Failed to create configuration! Reason: {err:#?}");
                }
            }
        }

        let builder = Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(Environment::with_prefix("factorn").separator("__"));

        let config = builder.build()?;

        Ok(Self {
            node: config.get("node").unwrap_or_default(),
            rpc: config.get("rpc").unwrap_or_default(),
        })
    }

    /// Directory of the deadpool index database
    #[must_use]
    pub fn deadpool_index_dir(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.node.data_dir);
        path.push(&self.node.network_name);
        path.push("indexes");
        path.push("deadpool");
        path
    }

    /// Directory of the announcement database
    #[must_use]
    pub fn announce_db_dir(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.node.data_dir);
        path.push(&self.node.network_name);
        path.push("announcedb");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.node.network_name, "main");
        assert!(settings.node.deadpool_index);
        assert!(settings.rpc.rpc_enabled);
    }

    #[test]
    fn database_paths_nest_under_network() {
        let mut settings = Settings::default();
        settings.node.data_dir = "/tmp/factorn".to_owned();
        settings.node.network_name = "regtest".to_owned();

        assert_eq!(
            settings.deadpool_index_dir(),
            PathBuf::from("/tmp/factorn/regtest/indexes/deadpool")
        );
        assert_eq!(
            settings.announce_db_dir(),
            PathBuf::from("/tmp/factorn/regtest/announcedb")
        );
    }
}
