// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{LockError, Result};

/// Default lock table connection name
/// Default value: lockmgrConn
pub const DEFAULT_CONNECTION_NAME: &str = "lockmgrConn";

/// Database endpoint used when no connection id is configured
/// Default value: RASBASE:5432
pub const DEFAULT_DB_CONNECTION_ID: &str = "RASBASE:5432";

/// Minimum run length locked with a single range call
/// Default value: 10
pub const DEFAULT_BULK_THRESHOLD: usize = 10;

/// Maximum server identity length in bytes
/// Default value: 255
pub const DEFAULT_MAX_IDENTITY_LEN: usize = 255;

/// Placeholder for an absent management host
pub const DEFAULT_RASMGR_HOST: &str = "defaultRasmgrHost";

/// Placeholder for an absent server name
pub const DEFAULT_SERVER_NAME: &str = "defaultServer";

/// Environment variable: RASDAMAN_DB_CONNECTION_ID
pub const ENV_DB_CONNECTION_ID: &str = "RASDAMAN_DB_CONNECTION_ID";
/// Environment variable: RASDAMAN_DB_USER
pub const ENV_DB_USER: &str = "RASDAMAN_DB_USER";
/// Environment variable: RASDAMAN_DB_PASSWORD
pub const ENV_DB_PASSWORD: &str = "RASDAMAN_DB_PASSWORD";
/// Environment variable: RASDAMAN_RASMGR_HOST
pub const ENV_RASMGR_HOST: &str = "RASDAMAN_RASMGR_HOST";
/// Environment variable: RASDAMAN_RASMGR_PORT
pub const ENV_RASMGR_PORT: &str = "RASDAMAN_RASMGR_PORT";
/// Environment variable: RASDAMAN_SERVER_NAME
pub const ENV_SERVER_NAME: &str = "RASDAMAN_SERVER_NAME";
/// Environment variable: RASDAMAN_LISTEN_PORT
pub const ENV_LISTEN_PORT: &str = "RASDAMAN_LISTEN_PORT";

/// Server process configuration consulted by the lock manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Lock table database connection id (`host:port` style)
    #[serde(default)]
    pub db_connection_id: Option<String>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    /// Management (rasmgr) host
    #[serde(default)]
    pub rasmgr_host: Option<String>,
    #[serde(default)]
    pub rasmgr_port: u16,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub listen_port: u16,
}

/// Database endpoint and credentials resolved from a [`ServerConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbEndpoint {
    pub connection_id: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ServerConfig {
    pub fn new(rasmgr_host: impl Into<String>, rasmgr_port: u16, server_name: impl Into<String>, listen_port: u16) -> Self {
        Self {
            rasmgr_host: Some(rasmgr_host.into()),
            rasmgr_port,
            server_name: Some(server_name.into()),
            listen_port,
            ..Default::default()
        }
    }

    pub fn with_database(
        mut self,
        connection_id: impl Into<String>,
        user: Option<impl Into<String>>,
        password: Option<impl Into<String>>,
    ) -> Self {
        self.db_connection_id = Some(connection_id.into());
        self.db_user = user.map(Into::into);
        self.db_password = password.map(Into::into);
        self
    }

    /// Configured endpoint, or the default endpoint without credentials
    pub fn db_endpoint(&self) -> DbEndpoint {
        match &self.db_connection_id {
            Some(connection_id) => DbEndpoint {
                connection_id: connection_id.clone(),
                user: self.db_user.clone(),
                password: self.db_password.clone(),
            },
            None => DbEndpoint {
                connection_id: DEFAULT_DB_CONNECTION_ID.to_string(),
                user: None,
                password: None,
            },
        }
    }

    /// Read the configuration from `RASDAMAN_*` environment variables
    pub fn from_env() -> Self {
        Self {
            db_connection_id: get_env_opt_str(ENV_DB_CONNECTION_ID),
            db_user: get_env_opt_str(ENV_DB_USER),
            db_password: get_env_opt_str(ENV_DB_PASSWORD),
            rasmgr_host: get_env_opt_str(ENV_RASMGR_HOST),
            rasmgr_port: get_env_u16(ENV_RASMGR_PORT, 0),
            server_name: get_env_opt_str(ENV_SERVER_NAME),
            listen_port: get_env_u16(ENV_LISTEN_PORT, 0),
        }
    }
}

fn get_env_opt_str(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_env_u16(key: &str, default: u16) -> u16 {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Source of the server configuration, consulted afresh on every lock operation
pub trait ConfigProvider: Send + Sync {
    fn server_config(&self) -> ServerConfig;
}

impl ConfigProvider for ServerConfig {
    fn server_config(&self) -> ServerConfig {
        self.clone()
    }
}

/// Configuration that can be replaced while the lock manager runs
#[derive(Debug, Default)]
pub struct SharedServerConfig {
    inner: RwLock<ServerConfig>,
}

impl SharedServerConfig {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn replace(&self, config: ServerConfig) {
        *self.inner.write() = config;
    }

    pub fn update(&self, f: impl FnOnce(&mut ServerConfig)) {
        f(&mut self.inner.write());
    }
}

impl ConfigProvider for SharedServerConfig {
    fn server_config(&self) -> ServerConfig {
        self.inner.read().clone()
    }
}

/// Configuration read from the environment on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigProvider for EnvConfig {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::from_env()
    }
}

/// Lock manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockManagerConfig {
    /// Name of the lock table connection
    #[serde(default = "default_connection_name")]
    pub connection_name: String,

    /// Minimum run length locked with a single range call
    #[serde(default = "default_bulk_threshold")]
    pub bulk_threshold: usize,

    /// Maximum server identity length in bytes
    #[serde(default = "default_max_identity_len")]
    pub max_identity_len: usize,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            connection_name: default_connection_name(),
            bulk_threshold: default_bulk_threshold(),
            max_identity_len: default_max_identity_len(),
        }
    }
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION_NAME.to_string()
}

fn default_bulk_threshold() -> usize {
    DEFAULT_BULK_THRESHOLD
}

fn default_max_identity_len() -> usize {
    DEFAULT_MAX_IDENTITY_LEN
}

impl LockManagerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.connection_name.is_empty() {
            return Err(LockError::configuration("Connection name must not be empty"));
        }

        if self.bulk_threshold == 0 {
            return Err(LockError::configuration("Bulk threshold must be greater than zero"));
        }

        if self.max_identity_len == 0 {
            return Err(LockError::configuration("Maximum identity length must be greater than zero"));
        }

        Ok(())
    }
}
