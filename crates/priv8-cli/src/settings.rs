//! Layered CLI settings
//!
//! Defaults, then an optional `priv8.toml`, then `PRIV8_*` environment
//! variables. Command-line flags are applied on top by the binary.

use priv8_client::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file looked up when `--config` is not given
pub const DEFAULT_SETTINGS_FILE: &str = "priv8.toml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_endpoint: String,
    pub network_endpoint: String,
    pub network: String,
    pub chain: String,
    pub session_uri: String,
    pub session_ttl_secs: u64,
    pub timeout_secs: u64,
    pub object_name_prefix: String,
    pub state_file: Option<PathBuf>,
    /// Balance credited to the wallet by the offline network
    pub offline_balance_wei: String,
}

impl Default for Settings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            storage_endpoint: config.storage_endpoint,
            network_endpoint: config.network_endpoint,
            network: config.network,
            chain: config.default_chain,
            session_uri: config.session_uri,
            session_ttl_secs: config.session_ttl.as_secs(),
            timeout_secs: config.timeout.as_secs(),
            object_name_prefix: config.object_name_prefix,
            state_file: Some(PathBuf::from(".priv8/state.json")),
            offline_balance_wei: "1000000000000000000".to_string(),
        }
    }
}

impl Settings {
    /// Load from `path` (if it exists) and the `PRIV8_` environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_SETTINGS_FILE));
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("PRIV8").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Client configuration for these settings
    pub fn client_config(&self) -> Config {
        let mut config = Config::new(self.storage_endpoint.clone())
            .with_network_endpoint(self.network_endpoint.clone())
            .with_network(self.network.clone())
            .with_chain(self.chain.clone())
            .with_session_ttl(Duration::from_secs(self.session_ttl_secs))
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_object_name_prefix(self.object_name_prefix.clone());
        config.session_uri = self.session_uri.clone();
        if let Some(path) = &self.state_file {
            config = config.with_state_file(path);
        }
        config
    }
}
