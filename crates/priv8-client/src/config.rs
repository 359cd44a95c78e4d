//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Storage gateway endpoint URL
    pub storage_endpoint: String,
    /// Key network relay endpoint URL
    pub network_endpoint: String,
    /// Key network name
    pub network: String,
    /// Chain used when none can be derived from conditions
    pub default_chain: String,
    /// Domain written into sign-in statements
    pub session_domain: String,
    /// URI written into sign-in statements
    pub session_uri: String,
    /// Lifetime requested for session credentials
    pub session_ttl: Duration,
    /// Request timeout per network round trip
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Prefix for generated object names
    pub object_name_prefix: String,
    /// Where the last-upload pointer is kept; in memory when `None`
    pub state_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_endpoint: "http://localhost:8000".to_string(),
            network_endpoint: "http://localhost:7470".to_string(),
            network: "datil-dev".to_string(),
            default_chain: "ethereum".to_string(),
            session_domain: "localhost".to_string(),
            session_uri: "lit:session:priv8".to_string(),
            session_ttl: Duration::from_secs(10 * 60),
            timeout: Duration::from_secs(30),
            user_agent: format!("priv8-client/{}", env!("CARGO_PKG_VERSION")),
            object_name_prefix: "encrypted_".to_string(),
            state_file: None,
        }
    }
}

impl Config {
    /// Create a new config with the given storage endpoint
    pub fn new(storage_endpoint: impl Into<String>) -> Self {
        Self {
            storage_endpoint: storage_endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the key network endpoint
    pub fn with_network_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.network_endpoint = endpoint.into();
        self
    }

    /// Set the key network name
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Set the default chain
    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.default_chain = chain.into();
        self
    }

    /// Set the session lifetime
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist the last-upload pointer to a file
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Set the generated object name prefix
    pub fn with_object_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.object_name_prefix = prefix.into();
        self
    }

    /// Session lifetime as a chrono duration
    pub fn session_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_ttl).unwrap_or_else(|_| chrono::Duration::minutes(10))
    }
}
