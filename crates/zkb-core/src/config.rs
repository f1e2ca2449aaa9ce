use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ZkbError, ZkbResult};
use crate::limits::JSON_BODY_LIMIT;

/// Top-level configuration (loaded from zkb.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkbConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub crypto: CryptoConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address for the proof API (default: 127.0.0.1:3001)
    pub listen: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9101)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Maximum JSON request body in bytes
    pub body_limit_bytes: usize,
    /// Production mode refuses to start without configured tokens
    pub production: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file mirroring the proof store (memory only when unset)
    pub path: Option<PathBuf>,
}

/// Bearer token table. Session handling lives outside this service; each
/// token stands for one authenticated owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// token → owner id
    pub tokens: BTreeMap<String, String>,
}

/// Password key derivation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// File holding the local key derivation salt
    pub salt_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the proof server, without the `/api` suffix
    pub api_base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".into(),
            metrics_addr: Some("127.0.0.1:9101".into()),
            log_level: "info".into(),
            log_format: "text".into(),
            body_limit_bytes: JSON_BODY_LIMIT,
            production: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            salt_file: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3001".into(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl ZkbConfig {
    pub fn from_toml_str(s: &str) -> ZkbResult<Self> {
        toml::from_str(s).map_err(|e| ZkbError::Config(e.to_string()))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> ZkbResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| ZkbError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde defaults cannot express.
    pub fn validate(&self) -> ZkbResult<()> {
        if self.server.production && self.auth.tokens.is_empty() {
            return Err(ZkbError::Config(
                "production mode requires at least one entry in [auth.tokens]".into(),
            ));
        }
        if self.auth.tokens.iter().any(|(t, o)| t.trim().is_empty() || o.trim().is_empty()) {
            return Err(ZkbError::Config("auth tokens and owner ids must be non-empty".into()));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ZkbError::Config("server.body_limit_bytes must be positive".into()));
        }
        Ok(())
    }
}
