use chaos::{ChaosConfig, ChaosError, ChaosMonkey, FaultInjector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid chaos configuration: {0}")]
    Chaos(#[from] ChaosError),
}

/// Per-connection settings shared by every [Session](crate::Session).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Name announced to peers and stamped into `Received` headers
    #[serde(default = "SessionConfig::default_hostname")]
    pub hostname: String,

    /// Upper bound on the number of bytes taken from the socket per read
    #[serde(default = "SessionConfig::default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// How long a single read may block. Unbounded when unset.
    #[serde(default, with = "humantime_serde")]
    pub read_timeout: Option<Duration>,

    /// How long a single reply may take to transmit. Unbounded when unset.
    #[serde(default, with = "humantime_serde")]
    pub write_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hostname: Self::default_hostname(),
            read_chunk_size: Self::default_read_chunk_size(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl SessionConfig {
    fn default_hostname() -> String {
        let name = gethostname::gethostname().to_string_lossy().into_owned();
        if name.is_empty() {
            "localhost".to_string()
        } else {
            name
        }
    }

    fn default_read_chunk_size() -> usize {
        1024
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_listen")]
    pub listen: String,

    #[serde(default)]
    pub session: SessionConfig,

    /// Fault injection is disabled unless this table is present
    #[serde(default)]
    pub chaos: Option<ChaosConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            session: SessionConfig::default(),
            chaos: None,
        }
    }
}

impl ServerConfig {
    fn default_listen() -> String {
        "0.0.0.0:1025".to_string()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        if let Some(chaos) = &config.chaos {
            chaos.validate()?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Build the fault injector described by the `chaos` table, if any
    pub fn fault_injector(&self) -> Result<Option<Arc<dyn FaultInjector>>, ConfigError> {
        match &self.chaos {
            Some(chaos) => {
                let monkey: Arc<dyn FaultInjector> = Arc::new(ChaosMonkey::new(chaos.clone())?);
                Ok(Some(monkey))
            }
            None => Ok(None),
        }
    }
}
