//! Deployment configuration

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use supertoken_chain::ChainConfig;
use supertoken_core::Address;

/// Known contracts of one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Human-readable network name
    pub name: String,

    /// SuperTokenFactory deployed on this network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_token_factory: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Account that sends transactions unless overridden
    pub deployer: Address,

    /// Where the local chain journals its transactions; no persistence when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,

    /// Local chain settings
    pub chain: ChainConfig,

    /// Networks keyed by chain id
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self::default_local()
    }
}

impl DeployConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&config_str)
    }

    /// Load the file if it exists, otherwise use the local defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using local defaults", path.display());
            Ok(Self::default_local())
        }
    }

    pub fn parse(config_str: &str) -> Result<Self, DeployError> {
        toml::from_str(config_str)
            .map_err(|e| DeployError::Config(format!("Failed to parse config TOML: {}", e)))
    }

    /// Configuration of a local development chain
    pub fn default_local() -> Self {
        let chain = ChainConfig::default();
        let mut networks = BTreeMap::new();
        networks.insert(
            chain.chain_id.to_string(),
            NetworkConfig {
                name: "local".to_string(),
                super_token_factory: None,
            },
        );

        Self {
            deployer: Address::from_label("deployer"),
            journal_path: Some(PathBuf::from("supertoken.journal")),
            chain,
            networks,
        }
    }

    /// Write the default config to `path`
    pub fn write_default(path: impl AsRef<Path>) -> Result<(), DeployError> {
        let path = path.as_ref();
        let toml_str = toml::to_string_pretty(&Self::default_local())
            .map_err(|e| DeployError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_str).map_err(|e| {
            DeployError::Config(format!("Failed to write config to {}: {}", path.display(), e))
        })?;

        log::info!("Created default config at {}", path.display());
        Ok(())
    }

    pub fn network(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.get(&chain_id.to_string())
    }

    /// Factory configured for `chain_id`, if any
    pub fn factory_for(&self, chain_id: u64) -> Option<Address> {
        self.network(chain_id)?.super_token_factory
    }
}
