//! Configuration management for the faucet server.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `FAUCET_*` environment variables, then the plain `PRIVATE_KEY` and `PORT`
//! variables used by existing deployments.

use alloy::primitives::{utils::parse_ether, U256};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default testnet RPC endpoint
pub const DEFAULT_RPC_URL: &str =
    "https://api.zan.top/node/v1/pharos/testnet/c6239098ec02412fbe1126bf461cd2d6";

/// Upper bound for `security.cleanup_interval_minutes` (one week)
pub const MAX_CLEANUP_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Configuration for the faucet server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetConfig {
    /// HTTP server configuration
    pub http: HttpConfig,

    /// Blockchain and transfer configuration
    pub ethereum: EthereumConfig,

    /// Cooldown and housekeeping configuration
    pub security: SecurityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Port to bind to
    pub port: u16,

    /// Address to bind to
    pub bind_address: String,

    /// The only origin allowed to call the faucet from a browser
    pub allowed_origin: String,
}

/// Blockchain and transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumConfig {
    /// RPC endpoint URL
    pub rpc_url: String,

    /// Private key of the faucet wallet (hex, with or without 0x prefix)
    pub private_key: String,

    /// Amount sent per request, in ether units (decimal string)
    pub amount_eth: String,

    /// Gas limit of each transfer
    pub gas_limit: u64,

    /// Gas price of each transfer, in gwei
    pub gas_price_gwei: u64,
}

/// Cooldown and housekeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Minimum hours between two transfers to the same address
    pub cooldown_hours: u64,

    /// Interval between cleanup passes over expired cooldown records
    pub cleanup_interval_minutes: u64,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                port: 3000,
                bind_address: "0.0.0.0".to_string(),
                allowed_origin: "https://brokex.trade".to_string(),
            },
            ethereum: EthereumConfig {
                rpc_url: DEFAULT_RPC_URL.to_string(),
                private_key: String::new(),
                amount_eth: "0.1".to_string(),
                gas_limit: 21_000,
                gas_price_gwei: 1,
            },
            security: SecurityConfig {
                cooldown_hours: 24,
                cleanup_interval_minutes: 60,
            },
        }
    }
}

impl FaucetConfig {
    /// Load configuration from defaults, an optional TOML file and the environment.
    ///
    /// A missing file is not an error: the service can be configured from the
    /// environment alone.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&FaucetConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        // An empty PORT counts as unset
        let port = match std::env::var("PORT") {
            Ok(port) if !port.trim().is_empty() => {
                Some(i64::from(port.trim().parse::<u16>().map_err(|e| {
                    config::ConfigError::Message(format!("Invalid PORT '{}': {}", port, e))
                })?))
            }
            _ => None,
        };

        builder
            .add_source(
                config::Environment::with_prefix("FAUCET")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("ethereum.private_key", std::env::var("PRIVATE_KEY").ok())?
            .set_override_option("http.port", port)?
            .build()?
            .try_deserialize()
    }

    /// Load configuration from a TOML file, which must exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&FaucetConfig::default())?)
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let key = self.ethereum.private_key.trim();
        if key.is_empty() {
            return Err(anyhow::anyhow!("PRIVATE_KEY is not set"));
        }

        let key = key.strip_prefix("0x").unwrap_or(key);
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Private key must be 64 hex characters"));
        }

        url::Url::parse(&self.ethereum.rpc_url)
            .map_err(|e| anyhow::anyhow!("Invalid RPC URL '{}': {}", self.ethereum.rpc_url, e))?;

        if self.amount_wei()? == U256::ZERO {
            return Err(anyhow::anyhow!("Transfer amount must be positive"));
        }

        if self.ethereum.gas_limit == 0 {
            return Err(anyhow::anyhow!("Gas limit must be greater than 0"));
        }

        if self.security.cooldown_hours == 0 {
            return Err(anyhow::anyhow!("Cooldown must be greater than 0"));
        }

        if self.security.cleanup_interval_minutes == 0 {
            return Err(anyhow::anyhow!("Cleanup interval must be greater than 0"));
        }

        if self.security.cleanup_interval_minutes > MAX_CLEANUP_INTERVAL_MINUTES {
            return Err(anyhow::anyhow!(
                "Cleanup interval must be at most {} minutes",
                MAX_CLEANUP_INTERVAL_MINUTES
            ));
        }

        axum::http::HeaderValue::from_str(&self.http.allowed_origin).map_err(|e| {
            anyhow::anyhow!("Invalid allowed origin '{}': {}", self.http.allowed_origin, e)
        })?;

        Ok(())
    }

    /// Transfer amount converted to wei
    pub fn amount_wei(&self) -> anyhow::Result<U256> {
        parse_ether(&self.ethereum.amount_eth).map_err(|e| {
            anyhow::anyhow!("Invalid transfer amount '{}': {}", self.ethereum.amount_eth, e)
        })
    }

    /// Gas price converted to wei
    pub fn gas_price_wei(&self) -> u128 {
        self.ethereum.gas_price_gwei as u128 * 1_000_000_000
    }
}
