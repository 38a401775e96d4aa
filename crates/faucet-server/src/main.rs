//! Main entry point for the faucet server.

use anyhow::Result;
use clap::{Arg, Command};
use faucet_server::{config::FaucetConfig, http::start_server};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let matches = Command::new("faucet-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Testnet Faucet Server - Send a fixed amount to an address once per cooldown window")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to an optional configuration file")
                .default_value("faucet-config.toml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a default configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("faucet-config.toml");

    if matches.get_flag("generate-config") {
        return generate_config(config_path);
    }

    info!("Starting Faucet Server v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // A missing private key must stop the process before any port is bound
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!("Configuration loaded and validated successfully");
    info!("Server will bind to: {}:{}", config.http.bind_address, config.http.port);
    info!("RPC endpoint: {}", config.ethereum.rpc_url);
    info!(
        "Payout: {} per address every {}h",
        config.ethereum.amount_eth, config.security.cooldown_hours
    );

    if let Err(e) = start_server(&config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Load configuration from the optional file and the environment
fn load_config(path: &str) -> Result<FaucetConfig> {
    if std::path::Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
    } else {
        info!("No configuration file at {}, using defaults and environment", path);
    }

    FaucetConfig::load(Some(path)).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
}

/// Generate a default configuration file
fn generate_config(path: &str) -> Result<()> {
    let config = FaucetConfig::default();

    config.save_to_file(path)?;

    println!("Generated default configuration file: {}", path);
    println!();
    println!("Before running the server, either set ethereum.private_key in the file");
    println!("or export PRIVATE_KEY. Other values can be overridden with FAUCET_* variables,");
    println!("e.g. FAUCET_ETHEREUM__RPC_URL or FAUCET_HTTP__ALLOWED_ORIGIN.");
    println!();
    println!("Example usage:");
    println!("  PRIVATE_KEY=... cargo run --bin faucet-server -- --config {}", path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_generate_and_load_config() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let temp_path = temp_dir.path().join("faucet-config.toml");
        let temp_path = temp_path.to_str().unwrap();

        generate_config(temp_path)?;
        let config = FaucetConfig::from_file(temp_path)?;

        assert_eq!(config.http.port, 3000);
        assert_eq!(config.ethereum.amount_eth, "0.1");

        Ok(())
    }

    #[test]
    fn test_generated_config_needs_private_key() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let temp_path = temp_file.path().to_str().unwrap();

        generate_config(temp_path)?;
        let config = FaucetConfig::from_file(temp_path)?;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("PRIVATE_KEY"));

        Ok(())
    }
}
