//! Blockchain integration for the faucet server.

use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, TxHash, U256},
    providers::{Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use std::str::FromStr;
use tracing::{debug, info};

/// A single faucet payout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Address,
    /// Amount in wei
    pub value: U256,
    pub gas_limit: u64,
    /// Gas price in wei
    pub gas_price: u128,
}

/// Amount and fee parameters shared by every payout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
}

impl TransferPolicy {
    pub fn from_config(config: &FaucetConfig) -> FaucetResult<Self> {
        Ok(Self {
            value: config.amount_wei()?,
            gas_limit: config.ethereum.gas_limit,
            gas_price: config.gas_price_wei(),
        })
    }

    /// Build the transfer paying `to`
    pub fn transfer_to(&self, to: Address) -> TransferRequest {
        TransferRequest {
            to,
            value: self.value,
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
        }
    }
}

/// Signs and submits faucet transfers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundsDispatcher: Send + Sync {
    /// Submit `transfer` and return its hash once the node has accepted it.
    ///
    /// Does not wait for the transaction to be mined.
    async fn send_transfer(&self, transfer: TransferRequest) -> FaucetResult<TxHash>;

    /// Address of the faucet wallet
    fn faucet_address(&self) -> Address;

    /// Current balance of the faucet wallet in wei
    async fn faucet_balance(&self) -> FaucetResult<U256>;
}

/// Validate an address the way EVM wallets do.
///
/// Accepts 40 hex digits with an optional `0x` prefix. All-lowercase and
/// all-uppercase forms are accepted as is; mixed case must carry a valid
/// EIP-55 checksum.
pub fn validate_address(address: &str) -> FaucetResult<Address> {
    let invalid = || FaucetError::InvalidAddress(address.to_string());

    let hex = address.strip_prefix("0x").unwrap_or(address);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let parsed = Address::from_str(hex).map_err(|_| invalid())?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && parsed.to_checksum(None)[2..] != *hex {
        return Err(invalid());
    }

    Ok(parsed)
}

/// Faucet wallet backed by an alloy HTTP provider
pub struct EthereumClient {
    faucet_address: Address,
    rpc_url: String,
    provider: Box<dyn Provider>,
}

impl std::fmt::Debug for EthereumClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumClient")
            .field("faucet_address", &self.faucet_address)
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl EthereumClient {
    /// Create a new client signing with the configured private key
    pub fn new(config: &FaucetConfig) -> FaucetResult<Self> {
        let key = config.ethereum.private_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|e| FaucetError::Internal(anyhow::anyhow!("Invalid private key: {}", e)))?;

        let faucet_address = signer.address();

        let url = url::Url::parse(&config.ethereum.rpc_url)
            .map_err(|e| FaucetError::Internal(anyhow::anyhow!("Invalid RPC URL: {}", e)))?;

        // The recommended fillers take care of nonce and chain id.
        let provider = Box::new(
            ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(url),
        );

        Ok(Self {
            faucet_address,
            rpc_url: config.ethereum.rpc_url.clone(),
            provider,
        })
    }
}

#[async_trait]
impl FundsDispatcher for EthereumClient {
    async fn send_transfer(&self, transfer: TransferRequest) -> FaucetResult<TxHash> {
        let tx_request = TransactionRequest::default()
            .with_from(self.faucet_address)
            .with_to(transfer.to)
            .with_value(transfer.value)
            .with_gas_limit(transfer.gas_limit)
            .with_gas_price(transfer.gas_price);

        debug!("Submitting transfer: {:?}", transfer);

        let pending_tx = self
            .provider
            .send_transaction(tx_request)
            .await
            .map_err(|e| FaucetError::DispatchFailure(e.to_string()))?;

        let tx_hash = *pending_tx.tx_hash();
        info!("Transaction sent: {} -> {}", tx_hash, transfer.to);

        Ok(tx_hash)
    }

    fn faucet_address(&self) -> Address {
        self.faucet_address
    }

    async fn faucet_balance(&self) -> FaucetResult<U256> {
        self.provider
            .get_balance(self.faucet_address)
            .await
            .map_err(|e| {
                FaucetError::Internal(anyhow::anyhow!("Failed to get faucet balance: {}", e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const TEST_KEY: &str = "abcd1234567890abcd1234567890abcd1234567890abcd1234567890abcd1234";

    #[test]
    fn test_validate_address_valid() {
        let valid_addresses = [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0x52908400098527886E0F7030069857D2E4169EE7",
            "0xde709f2102306220921060314715629080e2fb77",
            "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "0x0000000000000000000000000000000000000000",
        ];

        for addr in &valid_addresses {
            assert!(validate_address(addr).is_ok(), "{} should be valid", addr);
        }
    }

    #[test]
    fn test_validate_address_invalid() {
        let invalid_addresses = [
            "not-an-address",
            "invalid",
            "0x123",
            "0xGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGG",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed00",
            " 0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "",
        ];

        for addr in &invalid_addresses {
            assert!(
                matches!(validate_address(addr), Err(FaucetError::InvalidAddress(_))),
                "{} should be rejected",
                addr
            );
        }
    }

    #[test]
    fn test_validate_address_bad_checksum() {
        // Last letter flipped from the checksummed form
        assert!(validate_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD").is_err());
    }

    #[test]
    fn test_casings_parse_to_same_address() {
        let mixed = validate_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        let lower = validate_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(mixed, lower);
    }

    #[test]
    fn test_transfer_policy_defaults() {
        let mut config = FaucetConfig::default();
        config.ethereum.private_key = TEST_KEY.to_string();

        let policy = TransferPolicy::from_config(&config).unwrap();
        let to = address!("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        let transfer = policy.transfer_to(to);

        assert_eq!(transfer.to, to);
        assert_eq!(transfer.value, U256::from(100_000_000_000_000_000u128));
        assert_eq!(transfer.gas_limit, 21_000);
        assert_eq!(transfer.gas_price, 1_000_000_000);
    }

    #[test]
    fn test_client_creation_is_offline() {
        let mut config = FaucetConfig::default();
        config.ethereum.private_key = format!("0x{}", TEST_KEY);
        config.ethereum.rpc_url = "http://127.0.0.1:1".to_string();

        let client = EthereumClient::new(&config).unwrap();
        let expected = PrivateKeySigner::from_str(TEST_KEY).unwrap().address();
        assert_eq!(client.faucet_address(), expected);
    }

    #[test]
    fn test_client_rejects_bad_key() {
        let mut config = FaucetConfig::default();
        config.ethereum.private_key = "zz".repeat(32);

        assert!(EthereumClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_dispatch_failure() {
        let mut config = FaucetConfig::default();
        config.ethereum.private_key = TEST_KEY.to_string();
        config.ethereum.rpc_url = "http://127.0.0.1:1".to_string();

        let client = EthereumClient::new(&config).unwrap();
        let policy = TransferPolicy::from_config(&config).unwrap();
        let result = client
            .send_transfer(policy.transfer_to(Address::ZERO))
            .await;

        assert!(matches!(result, Err(FaucetError::DispatchFailure(_))));
    }
}
