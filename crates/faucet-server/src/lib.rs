//! Faucet Server - testnet faucet with a per-address cooldown
//!
//! This crate provides an HTTP server that implements faucet logic:
//! 1. Users POST an address to `/send`
//! 2. Server validates the address and checks it was not funded within the cooldown window
//! 3. Server signs and submits a fixed-amount transfer from the faucet wallet
//! 4. Server records the transfer time and returns the transaction hash

pub mod config;
pub mod error;
pub mod eth;
pub mod http;
pub mod state;

pub use config::FaucetConfig;
pub use error::{FaucetError, FaucetResult};
