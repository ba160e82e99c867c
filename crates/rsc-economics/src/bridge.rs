use async_trait::async_trait;
use rsc_types::{RscAmount, WithdrawalId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub withdrawal_id: WithdrawalId,
    pub to_address: String,
    pub amount: RscAmount,
    pub network: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_hash: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Worth retrying: timeouts, nonce races, RPC hiccups.
    #[error("transient bridge error: {0}")]
    Transient(String),

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

impl BridgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Transient(_))
    }
}

/// On-chain transfer service for withdrawals.
#[async_trait]
pub trait ChainBridge: Send + Sync {
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, BridgeError>;
}

#[derive(Error, Debug, Clone)]
#[error("price unavailable: {0}")]
pub struct OracleError(pub String);

/// RSC/USD exchange rate source.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_rsc_to_usd_rate(&self) -> Result<Decimal, OracleError>;
}
