//! Local stand-ins for the chain bridge and price oracle.

use async_trait::async_trait;
use rsc_economics::{
    BridgeError, ChainBridge, OracleError, PriceOracle, TransferReceipt, TransferRequest,
};
use rust_decimal::Decimal;
use tracing::info;

/// Bridge that settles every well-formed transfer instantly with a
/// deterministic transaction hash.
#[derive(Debug, Default)]
pub struct LoggingBridge;

impl LoggingBridge {
    pub fn transaction_hash(request: &TransferRequest) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(request.withdrawal_id.get().to_le_bytes().as_slice());
        hasher.update(request.to_address.as_bytes());
        hasher.update(request.amount.to_string().as_bytes());
        hasher.update(request.network.as_bytes());
        hasher.update(request.token.as_bytes());
        format!("0x{}", hex::encode(hasher.finalize().as_bytes()))
    }
}

#[async_trait]
impl ChainBridge for LoggingBridge {
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, BridgeError> {
        if !request.to_address.starts_with("0x") {
            return Err(BridgeError::Rejected(format!(
                "{} is not a hex address",
                request.to_address
            )));
        }
        let transaction_hash = Self::transaction_hash(request);
        info!(
            withdrawal = %request.withdrawal_id,
            to = %request.to_address,
            amount = %request.amount,
            network = %request.network,
            tx = %transaction_hash,
            "🔗 Transfer submitted"
        );
        Ok(TransferReceipt { transaction_hash })
    }
}

#[derive(Debug, Clone)]
pub struct StaticPriceOracle {
    rate: Decimal,
}

impl StaticPriceOracle {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn get_rsc_to_usd_rate(&self) -> Result<Decimal, OracleError> {
        if self.rate <= Decimal::ZERO {
            return Err(OracleError(format!("configured rate {} is not positive", self.rate)));
        }
        Ok(self.rate)
    }
}
