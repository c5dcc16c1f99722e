use async_trait::async_trait;
use ethers::{
    contract::abigen,
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, H256, U64},
};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error_handling::{classify_blockchain_error, ChainError};

// Giao diện on-chain guardian
abigen!(
    GuardianContract,
    r#"[
        function emergencyPause(address target, bytes32 reasonHash) external
        function isPaused(address target) external view returns (bool)
    ]"#,
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Khả năng đọc/ghi trạng thái pause trên guardian contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Guardian: Send + Sync + Debug {
    /// Đọc trạng thái pause on-chain của contract
    async fn is_paused(&self, target: Address) -> Result<bool, ChainError>;

    /// Gửi giao dịch emergencyPause và chờ xác nhận. Trả về hash giao dịch đã mine
    async fn emergency_pause(&self, target: Address, reason_hash: H256) -> Result<H256, ChainError>;
}

/// Guardian qua ethers, ký bằng LocalWallet nếu có private key
#[derive(Debug)]
pub struct EthersGuardian {
    reader: GuardianContract<Provider<Http>>,
    writer: Option<GuardianContract<SignerClient>>,
}

impl EthersGuardian {
    /// Tạo guardian chỉ đọc
    pub fn read_only(provider: Arc<Provider<Http>>, guardian_address: Address) -> Self {
        Self {
            reader: GuardianContract::new(guardian_address, provider),
            writer: None,
        }
    }

    /// Tạo guardian có quyền ghi từ private key
    pub fn with_signer(
        provider: Arc<Provider<Http>>,
        guardian_address: Address,
        private_key: &str,
        chain_id: u64,
    ) -> Result<Self, ChainError> {
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::Other(format!("private key không hợp lệ: {}", e)))?
            .with_chain_id(chain_id);
        info!(signer = ?wallet.address(), guardian = ?guardian_address, "Guardian dùng signer");

        let client = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));
        Ok(Self {
            reader: GuardianContract::new(guardian_address, provider),
            writer: Some(GuardianContract::new(guardian_address, client)),
        })
    }
}

#[async_trait]
impl Guardian for EthersGuardian {
    async fn is_paused(&self, target: Address) -> Result<bool, ChainError> {
        self.reader
            .is_paused(target)
            .call()
            .await
            .map_err(|e| classify_blockchain_error(&e.to_string()))
    }

    async fn emergency_pause(&self, target: Address, reason_hash: H256) -> Result<H256, ChainError> {
        let writer = self.writer.as_ref().ok_or(ChainError::WalletNotConfigured)?;

        let call = writer.emergency_pause(target, reason_hash.to_fixed_bytes());
        let pending = call
            .send()
            .await
            .map_err(|e| classify_blockchain_error(&e.to_string()))?;
        let tx_hash = pending.tx_hash();
        debug!(tx = ?tx_hash, target = ?target, "Đã gửi emergencyPause, chờ xác nhận");

        let receipt = pending
            .await
            .map_err(ChainError::from)?
            .ok_or_else(|| ChainError::TransactionDropped(format!("{:?}", tx_hash)))?;

        if receipt.status == Some(U64::from(1u64)) {
            Ok(receipt.transaction_hash)
        } else {
            Err(ChainError::TransactionReverted(format!(
                "{:?} (status {:?})",
                receipt.transaction_hash, receipt.status
            )))
        }
    }
}
