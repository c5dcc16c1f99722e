use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Block, Transaction};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::trace;

use crate::error_handling::ChainError;

/// Truy cập RPC tối thiểu mà poller cần
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync + Debug {
    /// Block height hiện tại
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Lấy block kèm đầy đủ giao dịch. Node chưa có block là lỗi tạm thời
    async fn block_with_txs(&self, number: u64) -> Result<Block<Transaction>, ChainError>;
}

/// ChainClient qua JSON-RPC HTTP của ethers
#[derive(Debug, Clone)]
pub struct EthersChainClient {
    provider: Arc<Provider<Http>>,
}

impl EthersChainClient {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }

    /// Tạo client từ RPC URL
    pub fn from_url(rpc_url: &str) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::ConnectionError(format!("{}: {}", rpc_url, e)))?;
        Ok(Self::new(Arc::new(provider)))
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        Arc::clone(&self.provider)
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let number = self.provider.get_block_number().await?;
        Ok(number.as_u64())
    }

    async fn block_with_txs(&self, number: u64) -> Result<Block<Transaction>, ChainError> {
        trace!(block = number, "Lấy block kèm giao dịch");
        self.provider
            .get_block_with_txs(number)
            .await?
            .ok_or(ChainError::BlockNotFound(number))
    }
}
