use ethers::providers::ProviderError;
use sentinel_common::CommonError;
use thiserror::Error;

/// Lỗi khi tương tác với blockchain RPC hoặc guardian contract
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Lỗi kết nối đến RPC
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Lỗi timeout khi chờ kết quả
    #[error("Request timed out: {0}")]
    TimeoutError(String),

    /// Lỗi quá giới hạn tần suất của RPC
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Node chưa trả về block
    #[error("Block not found: {0}")]
    BlockNotFound(u64),

    /// Giao dịch bị revert on-chain
    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    /// Giao dịch không được mine (bị drop khỏi mempool)
    #[error("Transaction dropped: {0}")]
    TransactionDropped(String),

    /// Lỗi wallet chưa được cấu hình
    #[error("Wallet not configured")]
    WalletNotConfigured,

    /// Lỗi khác
    #[error("Chain error: {0}")]
    Other(String),
}

impl ChainError {
    /// Lỗi hạ tầng tạm thời, có thể thử lại ở tick sau
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::ConnectionError(_)
                | ChainError::TimeoutError(_)
                | ChainError::RateLimitExceeded(_)
                | ChainError::BlockNotFound(_)
        )
    }
}

/// Phân loại lỗi từ chuỗi lỗi của blockchain
pub fn classify_blockchain_error(error_msg: &str) -> ChainError {
    let error_lowercase = error_msg.to_lowercase();

    if error_lowercase.contains("execution reverted") || error_lowercase.contains("revert") {
        ChainError::TransactionReverted(error_msg.to_string())
    } else if error_lowercase.contains("rate limit") || error_lowercase.contains("429") {
        ChainError::RateLimitExceeded(error_msg.to_string())
    } else if error_lowercase.contains("timeout") || error_lowercase.contains("timed out") {
        ChainError::TimeoutError(error_msg.to_string())
    } else if error_lowercase.contains("connect")
        || error_lowercase.contains("rpc")
        || error_lowercase.contains("unavailable")
        || error_lowercase.contains("dns")
    {
        ChainError::ConnectionError(error_msg.to_string())
    } else {
        ChainError::Other(error_msg.to_string())
    }
}

impl From<ProviderError> for ChainError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::JsonRpcClientError(e) => classify_blockchain_error(&e.to_string()),
            ProviderError::HTTPError(e) => {
                if e.is_timeout() {
                    ChainError::TimeoutError(e.to_string())
                } else {
                    ChainError::ConnectionError(e.to_string())
                }
            }
            ProviderError::SerdeJson(e) => ChainError::Other(format!("JSON error: {}", e)),
            other => classify_blockchain_error(&other.to_string()),
        }
    }
}

/// Lỗi tổng của sentinel khi khởi động/cấu hình
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_blockchain_error() {
        assert!(matches!(
            classify_blockchain_error("execution reverted: Guardian: not authorized"),
            ChainError::TransactionReverted(_)
        ));
        assert!(matches!(
            classify_blockchain_error("429 Too Many Requests: rate limit"),
            ChainError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            classify_blockchain_error("request timed out"),
            ChainError::TimeoutError(_)
        ));
        assert!(matches!(
            classify_blockchain_error("error sending request: connection refused"),
            ChainError::ConnectionError(_)
        ));
        assert!(matches!(
            classify_blockchain_error("something odd"),
            ChainError::Other(_)
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(ChainError::BlockNotFound(10).is_transient());
        assert!(ChainError::ConnectionError("down".into()).is_transient());
        assert!(!ChainError::TransactionReverted("no".into()).is_transient());
        assert!(!ChainError::WalletNotConfigured.is_transient());
    }
}
