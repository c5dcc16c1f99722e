use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use std::sync::Arc;
use tracing::{error, info};

use crate::chain::Guardian;

/// Hash lý do pause để ghi on-chain dưới dạng bytes32
pub fn reason_hash(reason: &str) -> H256 {
    H256::from(keccak256(reason.as_bytes()))
}

/// Thực thi pause qua guardian contract.
///
/// Không kiểm tra trạng thái pause và không thử lại khi lỗi; phía gọi chịu trách
/// nhiệm kiểm tra `is_paused` trong registry trước khi gọi.
#[derive(Debug, Clone)]
pub struct GuardianExecutor {
    guardian: Arc<dyn Guardian>,
}

impl GuardianExecutor {
    pub fn new(guardian: Arc<dyn Guardian>) -> Self {
        Self { guardian }
    }

    /// Trả về true khi giao dịch pause đã được xác nhận on-chain
    pub async fn pause(&self, target: Address, reason_hash: H256) -> bool {
        match self.guardian.emergency_pause(target, reason_hash).await {
            Ok(tx_hash) => {
                info!(contract = ?target, tx = ?tx_hash, "Đã pause contract");
                true
            }
            Err(e) => {
                error!(contract = ?target, error = %e, "Pause thất bại, cần operator xử lý");
                false
            }
        }
    }
}
