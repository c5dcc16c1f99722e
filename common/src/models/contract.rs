// External imports
use ethers::core::types::Address;

// Third party imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source code/ABI đã verify của một contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSource {
    /// Tên contract theo dịch vụ verify
    pub contract_name: String,
    /// Source code, có thể gồm nhiều file gộp lại
    pub source_code: String,
    /// ABI dạng JSON string
    pub abi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
}

/// Contract đang được bảo vệ. Chỉ registry được phép thay đổi
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredContract {
    /// Địa chỉ contract
    pub address: Address,
    /// Tên contract, "Unknown" nếu chưa verify
    pub name: String,
    /// Trạng thái pause, phản chiếu từ on-chain guardian
    pub is_paused: bool,
    /// None nếu contract chưa verify, khi đó chỉ phát hiện bằng signature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ContractSource>,
    /// Thời điểm đăng ký
    pub registered_at: DateTime<Utc>,
}

impl MonitoredContract {
    pub const UNKNOWN_NAME: &'static str = "Unknown";

    /// Tạo contract mới từ kết quả fetch lúc đăng ký
    pub fn new(address: Address, is_paused: bool, source: Option<ContractSource>) -> Self {
        let name = source
            .as_ref()
            .map(|s| s.contract_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| Self::UNKNOWN_NAME.to_string());

        Self {
            address,
            name,
            is_paused,
            source,
            registered_at: Utc::now(),
        }
    }

    /// Source code để gửi cho phân tích, rỗng nếu chưa verify
    pub fn source_code(&self) -> &str {
        self.source.as_ref().map(|s| s.source_code.as_str()).unwrap_or("")
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }
}
