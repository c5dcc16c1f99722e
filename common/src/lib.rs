//! Mô hình dữ liệu dùng chung cho sentinel: threat, policy, kết quả phân tích,
//! contract được bảo vệ và dedup cache.

// Modules paths
pub mod cache;
pub mod error;
pub mod models;
pub mod types;
pub mod utils;

// Re-exports
pub use cache::DedupCache;
pub use error::{CommonError, CommonResult};
pub use models::{ContractSource, MonitoredContract};
pub use types::{
    AnalysisResult, PolicyAction, PolicyResult, PolicyRule, PolicyViolation, RiskLevel,
    ThreatCategory, ThreatEvent, ThreatLevel, ThreatMetadata, Vulnerability,
    VulnerabilitySeverity,
};
