// External imports
use ethers::core::types::{Address, H256};

// Standard library imports
use std::{fmt, str::FromStr};

// Third party imports
use serde::{Deserialize, Serialize};

// Internal imports
use crate::error::CommonError;
use crate::utils::current_timestamp;

/// Mức độ nghiêm trọng của một threat hoặc violation, sắp xếp tăng dần
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Threat ở mức này có cần phân tích sâu không
    pub fn is_actionable(&self) -> bool {
        matches!(self, ThreatLevel::High | ThreatLevel::Critical)
    }

    /// Điểm rủi ro cộng thêm cho mỗi violation ở mức này
    pub fn score_weight(&self) -> u32 {
        match self {
            ThreatLevel::Critical => 40,
            ThreatLevel::High => 25,
            ThreatLevel::Medium => 10,
            ThreatLevel::Low => 5,
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Nhóm dấu hiệu mà detector đã khớp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatCategory {
    /// Hàm tấn công reentrancy đã biết
    Reentrancy,
    /// Gọi flash loan trực tiếp vào contract được bảo vệ
    FlashLoan,
    /// Hàm rút cạn quỹ
    FundDrain,
    /// Hàm withdraw/upgrade/ownership với giá trị lớn
    PrivilegedCall,
    /// Chuyển giá trị lớn bất thường
    LargeTransfer,
}

/// Metadata có cấu trúc đi kèm threat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatMetadata {
    pub category: ThreatCategory,
    /// Selector đã khớp, dạng 0x12345678
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Chữ ký hàm đã khớp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Một phát hiện của detector gắn với đúng một giao dịch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatEvent {
    /// ID sinh từ tx hash + thời điểm phát hiện
    pub id: String,
    pub contract_address: Address,
    pub level: ThreatLevel,
    pub details: String,
    pub tx_hash: H256,
    /// Unix timestamp (ms)
    pub timestamp: u64,
    /// Độ tin cậy trong khoảng [0, 1]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ThreatMetadata>,
}

impl ThreatEvent {
    /// Tạo threat mới
    pub fn new(
        contract_address: Address,
        tx_hash: H256,
        level: ThreatLevel,
        details: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let timestamp = current_timestamp();
        Self {
            id: format!("{:?}-{}", tx_hash, timestamp),
            contract_address,
            level,
            details: details.into(),
            tx_hash,
            timestamp,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ThreatMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn category(&self) -> Option<ThreatCategory> {
        self.metadata.as_ref().map(|m| m.category)
    }
}

/// Các rule của ACE policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyRule {
    BlacklistCompliance,
    MaxTransactionValue,
    DailyVolumeLimit,
    CriticalThreatDetected,
    HighThreatDetected,
}

/// Vi phạm policy, được tính vào điểm rủi ro
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    pub rule: PolicyRule,
    pub severity: ThreatLevel,
    pub details: String,
}

/// Hành động khuyến nghị, sắp xếp tăng dần theo mức nghiêm trọng
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Allow,
    Monitor,
    Pause,
    PauseImmediately,
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicyAction::Allow => "ALLOW",
            PolicyAction::Monitor => "MONITOR",
            PolicyAction::Pause => "PAUSE",
            PolicyAction::PauseImmediately => "PAUSE_IMMEDIATELY",
        };
        f.write_str(label)
    }
}

impl FromStr for PolicyAction {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(PolicyAction::Allow),
            "MONITOR" => Ok(PolicyAction::Monitor),
            "PAUSE" => Ok(PolicyAction::Pause),
            "PAUSE_IMMEDIATELY" => Ok(PolicyAction::PauseImmediately),
            other => Err(CommonError::Invalid(format!("policy action: {}", other))),
        }
    }
}

/// Kết quả đánh giá policy, tính mới cho mỗi lần evaluate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    /// true khi và chỉ khi không có violation nào
    pub passed: bool,
    pub policy_id: String,
    pub violations: Vec<PolicyViolation>,
    /// Trong khoảng [0, 100]
    pub risk_score: u8,
    pub recommended_action: PolicyAction,
}

/// Mức rủi ro tổng thể của một lần phân tích
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for RiskLevel {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAFE" | "NONE" => Ok(RiskLevel::Safe),
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            "CRITICAL" => Ok(RiskLevel::Critical),
            other => Err(CommonError::Invalid(format!("risk level: {}", other))),
        }
    }
}

impl From<VulnerabilitySeverity> for RiskLevel {
    fn from(severity: VulnerabilitySeverity) -> Self {
        match severity {
            VulnerabilitySeverity::Info => RiskLevel::Safe,
            VulnerabilitySeverity::Low => RiskLevel::Low,
            VulnerabilitySeverity::Medium => RiskLevel::Medium,
            VulnerabilitySeverity::High => RiskLevel::High,
            VulnerabilitySeverity::Critical => RiskLevel::Critical,
        }
    }
}

/// Mức độ của một lỗ hổng được báo cáo
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VulnerabilitySeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for VulnerabilitySeverity {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" | "INFORMATIONAL" => Ok(VulnerabilitySeverity::Info),
            "LOW" => Ok(VulnerabilitySeverity::Low),
            "MEDIUM" => Ok(VulnerabilitySeverity::Medium),
            "HIGH" => Ok(VulnerabilitySeverity::High),
            "CRITICAL" => Ok(VulnerabilitySeverity::Critical),
            other => Err(CommonError::Invalid(format!("vulnerability severity: {}", other))),
        }
    }
}

/// Một lỗ hổng trong kết quả phân tích
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    #[serde(rename = "type")]
    pub vuln_type: String,
    pub severity: VulnerabilitySeverity,
    pub description: String,
    pub confidence: f64,
    pub recommendation: String,
}

/// Kết quả phân tích, từ collaborator bên ngoài hoặc tổng hợp cục bộ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub risk_level: RiskLevel,
    /// Trong khoảng [0, 100]
    pub overall_score: u8,
    pub summary: String,
    pub vulnerabilities: Vec<Vulnerability>,
}

/// Module tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        assert!(ThreatLevel::Critical > ThreatLevel::High);
        assert!(ThreatLevel::High > ThreatLevel::Medium);
        assert!(ThreatLevel::Medium > ThreatLevel::Low);
        assert!(PolicyAction::PauseImmediately > PolicyAction::Pause);
        assert!(PolicyAction::Pause > PolicyAction::Monitor);
        assert!(PolicyAction::Monitor > PolicyAction::Allow);
        assert!(RiskLevel::Critical > RiskLevel::Safe);
    }

    #[test]
    fn test_actionable_levels() {
        assert!(ThreatLevel::Critical.is_actionable());
        assert!(ThreatLevel::High.is_actionable());
        assert!(!ThreatLevel::Medium.is_actionable());
        assert!(!ThreatLevel::Low.is_actionable());
    }

    #[test]
    fn test_policy_action_from_str() {
        assert_eq!("pause".parse::<PolicyAction>().unwrap(), PolicyAction::Pause);
        assert_eq!(
            "PAUSE_IMMEDIATELY".parse::<PolicyAction>().unwrap(),
            PolicyAction::PauseImmediately
        );
        assert!("halt".parse::<PolicyAction>().is_err());
    }

    #[test]
    fn test_threat_event_serializes_camel_case() {
        let event = ThreatEvent::new(
            Address::repeat_byte(0x11),
            H256::repeat_byte(0x22),
            ThreatLevel::Critical,
            "attack() selector",
            1.4,
        );
        assert_eq!(event.confidence, 1.0);
        assert!(event.id.starts_with("0x2222"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "CRITICAL");
        assert!(json.get("contractAddress").is_some());
        assert!(json.get("txHash").is_some());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_vulnerability_type_field_name() {
        let vuln = Vulnerability {
            vuln_type: "REENTRANCY".to_string(),
            severity: VulnerabilitySeverity::High,
            description: "external call before state update".to_string(),
            confidence: 0.9,
            recommendation: "use checks-effects-interactions".to_string(),
        };
        let json = serde_json::to_value(&vuln).unwrap();
        assert_eq!(json["type"], "REENTRANCY");
        assert_eq!(json["severity"], "HIGH");
    }
}
