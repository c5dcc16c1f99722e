use async_trait::async_trait;
use ethers::types::{Address, Bytes, Transaction, H256, U256};
use sentinel_common::{
    AnalysisResult, MonitoredContract, RiskLevel, ThreatCategory, ThreatEvent, ThreatLevel,
    Vulnerability, VulnerabilitySeverity,
};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Lỗi từ dịch vụ phân tích bên ngoài. Không bao giờ thoát ra khỏi orchestrator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Empty response")]
    Empty,
}

/// Tóm tắt threat gửi kèm yêu cầu phân tích
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatSummary {
    pub level: ThreatLevel,
    pub details: String,
}

/// Ngữ cảnh giao dịch gửi kèm yêu cầu phân tích
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub threat_summary: Vec<ThreatSummary>,
}

/// Yêu cầu gửi tới dịch vụ phân tích
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub contract_address: Address,
    pub chain_id: u64,
    pub contract_name: String,
    /// Rỗng nếu contract chưa verify
    pub source_code: String,
    pub transaction_context: TransactionContext,
}

impl AnalysisRequest {
    pub fn new(
        chain_id: u64,
        contract: &MonitoredContract,
        tx: &Transaction,
        threats: &[ThreatEvent],
    ) -> Self {
        Self {
            contract_address: contract.address,
            chain_id,
            contract_name: contract.name.clone(),
            source_code: contract.source_code().to_string(),
            transaction_context: TransactionContext {
                hash: tx.hash,
                from: tx.from,
                to: tx.to,
                value: tx.value,
                data: tx.input.clone(),
                threat_summary: threats
                    .iter()
                    .map(|t| ThreatSummary {
                        level: t.level,
                        details: t.details.clone(),
                    })
                    .collect(),
            },
        }
    }
}

/// Collaborator phân tích sâu (black-box request/response)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisClient: Send + Sync + Debug {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVulnerability {
    #[serde(rename = "type")]
    vuln_type: String,
    severity: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    recommendation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnalysis {
    risk_level: String,
    overall_score: f64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    vulnerabilities: Vec<WireVulnerability>,
}

/// Parse và kiểm tra phản hồi của dịch vụ phân tích
pub fn parse_analysis_response(body: &str) -> Result<AnalysisResult, AnalysisError> {
    if body.trim().is_empty() {
        return Err(AnalysisError::Empty);
    }

    let wire: WireAnalysis =
        serde_json::from_str(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    let risk_level =
        RiskLevel::from_str(&wire.risk_level).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    if !wire.overall_score.is_finite() {
        return Err(AnalysisError::Malformed("overallScore is not a number".to_string()));
    }

    let vulnerabilities = wire
        .vulnerabilities
        .into_iter()
        .map(|v| {
            let severity = VulnerabilitySeverity::from_str(&v.severity)
                .map_err(|e| AnalysisError::Malformed(e.to_string()))?;
            Ok(Vulnerability {
                vuln_type: v.vuln_type,
                severity,
                description: v.description,
                confidence: v.confidence.clamp(0.0, 1.0),
                recommendation: v.recommendation,
            })
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    Ok(AnalysisResult {
        risk_level,
        overall_score: wire.overall_score.clamp(0.0, 100.0).round() as u8,
        summary: wire.summary,
        vulnerabilities,
    })
}

/// Dịch vụ phân tích qua HTTP POST JSON
#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    client: reqwest::Client,
    url: String,
}

impl HttpAnalysisClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;
        parse_analysis_response(&body)
    }
}

/// Trọng số fallback theo nhóm threat: (điểm, mức độ)
fn category_weight(category: ThreatCategory) -> (u32, VulnerabilitySeverity) {
    match category {
        ThreatCategory::Reentrancy => (35, VulnerabilitySeverity::High),
        ThreatCategory::FlashLoan => (30, VulnerabilitySeverity::High),
        ThreatCategory::FundDrain => (40, VulnerabilitySeverity::Critical),
        ThreatCategory::PrivilegedCall => (20, VulnerabilitySeverity::Medium),
        ThreatCategory::LargeTransfer => (15, VulnerabilitySeverity::Medium),
    }
}

fn level_weight(level: ThreatLevel) -> (u32, VulnerabilitySeverity) {
    match level {
        ThreatLevel::Critical => (40, VulnerabilitySeverity::Critical),
        ThreatLevel::High => (25, VulnerabilitySeverity::High),
        ThreatLevel::Medium => (10, VulnerabilitySeverity::Medium),
        ThreatLevel::Low => (5, VulnerabilitySeverity::Low),
    }
}

fn category_label(category: Option<ThreatCategory>) -> &'static str {
    match category {
        Some(ThreatCategory::Reentrancy) => "REENTRANCY",
        Some(ThreatCategory::FlashLoan) => "FLASH_LOAN",
        Some(ThreatCategory::FundDrain) => "FUND_DRAIN",
        Some(ThreatCategory::PrivilegedCall) => "PRIVILEGED_CALL",
        Some(ThreatCategory::LargeTransfer) => "LARGE_TRANSFER",
        None => "HEURISTIC",
    }
}

/// Tổng hợp kết quả phân tích cục bộ chỉ từ output của detector.
///
/// Mức rủi ro là mức cao nhất trong các finding, điểm là tổng trọng số kẹp ở 100.
pub fn fallback_analysis(threats: &[ThreatEvent]) -> AnalysisResult {
    if threats.is_empty() {
        return AnalysisResult {
            risk_level: RiskLevel::Safe,
            overall_score: 0,
            summary: "No threats detected (local heuristic)".to_string(),
            vulnerabilities: Vec::new(),
        };
    }

    let mut score = 0u32;
    let mut risk_level = RiskLevel::Safe;
    let vulnerabilities: Vec<Vulnerability> = threats
        .iter()
        .map(|threat| {
            let (weight, severity) = match threat.category() {
                Some(category) => category_weight(category),
                None => level_weight(threat.level),
            };
            score = score.saturating_add(weight);
            risk_level = risk_level.max(RiskLevel::from(severity));
            Vulnerability {
                vuln_type: category_label(threat.category()).to_string(),
                severity,
                description: threat.details.clone(),
                confidence: threat.confidence,
                recommendation: "Review the transaction and keep the contract paused until audited"
                    .to_string(),
            }
        })
        .collect();

    AnalysisResult {
        risk_level,
        overall_score: score.min(100) as u8,
        summary: format!("{} finding(s) from local heuristic analysis", vulnerabilities.len()),
        vulnerabilities,
    }
}

/// Kết quả của orchestrator, kèm cờ cho biết có phải fallback không
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub fallback: bool,
}

/// Gọi dịch vụ phân tích với timeout, rơi về heuristic cục bộ khi có lỗi
#[derive(Debug, Clone)]
pub struct AnalysisOrchestrator {
    client: Option<Arc<dyn AnalysisClient>>,
    timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(client: Option<Arc<dyn AnalysisClient>>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Luôn trả về một AnalysisResult, không bao giờ chờ quá `timeout`
    pub async fn analyze(&self, request: &AnalysisRequest, threats: &[ThreatEvent]) -> AnalysisOutcome {
        let Some(client) = &self.client else {
            debug!(contract = ?request.contract_address, "Không cấu hình dịch vụ phân tích, dùng fallback");
            return Self::fallback(threats);
        };

        let result = match timeout(self.timeout, client.analyze(request)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(self.timeout)),
        };

        match result {
            Ok(result) => {
                info!(
                    contract = ?request.contract_address,
                    tx = ?request.transaction_context.hash,
                    risk_level = ?result.risk_level,
                    score = result.overall_score,
                    "Phân tích hoàn tất"
                );
                AnalysisOutcome {
                    result,
                    fallback: false,
                }
            }
            Err(e) => {
                warn!(
                    contract = ?request.contract_address,
                    tx = ?request.transaction_context.hash,
                    error = %e,
                    "Dịch vụ phân tích lỗi, dùng fallback"
                );
                Self::fallback(threats)
            }
        }
    }

    fn fallback(threats: &[ThreatEvent]) -> AnalysisOutcome {
        AnalysisOutcome {
            result: fallback_analysis(threats),
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::ThreatMetadata;

    fn threat(level: ThreatLevel, category: ThreatCategory) -> ThreatEvent {
        ThreatEvent::new(
            Address::repeat_byte(0xaa),
            H256::repeat_byte(0x01),
            level,
            "matched",
            0.9,
        )
        .with_metadata(ThreatMetadata {
            category,
            selector: None,
            signature: None,
        })
    }

    fn request() -> AnalysisRequest {
        let contract = MonitoredContract::new(Address::repeat_byte(0xaa), false, None);
        let tx = Transaction {
            hash: H256::repeat_byte(0x01),
            from: Address::repeat_byte(0x02),
            to: Some(contract.address),
            ..Default::default()
        };
        AnalysisRequest::new(1, &contract, &tx, &[threat(ThreatLevel::Critical, ThreatCategory::Reentrancy)])
    }

    #[test]
    fn test_request_schema() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["chainId"], 1);
        assert_eq!(json["contractName"], "Unknown");
        assert_eq!(json["sourceCode"], "");
        assert_eq!(json["transactionContext"]["threatSummary"][0]["level"], "CRITICAL");
        assert!(json["transactionContext"].get("hash").is_some());
    }

    #[test]
    fn test_parse_valid_response() {
        let body = r#"{
            "riskLevel": "critical",
            "overallScore": 92.4,
            "summary": "Reentrancy in withdraw",
            "vulnerabilities": [{
                "type": "REENTRANCY",
                "severity": "CRITICAL",
                "description": "external call before state update",
                "confidence": 0.95,
                "recommendation": "pause"
            }]
        }"#;
        let result = parse_analysis_response(body).unwrap();
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.overall_score, 92);
        assert_eq!(result.vulnerabilities[0].severity, VulnerabilitySeverity::Critical);
    }

    #[test]
    fn test_parse_rejects_bad_responses() {
        assert_eq!(parse_analysis_response("  "), Err(AnalysisError::Empty));
        assert!(matches!(
            parse_analysis_response("not json"),
            Err(AnalysisError::Malformed(_))
        ));
        assert!(matches!(
            parse_analysis_response(r#"{"riskLevel":"SEVERE","overallScore":10}"#),
            Err(AnalysisError::Malformed(_))
        ));
    }

    #[test]
    fn test_fallback_weights() {
        let result = fallback_analysis(&[threat(ThreatLevel::Critical, ThreatCategory::Reentrancy)]);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.overall_score, 35);

        let result = fallback_analysis(&[
            threat(ThreatLevel::Critical, ThreatCategory::FundDrain),
            threat(ThreatLevel::High, ThreatCategory::LargeTransfer),
        ]);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.overall_score, 55);

        let result = fallback_analysis(&[]);
        assert_eq!(result.risk_level, RiskLevel::Safe);
        assert_eq!(result.overall_score, 0);
    }

    #[tokio::test]
    async fn test_orchestrator_uses_collaborator_result() {
        let mut client = MockAnalysisClient::new();
        client.expect_analyze().times(1).returning(|_| {
            Ok(AnalysisResult {
                risk_level: RiskLevel::Low,
                overall_score: 12,
                summary: "benign".to_string(),
                vulnerabilities: Vec::new(),
            })
        });
        let orchestrator = AnalysisOrchestrator::new(Some(Arc::new(client)), Duration::from_secs(1));
        let outcome = orchestrator.analyze(&request(), &[]).await;
        assert!(!outcome.fallback);
        assert_eq!(outcome.result.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_orchestrator_falls_back_on_error() {
        let mut client = MockAnalysisClient::new();
        client
            .expect_analyze()
            .returning(|_| Err(AnalysisError::Malformed("garbage".to_string())));
        let orchestrator = AnalysisOrchestrator::new(Some(Arc::new(client)), Duration::from_secs(1));
        let threats = [threat(ThreatLevel::Critical, ThreatCategory::Reentrancy)];
        let outcome = orchestrator.analyze(&request(), &threats).await;
        assert!(outcome.fallback);
        assert_eq!(outcome.result.overall_score, 35);
    }

    #[derive(Debug)]
    struct HangingClient;

    #[async_trait]
    impl AnalysisClient for HangingClient {
        async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_times_out() {
        let orchestrator =
            AnalysisOrchestrator::new(Some(Arc::new(HangingClient)), Duration::from_secs(20));
        let threats = [threat(ThreatLevel::High, ThreatCategory::FlashLoan)];
        let outcome = orchestrator.analyze(&request(), &threats).await;
        assert!(outcome.fallback);
        assert_eq!(outcome.result.risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_orchestrator_without_client() {
        let orchestrator = AnalysisOrchestrator::new(None, Duration::from_secs(1));
        let outcome = orchestrator.analyze(&request(), &[]).await;
        assert!(outcome.fallback);
    }
}
