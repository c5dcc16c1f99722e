// External imports
use ethers::types::{Address, H256};

// Third party imports
use serde::{Deserialize, Serialize};

// Internal imports
use sentinel_common::{
    utils::current_timestamp, AnalysisResult, MonitoredContract, PolicyAction, ThreatEvent,
};

/// Loại event gửi tới observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ThreatDetected,
    AnalysisCompleted,
    PauseTriggered,
    PauseFailed,
    ContractRegistered,
}

/// Nội dung chi tiết kèm theo event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    Threats { threats: Vec<ThreatEvent> },
    #[serde(rename_all = "camelCase")]
    Analysis {
        result: AnalysisResult,
        /// true nếu kết quả được tổng hợp cục bộ
        fallback: bool,
    },
    #[serde(rename_all = "camelCase")]
    Pause {
        reason: String,
        risk_score: u8,
        action: PolicyAction,
    },
    #[serde(rename_all = "camelCase")]
    Contract { contract: MonitoredContract },
}

/// Event gửi tới observer: `{type, contractAddress, txHash, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub contract_address: Address,
    pub tx_hash: Option<H256>,
    /// Unix timestamp (ms)
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

impl GuardianEvent {
    fn new(event_type: EventType, contract_address: Address, tx_hash: Option<H256>) -> Self {
        Self {
            event_type,
            contract_address,
            tx_hash,
            timestamp: current_timestamp(),
            payload: None,
        }
    }

    fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn threat_detected(contract: Address, tx_hash: H256, threats: Vec<ThreatEvent>) -> Self {
        Self::new(EventType::ThreatDetected, contract, Some(tx_hash))
            .with_payload(EventPayload::Threats { threats })
    }

    pub fn analysis_completed(
        contract: Address,
        tx_hash: H256,
        result: AnalysisResult,
        fallback: bool,
    ) -> Self {
        Self::new(EventType::AnalysisCompleted, contract, Some(tx_hash))
            .with_payload(EventPayload::Analysis { result, fallback })
    }

    pub fn pause_triggered(
        contract: Address,
        tx_hash: H256,
        reason: String,
        risk_score: u8,
        action: PolicyAction,
    ) -> Self {
        Self::new(EventType::PauseTriggered, contract, Some(tx_hash)).with_payload(
            EventPayload::Pause {
                reason,
                risk_score,
                action,
            },
        )
    }

    pub fn pause_failed(
        contract: Address,
        tx_hash: H256,
        reason: String,
        risk_score: u8,
        action: PolicyAction,
    ) -> Self {
        Self::new(EventType::PauseFailed, contract, Some(tx_hash)).with_payload(
            EventPayload::Pause {
                reason,
                risk_score,
                action,
            },
        )
    }

    pub fn contract_registered(contract: MonitoredContract) -> Self {
        Self::new(EventType::ContractRegistered, contract.address, None)
            .with_payload(EventPayload::Contract { contract })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = GuardianEvent::pause_triggered(
            Address::repeat_byte(0xaa),
            H256::repeat_byte(0xbb),
            "attack() selector".to_string(),
            80,
            PolicyAction::PauseImmediately,
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "PAUSE_TRIGGERED");
        assert_eq!(
            json["contractAddress"],
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert!(json["txHash"].is_string());
        assert!(json["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(json["payload"]["kind"], "pause");
        assert_eq!(json["payload"]["riskScore"], 80);
        assert_eq!(json["payload"]["action"], "PAUSE_IMMEDIATELY");
    }

    #[test]
    fn test_registration_has_no_tx_hash() {
        let contract = MonitoredContract::new(Address::repeat_byte(0x01), false, None);
        let event = GuardianEvent::contract_registered(contract);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CONTRACT_REGISTERED");
        assert!(json["txHash"].is_null());
    }
}
