use ethers::types::{Address, Transaction, U256};
use ethers::utils::id;
use once_cell::sync::Lazy;
use sentinel_common::{
    utils::{format_selector, function_selector, wei_to_ether},
    ThreatCategory, ThreatEvent, ThreatLevel, ThreatMetadata,
};
use std::collections::HashMap;
use tracing::debug;

pub const ATTACK_CONFIDENCE: f64 = 0.98;
pub const SENSITIVE_CONFIDENCE: f64 = 0.85;
pub const LARGE_TRANSFER_CONFIDENCE: f64 = 0.7;

/// Hàm tấn công đã biết: khớp là CRITICAL bất kể giá trị
const ATTACK_SIGNATURES: &[(&str, ThreatCategory)] = &[
    ("attack()", ThreatCategory::Reentrancy),
    ("exploit()", ThreatCategory::Reentrancy),
    ("reentrancyAttack()", ThreatCategory::Reentrancy),
    ("flashLoan(address,address,uint256,bytes)", ThreatCategory::FlashLoan),
    ("drain()", ThreatCategory::FundDrain),
    ("drainFunds()", ThreatCategory::FundDrain),
];

/// Hàm nhạy cảm: chỉ báo HIGH khi đi kèm giá trị lớn hơn ngưỡng
const SENSITIVE_SIGNATURES: &[&str] = &[
    "withdraw(uint256)",
    "withdrawAll()",
    "emergencyWithdraw()",
    "upgradeTo(address)",
    "upgradeToAndCall(address,bytes)",
    "transferOwnership(address)",
    "setImplementation(address)",
];

#[derive(Debug, Clone, Copy)]
struct SignatureEntry {
    signature: &'static str,
    category: ThreatCategory,
}

static ATTACK_TABLE: Lazy<HashMap<[u8; 4], SignatureEntry>> = Lazy::new(|| {
    ATTACK_SIGNATURES
        .iter()
        .map(|&(signature, category)| (id(signature), SignatureEntry { signature, category }))
        .collect()
});

static SENSITIVE_TABLE: Lazy<HashMap<[u8; 4], SignatureEntry>> = Lazy::new(|| {
    SENSITIVE_SIGNATURES
        .iter()
        .map(|&signature| {
            (
                id(signature),
                SignatureEntry {
                    signature,
                    category: ThreatCategory::PrivilegedCall,
                },
            )
        })
        .collect()
});

/// Phát hiện threat trong một giao dịch dựa vào selector và giá trị.
///
/// Không giữ trạng thái; chỉ đọc ngưỡng cấu hình.
#[derive(Debug, Clone)]
pub struct ThreatDetector {
    sensitive_min_value: U256,
    large_value_threshold: U256,
}

impl ThreatDetector {
    pub fn new(sensitive_min_value: U256, large_value_threshold: U256) -> Self {
        Self {
            sensitive_min_value,
            large_value_threshold,
        }
    }

    /// Phân tích một giao dịch gửi tới `contract`.
    ///
    /// Giao dịch không có calldata (chuyển tiền thuần) không bao giờ sinh threat.
    /// Calldata ngắn hơn 4 byte không khớp selector nào nhưng vẫn được kiểm tra giá trị.
    pub fn analyze(&self, tx: &Transaction, contract: Address) -> Vec<ThreatEvent> {
        if tx.input.is_empty() {
            return Vec::new();
        }
        let selector = function_selector(&tx.input);
        let selector_hex = selector.as_ref().map(format_selector);
        let mut threats = Vec::new();

        if let Some(entry) = selector.and_then(|s| ATTACK_TABLE.get(&s)) {
            threats.push(
                ThreatEvent::new(
                    contract,
                    tx.hash,
                    ThreatLevel::Critical,
                    format!("Attack signature {} ({})", entry.signature, selector_hex.as_deref().unwrap_or_default()),
                    ATTACK_CONFIDENCE,
                )
                .with_metadata(ThreatMetadata {
                    category: entry.category,
                    selector: selector_hex.clone(),
                    signature: Some(entry.signature.to_string()),
                }),
            );
        } else if let Some(entry) = selector.and_then(|s| SENSITIVE_TABLE.get(&s)) {
            if tx.value > self.sensitive_min_value {
                threats.push(
                    ThreatEvent::new(
                        contract,
                        tx.hash,
                        ThreatLevel::High,
                        format!(
                            "Sensitive function {} called with {} native",
                            entry.signature,
                            wei_to_ether(tx.value)
                        ),
                        SENSITIVE_CONFIDENCE,
                    )
                    .with_metadata(ThreatMetadata {
                        category: entry.category,
                        selector: selector_hex.clone(),
                        signature: Some(entry.signature.to_string()),
                    }),
                );
            }
        }

        if tx.value > self.large_value_threshold {
            threats.push(
                ThreatEvent::new(
                    contract,
                    tx.hash,
                    ThreatLevel::High,
                    format!("Large transfer of {} native", wei_to_ether(tx.value)),
                    LARGE_TRANSFER_CONFIDENCE,
                )
                .with_metadata(ThreatMetadata {
                    category: ThreatCategory::LargeTransfer,
                    selector: selector_hex,
                    signature: None,
                }),
            );
        }

        if !threats.is_empty() {
            debug!(tx = ?tx.hash, contract = ?contract, count = threats.len(), "Phát hiện threat");
        }
        threats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Bytes, H256};
    use ethers::utils::parse_ether;

    fn detector() -> ThreatDetector {
        ThreatDetector::new(U256::exp10(17), U256::exp10(18))
    }

    fn tx_calling(signature: Option<&str>, value: &str) -> Transaction {
        let input = match signature {
            Some(sig) => {
                let mut data = id(sig).to_vec();
                data.extend_from_slice(&[0u8; 32]);
                Bytes::from(data)
            }
            None => Bytes::default(),
        };
        Transaction {
            hash: H256::random(),
            to: Some(Address::repeat_byte(0xaa)),
            value: parse_ether(value).unwrap(),
            input,
            ..Default::default()
        }
    }

    #[test]
    fn test_attack_signature_is_critical_regardless_of_value() {
        let contract = Address::repeat_byte(0xaa);
        for (signature, _) in ATTACK_SIGNATURES {
            let threats = detector().analyze(&tx_calling(Some(*signature), "0"), contract);
            assert_eq!(threats.len(), 1, "{}", signature);
            assert_eq!(threats[0].level, ThreatLevel::Critical);
            assert_eq!(threats[0].confidence, ATTACK_CONFIDENCE);
            assert_eq!(threats[0].contract_address, contract);
        }
    }

    #[test]
    fn test_flash_loan_category() {
        let threats = detector().analyze(
            &tx_calling(Some("flashLoan(address,address,uint256,bytes)"), "0.01"),
            Address::zero(),
        );
        assert_eq!(threats[0].category(), Some(ThreatCategory::FlashLoan));
        assert_eq!(
            threats[0].metadata.as_ref().unwrap().selector,
            Some(format_selector(&id("flashLoan(address,address,uint256,bytes)")))
        );
    }

    #[test]
    fn test_sensitive_function_needs_value() {
        let low = detector().analyze(&tx_calling(Some("withdraw(uint256)"), "0.1"), Address::zero());
        assert!(low.is_empty());

        let high = detector().analyze(&tx_calling(Some("withdraw(uint256)"), "0.5"), Address::zero());
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].level, ThreatLevel::High);
        assert_eq!(high[0].confidence, SENSITIVE_CONFIDENCE);
        assert_eq!(high[0].category(), Some(ThreatCategory::PrivilegedCall));
    }

    #[test]
    fn test_large_value_adds_independent_threat() {
        let threats = detector().analyze(&tx_calling(Some("withdraw(uint256)"), "2.5"), Address::zero());
        assert_eq!(threats.len(), 2);
        assert_eq!(threats[1].category(), Some(ThreatCategory::LargeTransfer));

        let unknown = detector().analyze(&tx_calling(Some("deposit()"), "2.5"), Address::zero());
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].level, ThreatLevel::High);
    }

    #[test]
    fn test_plain_transfer_never_threatens() {
        let threats = detector().analyze(&tx_calling(None, "500"), Address::zero());
        assert!(threats.is_empty());
    }

    #[test]
    fn test_short_calldata_still_checks_value() {
        let mut tx = tx_calling(None, "2.5");
        tx.input = Bytes::from(vec![0xde, 0xad]);

        let threats = detector().analyze(&tx, Address::zero());
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].level, ThreatLevel::High);
        assert_eq!(threats[0].category(), Some(ThreatCategory::LargeTransfer));
        assert_eq!(threats[0].metadata.as_ref().unwrap().selector, None);
    }

    #[test]
    fn test_unknown_selector_low_value() {
        let threats = detector().analyze(&tx_calling(Some("deposit()"), "0.2"), Address::zero());
        assert!(threats.is_empty());
    }
}
