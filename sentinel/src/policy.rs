use ethers::types::{Address, Bytes, U256};
use sentinel_common::{
    utils::wei_to_ether, PolicyAction, PolicyResult, PolicyRule, PolicyViolation, ThreatEvent,
    ThreatLevel,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

pub const POLICY_ID: &str = "ace-guardian-v1";

/// Độ dài cửa sổ của bộ đếm khối lượng theo ngày
pub const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Đầu vào cho một lần đánh giá policy
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub sender: Address,
    pub recipient: Option<Address>,
    pub value: U256,
    pub calldata: Bytes,
    pub threats: Vec<ThreatEvent>,
    /// Khối lượng sender đã chuyển trong cửa sổ hiện tại, chưa gồm giao dịch này
    pub sender_daily_volume: Option<U256>,
}

/// Ngưỡng và danh sách chặn của ACE policy
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub blacklist: HashSet<Address>,
    pub max_transaction_value: U256,
    pub daily_volume_limit: U256,
}

/// Tính điểm rủi ro và hành động khuyến nghị. Không có side effect
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn is_blacklisted(&self, address: &Address) -> bool {
        self.config.blacklist.contains(address)
    }

    pub fn evaluate(&self, context: &PolicyContext) -> PolicyResult {
        let mut violations = Vec::new();

        // Blacklist
        if self.is_blacklisted(&context.sender) {
            violations.push(PolicyViolation {
                rule: PolicyRule::BlacklistCompliance,
                severity: ThreatLevel::Critical,
                details: format!("Sender {:?} is blacklisted", context.sender),
            });
        }

        // Volume
        if context.value > self.config.max_transaction_value {
            violations.push(PolicyViolation {
                rule: PolicyRule::MaxTransactionValue,
                severity: ThreatLevel::High,
                details: format!(
                    "Value {} exceeds max transaction value {}",
                    wei_to_ether(context.value),
                    wei_to_ether(self.config.max_transaction_value)
                ),
            });
        }
        if let Some(volume) = context.sender_daily_volume {
            let total = volume.saturating_add(context.value);
            if total > self.config.daily_volume_limit {
                violations.push(PolicyViolation {
                    rule: PolicyRule::DailyVolumeLimit,
                    severity: ThreatLevel::Medium,
                    details: format!(
                        "Daily volume {} exceeds limit {}",
                        wei_to_ether(total),
                        wei_to_ether(self.config.daily_volume_limit)
                    ),
                });
            }
        }

        // Threat level: MEDIUM/LOW không thành violation
        for threat in &context.threats {
            let rule = match threat.level {
                ThreatLevel::Critical => PolicyRule::CriticalThreatDetected,
                ThreatLevel::High => PolicyRule::HighThreatDetected,
                ThreatLevel::Medium | ThreatLevel::Low => continue,
            };
            violations.push(PolicyViolation {
                rule,
                severity: threat.level,
                details: threat.details.clone(),
            });
        }

        let risk_score = risk_score(&violations, context.value);
        let recommended_action = recommend_action(&violations, risk_score);

        debug!(
            sender = ?context.sender,
            violations = violations.len(),
            risk_score,
            action = %recommended_action,
            "Đánh giá policy"
        );

        PolicyResult {
            passed: violations.is_empty(),
            policy_id: POLICY_ID.to_string(),
            violations,
            risk_score,
            recommended_action,
        }
    }
}

/// Điểm rủi ro cộng dồn theo violation và giá trị giao dịch, kẹp trong [0, 100]
pub fn risk_score(violations: &[PolicyViolation], value: U256) -> u8 {
    let mut score: u32 = violations
        .iter()
        .map(|v| v.severity.score_weight())
        .fold(0u32, u32::saturating_add);

    // 0.01 native
    if value > U256::exp10(16) {
        score = score.saturating_add(10);
    }
    // 0.1 native
    if value > U256::exp10(17) {
        score = score.saturating_add(20);
    }

    score.min(100) as u8
}

/// Chọn hành động theo thứ tự ưu tiên, khớp đầu tiên thắng
pub fn recommend_action(violations: &[PolicyViolation], risk_score: u8) -> PolicyAction {
    let has = |level: ThreatLevel| violations.iter().any(|v| v.severity == level);

    if has(ThreatLevel::Critical) {
        PolicyAction::PauseImmediately
    } else if has(ThreatLevel::High) || risk_score >= 60 {
        PolicyAction::Pause
    } else if has(ThreatLevel::Medium) || risk_score >= 30 {
        PolicyAction::Monitor
    } else {
        PolicyAction::Allow
    }
}

#[derive(Debug, Clone, Copy)]
struct VolumeWindow {
    started_at: u64,
    total: U256,
}

/// Bộ đếm khối lượng theo sender với cửa sổ cố định 24h.
///
/// Cửa sổ bắt đầu từ giao dịch đầu tiên của sender; khi hết hạn, bộ đếm reset về 0.
/// Thời gian truyền vào dạng Unix ms để test chủ động.
#[derive(Debug, Default)]
pub struct DailyVolumeTracker {
    windows: HashMap<Address, VolumeWindow>,
}

impl DailyVolumeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_expired(window: &VolumeWindow, now: u64) -> bool {
        now.saturating_sub(window.started_at) >= DAILY_WINDOW.as_millis() as u64
    }

    /// Khối lượng hiện tại trong cửa sổ của sender
    pub fn volume(&self, sender: &Address, now: u64) -> U256 {
        match self.windows.get(sender) {
            Some(window) if !Self::is_expired(window, now) => window.total,
            _ => U256::zero(),
        }
    }

    /// Ghi nhận giá trị vừa chuyển, trả về tổng mới
    pub fn record(&mut self, sender: Address, value: U256, now: u64) -> U256 {
        let window = self.windows.entry(sender).or_insert(VolumeWindow {
            started_at: now,
            total: U256::zero(),
        });
        if Self::is_expired(window, now) {
            *window = VolumeWindow {
                started_at: now,
                total: U256::zero(),
            };
        }
        window.total = window.total.saturating_add(value);
        window.total
    }

    /// Xóa các cửa sổ đã hết hạn
    pub fn reset_expired(&mut self, now: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| !Self::is_expired(window, now));
        before - self.windows.len()
    }

    pub fn tracked_senders(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::H256;
    use ethers::utils::parse_ether;
    use proptest::prelude::*;

    fn blacklisted() -> Address {
        Address::repeat_byte(0xbb)
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::new(PolicyConfig {
            blacklist: [blacklisted()].into_iter().collect(),
            max_transaction_value: parse_ether("10").unwrap(),
            daily_volume_limit: parse_ether("100").unwrap(),
        })
    }

    fn context(sender: Address, value: &str, threats: Vec<ThreatEvent>) -> PolicyContext {
        PolicyContext {
            sender,
            recipient: Some(Address::repeat_byte(0xaa)),
            value: parse_ether(value).unwrap(),
            calldata: Bytes::default(),
            threats,
            sender_daily_volume: None,
        }
    }

    fn threat(level: ThreatLevel) -> ThreatEvent {
        ThreatEvent::new(
            Address::repeat_byte(0xaa),
            H256::repeat_byte(0x01),
            level,
            format!("{} threat", level),
            0.9,
        )
    }

    #[test]
    fn test_scenario_a_clean_transfer() {
        let result = engine().evaluate(&context(Address::repeat_byte(1), "0.00001", vec![]));
        assert!(result.passed);
        assert!(result.risk_score <= 10);
        assert_eq!(result.recommended_action, PolicyAction::Allow);
        assert_eq!(result.policy_id, POLICY_ID);
    }

    #[test]
    fn test_scenario_b_blacklisted_sender() {
        let result = engine().evaluate(&context(blacklisted(), "0.001", vec![]));
        assert!(!result.passed);
        assert!(result.risk_score >= 40);
        assert_eq!(result.recommended_action, PolicyAction::PauseImmediately);
        assert_eq!(result.violations[0].rule, PolicyRule::BlacklistCompliance);
    }

    #[test]
    fn test_scenario_c_large_transfer_threat() {
        let result = engine().evaluate(&context(
            Address::repeat_byte(1),
            "2.5",
            vec![threat(ThreatLevel::High)],
        ));
        assert!(!result.passed);
        assert!(result.risk_score >= 30);
        assert_eq!(result.recommended_action, PolicyAction::Pause);
    }

    #[test]
    fn test_scenario_d_attack_signature() {
        let result = engine().evaluate(&context(
            Address::repeat_byte(1),
            "0.01",
            vec![threat(ThreatLevel::Critical)],
        ));
        assert!(!result.passed);
        assert!(result.risk_score >= 40);
        assert_eq!(result.recommended_action, PolicyAction::PauseImmediately);
        assert_eq!(result.violations[0].rule, PolicyRule::CriticalThreatDetected);
    }

    #[test]
    fn test_scenario_e_medium_threat_only() {
        let result = engine().evaluate(&context(
            Address::repeat_byte(1),
            "0.001",
            vec![threat(ThreatLevel::Medium), threat(ThreatLevel::Low)],
        ));
        assert!(result.passed);
        assert!(result.risk_score <= 20);
        assert!(result.recommended_action <= PolicyAction::Monitor);
    }

    #[test]
    fn test_max_transaction_value() {
        let result = engine().evaluate(&context(Address::repeat_byte(1), "11", vec![]));
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].rule, PolicyRule::MaxTransactionValue);
        // 25 (HIGH) + 10 + 20
        assert_eq!(result.risk_score, 55);
        assert_eq!(result.recommended_action, PolicyAction::Pause);
    }

    #[test]
    fn test_daily_volume_violation() {
        let mut ctx = context(Address::repeat_byte(1), "5", vec![]);
        ctx.sender_daily_volume = Some(parse_ether("96").unwrap());
        let result = engine().evaluate(&ctx);
        assert_eq!(result.violations[0].rule, PolicyRule::DailyVolumeLimit);
        assert_eq!(result.violations[0].severity, ThreatLevel::Medium);
        assert_eq!(result.recommended_action, PolicyAction::Monitor);

        ctx.sender_daily_volume = Some(parse_ether("90").unwrap());
        assert!(engine().evaluate(&ctx).passed);
    }

    #[test]
    fn test_value_bonus_thresholds() {
        assert_eq!(risk_score(&[], parse_ether("0.01").unwrap()), 0);
        assert_eq!(risk_score(&[], parse_ether("0.05").unwrap()), 10);
        assert_eq!(risk_score(&[], parse_ether("0.5").unwrap()), 30);
    }

    #[test]
    fn test_score_only_actions() {
        assert_eq!(recommend_action(&[], 60), PolicyAction::Pause);
        assert_eq!(recommend_action(&[], 30), PolicyAction::Monitor);
        assert_eq!(recommend_action(&[], 29), PolicyAction::Allow);
    }

    #[test]
    fn test_daily_volume_tracker_window() {
        let sender = Address::repeat_byte(1);
        let day = DAILY_WINDOW.as_millis() as u64;
        let mut tracker = DailyVolumeTracker::new();

        assert_eq!(tracker.volume(&sender, 0), U256::zero());
        tracker.record(sender, U256::from(5u64), 1_000);
        let total = tracker.record(sender, U256::from(7u64), 2_000);
        assert_eq!(total, U256::from(12u64));
        assert_eq!(tracker.volume(&sender, 1_000 + day - 1), U256::from(12u64));

        // Hết cửa sổ: volume về 0, lần ghi tiếp theo mở cửa sổ mới
        assert_eq!(tracker.volume(&sender, 1_000 + day), U256::zero());
        assert_eq!(tracker.record(sender, U256::from(3u64), 1_000 + day), U256::from(3u64));

        assert_eq!(tracker.reset_expired(1_000 + 2 * day), 1);
        assert_eq!(tracker.tracked_senders(), 0);
    }

    fn arb_level() -> impl Strategy<Value = ThreatLevel> {
        prop_oneof![
            Just(ThreatLevel::Low),
            Just(ThreatLevel::Medium),
            Just(ThreatLevel::High),
            Just(ThreatLevel::Critical),
        ]
    }

    fn violation(severity: ThreatLevel) -> PolicyViolation {
        PolicyViolation {
            rule: PolicyRule::HighThreatDetected,
            severity,
            details: String::new(),
        }
    }

    proptest! {
        #[test]
        fn prop_score_monotonic_and_clamped(
            base in prop::collection::vec(arb_level(), 0..8),
            extra in prop::collection::vec(arb_level(), 0..8),
            value in any::<u128>(),
        ) {
            let v1: Vec<PolicyViolation> = base.iter().copied().map(violation).collect();
            let mut v2 = v1.clone();
            v2.extend(extra.iter().copied().map(violation));
            let value = U256::from(value);

            let s1 = risk_score(&v1, value);
            let s2 = risk_score(&v2, value);
            prop_assert!(s2 >= s1);
            prop_assert!(s2 <= 100);
        }

        #[test]
        fn prop_blacklist_dominates(
            value in any::<u64>(),
            levels in prop::collection::vec(arb_level(), 0..5),
        ) {
            let threats = levels.into_iter().map(threat).collect();
            let mut ctx = context(blacklisted(), "0", threats);
            ctx.value = U256::from(value);
            let result = engine().evaluate(&ctx);
            prop_assert!(!result.passed);
            prop_assert!(result.risk_score >= 40);
            prop_assert_eq!(result.recommended_action, PolicyAction::PauseImmediately);
        }
    }
}
