use async_trait::async_trait;
use ethers::types::{Address, Block, Transaction, H256};
use sentinel_common::{
    utils::current_timestamp, DedupCache, MonitoredContract, PolicyAction, PolicyResult, RiskLevel,
};
use sentinel_network::{EventBroadcaster, GuardianEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisOrchestrator, AnalysisOutcome, AnalysisRequest};
use crate::config::Config;
use crate::detector::ThreatDetector;
use crate::executor::{reason_hash, GuardianExecutor};
use crate::policy::{DailyVolumeTracker, PolicyConfig, PolicyContext, PolicyEngine};
use crate::poller::BlockHandler;
use crate::registry::{ContractRegistry, ContractResolver, Registration, ResolvedContract};

/// Lệnh gửi tới pipeline từ bên ngoài, được xử lý giữa các tick
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    /// Contract đã được đọc xong từ mạng, pipeline chỉ cần ghi vào registry
    Register(ResolvedContract),
}

/// Đọc metadata contract trong task riêng rồi gửi kết quả cho pipeline.
///
/// Việc gọi guardian và dịch vụ verify không chặn vòng poll. Task trả về false nếu
/// pipeline đã dừng.
pub fn request_registration(
    resolver: ContractResolver,
    address: Address,
    commands: mpsc::Sender<PipelineCommand>,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        let resolved = resolver.resolve(address).await;
        match commands.send(PipelineCommand::Register(resolved)).await {
            Ok(()) => true,
            Err(_) => {
                warn!(contract = ?address, "Pipeline đã dừng, bỏ qua đăng ký");
                false
            }
        }
    })
}

/// Trạng thái chỉ đọc cho health/status API
#[derive(Debug, Default)]
pub struct SystemStatus {
    monitored_contracts: AtomicUsize,
    last_checked_block: AtomicU64,
    started: AtomicBool,
    contracts: RwLock<Vec<MonitoredContract>>,
}

impl SystemStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn monitored_contracts(&self) -> usize {
        self.monitored_contracts.load(Ordering::Relaxed)
    }

    pub fn last_checked_block(&self) -> Option<u64> {
        self.started
            .load(Ordering::Acquire)
            .then(|| self.last_checked_block.load(Ordering::Relaxed))
    }

    fn set_last_checked_block(&self, height: u64) {
        self.last_checked_block.store(height, Ordering::Relaxed);
        self.started.store(true, Ordering::Release);
    }

    /// Bản sao danh sách contract tại lần cập nhật gần nhất
    pub async fn contracts(&self) -> Vec<MonitoredContract> {
        self.contracts.read().await.clone()
    }

    async fn set_contracts(&self, contracts: Vec<MonitoredContract>) {
        self.monitored_contracts.store(contracts.len(), Ordering::Relaxed);
        *self.contracts.write().await = contracts;
    }
}

/// Quyết định cuối cùng cho một giao dịch
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub policy: PolicyResult,
    pub analysis: Option<AnalysisOutcome>,
    pub should_pause: bool,
    pub reason: String,
}

/// Ghép kết quả policy và phân tích thành quyết định pause.
///
/// Pause khi hành động khuyến nghị đạt ngưỡng hoặc phân tích đánh giá CRITICAL.
pub fn decide(policy: PolicyResult, analysis: Option<AnalysisOutcome>, threshold: PolicyAction) -> Decision {
    let analysis_level = analysis.as_ref().map(|a| a.result.risk_level);
    let analysis_critical = match analysis_level {
        Some(RiskLevel::Critical) => true,
        Some(RiskLevel::Safe | RiskLevel::Low | RiskLevel::Medium | RiskLevel::High) | None => false,
    };
    let should_pause = policy.recommended_action >= threshold || analysis_critical;

    let details = policy
        .violations
        .first()
        .map(|v| v.details.clone())
        .or_else(|| analysis.as_ref().map(|a| a.result.summary.clone()))
        .unwrap_or_else(|| "no violations".to_string());
    let reason = format!(
        "{} (risk score {}): {}",
        policy.recommended_action, policy.risk_score, details
    );

    Decision {
        policy,
        analysis,
        should_pause,
        reason,
    }
}

/// Kết quả bước thực thi pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// Cache báo contract đã pause, không gọi guardian
    AlreadyPaused,
    Paused,
    Failed,
}

/// Pipeline phát hiện - quyết định - phản ứng.
///
/// Sở hữu duy nhất registry và dedup cache; mọi giao dịch được xử lý tuần tự theo
/// thứ tự block rồi thứ tự trong block.
#[derive(Debug)]
pub struct GuardianPipeline {
    chain_id: u64,
    pause_threshold: PolicyAction,
    registry: ContractRegistry,
    dedup: DedupCache,
    detector: ThreatDetector,
    policy: PolicyEngine,
    volumes: DailyVolumeTracker,
    orchestrator: AnalysisOrchestrator,
    executor: GuardianExecutor,
    broadcaster: EventBroadcaster,
    status: Arc<SystemStatus>,
    commands: mpsc::Receiver<PipelineCommand>,
}

impl GuardianPipeline {
    pub fn new(
        config: &Config,
        registry: ContractRegistry,
        orchestrator: AnalysisOrchestrator,
        executor: GuardianExecutor,
        broadcaster: EventBroadcaster,
        status: Arc<SystemStatus>,
        commands: mpsc::Receiver<PipelineCommand>,
    ) -> Self {
        Self {
            chain_id: config.chain_id,
            pause_threshold: config.pause_action_threshold,
            registry,
            dedup: DedupCache::new(config.dedup_capacity),
            detector: ThreatDetector::new(config.sensitive_min_value, config.large_value_threshold),
            policy: PolicyEngine::new(PolicyConfig {
                blacklist: config.blacklist.iter().copied().collect(),
                max_transaction_value: config.max_transaction_value,
                daily_volume_limit: config.daily_volume_limit,
            }),
            volumes: DailyVolumeTracker::new(),
            orchestrator,
            executor,
            broadcaster,
            status,
            commands,
        }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Đăng ký contract và thông báo cho observer. Gọi mạng trực tiếp, chỉ dùng khi khởi động
    pub async fn register(&mut self, address: Address) -> MonitoredContract {
        let registration = self.registry.register(address).await;
        self.announce(registration).await
    }

    async fn announce(&mut self, registration: Registration) -> MonitoredContract {
        if registration.is_changed() {
            self.broadcaster
                .publish(GuardianEvent::contract_registered(registration.contract().clone()));
            self.refresh_status().await;
        }
        registration.into_contract()
    }

    /// Xử lý các lệnh đang chờ mà không block và không gọi mạng
    pub async fn drain_commands(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(command) = self.commands.try_recv() {
            match command {
                PipelineCommand::Register(resolved) => {
                    let registration = self.registry.apply(resolved);
                    self.announce(registration).await;
                }
            }
            handled += 1;
        }
        handled
    }

    async fn refresh_status(&self) {
        let contracts = self.registry.get_all().into_iter().cloned().collect();
        self.status.set_contracts(contracts).await;
    }

    /// Xử lý một giao dịch. Trả về None nếu giao dịch bị lọc hoặc đã xử lý
    pub async fn process_transaction(&mut self, tx: &Transaction) -> Option<Decision> {
        let target = tx.to?;
        match self.registry.get(&target) {
            Some(contract) if !contract.is_paused => {}
            _ => return None,
        }
        if !self.dedup.insert(tx.hash) {
            debug!(tx = ?tx.hash, "Giao dịch đã xử lý, bỏ qua");
            return None;
        }

        let threats = self.detector.analyze(tx, target);

        let now = current_timestamp();
        let context = PolicyContext {
            sender: tx.from,
            recipient: tx.to,
            value: tx.value,
            calldata: tx.input.clone(),
            threats: threats.clone(),
            sender_daily_volume: Some(self.volumes.volume(&tx.from, now)),
        };
        let policy = self.policy.evaluate(&context);
        self.volumes.record(tx.from, tx.value, now);

        if !threats.is_empty() {
            warn!(
                contract = ?target,
                tx = ?tx.hash,
                threats = threats.len(),
                risk_score = policy.risk_score,
                "Phát hiện threat"
            );
            self.broadcaster
                .publish(GuardianEvent::threat_detected(target, tx.hash, threats.clone()));
        }

        let analysis = if threats.iter().any(|t| t.level.is_actionable()) {
            let request = match self.registry.get(&target) {
                Some(contract) => AnalysisRequest::new(self.chain_id, contract, tx, &threats),
                None => return None,
            };
            let outcome = self.orchestrator.analyze(&request, &threats).await;
            self.broadcaster.publish(GuardianEvent::analysis_completed(
                target,
                tx.hash,
                outcome.result.clone(),
                outcome.fallback,
            ));
            Some(outcome)
        } else {
            None
        };

        let decision = decide(policy, analysis, self.pause_threshold);
        if decision.should_pause {
            self.enforce(target, tx.hash, &decision).await;
        }
        Some(decision)
    }

    /// Pause contract nếu cache chưa báo đã pause.
    ///
    /// Không thử lại khi thất bại; threat mới ở tick sau sẽ kích hoạt lại.
    pub async fn enforce(&mut self, target: Address, tx_hash: H256, decision: &Decision) -> PauseOutcome {
        match self.registry.get(&target) {
            Some(contract) if contract.is_paused => {
                debug!(contract = ?target, "Contract đã pause, bỏ qua");
                return PauseOutcome::AlreadyPaused;
            }
            _ => {}
        }

        let risk_score = decision.policy.risk_score;
        let action = decision.policy.recommended_action;
        if self.executor.pause(target, reason_hash(&decision.reason)).await {
            self.registry.set_paused(&target, true);
            self.refresh_status().await;
            info!(contract = ?target, tx = ?tx_hash, reason = %decision.reason, "Đã kích hoạt pause");
            self.broadcaster.publish(GuardianEvent::pause_triggered(
                target,
                tx_hash,
                decision.reason.clone(),
                risk_score,
                action,
            ));
            PauseOutcome::Paused
        } else {
            self.broadcaster.publish(GuardianEvent::pause_failed(
                target,
                tx_hash,
                decision.reason.clone(),
                risk_score,
                action,
            ));
            PauseOutcome::Failed
        }
    }
}

#[async_trait]
impl BlockHandler for GuardianPipeline {
    async fn on_tick_start(&mut self) {
        let handled = self.drain_commands().await;
        if handled > 0 {
            debug!(handled, "Đã xử lý lệnh đăng ký");
        }
        self.volumes.reset_expired(current_timestamp());
    }

    async fn on_block(&mut self, block: &Block<Transaction>) {
        debug!(
            block = ?block.number,
            txs = block.transactions.len(),
            "Xử lý block"
        );
        for tx in &block.transactions {
            self.process_transaction(tx).await;
        }
    }

    fn on_checkpoint(&mut self, height: u64) {
        self.status.set_last_checked_block(height);
    }
}
