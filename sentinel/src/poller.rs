use async_trait::async_trait;
use ethers::types::{Block, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::chain::ChainClient;
use crate::error_handling::ChainError;

/// Nơi nhận block từ poller, xử lý tuần tự theo thứ tự tăng dần
#[async_trait]
pub trait BlockHandler: Send {
    /// Gọi đầu mỗi tick, trước khi đọc block height
    async fn on_tick_start(&mut self) {}

    async fn on_block(&mut self, block: &Block<Transaction>);

    /// Gọi sau khi checkpoint được cập nhật
    fn on_checkpoint(&mut self, _height: u64) {}
}

/// Kết quả một tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick đầu tiên: đặt checkpoint tại head, không xử lý lịch sử
    Initialized(u64),
    /// Không có block mới
    Idle,
    /// Đã xử lý block trong khoảng [from, to]
    Processed { from: u64, to: u64 },
}

/// Kéo block mới từ RPC theo chu kỳ.
///
/// Checkpoint chỉ tiến lên khi cả khoảng block đã được lấy và xử lý xong; lỗi RPC
/// khiến khoảng đó được thử lại ở tick sau, không giới hạn số lần.
#[derive(Debug)]
pub struct ChainPoller {
    client: Arc<dyn ChainClient>,
    last_checked: Option<u64>,
    max_blocks_per_tick: u64,
    poll_interval: Duration,
}

impl ChainPoller {
    pub fn new(client: Arc<dyn ChainClient>, poll_interval: Duration, max_blocks_per_tick: u64) -> Self {
        Self {
            client,
            last_checked: None,
            max_blocks_per_tick: max_blocks_per_tick.max(1),
            poll_interval,
        }
    }

    pub fn last_checked(&self) -> Option<u64> {
        self.last_checked
    }

    /// Một chu kỳ poll. Trả về lỗi nếu RPC lỗi, khi đó checkpoint giữ nguyên
    pub async fn tick<H: BlockHandler + ?Sized>(&mut self, handler: &mut H) -> Result<TickOutcome, ChainError> {
        handler.on_tick_start().await;

        let head = self.client.block_number().await?;
        let Some(last) = self.last_checked else {
            self.last_checked = Some(head);
            handler.on_checkpoint(head);
            info!(block = head, "Bắt đầu theo dõi từ block hiện tại");
            return Ok(TickOutcome::Initialized(head));
        };

        if head <= last {
            return Ok(TickOutcome::Idle);
        }

        let from = last + 1;
        let to = head.min(last.saturating_add(self.max_blocks_per_tick));
        if to < head {
            debug!(from, to, head, "Đang bắt kịp, giới hạn số block mỗi tick");
        }

        // Lấy toàn bộ khoảng trước khi xử lý để lỗi giữa chừng không xử lý nửa vời
        let mut blocks = Vec::with_capacity((to - from + 1) as usize);
        for number in from..=to {
            blocks.push(self.client.block_with_txs(number).await?);
        }

        for block in &blocks {
            handler.on_block(block).await;
        }

        self.last_checked = Some(to);
        handler.on_checkpoint(to);
        Ok(TickOutcome::Processed { from, to })
    }

    /// Chạy vòng poll cho tới khi nhận tín hiệu shutdown.
    ///
    /// Tick tiếp theo chỉ bắt đầu sau khi tick hiện tại hoàn tất.
    pub async fn run<H: BlockHandler + ?Sized>(&mut self, handler: &mut H, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Chain poller đã khởi động");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(handler).await {
                        Ok(_) => {}
                        Err(e) if e.is_transient() => {
                            warn!(error = %e, last_checked = ?self.last_checked, "Lỗi RPC tạm thời, thử lại ở chu kỳ sau");
                        }
                        Err(e) => {
                            error!(error = %e, last_checked = ?self.last_checked, "Tick lỗi, thử lại ở chu kỳ sau");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(last_checked = ?self.last_checked, "Chain poller đã dừng");
    }
}
