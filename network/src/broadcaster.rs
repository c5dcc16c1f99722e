// Third party imports
use tokio::sync::broadcast;
use tracing::{debug, trace};

// Internal imports
use crate::events::GuardianEvent;

/// Số event tối đa được giữ cho mỗi observer chậm trước khi bị bỏ qua
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out event tới các observer đang kết nối.
///
/// Best-effort: observer kết nối sau sẽ không nhận event cũ, observer chậm chỉ
/// mất event của chính nó và không bao giờ chặn pipeline.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<GuardianEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Đăng ký observer mới
    pub fn subscribe(&self) -> broadcast::Receiver<GuardianEvent> {
        self.tx.subscribe()
    }

    /// Gửi event, trả về số observer nhận được. Không có observer không phải lỗi
    pub fn publish(&self, event: GuardianEvent) -> usize {
        let event_type = event.event_type;
        match self.tx.send(event) {
            Ok(delivered) => {
                debug!(?event_type, delivered, "Đã broadcast event");
                delivered
            }
            Err(_) => {
                trace!(?event_type, "Không có observer nào, bỏ qua event");
                0
            }
        }
    }

    /// Số observer đang kết nối
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
