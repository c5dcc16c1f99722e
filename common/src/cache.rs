// External imports
use ethers::core::types::H256;

// Standard library imports
use std::num::NonZeroUsize;

// Third party imports
use lru::LruCache;
use tracing::trace;

/// Dung lượng mặc định của dedup cache
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Tập hash giao dịch đã xử lý, giới hạn dung lượng, phần tử cũ nhất bị loại trước.
///
/// Dùng `LruCache` nhưng không bao giờ gọi `get`, nên thứ tự LRU trùng với thứ tự
/// chèn và cache hoạt động như FIFO.
#[derive(Debug)]
pub struct DedupCache {
    seen: LruCache<H256, ()>,
}

impl DedupCache {
    /// Tạo cache mới, dung lượng 0 được nâng lên 1
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: LruCache::new(capacity),
        }
    }

    /// Đánh dấu đã xử lý. Trả về false nếu hash đã có trong cache
    pub fn insert(&mut self, tx_hash: H256) -> bool {
        if self.seen.contains(&tx_hash) {
            return false;
        }
        if let Some((evicted, _)) = self.seen.push(tx_hash, ()) {
            if evicted != tx_hash {
                trace!(evicted = ?evicted, "Loại hash cũ nhất khỏi dedup cache");
            }
        }
        true
    }

    pub fn contains(&self, tx_hash: &H256) -> bool {
        self.seen.contains(tx_hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.seen.cap().get()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
