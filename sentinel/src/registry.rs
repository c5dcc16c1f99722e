use ethers::types::Address;
use sentinel_common::{ContractSource, MonitoredContract};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::Guardian;
use crate::verification::SourceProvider;

/// Kết quả đọc trạng thái và source của một contract từ mạng
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContract {
    pub address: Address,
    /// None nếu không đọc được trạng thái pause
    pub is_paused: Option<bool>,
    pub source: Option<ContractSource>,
}

/// Đọc metadata contract từ guardian và dịch vụ verify.
///
/// Không giữ trạng thái nên có thể chạy ngoài pipeline, song song với việc xử lý block.
#[derive(Debug, Clone)]
pub struct ContractResolver {
    chain_id: u64,
    guardian: Arc<dyn Guardian>,
    sources: Arc<dyn SourceProvider>,
}

impl ContractResolver {
    pub fn new(chain_id: u64, guardian: Arc<dyn Guardian>, sources: Arc<dyn SourceProvider>) -> Self {
        Self {
            chain_id,
            guardian,
            sources,
        }
    }

    /// Lỗi của collaborator không làm hỏng kết quả, chỉ để trống trường tương ứng
    pub async fn resolve(&self, address: Address) -> ResolvedContract {
        let is_paused = match self.guardian.is_paused(address).await {
            Ok(paused) => Some(paused),
            Err(e) => {
                warn!(contract = ?address, error = %e, "Không đọc được trạng thái pause");
                None
            }
        };

        let source = match self.sources.fetch_source(self.chain_id, address).await {
            Ok(Some(source)) => Some(source),
            Ok(None) => {
                warn!(contract = ?address, "Contract chưa verify, chỉ phát hiện bằng signature");
                None
            }
            Err(e) => {
                warn!(contract = ?address, error = %e, "Lỗi lấy source, chỉ phát hiện bằng signature");
                None
            }
        };

        ResolvedContract {
            address,
            is_paused,
            source,
        }
    }
}

/// Kết quả một lần đăng ký
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(MonitoredContract),
    Updated(MonitoredContract),
    /// Bản ghi trong cache giữ nguyên
    Unchanged(MonitoredContract),
}

impl Registration {
    pub fn contract(&self) -> &MonitoredContract {
        match self {
            Registration::Created(c) | Registration::Updated(c) | Registration::Unchanged(c) => c,
        }
    }

    pub fn into_contract(self) -> MonitoredContract {
        match self {
            Registration::Created(c) | Registration::Updated(c) | Registration::Unchanged(c) => c,
        }
    }

    pub fn is_changed(&self) -> bool {
        !matches!(self, Registration::Unchanged(_))
    }
}

/// Cache metadata của các contract được bảo vệ.
///
/// Chỉ pipeline ghi vào registry, nên không cần khóa.
#[derive(Debug)]
pub struct ContractRegistry {
    contracts: HashMap<Address, MonitoredContract>,
    resolver: ContractResolver,
}

impl ContractRegistry {
    pub fn new(resolver: ContractResolver) -> Self {
        Self {
            contracts: HashMap::new(),
            resolver,
        }
    }

    pub fn resolver(&self) -> &ContractResolver {
        &self.resolver
    }

    /// Đăng ký contract để bảo vệ, gọi mạng ngay tại chỗ.
    ///
    /// Nếu source đã có trong cache thì trả về bản ghi cũ mà không gọi mạng. Chỉ dùng
    /// khi khởi động; lúc đang chạy dùng `ContractResolver` ngoài pipeline rồi `apply`.
    pub async fn register(&mut self, address: Address) -> Registration {
        if let Some(existing) = self.contracts.get(&address) {
            if existing.has_source() {
                return Registration::Unchanged(existing.clone());
            }
        }
        let resolved = self.resolver.resolve(address).await;
        self.apply(resolved)
    }

    /// Ghép kết quả đọc từ mạng vào cache, không gọi mạng.
    ///
    /// Lần đăng ký đầu coi lỗi đọc pause là chưa pause. Với contract đã có trong cache,
    /// trạng thái pause đã biết không bị ghi đè bởi lỗi đọc hay kết quả đọc cũ hơn lần
    /// pause gần nhất, và source đã cache được giữ nguyên.
    pub fn apply(&mut self, resolved: ResolvedContract) -> Registration {
        let address = resolved.address;
        let Some(existing) = self.contracts.get(&address) else {
            let contract = MonitoredContract::new(address, resolved.is_paused.unwrap_or(false), resolved.source);
            info!(
                contract = ?address,
                name = %contract.name,
                is_paused = contract.is_paused,
                verified = contract.has_source(),
                "Đã đăng ký contract"
            );
            self.contracts.insert(address, contract.clone());
            return Registration::Created(contract);
        };

        if existing.has_source() {
            return Registration::Unchanged(existing.clone());
        }

        let is_paused = existing.is_paused || resolved.is_paused.unwrap_or(false);
        let mut contract = MonitoredContract::new(address, is_paused, resolved.source);
        contract.registered_at = existing.registered_at;
        if contract == *existing {
            debug!(contract = ?address, "Đăng ký lại không có thay đổi");
            return Registration::Unchanged(contract);
        }

        info!(
            contract = ?address,
            name = %contract.name,
            is_paused = contract.is_paused,
            verified = contract.has_source(),
            "Đã cập nhật contract"
        );
        self.contracts.insert(address, contract.clone());
        Registration::Updated(contract)
    }

    pub fn get(&self, address: &Address) -> Option<&MonitoredContract> {
        self.contracts.get(address)
    }

    /// Tất cả contract, sắp xếp theo thời điểm đăng ký
    pub fn get_all(&self) -> Vec<&MonitoredContract> {
        let mut all: Vec<&MonitoredContract> = self.contracts.values().collect();
        all.sort_by_key(|c| (c.registered_at, c.address));
        all
    }

    /// Cập nhật trạng thái pause trong cache. Trả về false nếu contract chưa đăng ký
    pub fn set_paused(&mut self, address: &Address, paused: bool) -> bool {
        match self.contracts.get_mut(address) {
            Some(contract) => {
                contract.is_paused = paused;
                true
            }
            None => false,
        }
    }

    pub fn is_monitored(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockGuardian;
    use crate::error_handling::ChainError;
    use crate::verification::{MockSourceProvider, VerificationError};

    fn vault_source() -> ContractSource {
        ContractSource {
            contract_name: "Vault".to_string(),
            source_code: "contract Vault {}".to_string(),
            abi: "[]".to_string(),
            compiler_version: None,
        }
    }

    fn registry(guardian: MockGuardian, sources: MockSourceProvider) -> ContractRegistry {
        ContractRegistry::new(ContractResolver::new(1, Arc::new(guardian), Arc::new(sources)))
    }

    #[tokio::test]
    async fn test_register_fetches_once_when_source_cached() {
        let address = Address::repeat_byte(0x01);

        let mut guardian = MockGuardian::new();
        guardian.expect_is_paused().times(1).returning(|_| Ok(false));
        let mut sources = MockSourceProvider::new();
        sources
            .expect_fetch_source()
            .times(1)
            .returning(|_, _| Ok(Some(vault_source())));

        let mut registry = registry(guardian, sources);
        let first = registry.register(address).await;
        let second = registry.register(address).await;

        assert!(matches!(first, Registration::Created(_)));
        assert!(!second.is_changed());
        assert_eq!(first.contract(), second.contract());
        assert_eq!(first.contract().name, "Vault");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_register_degrades_on_collaborator_failures() {
        let address = Address::repeat_byte(0x02);

        let mut guardian = MockGuardian::new();
        guardian
            .expect_is_paused()
            .returning(|_| Err(ChainError::ConnectionError("down".to_string())));
        let mut sources = MockSourceProvider::new();
        sources
            .expect_fetch_source()
            .returning(|_, _| Err(VerificationError::Status(503)));

        let mut registry = registry(guardian, sources);
        let contract = registry.register(address).await.into_contract();

        assert!(!contract.is_paused);
        assert!(contract.source.is_none());
        assert_eq!(contract.name, "Unknown");
        assert!(registry.is_monitored(&address));
    }

    #[tokio::test]
    async fn test_register_retries_source_for_unverified_contract() {
        let address = Address::repeat_byte(0x03);

        let mut guardian = MockGuardian::new();
        guardian.expect_is_paused().times(2).returning(|_| Ok(true));
        let mut sources = MockSourceProvider::new();
        let mut calls = 0;
        sources.expect_fetch_source().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(None)
            } else {
                Ok(Some(vault_source()))
            }
        });

        let mut registry = registry(guardian, sources);
        let first = registry.register(address).await.into_contract();
        assert!(first.source.is_none());
        assert!(first.is_paused);

        let second = registry.register(address).await;
        assert!(matches!(second, Registration::Updated(_)));
        assert!(second.contract().has_source());
        assert_eq!(second.contract().registered_at, first.registered_at);
    }

    #[tokio::test]
    async fn test_reregister_keeps_known_pause_when_read_fails() {
        let address = Address::repeat_byte(0x05);

        let mut guardian = MockGuardian::new();
        let mut reads = 0;
        guardian.expect_is_paused().times(2).returning(move |_| {
            reads += 1;
            if reads == 1 {
                Ok(false)
            } else {
                Err(ChainError::ConnectionError("timeout".to_string()))
            }
        });
        let mut sources = MockSourceProvider::new();
        sources.expect_fetch_source().returning(|_, _| Ok(None));

        let mut registry = registry(guardian, sources);
        registry.register(address).await;
        assert!(registry.set_paused(&address, true));

        let again = registry.register(address).await;
        assert!(!again.is_changed());
        assert!(registry.get(&address).unwrap().is_paused);
    }

    #[test]
    fn test_apply_ignores_stale_unpaused_read() {
        let address = Address::repeat_byte(0x06);
        let mut registry = registry(MockGuardian::new(), MockSourceProvider::new());

        // Kết quả đọc xong trước khi pipeline pause contract
        let stale = ResolvedContract {
            address,
            is_paused: Some(false),
            source: None,
        };
        assert!(matches!(registry.apply(stale.clone()), Registration::Created(_)));
        registry.set_paused(&address, true);

        assert!(!registry.apply(stale).is_changed());
        assert!(registry.get(&address).unwrap().is_paused);
    }

    #[tokio::test]
    async fn test_set_paused() {
        let mut guardian = MockGuardian::new();
        guardian.expect_is_paused().returning(|_| Ok(false));
        let mut sources = MockSourceProvider::new();
        sources.expect_fetch_source().returning(|_, _| Ok(None));

        let mut registry = registry(guardian, sources);
        let address = Address::repeat_byte(0x04);
        assert!(!registry.set_paused(&address, true));

        registry.register(address).await;
        assert!(registry.set_paused(&address, true));
        assert!(registry.get(&address).unwrap().is_paused);
        assert_eq!(registry.get_all().len(), 1);
    }
}
