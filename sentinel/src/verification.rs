use async_trait::async_trait;
use backoff::ExponentialBackoff;
use ethers::types::Address;
use sentinel_common::{utils::format_address, ContractSource};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Lỗi khi lấy source từ dịch vụ verify
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Collaborator trả về source/ABI đã verify của một contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceProvider: Send + Sync + Debug {
    /// Ok(None) nghĩa là contract chưa verify
    async fn fetch_source(
        &self,
        chain_id: u64,
        address: Address,
    ) -> Result<Option<ContractSource>, VerificationError>;
}

/// Thông điệp ABI mà explorer trả về cho contract chưa verify
const NOT_VERIFIED_ABI: &str = "Contract source code not verified";

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExplorerSource {
    #[serde(default)]
    source_code: String,
    #[serde(rename = "ABI", default)]
    abi: String,
    #[serde(default)]
    contract_name: String,
    #[serde(default)]
    compiler_version: String,
}

/// Parse phản hồi `getsourcecode` kiểu Etherscan
pub fn parse_source_response(body: Value) -> Result<Option<ContractSource>, VerificationError> {
    let response: ExplorerResponse =
        serde_json::from_value(body).map_err(|e| VerificationError::Malformed(e.to_string()))?;

    if response.status != "1" {
        // Khi lỗi, `result` là chuỗi mô tả
        let detail = response
            .result
            .as_str()
            .map(str::to_string)
            .unwrap_or(response.message);
        return Err(VerificationError::Api(detail));
    }

    let entries: Vec<ExplorerSource> = serde_json::from_value(response.result)
        .map_err(|e| VerificationError::Malformed(e.to_string()))?;
    let Some(entry) = entries.into_iter().next() else {
        return Ok(None);
    };

    if entry.source_code.trim().is_empty() || entry.abi == NOT_VERIFIED_ABI {
        return Ok(None);
    }

    Ok(Some(ContractSource {
        contract_name: entry.contract_name,
        source_code: entry.source_code,
        abi: entry.abi,
        compiler_version: Some(entry.compiler_version).filter(|v| !v.is_empty()),
    }))
}

/// Cấu hình backoff cho việc lấy source, nằm ngoài critical path
pub fn create_backoff() -> ExponentialBackoff {
    let mut backoff = ExponentialBackoff::default();
    backoff.initial_interval = Duration::from_millis(500);
    backoff.max_interval = Duration::from_secs(4);
    backoff.multiplier = 2.0;
    backoff.max_elapsed_time = Some(Duration::from_secs(15));
    backoff
}

/// SourceProvider qua API explorer kiểu Etherscan v2 (`chainid` + `address`)
#[derive(Debug, Clone)]
pub struct ExplorerSourceProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl ExplorerSourceProvider {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key,
        }
    }

    async fn fetch_once(
        &self,
        chain_id: u64,
        address: Address,
    ) -> Result<Option<ContractSource>, backoff::Error<VerificationError>> {
        let chain_id = chain_id.to_string();
        let address = format_address(&address);
        let mut query = vec![
            ("chainid", chain_id.as_str()),
            ("module", "contract"),
            ("action", "getsourcecode"),
            ("address", address.as_str()),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.push(("apikey", key));
        }

        let response = self
            .client
            .get(&self.api_url)
            .query(&query)
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| backoff::Error::transient(VerificationError::Http(e.to_string())))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(backoff::Error::transient(VerificationError::Status(status.as_u16())));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(VerificationError::Status(status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| backoff::Error::permanent(VerificationError::Malformed(e.to_string())))?;

        match parse_source_response(body) {
            // Explorer báo rate limit trong body thay vì status code
            Err(VerificationError::Api(detail)) if detail.to_lowercase().contains("rate limit") => {
                Err(backoff::Error::transient(VerificationError::Api(detail)))
            }
            other => other.map_err(backoff::Error::permanent),
        }
    }
}

#[async_trait]
impl SourceProvider for ExplorerSourceProvider {
    async fn fetch_source(
        &self,
        chain_id: u64,
        address: Address,
    ) -> Result<Option<ContractSource>, VerificationError> {
        let result = backoff::future::retry(create_backoff(), || async move {
            self.fetch_once(chain_id, address).await.map_err(|e| {
                if let backoff::Error::Transient { err, .. } = &e {
                    debug!(contract = ?address, error = %err, "Lỗi tạm thời khi lấy source, thử lại");
                }
                e
            })
        })
        .await;

        if let Err(e) = &result {
            warn!(contract = ?address, error = %e, "Không lấy được source");
        }
        result
    }
}
