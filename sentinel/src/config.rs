use dotenv::dotenv;
use ethers::types::{Address, U256};
use sentinel_common::{
    cache::DEFAULT_DEDUP_CAPACITY,
    utils::{ether_to_wei, parse_address, parse_address_list},
    PolicyAction,
};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error_handling::SentinelError;

/// Cấu hình toàn bộ sentinel
#[derive(Clone, Debug)]
pub struct Config {
    // Blockchain
    pub rpc_url: String,
    pub chain_id: u64,
    /// Khóa ký giao dịch pause. None: guardian chỉ đọc, mọi lần pause đều thất bại
    pub private_key: Option<String>,
    pub guardian_address: Address,

    // Monitoring
    pub monitored_contracts: Vec<Address>,
    pub poll_interval: Duration,
    pub max_blocks_per_tick: u64,
    pub dedup_capacity: usize,

    // Detector (wei)
    pub sensitive_min_value: U256,
    pub large_value_threshold: U256,

    // Policy (wei)
    pub blacklist: Vec<Address>,
    pub max_transaction_value: U256,
    pub daily_volume_limit: U256,
    /// Hành động tối thiểu để kích hoạt pause
    pub pause_action_threshold: PolicyAction,

    // Analysis collaborator
    pub analysis_url: Option<String>,
    pub analysis_timeout: Duration,

    // Verification collaborator
    pub verification_api_url: String,
    pub verification_api_key: Option<String>,

    // API
    pub api_host: String,
    pub api_port: u16,

    // Logging
    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 31337,
            private_key: None,
            guardian_address: Address::zero(),
            monitored_contracts: Vec::new(),
            poll_interval: Duration::from_millis(3000),
            max_blocks_per_tick: 10,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            // 0.1 native
            sensitive_min_value: U256::exp10(17),
            // 1 native
            large_value_threshold: U256::exp10(18),
            blacklist: Vec::new(),
            // 10 native
            max_transaction_value: U256::exp10(19),
            // 100 native
            daily_volume_limit: U256::exp10(20),
            pause_action_threshold: PolicyAction::Pause,
            analysis_url: None,
            analysis_timeout: Duration::from_secs(20),
            verification_api_url: "https://api.etherscan.io/v2/api".to_string(),
            verification_api_key: None,
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            log_dir: "logs".to_string(),
        }
    }
}

impl Config {
    /// Tải cấu hình từ `.env` và biến môi trường.
    ///
    /// `RPC_URL`, `CHAIN_ID` và `GUARDIAN_ADDRESS` là bắt buộc; các khóa còn lại
    /// lấy giá trị mặc định nếu không có.
    pub fn from_env() -> Result<Self, SentinelError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Dựng cấu hình từ một hàm tra cứu khóa, tách riêng để test không đụng env
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SentinelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| SentinelError::Config(format!("thiếu biến môi trường {}", key)))
        };

        Ok(Config {
            rpc_url: required("RPC_URL")?,
            chain_id: parse_number("CHAIN_ID", &required("CHAIN_ID")?)?,
            private_key: get("PRIVATE_KEY"),
            guardian_address: parse_address(&required("GUARDIAN_ADDRESS")?)?,
            monitored_contracts: match get("MONITORED_CONTRACTS") {
                Some(list) => parse_address_list(&list)?,
                None => defaults.monitored_contracts,
            },
            poll_interval: match get("POLL_INTERVAL_MS") {
                Some(v) => Duration::from_millis(parse_number("POLL_INTERVAL_MS", &v)?),
                None => defaults.poll_interval,
            },
            max_blocks_per_tick: match get("MAX_BLOCKS_PER_TICK") {
                Some(v) => parse_number::<u64>("MAX_BLOCKS_PER_TICK", &v)?.max(1),
                None => defaults.max_blocks_per_tick,
            },
            dedup_capacity: match get("DEDUP_CAPACITY") {
                Some(v) => parse_number("DEDUP_CAPACITY", &v)?,
                None => defaults.dedup_capacity,
            },
            sensitive_min_value: match get("SENSITIVE_MIN_VALUE_ETH") {
                Some(v) => ether_to_wei(&v)?,
                None => defaults.sensitive_min_value,
            },
            large_value_threshold: match get("LARGE_VALUE_THRESHOLD_ETH") {
                Some(v) => ether_to_wei(&v)?,
                None => defaults.large_value_threshold,
            },
            blacklist: match get("BLACKLIST") {
                Some(list) => parse_address_list(&list)?,
                None => defaults.blacklist,
            },
            max_transaction_value: match get("MAX_TRANSACTION_VALUE_ETH") {
                Some(v) => ether_to_wei(&v)?,
                None => defaults.max_transaction_value,
            },
            daily_volume_limit: match get("DAILY_VOLUME_LIMIT_ETH") {
                Some(v) => ether_to_wei(&v)?,
                None => defaults.daily_volume_limit,
            },
            pause_action_threshold: match get("PAUSE_ACTION_THRESHOLD") {
                Some(v) => PolicyAction::from_str(&v)?,
                None => defaults.pause_action_threshold,
            },
            analysis_url: get("ANALYSIS_URL"),
            analysis_timeout: match get("ANALYSIS_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse_number("ANALYSIS_TIMEOUT_SECS", &v)?),
                None => defaults.analysis_timeout,
            },
            verification_api_url: get("VERIFICATION_API_URL")
                .unwrap_or(defaults.verification_api_url),
            verification_api_key: get("VERIFICATION_API_KEY"),
            api_host: get("API_HOST").unwrap_or(defaults.api_host),
            api_port: match get("API_PORT") {
                Some(v) => parse_number("API_PORT", &v)?,
                None => defaults.api_port,
            },
            log_dir: get("LOG_DIR").unwrap_or(defaults.log_dir),
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, SentinelError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| SentinelError::Config(format!("{} không hợp lệ: {}", key, value)))
}
