// External imports
use ethers::core::types::{Address, Bytes, U256};
use ethers::utils::{format_ether, parse_ether};

// Standard library imports
use std::{
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

// Internal imports
use crate::error::{CommonError, CommonResult};

/// Lấy thời gian hiện tại (milliseconds)
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Địa chỉ dạng canonical: chữ thường, đủ 40 ký tự hex, có tiền tố 0x
pub fn format_address(address: &Address) -> String {
    format!("{:?}", address)
}

/// Parse địa chỉ từ chuỗi, chấp nhận cả dạng checksum lẫn chữ thường
pub fn parse_address(value: &str) -> CommonResult<Address> {
    let trimmed = value.trim();
    Address::from_str(trimmed).map_err(|_| CommonError::InvalidAddress(trimmed.to_string()))
}

/// Parse danh sách địa chỉ phân tách bằng dấu phẩy, bỏ qua phần tử rỗng
pub fn parse_address_list(value: &str) -> CommonResult<Vec<Address>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_address)
        .collect()
}

/// Chuyển số lượng native (ví dụ "0.01") sang wei
pub fn ether_to_wei(value: &str) -> CommonResult<U256> {
    parse_ether(value.trim()).map_err(|e| CommonError::InvalidAmount(format!("{}: {}", value, e)))
}

/// Chuyển wei sang số thực theo đơn vị native, chỉ dùng cho hiển thị/log
pub fn wei_to_ether(value: U256) -> f64 {
    format_ether(value).parse::<f64>().unwrap_or(f64::MAX)
}

/// Lấy 4-byte function selector từ calldata
pub fn function_selector(data: &Bytes) -> Option<[u8; 4]> {
    if data.len() < 4 {
        return None;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);
    Some(selector)
}

/// Format selector dạng 0xabcdef01
pub fn format_selector(selector: &[u8; 4]) -> String {
    format!("0x{}", hex::encode(selector))
}
