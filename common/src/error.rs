// Third party imports
use thiserror::Error;

/// Lỗi chung
#[derive(Debug, Error)]
pub enum CommonError {
    /// Lỗi không hợp lệ
    #[error("Invalid: {0}")]
    Invalid(String),
    /// Địa chỉ không hợp lệ
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// Giá trị native không parse được
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Kiểu kết quả chung
pub type CommonResult<T> = Result<T, CommonError>;
