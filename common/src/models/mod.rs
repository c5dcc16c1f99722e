// Internal modules
mod contract;

// Re-exports
pub use contract::*;
