//! Truy cập blockchain: RPC client cho poller và guardian contract.

pub mod client;
pub mod guardian;

pub use client::{ChainClient, EthersChainClient};
pub use guardian::{EthersGuardian, Guardian, GuardianContract};

#[cfg(test)]
pub use client::MockChainClient;
#[cfg(test)]
pub use guardian::MockGuardian;
