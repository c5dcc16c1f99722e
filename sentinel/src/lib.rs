// Public modules
pub mod analysis;
pub mod api;
pub mod chain;
pub mod config;
pub mod detector;
pub mod error_handling;
pub mod executor;
pub mod pipeline;
pub mod policy;
pub mod poller;
pub mod registry;
pub mod verification;

// Re-exports
pub use analysis::{AnalysisClient, AnalysisOrchestrator, AnalysisOutcome, HttpAnalysisClient};
pub use config::Config;
pub use detector::ThreatDetector;
pub use error_handling::{ChainError, SentinelError};
pub use executor::GuardianExecutor;
pub use pipeline::{decide, request_registration, Decision, GuardianPipeline, PipelineCommand, SystemStatus};
pub use policy::{DailyVolumeTracker, PolicyContext, PolicyEngine};
pub use poller::{BlockHandler, ChainPoller};
pub use registry::{ContractRegistry, ContractResolver, Registration, ResolvedContract};
