pub mod chunk;
pub mod metrics;
pub mod orchestrator;
pub mod scheduler;

#[cfg(test)]
pub mod testing;

pub use orchestrator::{OnChainSource, SnapshotOrchestrator, SnapshotSettings};
pub use scheduler::SnapshotScheduler;
