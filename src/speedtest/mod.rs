//! Throughput/latency measurement engine
//!
//! This module holds the concurrency-bearing core of the application,
//! organized into focused sub-modules:
//!
//! - `counter`: shared byte accounting and average-rate computation
//! - `formatting`: human-readable rate rendering
//! - `probe`: latency/jitter measurement with ICMP-to-HTTP fallback
//! - `ranker`: bounded-pool concurrent server ranking
//! - `loadgen`: self-replenishing concurrent transfer streams
//! - `orchestrator`: phase sequencing and report assembly
//! - `errors`: the engine's error taxonomy

pub mod counter;
pub mod errors;
pub mod formatting;
pub mod loadgen;
pub mod orchestrator;
pub mod probe;
pub mod ranker;

pub use counter::RateCounter;
pub use errors::{SpeedtestError, SpeedtestResult};
pub use formatting::format_rate;
pub use loadgen::{LoadGenerator, PayloadMode, TransferResult};
pub use orchestrator::{TestOptions, TestOrchestrator, TestPhase};
pub use probe::{LatencyProbe, PingStats, jitter_from_samples};
pub use ranker::ServerRanker;

#[cfg(test)]
pub mod tests;
