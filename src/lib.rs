//! speedprobe - internet speed testing against LibreSpeed-compatible servers
//!
//! The crate is organized around a measurement engine (`speedtest`) and the
//! collaborators that feed and consume it:
//!
//! - `servers`: server records, list retrieval, and preprocessing
//! - `client`: explicit HTTP client construction shared by every component
//! - `speedtest`: rate counting, latency/jitter probing, server ranking,
//!   load generation, and test orchestration
//! - `report`: the result records produced by an orchestrated run
//! - `geo`: client/ISP enrichment and great-circle distance
//! - `telemetry`: result submission and share-link construction
//! - `cli`: the clap command surface and report rendering

pub mod cli;
pub mod client;
pub mod geo;
pub mod report;
pub mod servers;
pub mod speedtest;
pub mod telemetry;
