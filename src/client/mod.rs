//! HTTP client construction
//!
//! One explicitly-configured `reqwest::Client` is built at startup and handed
//! to every component, so tests can point components at isolated backends
//! instead of a process-wide singleton.
//!
//! The configured timeout is applied to the connect phase only: transfer
//! requests are duration-bounded by cooperative cancellation and must be
//! allowed to outlive any fixed per-request limit, while probe requests add
//! their own per-request deadline.

use std::time::Duration;

use reqwest::Client;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("speedprobe/", env!("CARGO_PKG_VERSION"));

/// Transport-level configuration shared by every component
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connect timeout for every request
    pub timeout: Duration,
    /// Accept invalid TLS certificates (self-hosted backends)
    pub skip_cert_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            skip_cert_verify: false,
        }
    }
}

/// Builds the shared HTTP client from a configuration
pub fn build_client(config: &ClientConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(config.timeout)
        .danger_accept_invalid_certs(config.skip_cert_verify)
        .user_agent(USER_AGENT)
        .build()
}
