//! Latency and jitter measurement
//!
//! The probe measures round-trip time with ICMP echo requests and falls back
//! to timed HTTP GETs against the server's ping path when ICMP is flagged
//! off, errors out, or returns no samples. The fallback is the only retry
//! tier: when the HTTP strategy fails too, the probe fails.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use log::debug;
use reqwest::{Client, StatusCode};
use surge_ping::{Client as IcmpClient, Config as IcmpConfig, ICMP, PingIdentifier, PingSequence};

use crate::servers::Server;
use crate::speedtest::errors::{SpeedtestError, SpeedtestResult};

/// Extra HTTP samples requested so the handshake-skewed first sample can be
/// discarded before averaging
const HTTP_EXTRA_SAMPLES: usize = 2;

/// Per-echo reply deadline
const ICMP_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-request deadline for liveness checks and HTTP ping samples
const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Echo payload size, the conventional 56 data bytes
const ICMP_PAYLOAD: [u8; 56] = [0u8; 56];

/// Average/jitter pair produced by one probe run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStats {
    pub latency_ms: f64,
    pub jitter_ms: f64,
}

/// Measures round-trip latency and jitter for one server
pub struct LatencyProbe {
    client: Client,
}

impl LatencyProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Probes the server with `sample_count` round trips
    ///
    /// ICMP echo is the primary strategy. The HTTP fallback runs with two
    /// extra samples (the first is discarded); an ICMP error or an empty
    /// ICMP sample set flags the server so later calls skip straight to HTTP.
    pub async fn probe(&self, server: &Server, sample_count: usize) -> SpeedtestResult<PingStats> {
        if server.icmp_disabled() {
            debug!("ICMP disabled for {}, using HTTP ping", server.name);
            return self
                .http_ping(server, sample_count + HTTP_EXTRA_SAMPLES)
                .await;
        }

        match self.icmp_ping(server, sample_count).await {
            Ok(stats) => Ok(stats),
            Err(err) => {
                debug!(
                    "ICMP probe failed for {} ({err}), falling back to HTTP ping",
                    server.name
                );
                server.disable_icmp();
                self.http_ping(server, sample_count + HTTP_EXTRA_SAMPLES)
                    .await
            }
        }
    }

    /// Liveness pre-check used before ranking a candidate
    ///
    /// A server is up only when the ping path answers HTTP 200 with an empty
    /// body; any other status, a non-empty body, or a transport error marks
    /// it down.
    pub async fn is_up(&self, server: &Server) -> bool {
        let url = match server.endpoint(&server.ping_path) {
            Ok(url) => url,
            Err(err) => {
                debug!("liveness check skipped for {}: {err}", server.name);
                return false;
            }
        };

        let response = match self
            .client
            .get(url)
            .timeout(HTTP_PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!("liveness check failed for {}: {err}", server.name);
                return false;
            }
        };

        let status = response.status();
        match response.bytes().await {
            Ok(body) => {
                if !body.is_empty() {
                    debug!(
                        "ping path for {} returned {} unexpected body bytes",
                        server.name,
                        body.len()
                    );
                }
                status == StatusCode::OK && body.is_empty()
            }
            Err(err) => {
                debug!("liveness body read failed for {}: {err}", server.name);
                false
            }
        }
    }

    async fn icmp_ping(&self, server: &Server, count: usize) -> SpeedtestResult<PingStats> {
        let host = server.host()?;
        let addr = resolve_host(server, &host).await?;

        let config = match addr {
            IpAddr::V4(_) => IcmpConfig::default(),
            IpAddr::V6(_) => IcmpConfig::builder().kind(ICMP::V6).build(),
        };
        let icmp_client =
            IcmpClient::new(&config).map_err(|err| SpeedtestError::ProbeFailed {
                server: server.name.clone(),
                reason: format!("ICMP socket unavailable: {err}"),
            })?;
        let mut pinger = icmp_client.pinger(addr, PingIdentifier(rand::random())).await;
        pinger.timeout(ICMP_TIMEOUT);

        let mut rtts = Vec::with_capacity(count);
        for seq in 0..count {
            match pinger.ping(PingSequence(seq as u16), &ICMP_PAYLOAD).await {
                Ok((_, rtt)) => rtts.push(rtt.as_secs_f64() * 1000.0),
                Err(err) => debug!("ICMP echo {seq} to {host} failed: {err}"),
            }
        }

        if rtts.is_empty() {
            return Err(SpeedtestError::ProbeFailed {
                server: server.name.clone(),
                reason: "no ICMP echo replies".to_string(),
            });
        }

        Ok(PingStats {
            latency_ms: mean(&rtts),
            jitter_ms: jitter_from_samples(&rtts),
        })
    }

    async fn http_ping(&self, server: &Server, count: usize) -> SpeedtestResult<PingStats> {
        let url = server.endpoint(&server.ping_path)?;

        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let started = Instant::now();
            let response = self
                .client
                .get(url.clone())
                .timeout(HTTP_PROBE_TIMEOUT)
                .send()
                .await
                .map_err(|err| SpeedtestError::ProbeFailed {
                    server: server.name.clone(),
                    reason: err.to_string(),
                })?;
            // the sample times the full round trip including body drain
            let _ = response.bytes().await;
            samples.push(started.elapsed().as_secs_f64() * 1000.0);
        }

        // discard the first sample, it carries connection handshake overhead
        if samples.len() > 1 {
            samples.remove(0);
        }

        Ok(PingStats {
            latency_ms: mean(&samples),
            jitter_ms: jitter_from_samples(&samples),
        })
    }
}

async fn resolve_host(server: &Server, host: &str) -> SpeedtestResult<IpAddr> {
    let mut addrs = tokio::net::lookup_host((host, 0u16)).await.map_err(|err| {
        SpeedtestError::ServerUnreachable {
            server: server.name.clone(),
            reason: format!("resolving {host}: {err}"),
        }
    })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| SpeedtestError::ServerUnreachable {
            server: server.name.clone(),
            reason: format!("{host} resolved to no addresses"),
        })
}

pub(crate) fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Smoothed RTT variation over an ordered sample sequence
///
/// The first sample is only a reference point. From the third sample onward
/// the running jitter is an exponentially weighted blend of itself and each
/// new absolute RTT delta: 70/30 when the delta pulls the value down, 80/20
/// when it pulls it up.
pub fn jitter_from_samples(samples: &[f64]) -> f64 {
    let mut last_rtt = 0.0;
    let mut jitter = 0.0;
    for (idx, &rtt) in samples.iter().enumerate() {
        if idx != 0 {
            let inst_jitter = (last_rtt - rtt).abs();
            if idx > 1 {
                if jitter > inst_jitter {
                    jitter = jitter * 0.7 + inst_jitter * 0.3;
                } else {
                    jitter = inst_jitter * 0.2 + jitter * 0.8;
                }
            }
        }
        last_rtt = rtt;
    }
    jitter
}
