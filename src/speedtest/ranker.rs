//! Concurrent server ranking
//!
//! Every candidate goes through the same pipeline in a bounded worker pool:
//! endpoint validation, liveness pre-check, then a single-sample latency
//! probe. Candidates that fail any step are dropped silently; an unreachable
//! server simply does not participate in ranking. Selection runs only after
//! every job has finished.

use std::sync::Arc;

use log::debug;
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::servers::Server;
use crate::speedtest::errors::{SpeedtestError, SpeedtestResult};
use crate::speedtest::probe::LatencyProbe;

/// Fixed number of concurrent ranking workers, independent of candidate count
const RANKING_POOL_SIZE: usize = 10;

/// Latency result emitted for one live candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProbeResult {
    pub(crate) index: usize,
    pub(crate) latency_ms: f64,
}

/// Probes candidate servers concurrently and selects the fastest reachable one
pub struct ServerRanker {
    client: Client,
}

impl ServerRanker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Ranks the candidate list and returns the fastest reachable server
    ///
    /// Fails with `NoServersAvailable` when the list is empty or no candidate
    /// produced a latency result.
    pub async fn rank(&self, servers: &[Server]) -> SpeedtestResult<Server> {
        if servers.is_empty() {
            return Err(SpeedtestError::NoServersAvailable);
        }

        let semaphore = Arc::new(Semaphore::new(RANKING_POOL_SIZE));
        let mut jobs = JoinSet::new();
        for (index, server) in servers.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let probe = LatencyProbe::new(self.client.clone());
            jobs.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("ranking semaphore closed");
                rank_candidate(&probe, index, &server).await
            });
        }

        // draining the set is the completion barrier: selection must not
        // start until every job has been dispatched and finished
        let mut results = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => debug!("ranking worker failed to complete: {err}"),
            }
        }

        let best = select_best(&mut results).ok_or(SpeedtestError::NoServersAvailable)?;
        let chosen = servers[best.index].clone();
        debug!(
            "selected server {} with latency {:.2} ms",
            chosen.name, best.latency_ms
        );
        Ok(chosen)
    }
}

/// One candidate's trip through the ranking pipeline; `None` drops the job
async fn rank_candidate(probe: &LatencyProbe, index: usize, server: &Server) -> Option<ProbeResult> {
    if let Err(err) = server.base() {
        debug!(
            "server URL is invalid for {} ({}), skipping: {err}",
            server.name, server.base_url
        );
        return None;
    }

    if !probe.is_up(server).await {
        debug!("server {} doesn't seem to be up, skipping", server.name);
        return None;
    }

    match probe.probe(server, 1).await {
        Ok(stats) => Some(ProbeResult {
            index,
            latency_ms: stats.latency_ms,
        }),
        Err(err) => {
            debug!("can't ping server {}, skipping: {err}", server.name);
            None
        }
    }
}

/// Minimum positive latency wins; exact ties resolve to the lowest candidate
/// index. Result arrival order is unconstrained, so the collection is put in
/// index order before scanning.
pub(crate) fn select_best(results: &mut [ProbeResult]) -> Option<ProbeResult> {
    results.sort_by_key(|result| result.index);
    let mut best: Option<ProbeResult> = None;
    for result in results.iter() {
        if result.latency_ms <= 0.0 {
            continue;
        }
        match best {
            Some(current) if result.latency_ms >= current.latency_ms => {}
            _ => best = Some(*result),
        }
    }
    best
}
