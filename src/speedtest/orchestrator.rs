//! Test orchestration
//!
//! Sequences one full test run: ranking, latency probing, the download and
//! upload windows, and report assembly. Phases advance through a validated
//! state machine; any fatal error moves the run to `Failed` and propagates.
//! Telemetry submission is the one step that degrades instead of failing.

use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use reqwest::Client;

use crate::geo::{self, DistanceUnit, IpInfoSummary};
use crate::report::{ClientInfo, Report};
use crate::servers::Server;
use crate::speedtest::errors::{SpeedtestError, SpeedtestResult};
use crate::speedtest::loadgen::{LoadGenerator, PayloadMode};
use crate::speedtest::probe::LatencyProbe;
use crate::speedtest::ranker::ServerRanker;
use crate::telemetry::{self, TelemetryConfig};

/// Phases of an orchestrated test run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Init,
    Ranking,
    Probing,
    Downloading,
    Uploading,
    Reporting,
    Done,
    Failed,
}

impl TestPhase {
    /// Forward transitions of the phase machine. `Init -> Probing` covers
    /// runs that start from an already-chosen server; `Failed` is reachable
    /// from anywhere and handled separately.
    pub(crate) fn can_advance_to(self, next: TestPhase) -> bool {
        matches!(
            (self, next),
            (TestPhase::Init, TestPhase::Ranking)
                | (TestPhase::Init, TestPhase::Probing)
                | (TestPhase::Ranking, TestPhase::Probing)
                | (TestPhase::Probing, TestPhase::Downloading)
                | (TestPhase::Downloading, TestPhase::Uploading)
                | (TestPhase::Uploading, TestPhase::Reporting)
                | (TestPhase::Reporting, TestPhase::Done)
        )
    }
}

/// Parameters shaping an orchestrated test run
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// Latency samples taken against the chosen server
    pub ping_count: usize,
    /// Concurrent transfer streams per window
    pub concurrent: usize,
    /// Chunk-count hint passed to the download endpoint
    pub chunks: usize,
    /// Upload payload size in KiB
    pub upload_size_kib: usize,
    /// Wall-clock duration of each transfer window
    pub duration: Duration,
    pub no_download: bool,
    pub no_upload: bool,
    pub no_prealloc: bool,
    pub distance_unit: DistanceUnit,
    /// Telemetry endpoint; `None` disables submission entirely
    pub telemetry: Option<TelemetryConfig>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            ping_count: 10,
            concurrent: 3,
            chunks: 100,
            upload_size_kib: 1024,
            duration: Duration::from_secs(15),
            no_download: false,
            no_upload: false,
            no_prealloc: false,
            distance_unit: DistanceUnit::Kilometres,
            telemetry: None,
        }
    }
}

/// Runs one orchestrated test and assembles the report
pub struct TestOrchestrator {
    client: Client,
    options: TestOptions,
    phase: TestPhase,
}

impl TestOrchestrator {
    pub fn new(client: Client, options: TestOptions) -> Self {
        Self {
            client,
            options,
            phase: TestPhase::Init,
        }
    }

    /// Current phase, for observation in tests and progress reporting
    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    /// Full run: ranks the candidate list, then measures the winner
    pub async fn run(mut self, candidates: Vec<Server>) -> SpeedtestResult<Report> {
        self.advance(TestPhase::Ranking)?;
        info!("ranking {} candidate servers", candidates.len());
        let ranker = ServerRanker::new(self.client.clone());
        let server = match ranker.rank(&candidates).await {
            Ok(server) => server,
            Err(err) => return Err(self.fail(err)),
        };
        info!("selected server: {server}");
        self.measure(server).await
    }

    /// Measures an already-chosen server, skipping the ranking phase
    pub async fn run_single(mut self, server: Server) -> SpeedtestResult<Report> {
        self.measure(server).await
    }

    async fn measure(&mut self, server: Server) -> SpeedtestResult<Report> {
        self.advance(TestPhase::Probing)?;

        info!("getting ISP information");
        let isp_info = match geo::client_info(&self.client, &server, self.options.distance_unit)
            .await
        {
            Ok(info) => info,
            Err(err) => {
                warn!("failed to get ISP information: {err}");
                IpInfoSummary::default()
            }
        };

        info!("ping and jitter test started");
        let probe = LatencyProbe::new(self.client.clone());
        let ping_stats = match probe.probe(&server, self.options.ping_count).await {
            Ok(stats) => stats,
            Err(err) => return Err(self.fail(err)),
        };

        self.advance(TestPhase::Downloading)?;
        let loadgen = LoadGenerator::new(self.client.clone());
        let (download, bytes_received) = if self.options.no_download {
            info!("download test skipped");
            (0.0, 0)
        } else {
            info!("download test started");
            match loadgen
                .run_download(
                    &server,
                    self.options.concurrent,
                    self.options.chunks,
                    self.options.duration,
                )
                .await
            {
                Ok(result) => (result.mbps, result.total_bytes),
                Err(err) => return Err(self.fail(err)),
            }
        };

        self.advance(TestPhase::Uploading)?;
        let (upload, bytes_sent) = if self.options.no_upload {
            info!("upload test skipped");
            (0.0, 0)
        } else {
            info!("upload test started");
            let mode = if self.options.no_prealloc {
                PayloadMode::Random
            } else {
                PayloadMode::PreAllocated {
                    size_kib: self.options.upload_size_kib,
                }
            };
            match loadgen
                .run_upload(&server, self.options.concurrent, mode, self.options.duration)
                .await
            {
                Ok(result) => (result.mbps, result.total_bytes),
                Err(err) => return Err(self.fail(err)),
            }
        };

        self.advance(TestPhase::Reporting)?;
        let mut report = Report {
            timestamp: Utc::now(),
            server,
            client: ClientInfo {
                ip_info: isp_info.raw.clone(),
            },
            bytes_sent,
            bytes_received,
            ping: ping_stats.latency_ms,
            jitter: ping_stats.jitter_ms,
            upload,
            download,
            share_link: String::new(),
        };

        if let Some(config) = &self.options.telemetry {
            info!("sending telemetry information");
            match telemetry::submit(&self.client, config, &report, &isp_info).await {
                Ok(link) => report.share_link = link,
                // degraded: the run still completes with no share link set
                Err(err) => warn!("telemetry submission failed: {err}"),
            }
        }

        self.advance(TestPhase::Done)?;
        Ok(report)
    }

    fn advance(&mut self, next: TestPhase) -> SpeedtestResult<()> {
        if !self.phase.can_advance_to(next) {
            return Err(SpeedtestError::InvalidPhaseTransition(format!(
                "{:?} -> {next:?}",
                self.phase
            )));
        }
        self.phase = next;
        Ok(())
    }

    fn fail(&mut self, err: SpeedtestError) -> SpeedtestError {
        error!("test run failed during {:?}: {err}", self.phase);
        self.phase = TestPhase::Failed;
        err
    }
}
