//! Telemetry submission and share-link construction
//!
//! A finished report can be submitted to a LibreSpeed telemetry endpoint as
//! a multipart form. The endpoint answers `id <ID>`; the ID becomes the
//! query parameter of the share link. Submission failures never abort a run;
//! the orchestrator logs them and leaves the share link empty.

use log::debug;
use reqwest::{Client, Url, multipart::Form};
use serde::Serialize;

use crate::geo::IpInfoSummary;
use crate::report::Report;
use crate::speedtest::errors::{SpeedtestError, SpeedtestResult};

pub const DEFAULT_TELEMETRY_SERVER: &str = "https://librespeed.org";
pub const DEFAULT_TELEMETRY_PATH: &str = "/results/telemetry.php";
pub const DEFAULT_TELEMETRY_SHARE: &str = "/results/";

/// Telemetry endpoint configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub server: String,
    pub path: String,
    pub share: String,
    /// Free-form note submitted alongside the result
    pub extra: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_TELEMETRY_SERVER.to_string(),
            path: DEFAULT_TELEMETRY_PATH.to_string(),
            share: DEFAULT_TELEMETRY_SHARE.to_string(),
            extra: String::new(),
        }
    }
}

impl TelemetryConfig {
    /// Full submission URL
    pub fn endpoint(&self) -> SpeedtestResult<Url> {
        join(&self.server, &self.path)
    }

    /// Base URL that share IDs are appended to
    pub fn share_base(&self) -> SpeedtestResult<Url> {
        join(&self.server, &self.share)
    }
}

fn join(server: &str, path: &str) -> SpeedtestResult<Url> {
    let raw = format!(
        "{}/{}",
        server.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|err| SpeedtestError::InvalidUrl {
        url: raw,
        reason: err.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct TelemetryExtra<'a> {
    #[serde(rename = "serverName")]
    server_name: &'a str,
    extra: &'a str,
}

/// Submits a finished report and returns the share link
pub async fn submit(
    client: &Client,
    config: &TelemetryConfig,
    report: &Report,
    isp_info: &IpInfoSummary,
) -> SpeedtestResult<String> {
    let isp_json = serde_json::to_string(isp_info)
        .map_err(|err| SpeedtestError::TelemetryRejected(err.to_string()))?;
    let extra_json = serde_json::to_string(&TelemetryExtra {
        server_name: &report.server.name,
        extra: &config.extra,
    })
    .map_err(|err| SpeedtestError::TelemetryRejected(err.to_string()))?;

    let form = Form::new()
        .text("ispinfo", isp_json)
        .text("dl", format!("{:.2}", report.download))
        .text("ul", format!("{:.2}", report.upload))
        .text("ping", format!("{:.2}", report.ping))
        .text("jitter", format!("{:.2}", report.jitter))
        .text("log", String::new())
        .text("extra", extra_json);

    let endpoint = config.endpoint()?;
    debug!("submitting telemetry to {endpoint}");
    let response = client.post(endpoint).multipart(form).send().await?;
    let body = response.text().await?;

    // expected response shape: "id <ID>"
    let mut parts = body.split_whitespace();
    let (tag, id) = (parts.next(), parts.next());
    match (tag, id, parts.next()) {
        (Some("id"), Some(id), None) => {
            let mut share = config.share_base()?;
            share.query_pairs_mut().append_pair("id", id);
            Ok(share.to_string())
        }
        _ => Err(SpeedtestError::TelemetryRejected(body)),
    }
}
