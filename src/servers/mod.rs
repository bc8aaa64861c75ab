//! Speed test server records and endpoint handling
//!
//! Server entries arrive already parsed from the backend JSON list. They are
//! shared read-only across ranking workers; the only runtime mutation is the
//! ICMP capability flag, flipped once after a failed ICMP attempt.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::speedtest::errors::{SpeedtestError, SpeedtestResult};

pub mod list;

pub use list::{
    DEFAULT_SERVER_LIST_URL, fetch_server_list, filter_servers, load_local_server_list,
    preprocess_servers,
};

/// A LibreSpeed-compatible speed test backend
///
/// Field names follow the backend server-list JSON. `base_url` carries
/// scheme, host, and optional port; the three path suffixes are joined onto
/// it per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i32,
    pub name: String,
    #[serde(rename = "server")]
    pub base_url: String,
    #[serde(rename = "dlURL")]
    pub download_path: String,
    #[serde(rename = "ulURL")]
    pub upload_path: String,
    #[serde(rename = "pingURL")]
    pub ping_path: String,
    #[serde(rename = "getIpURL")]
    pub get_ip_path: String,
    #[serde(rename = "sponsorName", default)]
    pub sponsor_name: String,
    #[serde(rename = "sponsorURL", default)]
    pub sponsor_url: String,

    /// Learned at runtime: once an ICMP attempt fails, later probes of this
    /// server go straight to the HTTP strategy. Shared across clones so a
    /// flag set during ranking carries over to the measurement run.
    #[serde(skip)]
    pub no_icmp: Arc<AtomicBool>,
}

impl Server {
    /// Parses the base endpoint into a URL
    pub fn base(&self) -> SpeedtestResult<Url> {
        Url::parse(&self.base_url).map_err(|err| SpeedtestError::InvalidUrl {
            url: self.base_url.clone(),
            reason: err.to_string(),
        })
    }

    /// Joins one of the server's path suffixes onto the base endpoint
    pub fn endpoint(&self, suffix: &str) -> SpeedtestResult<Url> {
        let mut url = self.base()?;
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            suffix.trim_start_matches('/')
        );
        url.set_path(&joined);
        Ok(url)
    }

    /// Hostname of the base endpoint, used as the ICMP echo target
    pub fn host(&self) -> SpeedtestResult<String> {
        let url = self.base()?;
        url.host_str()
            .map(str::to_owned)
            .ok_or_else(|| SpeedtestError::InvalidUrl {
                url: self.base_url.clone(),
                reason: "missing host".to_string(),
            })
    }

    pub fn icmp_disabled(&self) -> bool {
        self.no_icmp.load(Ordering::Relaxed)
    }

    pub fn disable_icmp(&self) {
        self.no_icmp.store(true, Ordering::Relaxed);
    }

    /// Sponsor display string, empty when the entry has no sponsor
    pub fn sponsor(&self) -> String {
        if self.sponsor_name.is_empty() {
            return String::new();
        }
        if self.sponsor_url.is_empty() {
            return self.sponsor_name.clone();
        }
        // sponsor URLs in the wild sometimes omit the scheme
        let url = if self.sponsor_url.contains("://") {
            self.sponsor_url.clone()
        } else {
            format!("https://{}", self.sponsor_url)
        };
        format!("{} @ {}", self.sponsor_name, url)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.id, self.name, self.base_url)?;
        let sponsor = self.sponsor();
        if !sponsor.is_empty() {
            write!(f, " [sponsor: {sponsor}]")?;
        }
        Ok(())
    }
}
