//! Test result records
//!
//! A `Report` is assembled once per orchestrated run and immutable after
//! that. The nested shape serializes to the JSON output formats; `flatten`
//! produces the row used by CSV/TSV outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::IpInfo;
use crate::servers::Server;

/// Aggregate result of one orchestrated test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub server: Server,
    pub client: ClientInfo,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Average round-trip latency in milliseconds
    pub ping: f64,
    /// Smoothed RTT variation in milliseconds
    pub jitter: f64,
    /// Upload rate in Mbps
    pub upload: f64,
    /// Download rate in Mbps
    pub download: f64,
    /// Set when telemetry submission succeeded, empty otherwise
    pub share_link: String,
}

/// The client's ISP information as reported by the IP lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(flatten)]
    pub ip_info: IpInfo,
}

/// Flattened single-row view of a report, for CSV/TSV outputs
#[derive(Debug, Clone, Serialize)]
pub struct FlatReport {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub address: String,
    pub ping: f64,
    pub jitter: f64,
    pub download: f64,
    pub upload: f64,
    pub share: String,
    pub ip: String,
}

impl Report {
    pub fn flatten(&self) -> FlatReport {
        FlatReport {
            timestamp: self.timestamp,
            name: self.server.name.clone(),
            address: self.server.base_url.clone(),
            ping: self.ping,
            jitter: self.jitter,
            download: self.download,
            upload: self.upload,
            share: self.share_link.clone(),
            ip: self.client.ip_info.ip.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_report() -> Report {
        Report {
            timestamp: Utc::now(),
            server: Server {
                id: 1,
                name: "Test".to_string(),
                base_url: "http://test.example.com".to_string(),
                download_path: "garbage.php".to_string(),
                upload_path: "empty.php".to_string(),
                ping_path: "empty.php".to_string(),
                get_ip_path: "getIP.php".to_string(),
                sponsor_name: String::new(),
                sponsor_url: String::new(),
                no_icmp: Arc::default(),
            },
            client: ClientInfo {
                ip_info: IpInfo {
                    ip: "203.0.113.9".to_string(),
                    ..IpInfo::default()
                },
            },
            bytes_sent: 1000,
            bytes_received: 2000,
            ping: 12.34,
            jitter: 1.5,
            upload: 10.0,
            download: 20.0,
            share_link: String::new(),
        }
    }

    #[test]
    fn test_flatten_carries_report_fields() {
        let report = test_report();
        let flat = report.flatten();
        assert_eq!(flat.name, "Test");
        assert_eq!(flat.address, "http://test.example.com");
        assert_eq!(flat.ping, 12.34);
        assert_eq!(flat.download, 20.0);
        assert_eq!(flat.ip, "203.0.113.9");
    }

    #[test]
    fn test_report_json_field_names() {
        let report = test_report();
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["timestamp"].is_string());
        assert_eq!(value["bytes_sent"], 1000);
        assert_eq!(value["bytes_received"], 2000);
        assert_eq!(value["download"], 20.0);
        assert_eq!(value["share_link"], "");
        // the client's ip_info is flattened into the client object
        assert_eq!(value["client"]["ip"], "203.0.113.9");
        // the server serializes with its backend JSON names
        assert_eq!(value["server"]["dlURL"], "garbage.php");
    }
}
