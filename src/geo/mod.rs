//! Client/ISP enrichment
//!
//! Looks up the client's public IP information, resolves and looks up the
//! chosen server, and renders the great-circle distance between the two.
//! None of this is required by the measurement engine; failures degrade to
//! an empty enrichment.

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::servers::Server;

/// Public IP information endpoint
pub const IP_INFO_URL: &str = "https://ipinfo.io/json";

/// Mean earth radius in kilometres
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Unit used when rendering the client-to-server distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DistanceUnit {
    #[value(name = "km")]
    Kilometres,
    #[value(name = "mi")]
    Miles,
    #[value(name = "NM")]
    NauticalMiles,
}

impl DistanceUnit {
    fn from_km(self, km: f64) -> (f64, &'static str) {
        match self {
            DistanceUnit::Kilometres => (km, "km"),
            DistanceUnit::Miles => (km * 0.621371, "mi"),
            DistanceUnit::NauticalMiles => (km * 0.539957, "NM"),
        }
    }
}

/// Raw response shape of the IP information service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    /// "lat,lon" pair as reported by the service
    #[serde(default, rename = "loc")]
    pub location: String,
    #[serde(default, rename = "org")]
    pub organization: String,
    #[serde(default)]
    pub postal: String,
    #[serde(default)]
    pub timezone: String,
}

/// Client enrichment: the raw lookup plus the composed display line
#[derive(Debug, Clone, Default, Serialize)]
pub struct IpInfoSummary {
    #[serde(rename = "processedString")]
    pub processed: String,
    #[serde(rename = "rawIspInfo")]
    pub raw: IpInfo,
}

/// Looks up the client's IP information and composes the
/// "IP - org, country (distance)" display line against the chosen server
pub async fn client_info(
    client: &reqwest::Client,
    server: &Server,
    unit: DistanceUnit,
) -> anyhow::Result<IpInfoSummary> {
    let raw = lookup(client, IP_INFO_URL).await?;

    let mut processed = String::new();
    if !raw.ip.is_empty() {
        processed.push_str(&raw.ip);
    }
    if !raw.organization.is_empty() {
        processed.push_str(" - ");
        processed.push_str(&raw.organization);
    }
    if !raw.country.is_empty() {
        processed.push_str(", ");
        processed.push_str(&raw.country);
    }

    // server-side lookup only serves the distance rendering; skip it quietly
    // when anything along the way is missing
    if let Some(distance) = server_distance(client, server, &raw.location, unit).await {
        processed.push_str(&format!(" ({distance})"));
    }

    Ok(IpInfoSummary { processed, raw })
}

async fn lookup(client: &reqwest::Client, url: &str) -> anyhow::Result<IpInfo> {
    let response = client.get(url).send().await?;
    let body = response.bytes().await?;
    if body.is_empty() {
        return Ok(IpInfo::default());
    }
    match serde_json::from_slice(&body) {
        Ok(info) => Ok(info),
        Err(err) => {
            debug!("failed to parse IP info payload: {err}");
            Ok(IpInfo::default())
        }
    }
}

async fn server_distance(
    client: &reqwest::Client,
    server: &Server,
    client_location: &str,
    unit: DistanceUnit,
) -> Option<String> {
    let host = server.host().ok()?;
    let mut addrs = tokio::net::lookup_host((host.as_str(), 0u16)).await.ok()?;
    let server_ip = addrs.find(|addr| addr.is_ipv4())?.ip();

    let url = format!("https://ipinfo.io/{server_ip}/json");
    let server_info = match lookup(client, &url).await {
        Ok(info) => info,
        Err(err) => {
            debug!("failed to look up server IP info: {err}");
            return None;
        }
    };

    format_distance(client_location, &server_info.location, unit)
}

/// Renders the great-circle distance between two "lat,lon" strings
pub fn format_distance(from: &str, to: &str, unit: DistanceUnit) -> Option<String> {
    let from = parse_location(from)?;
    let to = parse_location(to)?;
    let (value, suffix) = unit.from_km(haversine_km(from, to));
    Some(format!("{value:.2} {suffix}"))
}

fn parse_location(location: &str) -> Option<(f64, f64)> {
    let (lat, lon) = location.split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let lon = lon.trim().parse::<f64>().ok()?;
    Some((lat, lon))
}

fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
