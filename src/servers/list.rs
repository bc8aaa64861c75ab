//! Server list retrieval and preprocessing
//!
//! Lists come from the default remote endpoint, an alternative remote URL,
//! or a local JSON file, and are normalized before ranking: every entry gets
//! a concrete scheme and its ICMP capability flag seeded from configuration.

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use reqwest::Url;

use crate::servers::Server;
use crate::speedtest::errors::{SpeedtestError, SpeedtestResult};

/// Default remote server list
pub const DEFAULT_SERVER_LIST_URL: &str = "https://librespeed.org/backend-servers/servers.php";

/// Fetches and parses a server list from a remote URL
pub async fn fetch_server_list(client: &reqwest::Client, list_url: &str) -> Result<Vec<Server>> {
    debug!("fetching server list from {list_url}");
    let response = client
        .get(list_url)
        .send()
        .await
        .with_context(|| format!("requesting server list from {list_url}"))?;
    let servers = response
        .json::<Vec<Server>>()
        .await
        .context("parsing server list JSON")?;
    debug!("fetched {} server entries", servers.len());
    Ok(servers)
}

/// Reads and parses a server list from a local JSON file
pub async fn load_local_server_list(path: &Path) -> Result<Vec<Server>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading server list from {}", path.display()))?;
    let servers =
        serde_json::from_slice::<Vec<Server>>(&raw).context("parsing server list JSON")?;
    debug!(
        "loaded {} server entries from {}",
        servers.len(),
        path.display()
    );
    Ok(servers)
}

/// Normalizes every server entry in place
///
/// Entries without a scheme default to `http`, or `https` when `force_https`
/// is set; entries that already carry `http` are upgraded only under
/// `force_https`. `no_icmp` seeds the runtime ICMP capability flag.
pub fn preprocess_servers(
    servers: &mut [Server],
    force_https: bool,
    no_icmp: bool,
) -> SpeedtestResult<()> {
    for server in servers.iter_mut() {
        let raw = server.base_url.trim();
        let normalized = if let Some(stripped) = raw.strip_prefix("http://") {
            if force_https {
                format!("https://{stripped}")
            } else {
                raw.to_string()
            }
        } else if raw.starts_with("https://") {
            raw.to_string()
        } else if force_https {
            format!("https://{raw}")
        } else {
            format!("http://{raw}")
        };

        // reject unusable entries up front rather than mid-ranking
        Url::parse(&normalized).map_err(|err| SpeedtestError::InvalidUrl {
            url: normalized.clone(),
            reason: err.to_string(),
        })?;

        server.base_url = normalized;
        if no_icmp {
            server.disable_icmp();
        }
    }
    Ok(())
}

/// Applies include/exclude ID filters, preserving list order
///
/// An empty include list keeps everything; exclusions are applied after.
pub fn filter_servers(servers: Vec<Server>, include: &[i32], exclude: &[i32]) -> Vec<Server> {
    servers
        .into_iter()
        .filter(|server| include.is_empty() || include.contains(&server.id))
        .filter(|server| !exclude.contains(&server.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn server_with(id: i32, base_url: &str) -> Server {
        Server {
            id,
            name: format!("server-{id}"),
            base_url: base_url.to_string(),
            download_path: "garbage.php".to_string(),
            upload_path: "empty.php".to_string(),
            ping_path: "empty.php".to_string(),
            get_ip_path: "getIP.php".to_string(),
            sponsor_name: String::new(),
            sponsor_url: String::new(),
            no_icmp: Arc::default(),
        }
    }

    #[test]
    fn test_preprocess_defaults_missing_scheme_to_http() {
        let mut servers = vec![server_with(1, "speedtest.example.com/backend")];
        preprocess_servers(&mut servers, false, false).unwrap();
        assert_eq!(servers[0].base_url, "http://speedtest.example.com/backend");
    }

    #[test]
    fn test_preprocess_forces_https() {
        let mut servers = vec![
            server_with(1, "http://a.example.com"),
            server_with(2, "b.example.com"),
            server_with(3, "https://c.example.com"),
        ];
        preprocess_servers(&mut servers, true, false).unwrap();
        assert_eq!(servers[0].base_url, "https://a.example.com");
        assert_eq!(servers[1].base_url, "https://b.example.com");
        assert_eq!(servers[2].base_url, "https://c.example.com");
    }

    #[test]
    fn test_preprocess_keeps_existing_scheme_without_force() {
        let mut servers = vec![server_with(1, "https://secure.example.com")];
        preprocess_servers(&mut servers, false, false).unwrap();
        assert_eq!(servers[0].base_url, "https://secure.example.com");
    }

    #[test]
    fn test_preprocess_seeds_icmp_flag() {
        let mut servers = vec![server_with(1, "http://a.example.com")];
        preprocess_servers(&mut servers, false, true).unwrap();
        assert!(servers[0].icmp_disabled());
    }

    #[test]
    fn test_filter_include_and_exclude_preserve_order() {
        let servers = vec![
            server_with(1, "http://a.example.com"),
            server_with(2, "http://b.example.com"),
            server_with(3, "http://c.example.com"),
            server_with(4, "http://d.example.com"),
        ];

        let included = filter_servers(servers.clone(), &[3, 1], &[]);
        let ids: Vec<i32> = included.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let excluded = filter_servers(servers, &[], &[2]);
        let ids: Vec<i32> = excluded.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_load_local_server_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{
                "id": 1,
                "name": "Local",
                "server": "http://local.example.com",
                "dlURL": "garbage.php",
                "ulURL": "empty.php",
                "pingURL": "empty.php",
                "getIpURL": "getIP.php"
            }}]"#
        )
        .unwrap();

        let servers = load_local_server_list(file.path()).await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "Local");
    }

    #[tokio::test]
    async fn test_load_local_server_list_missing_file() {
        let result = load_local_server_list(Path::new("/nonexistent/servers.json")).await;
        assert!(result.is_err());
    }
}
