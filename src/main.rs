use anyhow::{Context, Result};
use clap::Parser;
use log::warn;

use speedprobe::cli::Cli;
use speedprobe::cli::output::{self, OutputFormat};
use speedprobe::client::build_client;
use speedprobe::servers::{self, Server};
use speedprobe::speedtest::orchestrator::TestOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    if cli.csv_header {
        println!("{}", output::CSV_HEADER);
        return Ok(());
    }

    let client = build_client(&cli.client_config()).context("building HTTP client")?;

    // assemble the candidate list: the default remote list unless the user
    // supplied alternatives, then any alternative remote or local lists
    let mut candidates: Vec<Server> = Vec::new();
    if cli.remote_servers.is_none() && cli.local_servers.is_none() {
        match servers::fetch_server_list(&client, servers::DEFAULT_SERVER_LIST_URL).await {
            Ok(list) => candidates.extend(list),
            Err(err) => warn!("unable to fetch default server list: {err}"),
        }
    }
    if let Some(url) = &cli.remote_servers {
        match servers::fetch_server_list(&client, url).await {
            Ok(list) => candidates.extend(list),
            Err(err) => warn!("unable to fetch server list from {url}: {err}"),
        }
    }
    if let Some(path) = &cli.local_servers {
        match servers::load_local_server_list(path).await {
            Ok(list) => candidates.extend(list),
            Err(err) => warn!("unable to load server list from {}: {err}", path.display()),
        }
    }

    let mut candidates = servers::filter_servers(candidates, &cli.include_ids, &cli.exclude_ids);
    servers::preprocess_servers(&mut candidates, cli.secure, cli.no_icmp)
        .context("preprocessing server list")?;

    if cli.list {
        for server in &candidates {
            println!("{server}");
        }
        return Ok(());
    }

    let orchestrator = TestOrchestrator::new(client, cli.test_options());
    let report = orchestrator.run(candidates).await?;

    println!(
        "{}",
        output::render_report(&report, cli.format, cli.bytes, cli.binary_base)?
    );

    // flat formats are commonly appended to files; echo the share link
    // separately so it stays visible
    if matches!(cli.format, OutputFormat::Csv | OutputFormat::Tsv) && !report.share_link.is_empty()
    {
        eprintln!("Share link: {}", report.share_link);
    }

    Ok(())
}
