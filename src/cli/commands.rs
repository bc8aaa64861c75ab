use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cli::output::OutputFormat;
use crate::client::ClientConfig;
use crate::geo::DistanceUnit;
use crate::speedtest::orchestrator::TestOptions;
use crate::telemetry::TelemetryConfig;

/// Main CLI structure for the speedprobe application
/// Uses clap's derive macros for automatic CLI generation
#[derive(Parser, Debug)]
#[command(name = "speedprobe")]
#[command(version)] // Automatically uses version from Cargo.toml
#[command(about = "Test your internet speed against LibreSpeed-compatible servers")]
#[command(long_about = "Speedprobe ranks LibreSpeed-compatible servers by latency, measures ping \
and jitter, and drives sustained concurrent transfers to estimate download and upload throughput. \
Results can be rendered human-readable or machine-readable and optionally shared via the \
LibreSpeed telemetry service.\n\n\
Examples:\n  \
sp                                    # Automatic test against the fastest server\n  \
sp --list                             # Show the available servers\n  \
sp -s 12,34 --duration 10             # Test against specific servers for 10 seconds\n  \
sp -f json --no-upload                # Download-only test with JSON output")]
pub struct Cli {
    /// Display the fetched server list and exit
    #[arg(short = 'l', long, help = "Display a list of available servers")]
    pub list: bool,

    /// Print the CSV header line and exit
    #[arg(long, help = "Print CSV headers")]
    pub csv_header: bool,

    /// Restrict testing to these server IDs
    #[arg(
        short = 's',
        long = "servers",
        value_delimiter = ',',
        help = "Comma separated server IDs to test against"
    )]
    pub include_ids: Vec<i32>,

    /// Never test against these server IDs
    #[arg(
        short = 'e',
        long = "exclude",
        value_delimiter = ',',
        help = "Comma separated server IDs to exclude from testing"
    )]
    pub exclude_ids: Vec<i32>,

    /// Output rendering; non-human formats report speeds in Mbps
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human-readable",
        help = "Output format"
    )]
    pub format: OutputFormat,

    #[arg(long, help = "Do not perform the download test")]
    pub no_download: bool,

    #[arg(long, help = "Do not perform the upload test")]
    pub no_upload: bool,

    #[arg(long, help = "Do not use ICMP ping, start with the HTTP strategy")]
    pub no_icmp: bool,

    /// Stream upload data straight from the OS random source instead of a
    /// pre-allocated buffer; slower, but bounded memory
    #[arg(
        long,
        help = "Do not pre-allocate the upload payload (for memory-constrained systems)"
    )]
    pub no_pre_allocate: bool,

    #[arg(
        short = 'c',
        long,
        default_value_t = 3,
        help = "Concurrent HTTP transfer streams"
    )]
    pub concurrent: usize,

    /// Chunk-count hint sent to the download endpoint; chunk size depends on
    /// the server configuration
    #[arg(
        short = 'C',
        long,
        default_value_t = 100,
        help = "Chunks to request from the download endpoint"
    )]
    pub chunks: usize,

    #[arg(
        short = 'B',
        long,
        help = "Display rates in bytes instead of bits (human-readable output only)"
    )]
    pub bytes: bool,

    #[arg(
        short = 'b',
        long,
        help = "Use binary prefixes (KiB, Mibit, ...) instead of decimal (human-readable output only)"
    )]
    pub binary_base: bool,

    #[arg(
        short = 'd',
        long,
        value_enum,
        default_value = "km",
        help = "Distance unit shown in the ISP information"
    )]
    pub distance: DistanceUnit,

    #[arg(
        short = 'L',
        long,
        help = "Use an alternative server list from a local JSON file"
    )]
    pub local_servers: Option<PathBuf>,

    #[arg(
        short = 'R',
        long,
        help = "Use an alternative server list from a remote JSON URL"
    )]
    pub remote_servers: Option<String>,

    #[arg(
        short = 't',
        long,
        default_value_t = 15,
        help = "HTTP connect timeout in seconds"
    )]
    pub timeout: u64,

    #[arg(
        short = 'D',
        long,
        default_value_t = 15,
        help = "Duration of each transfer window in seconds"
    )]
    pub duration: u64,

    #[arg(
        short = 'u',
        long,
        default_value_t = 1024,
        help = "Size of the upload payload in KiB"
    )]
    pub upload_size: usize,

    #[arg(
        short = 'p',
        long,
        default_value_t = 10,
        help = "Latency samples taken against the chosen server"
    )]
    pub ping_count: usize,

    #[arg(long, help = "Force HTTPS when a server list entry has no scheme")]
    pub secure: bool,

    #[arg(long, help = "Skip TLS certificate verification")]
    pub skip_cert_verify: bool,

    /// Submit the result to the telemetry service and print the share link
    #[arg(long, help = "Share the result via the telemetry service")]
    pub share: bool,

    #[arg(long, help = "Alternative telemetry server base URL")]
    pub telemetry_server: Option<String>,

    /// Logging verbosity; specify multiple times for more detail
    #[arg(short = 'v', long, action = clap::ArgAction::Count, help = "Increase logging verbosity")]
    pub verbose: u8,
}

impl Cli {
    /// Log level derived from the repeated `-v` flag
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Transport configuration for the shared HTTP client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout),
            skip_cert_verify: self.skip_cert_verify,
        }
    }

    /// Engine options assembled from the flag set
    pub fn test_options(&self) -> TestOptions {
        TestOptions {
            ping_count: self.ping_count,
            concurrent: self.concurrent,
            chunks: self.chunks,
            upload_size_kib: self.upload_size,
            duration: Duration::from_secs(self.duration),
            no_download: self.no_download,
            no_upload: self.no_upload,
            no_prealloc: self.no_pre_allocate,
            distance_unit: self.distance,
            telemetry: self.share.then(|| TelemetryConfig {
                server: self
                    .telemetry_server
                    .clone()
                    .unwrap_or_else(|| crate::telemetry::DEFAULT_TELEMETRY_SERVER.to_string()),
                ..TelemetryConfig::default()
            }),
        }
    }
}
