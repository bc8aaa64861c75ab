//! Report rendering
//!
//! Turns a finished `Report` into the requested output format. Human-readable
//! output uses the rate ladder; the flat formats carry speeds in Mbps and the
//! JSON formats serialize the full nested report.

use clap::ValueEnum;

use crate::report::Report;
use crate::speedtest::formatting::format_rate;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[value(name = "human-readable")]
    HumanReadable,
    Csv,
    Tsv,
    Json,
    Jsonl,
    #[value(name = "json-pretty")]
    JsonPretty,
}

/// Header line matching the CSV row layout
pub const CSV_HEADER: &str = "Timestamp,Server Name,Address,Ping,Jitter,Download,Upload,Share,IP";

/// Renders a report in the requested format
pub fn render_report(
    report: &Report,
    format: OutputFormat,
    use_bytes: bool,
    binary_base: bool,
) -> anyhow::Result<String> {
    let rendered = match format {
        OutputFormat::HumanReadable => render_human(report, use_bytes, binary_base),
        OutputFormat::Csv => render_flat(report, ","),
        OutputFormat::Tsv => render_flat(report, "\t"),
        OutputFormat::Json | OutputFormat::Jsonl => serde_json::to_string(report)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(report)?,
    };
    Ok(rendered)
}

fn render_human(report: &Report, use_bytes: bool, binary_base: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("Server:\t\t{}\n", report.server));

    let client = &report.client.ip_info;
    if !client.ip.is_empty() {
        let mut line = client.ip.clone();
        if !client.organization.is_empty() {
            line.push_str(&format!(" - {}", client.organization));
        }
        if !client.country.is_empty() {
            line.push_str(&format!(", {}", client.country));
        }
        out.push_str(&format!("You are from:\t{line}\n"));
    }

    out.push_str(&format!("Ping:\t\t{:.2} ms\n", report.ping));
    out.push_str(&format!("Jitter:\t\t{:.2} ms\n", report.jitter));
    out.push_str(&format!(
        "Download:\t{}\n",
        human_rate(report.download, use_bytes, binary_base)
    ));
    out.push_str(&format!(
        "Upload:\t\t{}\n",
        human_rate(report.upload, use_bytes, binary_base)
    ));
    if !report.share_link.is_empty() {
        out.push_str(&format!("Share link:\t{}\n", report.share_link));
    }
    // drop the trailing newline, the caller prints with one
    out.pop();
    out
}

/// Report rates are stored in Mbps; scale back to a raw per-second value
/// before applying the unit ladder
fn human_rate(mbps: f64, use_bytes: bool, binary_base: bool) -> String {
    let bits = mbps * 1_000_000.0;
    let rate = if use_bytes { bits / 8.0 } else { bits };
    format_rate(rate, use_bytes, binary_base)
}

fn render_flat(report: &Report, separator: &str) -> String {
    let flat = report.flatten();
    [
        flat.timestamp.to_rfc3339(),
        escape_field(&flat.name, separator),
        escape_field(&flat.address, separator),
        format!("{:.2}", flat.ping),
        format!("{:.2}", flat.jitter),
        format!("{:.2}", flat.download),
        format!("{:.2}", flat.upload),
        escape_field(&flat.share, separator),
        escape_field(&flat.ip, separator),
    ]
    .join(separator)
}

/// Quotes a field that would collide with the separator
fn escape_field(value: &str, separator: &str) -> String {
    if value.contains(separator) || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
