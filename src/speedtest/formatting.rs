//! Formatting utilities for measured rates
//!
//! Converts raw per-second rates into human-readable strings with the
//! conventional unit ladder, in either bits or bytes, with decimal (1000) or
//! binary (1024) scaling. All human-readable output goes through this module
//! so rates are formatted consistently across the application.

/// Formats a per-second rate with the appropriate unit prefix
///
/// `rate` is interpreted as bits/s or bytes/s according to `use_bytes`;
/// `binary_base` switches the ladder from decimal (KB, Mb, ...) to binary
/// (KiB, Mibit, ...) prefixes.
///
/// # Examples
///
/// ```
/// use speedprobe::speedtest::formatting::format_rate;
///
/// assert_eq!(format_rate(512.0, false, false), "512.00 bits/s");
/// assert_eq!(format_rate(2_000_000.0, false, false), "2.00 Mb/s");
/// assert_eq!(format_rate(1048576.0, true, true), "1.00 MiB/s");
/// ```
pub fn format_rate(rate: f64, use_bytes: bool, binary_base: bool) -> String {
    let base: f64 = if binary_base { 1024.0 } else { 1000.0 };
    let units = match (use_bytes, binary_base) {
        (true, true) => ["bytes/s", "KiB/s", "MiB/s", "GiB/s"],
        (true, false) => ["bytes/s", "KB/s", "MB/s", "GB/s"],
        (false, true) => ["bits/s", "Kibit/s", "Mibit/s", "Gibit/s"],
        (false, false) => ["bits/s", "Kb/s", "Mb/s", "Gb/s"],
    };

    if rate < base {
        format!("{:.2} {}", rate, units[0])
    } else if rate / base < base {
        format!("{:.2} {}", rate / base, units[1])
    } else if rate / base / base < base {
        format!("{:.2} {}", rate / base / base, units[2])
    } else {
        format!("{:.2} {}", rate / base / base / base, units[3])
    }
}
