//! Formatting helpers for the build transcript

use prost_types::Timestamp;

/// Format a byte count the way the daemon's CLI does: plain bytes below
/// 1000, one decimal place with a decimal SI unit above.
pub fn humanise_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["kB", "MB", "GB", "TB"];

    if bytes < 1000 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;

    while value >= 1000.0 && unit + 1 < UNITS.len() {
        value /= 1000.0;
        unit += 1;
    }

    format!("{value:.1} {}", UNITS[unit])
}

/// Seconds-and-milliseconds offset of `at` from `started`, rendered `S.mmm`.
///
/// Negative offsets (clock skew between daemon components) clamp to `0.000`.
pub fn format_elapsed(started: &Timestamp, at: &Timestamp) -> String {
    let mut seconds = at.seconds - started.seconds;
    let mut nanos = at.nanos - started.nanos;

    if nanos < 0 {
        seconds -= 1;
        nanos += 1_000_000_000;
    }

    if seconds < 0 {
        return "0.000".to_string();
    }

    format!("{}.{:03}", seconds, nanos / 1_000_000)
}
