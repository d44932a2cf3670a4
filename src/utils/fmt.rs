//! ## fmt
//!
//! format utilities

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Format time using fmt string in utc time
pub fn fmt_time_utc(time: SystemTime, fmt: &str) -> String {
    let datetime: DateTime<Utc> = time.into();
    format!("{}", datetime.format(fmt))
}

/// Format a byte count the way listings show it
pub fn fmt_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if size < 1024 {
        return format!("{size} B");
    }
    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
