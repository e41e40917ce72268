//! Process lifecycle: shutdown coordination and self-reporting for /status.

pub mod shutdown;

pub use shutdown::Shutdown;

use serde::Serialize;
use std::time::Instant;

/// Process-level figures reported on /status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    pub uptime_secs: u64,
    /// Resident set size in bytes. Only available on Linux.
    pub memory_rss_bytes: Option<u64>,
}

impl ProcessStats {
    pub fn collect(started_at: Instant) -> Self {
        Self {
            uptime_secs: started_at.elapsed().as_secs(),
            memory_rss_bytes: rss_bytes(),
        }
    }
}

#[cfg(target_os = "linux")]
fn rss_bytes() -> Option<u64> {
    // /proc/self/statm: size resident shared text lib data dt (pages)
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn rss_bytes() -> Option<u64> {
    None
}
