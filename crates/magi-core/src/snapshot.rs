//! Per-tick metric snapshot and display helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One consistent, immutable set of metric values produced on a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Tick sequence number, starting at 1.
    pub tick: u64,
    pub collected_unix_ms: u64,
    pub cpu_usage: f64,
    pub cpu_cores: usize,
    pub memory_usage: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub network_down_bps: f64,
    pub network_up_bps: f64,
    pub network_type: String,
    pub network_effective_type: String,
    pub network_rtt_ms: f64,
    pub uptime_seconds: u64,
    pub battery_level: Option<f64>,
    pub is_charging: Option<bool>,
    pub battery_time_remaining_s: Option<f64>,
    pub sync_rate: f64,
}

impl MetricSnapshot {
    /// CPU or memory in their critical band.
    pub fn is_emergency(&self) -> bool {
        self.cpu_usage > 80.0 || self.memory_usage > 85.0
    }
}

pub(crate) fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// `HH:MM:SS` (UTC, 24h) for a unix timestamp in milliseconds.
pub fn wall_clock(unix_ms: u64) -> String {
    let secs = unix_ms / 1000;
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;
    format!("{hour:02}:{min:02}:{sec:02}")
}

/// Human-readable byte count, 1024-based, up to two decimals.
pub fn format_bytes(bytes: f64) -> String {
    format_bytes_with(bytes, 2)
}

pub fn format_bytes_with(bytes: f64, decimals: usize) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0.0 || !bytes.is_finite() || bytes < 0.0 {
        return "0 B".to_string();
    }
    let i = ((bytes.ln() / 1024f64.ln()).floor().max(0.0) as usize).min(UNITS.len() - 1);
    let scaled = bytes / 1024f64.powi(i as i32);
    let mut s = format!("{scaled:.decimals$}");
    if s.contains('.') {
        s = s.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{s} {}", UNITS[i])
}

/// Bytes per second as `"<bytes>/s"`.
pub fn format_speed(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second < 0.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_second))
}

/// `HH:MM:SS`, or `Nd HH:MM:SS` once past a day.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    }
}
