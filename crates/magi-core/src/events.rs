//! Threshold-crossing event generation.
//!
//! Each monitored channel splits its value range into ordered bands. An event
//! fires only when a new sample lands in a different band than the previous
//! sample. A value hovering inside one band never repeats itself.
//!
//! A boundary is either *exceeded* (the value must be strictly above it, as
//! for the warning and critical levels) or *reached* (the value only has to
//! be at or above it, so that dropping strictly below it counts as the
//! falling crossing). A CPU reading of exactly 80 is still "elevated"; 81 is
//! critical. A reading of exactly 40 has not yet normalized; 39 has.
//!
//! Every channel carries its own cooldown clock. A crossing that arrives while
//! its channel is cooling down is dropped, but the channel still records the
//! new value, so the next crossing is judged against the most recent sample.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::log_store::Severity;
use crate::snapshot::MetricSnapshot;

/// Monitored metric dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Cpu,
    Memory,
    Network,
    Battery,
    Charging,
    SyncRate,
    /// Synthetic "still alive" messages.
    Heartbeat,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Memory => write!(f, "memory"),
            Self::Network => write!(f, "network"),
            Self::Battery => write!(f, "battery"),
            Self::Charging => write!(f, "charging"),
            Self::SyncRate => write!(f, "sync_rate"),
            Self::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// Event produced by the watcher, ready to be appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: Channel,
    pub severity: Severity,
    pub message: String,
    pub localized_message: String,
}

impl ChannelEvent {
    fn new(channel: Channel, severity: Severity, message: String, localized: &str) -> Self {
        Self {
            channel,
            severity,
            message,
            localized_message: localized.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Rising,
    Falling,
}

/// One band boundary and which side owns the boundary value itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub at: f64,
    /// The boundary value belongs to the upper band.
    pub inclusive: bool,
}

impl Boundary {
    /// Crossed upward only by values strictly above `at`.
    pub const fn exceeded(at: f64) -> Self {
        Self {
            at,
            inclusive: false,
        }
    }

    /// Left downward only by values strictly below `at`.
    pub const fn reached(at: f64) -> Self {
        Self { at, inclusive: true }
    }

    fn below(self, value: f64) -> bool {
        if self.inclusive {
            value < self.at
        } else {
            value <= self.at
        }
    }
}

pub const CPU_BANDS: [Boundary; 3] = [
    Boundary::reached(40.0),
    Boundary::exceeded(60.0),
    Boundary::exceeded(80.0),
];
pub const MEMORY_BANDS: [Boundary; 3] = [
    Boundary::reached(50.0),
    Boundary::exceeded(70.0),
    Boundary::exceeded(85.0),
];
pub const NETWORK_BANDS: [Boundary; 3] = [
    Boundary::reached(1_000.0),
    Boundary::exceeded(100_000.0),
    Boundary::exceeded(10_000_000.0),
];
pub const BATTERY_BANDS: [Boundary; 3] = [
    Boundary::reached(20.0),
    Boundary::reached(50.0),
    Boundary::exceeded(80.0),
];
pub const SYNC_RATE_BANDS: [Boundary; 3] = [
    Boundary::reached(50.0),
    Boundary::reached(70.0),
    Boundary::exceeded(90.0),
];

/// Band index of `value`: the number of boundaries it sits above.
pub fn band_of(value: f64, boundaries: &[Boundary]) -> usize {
    boundaries.iter().filter(|b| !b.below(value)).count()
}

/// Heartbeat phrases, picked uniformly when the log has been quiet.
pub const HEARTBEAT_PHRASES: [(&str, &str); 3] = [
    ("System status nominal", "システム状態正常"),
    ("Monitoring systems operational", "監視システム稼働中"),
    ("Data collection active", "データ収集中"),
];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-channel cooldowns and heartbeat timing, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub cpu_cooldown_ms: u64,
    pub memory_cooldown_ms: u64,
    pub network_cooldown_ms: u64,
    /// Cooldown for the "activity dropped" network event.
    pub network_low_cooldown_ms: u64,
    pub battery_cooldown_ms: u64,
    pub charging_cooldown_ms: u64,
    pub sync_rate_cooldown_ms: u64,
    /// How often the heartbeat check runs.
    pub heartbeat_interval_ms: u64,
    /// Quiet period after which a heartbeat line is written.
    pub heartbeat_quiet_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            cpu_cooldown_ms: 5_000,
            memory_cooldown_ms: 5_000,
            network_cooldown_ms: 3_000,
            network_low_cooldown_ms: 5_000,
            battery_cooldown_ms: 3_000,
            charging_cooldown_ms: 3_000,
            sync_rate_cooldown_ms: 3_000,
            heartbeat_interval_ms: 8_000,
            heartbeat_quiet_ms: 15_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-channel state
// ---------------------------------------------------------------------------

/// Last value and cooldown clock for one banded channel.
#[derive(Debug, Clone)]
struct BandTracker {
    boundaries: [Boundary; 3],
    last: Option<f64>,
    last_emit_ms: Option<u64>,
}

impl BandTracker {
    fn new(boundaries: [Boundary; 3], initial: Option<f64>) -> Self {
        Self {
            boundaries,
            last: initial,
            last_emit_ms: None,
        }
    }

    /// Record `value`; return the entered band and direction if it crossed.
    fn crossing(&mut self, value: Option<f64>) -> Option<(usize, Direction, f64)> {
        let prev = std::mem::replace(&mut self.last, value);
        let (prev, value) = (prev?, value?);
        let from = band_of(prev, &self.boundaries);
        let to = band_of(value, &self.boundaries);
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => Some((to, Direction::Rising, value)),
            std::cmp::Ordering::Less => Some((to, Direction::Falling, value)),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn cooled_down(&self, now_ms: u64, cooldown_ms: u64) -> bool {
        match self.last_emit_ms {
            None => true,
            Some(t) => now_ms.saturating_sub(t) >= cooldown_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// ThresholdWatcher
// ---------------------------------------------------------------------------

/// Watches successive snapshots and emits events on band transitions.
#[derive(Debug, Clone)]
pub struct ThresholdWatcher {
    config: WatcherConfig,
    cpu: BandTracker,
    memory: BandTracker,
    network: BandTracker,
    battery: BandTracker,
    sync_rate: BandTracker,
    charging: Option<bool>,
    charging_emit_ms: Option<u64>,
    /// Time of the most recent channel event (heartbeats excluded).
    last_activity_ms: u64,
    last_heartbeat_check_ms: u64,
}

impl ThresholdWatcher {
    /// `start_ms` anchors the heartbeat quiet period.
    pub fn new(config: WatcherConfig, start_ms: u64) -> Self {
        Self {
            config,
            cpu: BandTracker::new(CPU_BANDS, Some(0.0)),
            memory: BandTracker::new(MEMORY_BANDS, Some(0.0)),
            network: BandTracker::new(NETWORK_BANDS, Some(0.0)),
            battery: BandTracker::new(BATTERY_BANDS, None),
            sync_rate: BandTracker::new(SYNC_RATE_BANDS, Some(100.0)),
            charging: None,
            charging_emit_ms: None,
            last_activity_ms: start_ms,
            last_heartbeat_check_ms: start_ms,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Compare `snapshot` against the previous one and return the events to
    /// log, in channel order.
    pub fn observe(&mut self, snapshot: &MetricSnapshot, now_ms: u64) -> Vec<ChannelEvent> {
        let mut out = Vec::new();

        if let Some((band, dir, v)) = self.cpu.crossing(Some(snapshot.cpu_usage))
            && let Some(ev) = cpu_event(band, dir, v)
            && self.cpu.cooled_down(now_ms, self.config.cpu_cooldown_ms)
        {
            self.cpu.last_emit_ms = Some(now_ms);
            out.push(ev);
        }

        if let Some((band, dir, v)) = self.memory.crossing(Some(snapshot.memory_usage))
            && let Some(ev) = memory_event(band, dir, v)
            && self.memory.cooled_down(now_ms, self.config.memory_cooldown_ms)
        {
            self.memory.last_emit_ms = Some(now_ms);
            out.push(ev);
        }

        if let Some((band, dir, _)) = self.network.crossing(Some(snapshot.network_down_bps))
            && let Some(ev) = network_event(band, dir)
        {
            let cooldown = if band == 0 {
                self.config.network_low_cooldown_ms
            } else {
                self.config.network_cooldown_ms
            };
            if self.network.cooled_down(now_ms, cooldown) {
                self.network.last_emit_ms = Some(now_ms);
                out.push(ev);
            }
        }

        if let Some((band, dir, v)) = self.battery.crossing(snapshot.battery_level)
            && let Some(ev) = battery_event(band, dir, v)
            && self.battery.cooled_down(now_ms, self.config.battery_cooldown_ms)
        {
            self.battery.last_emit_ms = Some(now_ms);
            out.push(ev);
        }

        if let Some(ev) = self.charging_edge(snapshot, now_ms) {
            out.push(ev);
        }

        if let Some((band, dir, v)) = self.sync_rate.crossing(Some(snapshot.sync_rate))
            && let Some(ev) = sync_rate_event(band, dir, v)
            && self.sync_rate.cooled_down(now_ms, self.config.sync_rate_cooldown_ms)
        {
            self.sync_rate.last_emit_ms = Some(now_ms);
            out.push(ev);
        }

        if !out.is_empty() {
            self.last_activity_ms = now_ms;
        }
        out
    }

    fn charging_edge(&mut self, snapshot: &MetricSnapshot, now_ms: u64) -> Option<ChannelEvent> {
        let current = snapshot.is_charging?;
        let prev = self.charging.replace(current);
        if prev == Some(current) {
            return None;
        }
        let cooled = self
            .charging_emit_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= self.config.charging_cooldown_ms);
        if !cooled {
            return None;
        }
        let ev = if current {
            ChannelEvent::new(
                Channel::Charging,
                Severity::Success,
                "Power adapter connected".to_string(),
                "電源アダプタ接続",
            )
        } else if snapshot.battery_level.is_some() {
            ChannelEvent::new(
                Channel::Charging,
                Severity::Info,
                "Running on battery power".to_string(),
                "バッテリー駆動中",
            )
        } else {
            return None;
        };
        self.charging_emit_ms = Some(now_ms);
        Some(ev)
    }

    /// Heartbeat check. Runs at most once per `heartbeat_interval_ms`; emits a
    /// random nominal line when no channel has spoken for `heartbeat_quiet_ms`.
    pub fn heartbeat<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> Option<ChannelEvent> {
        if now_ms.saturating_sub(self.last_heartbeat_check_ms) < self.config.heartbeat_interval_ms {
            return None;
        }
        self.last_heartbeat_check_ms = now_ms;
        if now_ms.saturating_sub(self.last_activity_ms) <= self.config.heartbeat_quiet_ms {
            return None;
        }
        let (message, localized) = HEARTBEAT_PHRASES[rng.random_range(0..HEARTBEAT_PHRASES.len())];
        Some(ChannelEvent::new(
            Channel::Heartbeat,
            Severity::Info,
            message.to_string(),
            localized,
        ))
    }
}

// ---------------------------------------------------------------------------
// Transition tables
// ---------------------------------------------------------------------------

fn cpu_event(band: usize, dir: Direction, v: f64) -> Option<ChannelEvent> {
    let (severity, message, localized) = match (band, dir) {
        (3, _) => (Severity::Error, format!("CPU usage critical: {v:.1}%"), "CPU使用率危険"),
        (2, Direction::Rising) => (Severity::Warn, format!("CPU usage elevated: {v:.1}%"), "CPU使用率上昇"),
        (2, Direction::Falling) => (Severity::Warn, format!("CPU load easing: {v:.1}%"), "CPU負荷緩和"),
        (1, Direction::Rising) => (Severity::Info, format!("CPU load rising: {v:.1}%"), "CPU負荷上昇"),
        (1, Direction::Falling) => (Severity::Info, format!("CPU load receding: {v:.1}%"), "CPU負荷低下"),
        (0, _) => (Severity::Success, "CPU usage normalized".to_string(), "CPU使用率正常化"),
        _ => return None,
    };
    Some(ChannelEvent::new(Channel::Cpu, severity, message, localized))
}

fn memory_event(band: usize, dir: Direction, v: f64) -> Option<ChannelEvent> {
    let (severity, message, localized) = match (band, dir) {
        (3, _) => (Severity::Error, format!("Memory pressure critical: {v:.1}%"), "メモリ危険"),
        (2, Direction::Rising) => (Severity::Warn, format!("Memory usage high: {v:.1}%"), "メモリ警告"),
        (2, Direction::Falling) => (Severity::Warn, format!("Memory pressure easing: {v:.1}%"), "メモリ圧迫緩和"),
        (1, Direction::Rising) => (Severity::Info, format!("Memory usage rising: {v:.1}%"), "メモリ使用量上昇"),
        (1, Direction::Falling) => (Severity::Info, format!("Memory usage receding: {v:.1}%"), "メモリ使用量低下"),
        (0, _) => (Severity::Success, "Memory usage optimal".to_string(), "メモリ最適"),
        _ => return None,
    };
    Some(ChannelEvent::new(Channel::Memory, severity, message, localized))
}

fn network_event(band: usize, dir: Direction) -> Option<ChannelEvent> {
    let (severity, message, localized) = match (band, dir) {
        (0, Direction::Falling) => (Severity::Warn, "Network activity low", "ネットワーク活性低下"),
        (2, Direction::Rising) => (Severity::Success, "Network connection active", "ネットワーク接続安定"),
        (3, Direction::Rising) => (Severity::Info, "High network activity detected", "高ネットワーク活性"),
        _ => return None,
    };
    Some(ChannelEvent::new(Channel::Network, severity, message.to_string(), localized))
}

fn battery_event(band: usize, dir: Direction, v: f64) -> Option<ChannelEvent> {
    let (severity, message, localized) = match (band, dir) {
        (0, Direction::Falling) => (Severity::Error, format!("Battery critical: {v:.0}%"), "バッテリー危険"),
        (1, Direction::Falling) => (Severity::Warn, format!("Battery low: {v:.0}%"), "バッテリー低下"),
        (3, Direction::Rising) => (Severity::Success, format!("Battery charged: {v:.0}%"), "バッテリー充電済"),
        _ => return None,
    };
    Some(ChannelEvent::new(Channel::Battery, severity, message, localized))
}

fn sync_rate_event(band: usize, dir: Direction, v: f64) -> Option<ChannelEvent> {
    let (severity, message, localized) = match (band, dir) {
        (0, Direction::Falling) => (Severity::Error, format!("Sync rate critical: {v:.1}%"), "同期率危険"),
        (1, Direction::Falling) => (Severity::Warn, format!("Sync rate warning: {v:.1}%"), "同期率警告"),
        (3, Direction::Rising) => (Severity::Success, format!("Sync rate optimal: {v:.1}%"), "同期率最適"),
        _ => return None,
    };
    Some(ChannelEvent::new(Channel::SyncRate, severity, message, localized))
}
