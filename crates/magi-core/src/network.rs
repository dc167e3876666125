//! Network throughput reconciliation.
//!
//! Two independent views of the link:
//!
//! 1. **Declared capacity**: the connection descriptor the host advertises.
//!    Coarse, and only updated when the descriptor changes.
//! 2. **Measured transfers**: byte counts and timings of transfers that
//!    completed since the previous tick, smoothed with an EMA.
//!
//! Download speed prefers the measured value whenever it is positive. Upload
//! cannot be measured this way and always comes from the declared view.

use serde::{Deserialize, Serialize};

use crate::smoothing::{ema, sanitize};
use crate::source::{ConnectionDescriptor, TransferEntry};

/// Bytes per second in one Mbit/s (approximation used for declared links).
pub const BYTES_PER_MBIT: f64 = 125_000.0;
/// Default smoothing factor for measured download speed.
pub const DEFAULT_ALPHA: f64 = 0.2;
/// Transfer entries a host should retain between ticks.
pub const MAX_RETAINED_TRANSFERS: usize = 50;

/// Reconciled network view for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReading {
    pub down_bps: f64,
    pub up_bps: f64,
    pub kind: String,
    pub effective_type: String,
    pub rtt_ms: f64,
}

/// Declared-capacity view, converted to bytes/s.
#[derive(Debug, Clone, PartialEq)]
struct DeclaredLink {
    down_bps: f64,
    up_bps: f64,
    kind: String,
    effective_type: String,
    rtt_ms: f64,
}

impl From<&ConnectionDescriptor> for DeclaredLink {
    fn from(d: &ConnectionDescriptor) -> Self {
        Self {
            down_bps: sanitize(d.downlink_mbps * BYTES_PER_MBIT),
            up_bps: sanitize(d.uplink_mbps * BYTES_PER_MBIT),
            kind: if d.kind.is_empty() {
                "unknown".to_string()
            } else {
                d.kind.clone()
            },
            effective_type: if d.effective_type.is_empty() {
                "4g".to_string()
            } else {
                d.effective_type.clone()
            },
            rtt_ms: sanitize(d.rtt_ms),
        }
    }
}

impl Default for DeclaredLink {
    fn default() -> Self {
        Self::from(&ConnectionDescriptor::default())
    }
}

/// Merges declared and measured throughput into one smoothed reading.
#[derive(Debug, Clone)]
pub struct NetworkReconciler {
    alpha: f64,
    declared: DeclaredLink,
    measured_down: f64,
    /// Start time of the newest entry seen so far.
    watermark_ms: Option<f64>,
}

impl Default for NetworkReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl NetworkReconciler {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            declared: DeclaredLink::default(),
            measured_down: 0.0,
            watermark_ms: None,
        }
    }

    /// Replace the declared-capacity view.
    pub fn observe_declared(&mut self, descriptor: &ConnectionDescriptor) {
        self.declared = DeclaredLink::from(descriptor);
    }

    /// Fold the retained transfer entries into the measured estimate.
    ///
    /// Only entries that started after the previous watermark count. The
    /// first call just sets the watermark: with no prior measurement there is
    /// nothing to compare against, so it reads as zero traffic.
    pub fn observe_transfers(&mut self, entries: &[TransferEntry]) {
        if let Some(watermark) = self.watermark_ms {
            let (bytes, time_ms) = entries
                .iter()
                .filter(|e| e.start_ms > watermark && e.transfer_size > 0)
                .fold((0.0_f64, 0.0_f64), |(b, t), e| {
                    (b + e.transfer_size as f64, t + sanitize(e.duration_ms()))
                });

            if time_ms > 0.0 {
                let instantaneous = bytes / time_ms * 1000.0;
                self.measured_down = ema(self.measured_down, instantaneous, self.alpha).round();
            }
        }

        if let Some(last) = entries.last() {
            self.watermark_ms = Some(last.start_ms);
        }
    }

    /// Smoothed measured download speed, bytes/s.
    pub fn measured_down_bps(&self) -> f64 {
        self.measured_down
    }

    /// Declared download capacity, bytes/s.
    pub fn declared_down_bps(&self) -> f64 {
        self.declared.down_bps
    }

    pub fn reading(&self) -> NetworkReading {
        NetworkReading {
            down_bps: reconcile(self.measured_down, self.declared.down_bps),
            up_bps: self.declared.up_bps,
            kind: self.declared.kind.clone(),
            effective_type: self.declared.effective_type.clone(),
            rtt_ms: self.declared.rtt_ms,
        }
    }
}

/// Prefer empirical evidence over advertised capability.
pub fn reconcile(measured_bps: f64, declared_bps: f64) -> f64 {
    if measured_bps > 0.0 {
        measured_bps
    } else {
        declared_bps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(start: f64, end: f64, size: u64) -> TransferEntry {
        TransferEntry {
            start_ms: start,
            response_end_ms: end,
            transfer_size: size,
        }
    }

    fn wifi(down_mbps: f64, up_mbps: f64) -> ConnectionDescriptor {
        ConnectionDescriptor {
            downlink_mbps: down_mbps,
            uplink_mbps: up_mbps,
            rtt_ms: 50.0,
            kind: "wifi".into(),
            effective_type: "4g".into(),
        }
    }

    #[test]
    fn first_tick_is_zero_traffic() {
        let mut net = NetworkReconciler::default();
        net.observe_transfers(&[entry(0.0, 100.0, 1_000_000)]);
        assert_eq!(net.measured_down_bps(), 0.0);
        assert_eq!(net.reading().down_bps, 0.0);
    }

    #[test]
    fn measured_speed_is_smoothed() {
        let mut net = NetworkReconciler::default();
        let mut entries = vec![entry(0.0, 10.0, 10)];
        net.observe_transfers(&entries);

        // 100_000 bytes over 100 ms = 1_000_000 B/s
        entries.push(entry(500.0, 600.0, 100_000));
        net.observe_transfers(&entries);
        assert_eq!(net.measured_down_bps(), 200_000.0);

        // Same entries again: nothing new, estimate holds.
        net.observe_transfers(&entries);
        assert_eq!(net.measured_down_bps(), 200_000.0);
    }

    #[test]
    fn measured_wins_over_declared() {
        let mut net = NetworkReconciler::default();
        net.observe_declared(&wifi(10.0, 5.0));
        let mut entries = vec![entry(0.0, 1.0, 1)];
        net.observe_transfers(&entries);
        entries.push(entry(10.0, 20.0, 5_000));
        net.observe_transfers(&entries);

        let r = net.reading();
        assert!(r.down_bps > 0.0);
        assert_eq!(r.down_bps, net.measured_down_bps());
        assert_ne!(r.down_bps, 10.0 * BYTES_PER_MBIT);
    }

    #[test]
    fn declared_used_when_nothing_measured() {
        let mut net = NetworkReconciler::default();
        net.observe_declared(&wifi(10.0, 5.0));
        let r = net.reading();
        assert_eq!(r.down_bps, 1_250_000.0);
        assert_eq!(r.up_bps, 625_000.0);
        assert_eq!(r.kind, "wifi");
        assert_eq!(r.rtt_ms, 50.0);
    }

    #[test]
    fn upload_unknown_reads_zero() {
        let net = NetworkReconciler::default();
        assert_eq!(net.reading().up_bps, 0.0);
        assert_eq!(net.reading().kind, "unknown");
        assert_eq!(net.reading().effective_type, "4g");
    }

    #[test]
    fn reconcile_policy() {
        assert_eq!(reconcile(42.0, 1_000.0), 42.0);
        assert_eq!(reconcile(0.0, 1_000.0), 1_000.0);
    }

    #[test]
    fn garbage_descriptor_is_clamped() {
        let mut net = NetworkReconciler::default();
        net.observe_declared(&ConnectionDescriptor {
            downlink_mbps: f64::NAN,
            uplink_mbps: -3.0,
            rtt_ms: -1.0,
            kind: String::new(),
            effective_type: String::new(),
        });
        let r = net.reading();
        assert_eq!(r.down_bps, 0.0);
        assert_eq!(r.up_bps, 0.0);
        assert_eq!(r.rtt_ms, 0.0);
        assert_eq!(r.kind, "unknown");
    }
}
