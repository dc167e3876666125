//! # magi-core
//!
//! **A live system-health readout built from the signals a sandboxed process
//! can actually see.**
//!
//! `magi-core` turns indirect host signals (frame pacing, scheduler latency,
//! transfer timings, memory counters, link and battery descriptors) into a
//! smoothed per-tick [`MetricSnapshot`], a composite sync rate, a bounded feed
//! of threshold-crossing log lines, and spoken status reports.
//!
//! ## Quick Start
//!
//! ```no_run
//! use magi_core::{Monitor, MonitorConfig, native_signals};
//!
//! let mut monitor = Monitor::new(MonitorConfig::default(), native_signals(None));
//! monitor.start();
//!
//! let snap = monitor.tick();
//! println!("cpu {}%  sync {:.1}%", snap.cpu_usage, snap.sync_rate);
//!
//! for entry in monitor.logs() {
//!     println!("[{}] {} {}", entry.timestamp, entry.severity.prefix(), entry.message);
//! }
//! ```
//!
//! ## Architecture
//!
//! Host signals → estimators (CPU, memory, network) → sync rate → snapshot
//! → threshold watcher → log store
//!
//! Every signal is optional. A host that lacks one gets the documented
//! fallback instead of an error; the only fallible operation in the crate is
//! loading a [`MonitorConfig`].

pub mod audio;
pub mod config;
pub mod cpu;
pub mod error;
pub mod events;
pub mod host;
pub mod log_store;
pub mod monitor;
pub mod network;
pub mod report;
pub mod smoothing;
pub mod snapshot;
pub mod source;
pub mod sync_rate;

pub use audio::{AudioCommand, AudioControl, AudioSink};
pub use config::MonitorConfig;
pub use cpu::{CpuEstimator, CpuSample};
pub use error::ConfigError;
pub use events::{Channel, ChannelEvent, ThresholdWatcher, WatcherConfig};
pub use host::native_signals;
pub use log_store::{LogEntry, LogStore, Severity};
pub use monitor::Monitor;
pub use network::{NetworkReading, NetworkReconciler};
pub use report::{
    Announcer, ReportSynthesizer, SpeechRequest, SpeechSink, StatusReport, VoiceConfig,
    number_to_japanese,
};
pub use snapshot::{MetricSnapshot, format_bytes, format_speed, format_uptime, wall_clock};
pub use source::{
    BatterySource, BatteryStatus, Callback, Capability, ConnectionDescriptor, ConnectionSource,
    FrameCounter, HostSignals, IdleProbe, MemoryProbe, MemoryReading, Notifier, Subscription,
    TransferEntry, TransferFeed,
};
pub use sync_rate::sync_rate;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
