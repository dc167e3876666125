pub mod config;
pub mod monitor;
pub mod report;
pub mod server;
pub mod snapshot;
pub mod watch;

use std::path::Path;
use std::sync::{Arc, Mutex};

use magi_core::{
    FrameCounter, LogEntry, Monitor, MonitorConfig, SpeechRequest, SpeechSink, native_signals,
};

/// Load the config file if one was given, apply CLI overrides, and validate.
/// Exits the process on error.
pub fn load_config(path: Option<&Path>, seed: Option<u64>) -> MonitorConfig {
    let mut config = match path {
        Some(path) => match MonitorConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => MonitorConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }
    config
}

/// Override the refresh interval, rejecting zero.
pub fn with_refresh(mut config: MonitorConfig, refresh_ms: Option<u64>) -> MonitorConfig {
    if let Some(ms) = refresh_ms {
        if ms == 0 {
            eprintln!("Error: refresh interval must be at least 1 ms");
            std::process::exit(1);
        }
        config.refresh_interval_ms = ms;
    }
    config
}

/// Build a monitor wired to the native host signals.
///
/// Pass a frame counter when something is actually rendering frames (the
/// dashboard); headless commands leave it out and the CPU estimate falls back
/// to idle-probe and transfer signals only.
pub fn build_monitor(config: MonitorConfig, frames: Option<FrameCounter>) -> Monitor {
    Monitor::new(config, native_signals(frames))
}

/// Speech sink for terminals: keeps the last utterance so it can be shown
/// as a caption. There is no synthesizer behind it.
#[derive(Clone, Default)]
pub struct CaptionSink {
    last: Arc<Mutex<Option<SpeechRequest>>>,
}

impl CaptionSink {
    pub fn last(&self) -> Option<SpeechRequest> {
        self.last.lock().ok().and_then(|g| g.clone())
    }
}

impl SpeechSink for CaptionSink {
    fn speak(&mut self, request: &SpeechRequest) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(request.clone());
        }
    }

    fn cancel(&mut self) {
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }
}

/// One log line as printed by `watch` and `snapshot`.
pub fn format_log_line(entry: &LogEntry) -> String {
    format!(
        "[{}] {:<3} {}",
        entry.timestamp,
        entry.severity.prefix(),
        entry.message
    )
}
