//! Integration tests for magi-core.
//!
//! These drive the whole pipeline through scripted host signals:
//! host signals → monitor tick → snapshot → threshold events → log feed.

use std::sync::{Arc, Mutex};

use magi_core::{
    Callback, ConnectionDescriptor, ConnectionSource, FrameCounter, HostSignals, MemoryProbe,
    MemoryReading, MetricSnapshot, Monitor, MonitorConfig, Notifier, Severity, SpeechRequest,
    SpeechSink, Subscription, ThresholdWatcher, WatcherConfig, sync_rate,
};

struct HalfMemory;

impl MemoryProbe for HalfMemory {
    fn read(&self) -> Option<MemoryReading> {
        Some(MemoryReading {
            used_bytes: 4 << 30,
            total_bytes: 8 << 30,
        })
    }
}

struct ScriptedLink(Notifier<ConnectionDescriptor>);

impl ConnectionSource for ScriptedLink {
    fn subscribe(&self, on_change: Callback<ConnectionDescriptor>) -> Subscription {
        self.0.subscribe(on_change)
    }
}

#[derive(Clone, Default)]
struct Transcript(Arc<Mutex<Vec<SpeechRequest>>>);

impl SpeechSink for Transcript {
    fn speak(&mut self, request: &SpeechRequest) {
        self.0.lock().unwrap().push(request.clone());
    }
    fn cancel(&mut self) {}
}

fn no_cooldowns() -> MonitorConfig {
    MonitorConfig {
        seed: Some(1),
        watcher: WatcherConfig {
            cpu_cooldown_ms: 0,
            memory_cooldown_ms: 0,
            network_cooldown_ms: 0,
            network_low_cooldown_ms: 0,
            battery_cooldown_ms: 0,
            charging_cooldown_ms: 0,
            sync_rate_cooldown_ms: 0,
            ..WatcherConfig::default()
        },
        ..MonitorConfig::default()
    }
}

#[test]
fn stalled_renderer_walks_cpu_through_every_band() {
    // Frames never advance: the renderer is starved, so the estimator climbs
    // toward 100% through the EMA.
    let host = HostSignals {
        frames: Some(FrameCounter::new()),
        memory: Some(Box::new(HalfMemory)),
        ..HostSignals::none()
    };
    let mut monitor = Monitor::new(no_cooldowns(), host);
    monitor.start_at(0);

    let mut readings = Vec::new();
    for i in 1..=8 {
        readings.push(monitor.tick_at(i * 1_000).cpu_usage);
    }
    assert_eq!(readings[..6], [0.0, 30.0, 51.0, 66.0, 76.0, 83.0]);
    assert!(readings.windows(2).all(|w| w[1] >= w[0]));

    let cpu: Vec<Severity> = monitor
        .logs()
        .filter(|e| e.message.starts_with("CPU"))
        .map(|e| e.severity)
        .collect();
    assert_eq!(cpu, vec![Severity::Info, Severity::Warn, Severity::Error]);

    let snap = monitor.snapshot();
    assert_eq!(snap.memory_usage, 50.0);
    assert!(snap.is_emergency());
    assert_eq!(snap.sync_rate, sync_rate(snap.cpu_usage, 50.0));
}

#[test]
fn cpu_90_memory_50_scenario() {
    let mut watcher = ThresholdWatcher::new(WatcherConfig::default(), 0);
    let sync = sync_rate(90.0, 50.0);
    assert!((sync - 58.0).abs() < 1e-9);

    let snap = MetricSnapshot {
        tick: 1,
        collected_unix_ms: 0,
        cpu_usage: 90.0,
        cpu_cores: 4,
        memory_usage: 50.0,
        memory_used_bytes: 0,
        memory_total_bytes: 0,
        network_down_bps: 0.0,
        network_up_bps: 0.0,
        network_type: "unknown".into(),
        network_effective_type: "4g".into(),
        network_rtt_ms: 0.0,
        uptime_seconds: 1,
        battery_level: None,
        is_charging: None,
        battery_time_remaining_s: None,
        sync_rate: sync,
    };
    let events = watcher.observe(&snap, 1_000);
    assert!(
        events
            .iter()
            .any(|e| e.severity == Severity::Error && e.message.starts_with("CPU usage critical"))
    );
    assert!(
        events
            .iter()
            .any(|e| e.severity == Severity::Warn && e.message.starts_with("Sync rate warning"))
    );
}

#[test]
fn declared_link_feeds_network_reading() {
    let link = Notifier::new();
    link.publish(ConnectionDescriptor {
        downlink_mbps: 10.0,
        uplink_mbps: 2.0,
        rtt_ms: 40.0,
        kind: "wifi".into(),
        effective_type: "4g".into(),
    });
    let host = HostSignals {
        connection: Some(Box::new(ScriptedLink(link.clone()))),
        ..HostSignals::none()
    };
    let mut monitor = Monitor::new(no_cooldowns(), host);

    let snap = monitor.tick_at(1_000).clone();
    assert_eq!(snap.network_down_bps, 1_250_000.0);
    assert_eq!(snap.network_up_bps, 250_000.0);
    assert_eq!(snap.network_type, "wifi");
    assert!(
        monitor
            .logs()
            .any(|e| e.message == "Network connection active")
    );

    link.publish(ConnectionDescriptor {
        downlink_mbps: 0.0,
        uplink_mbps: 0.0,
        rtt_ms: 0.0,
        kind: "none".into(),
        effective_type: "slow-2g".into(),
    });
    let snap = monitor.tick_at(2_000).clone();
    assert_eq!(snap.network_down_bps, 0.0);
    assert_eq!(snap.network_effective_type, "slow-2g");
    assert!(monitor.logs().any(|e| e.message == "Network activity low"));

    monitor.stop();
    assert_eq!(link.subscriber_count(), 0);
}

#[test]
fn log_feed_stays_bounded_with_gapless_ids() {
    let config = MonitorConfig {
        log_capacity: 5,
        ..no_cooldowns()
    };
    let host = HostSignals {
        frames: Some(FrameCounter::new()),
        ..HostSignals::none()
    };
    let mut monitor = Monitor::new(config, host);
    for i in 1..=60 {
        monitor.tick_at(i * 1_000);
    }
    let ids: Vec<u64> = monitor.logs().map(|e| e.id).collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn voice_announces_periodically_only_when_enabled() {
    let transcript = Transcript::default();
    let mut monitor =
        Monitor::new(no_cooldowns(), HostSignals::none()).with_speech_sink(Box::new(transcript.clone()));
    monitor.start_at(0);
    for i in 1..=40 {
        monitor.tick_at(i * 1_000);
    }
    assert!(transcript.0.lock().unwrap().is_empty());
    assert!(monitor.last_report().is_none());

    monitor.voice_mut().set_enabled(true);
    for i in 41..=80 {
        monitor.tick_at(i * 1_000);
    }
    let spoken = transcript.0.lock().unwrap().clone();
    // Voice came on at 41s; announcements at 56s and 71s.
    assert_eq!(spoken.len(), 2);
    assert!(spoken.iter().all(|r| r.lang == "ja-JP"));
    assert!(spoken[0].text.contains("パーセント"));
}
