//! The monitor context: owns every estimator, the event watcher, the log and
//! the report/voice/audio controls, and advances them one tick at a time.
//!
//! A monitor is single-writer. Callers drive it with [`Monitor::tick`] on a
//! fixed interval (the CLI from its own loop, the server from a tokio task).
//! Asynchronous host signals (connection, battery) land in latest-value slots
//! through their subscriptions and are folded in on the next tick.

use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use uuid::Uuid;

use crate::audio::{AudioControl, AudioSink};
use crate::config::MonitorConfig;
use crate::cpu::{CpuEstimator, CpuSample};
use crate::events::{ChannelEvent, ThresholdWatcher};
use crate::log_store::{LogEntry, LogStore, Severity};
use crate::network::NetworkReconciler;
use crate::report::{Announcer, ReportSynthesizer, SpeechSink, StatusReport};
use crate::smoothing::percent;
use crate::snapshot::{MetricSnapshot, unix_ms_now, wall_clock};
use crate::source::{
    BatteryStatus, Callback, Capability, ConnectionDescriptor, HostSignals, Latest, Notifier,
    Subscription,
};
use crate::sync_rate::sync_rate;

/// Core count reported when the host cannot tell.
const FALLBACK_CORES: usize = 4;

pub struct Monitor {
    id: Uuid,
    config: MonitorConfig,
    host: HostSignals,
    epoch: Instant,
    cpu_cores: usize,

    cpu: CpuEstimator,
    network: NetworkReconciler,
    watcher: ThresholdWatcher,
    logs: LogStore,
    reports: ReportSynthesizer,
    voice: Announcer,
    audio: AudioControl,
    rng: StdRng,

    connection: Latest<ConnectionDescriptor>,
    applied_connection: Option<ConnectionDescriptor>,
    battery: Latest<BatteryStatus>,
    subscriptions: Vec<Subscription>,

    snapshot: MetricSnapshot,
    snapshots: Notifier<MetricSnapshot>,
    last_report: Option<StatusReport>,
    started_at_ms: Option<u64>,
    announcing: bool,
    last_announce_ms: u64,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .field("tick", &self.snapshot.tick)
            .field("capabilities", &self.host.capabilities())
            .finish()
    }
}

impl Monitor {
    pub fn new(config: MonitorConfig, host: HostSignals) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_CORES);

        Self {
            id: Uuid::new_v4(),
            cpu: CpuEstimator::new(config.cpu_alpha),
            network: NetworkReconciler::new(config.network_alpha),
            watcher: ThresholdWatcher::new(config.watcher.clone(), 0),
            logs: LogStore::new(config.log_capacity),
            reports: ReportSynthesizer::new(config.report_cooldown_ms),
            voice: Announcer::new(config.voice.clone(), None),
            audio: AudioControl::new(config.bgm.clone(), None),
            rng,
            connection: Latest::default(),
            applied_connection: None,
            battery: Latest::default(),
            subscriptions: Vec::new(),
            snapshot: empty_snapshot(cpu_cores),
            snapshots: Notifier::new(),
            last_report: None,
            started_at_ms: None,
            announcing: false,
            last_announce_ms: 0,
            epoch: Instant::now(),
            cpu_cores,
            config,
            host,
        }
    }

    /// Override the detected core count.
    pub fn with_cpu_cores(mut self, cores: usize) -> Self {
        self.cpu_cores = cores.max(1);
        self.snapshot.cpu_cores = self.cpu_cores;
        self
    }

    pub fn with_speech_sink(mut self, sink: Box<dyn SpeechSink>) -> Self {
        self.voice.set_sink(sink);
        self
    }

    pub fn with_audio_sink(mut self, sink: Box<dyn AudioSink>) -> Self {
        self.audio.set_sink(sink);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.host.capabilities()
    }

    /// Milliseconds since this monitor was constructed.
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn is_running(&self) -> bool {
        self.started_at_ms.is_some()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn start(&mut self) {
        let now = self.now_ms();
        self.start_at(now);
    }

    /// Subscribe to event-driven sources and write the boot lines.
    /// Starting an already running monitor does nothing.
    pub fn start_at(&mut self, now_ms: u64) {
        if self.is_running() {
            return;
        }
        self.started_at_ms = Some(now_ms);
        self.watcher = ThresholdWatcher::new(self.config.watcher.clone(), now_ms);
        self.last_announce_ms = now_ms;
        self.host.resume();

        if let Some(source) = &self.host.connection {
            self.subscriptions.push(source.subscribe(self.connection.writer()));
        }
        if let Some(source) = &self.host.battery {
            self.subscriptions.push(source.subscribe(self.battery.writer()));
        }

        for cap in Capability::ALL {
            if !self.host.has(cap) {
                log::warn!("monitor {}: {cap} unavailable, using fallback", self.id);
            }
        }

        self.log(Severity::System, "MAGI system monitor initialized", "MAGIシステムモニタ初期化");
        self.log(Severity::Success, "System monitoring active", "システム監視有効");
        let cores = self.cpu_cores;
        self.log(Severity::Info, &format!("Detected {cores} CPU cores"), "CPUコア検出");
        if let Some(status) = self.battery.get() {
            let level = percent(status.level * 100.0);
            self.log(Severity::Info, &format!("Battery level: {level}%"), "バッテリーレベル");
        }
        log::info!("monitor {} started", self.id);
    }

    /// Drop every subscription, stop the host's background probes and cancel
    /// speech. Idempotent; a later start or tick resumes the probes.
    pub fn stop(&mut self) {
        if self.started_at_ms.take().is_some() {
            self.subscriptions.clear();
            self.host.suspend();
            self.voice.stop();
            log::info!("monitor {} stopped after {} ticks", self.id, self.snapshot.tick);
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    pub fn tick(&mut self) -> &MetricSnapshot {
        let now = self.now_ms();
        self.tick_at(now)
    }

    /// Advance one tick at monotonic time `now_ms`.
    ///
    /// Order: CPU, memory, network, sync rate, then the event watcher, then
    /// the heartbeat and periodic voice timers.
    pub fn tick_at(&mut self, now_ms: u64) -> &MetricSnapshot {
        if !self.is_running() {
            self.start_at(now_ms);
        }
        let started = self.started_at_ms.unwrap_or(now_ms);

        let cpu_usage = f64::from(self.cpu.sample(CpuSample {
            now_ms: now_ms as f64,
            frames: self.host.frames.as_ref().map(|f| f.take()),
            idle_delay_ms: self.host.idle.as_ref().and_then(|p| p.latest_delay_ms()),
        }));

        let memory = self.host.memory.as_ref().and_then(|p| p.read());
        let (memory_usage, used, total) = match memory {
            Some(m) if m.total_bytes > 0 => (
                percent(m.used_bytes as f64 / m.total_bytes as f64 * 100.0),
                m.used_bytes,
                m.total_bytes,
            ),
            _ => (0.0, 0, 0),
        };

        if let Some(descriptor) = self.connection.get()
            && self.applied_connection.as_ref() != Some(&descriptor)
        {
            self.network.observe_declared(&descriptor);
            self.applied_connection = Some(descriptor);
        }
        if let Some(feed) = &self.host.transfers {
            self.network.observe_transfers(&feed.entries());
        }
        let net = self.network.reading();

        let battery = self.battery.get();
        let sync = sync_rate(cpu_usage, memory_usage);

        self.snapshot = MetricSnapshot {
            tick: self.snapshot.tick + 1,
            collected_unix_ms: unix_ms_now(),
            cpu_usage,
            cpu_cores: self.cpu_cores,
            memory_usage,
            memory_used_bytes: used,
            memory_total_bytes: total,
            network_down_bps: net.down_bps,
            network_up_bps: net.up_bps,
            network_type: net.kind,
            network_effective_type: net.effective_type,
            network_rtt_ms: net.rtt_ms,
            uptime_seconds: now_ms.saturating_sub(started) / 1000,
            battery_level: battery.as_ref().map(|b| percent(b.level * 100.0)),
            is_charging: battery.as_ref().map(|b| b.charging),
            battery_time_remaining_s: battery.as_ref().and_then(time_remaining),
            sync_rate: sync,
        };

        let events = self.watcher.observe(&self.snapshot, now_ms);
        for event in events {
            self.record(event);
        }
        if let Some(beat) = self.watcher.heartbeat(now_ms, &mut self.rng) {
            self.record(beat);
        }

        // The announcement period restarts whenever voice output is switched on.
        let active = self.voice.active();
        if active && !self.announcing {
            self.last_announce_ms = now_ms;
        }
        self.announcing = active;
        if active && now_ms.saturating_sub(self.last_announce_ms) >= self.voice.config().interval_ms
        {
            self.last_announce_ms = now_ms;
            self.report_at(now_ms, false);
        }

        log::debug!(
            "tick {}: cpu={} mem={} down={} sync={:.1}",
            self.snapshot.tick,
            self.snapshot.cpu_usage,
            self.snapshot.memory_usage,
            self.snapshot.network_down_bps,
            self.snapshot.sync_rate
        );
        self.snapshots.publish(self.snapshot.clone());
        &self.snapshot
    }

    fn record(&mut self, event: ChannelEvent) {
        log::debug!("{} event: {}", event.channel, event.message);
        self.log(event.severity, &event.message, &event.localized_message);
    }

    fn log(&mut self, severity: Severity, message: &str, localized: &str) {
        self.logs
            .append(wall_clock(unix_ms_now()), severity, message, localized);
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    pub fn report(&mut self, force: bool) -> Option<StatusReport> {
        let now = self.now_ms();
        self.report_at(now, force)
    }

    /// Synthesize a status report from the latest snapshot.
    ///
    /// With voice enabled the report is rate limited (`None` while cooling
    /// down, unless `force`) and spoken. With voice disabled the report is
    /// only composed: it is never rate limited and leaves the clock alone,
    /// so switching voice on later is not delayed by silent reads.
    pub fn report_at(&mut self, now_ms: u64, force: bool) -> Option<StatusReport> {
        let report = if self.voice.config().enabled {
            let report = self
                .reports
                .synthesize(&self.snapshot, now_ms, force, &mut self.rng)?;
            self.voice.speak(&report);
            report
        } else {
            ReportSynthesizer::compose(&self.snapshot, &mut self.rng)
        };
        self.last_report = Some(report.clone());
        Some(report)
    }

    pub fn last_report(&self) -> Option<&StatusReport> {
        self.last_report.as_ref()
    }

    // -----------------------------------------------------------------------
    // Readers and controls
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> &MetricSnapshot {
        &self.snapshot
    }

    pub fn logs(&self) -> impl ExactSizeIterator<Item = &LogEntry> {
        self.logs.entries()
    }

    pub fn logs_since(&self, id: Option<u64>) -> Vec<LogEntry> {
        self.logs.since(id)
    }

    /// Receive every new snapshot. The current one is delivered immediately
    /// once the first tick has run.
    pub fn subscribe_snapshots(&self, on_change: Callback<MetricSnapshot>) -> Subscription {
        self.snapshots.subscribe(on_change)
    }

    pub fn voice(&self) -> &Announcer {
        &self.voice
    }

    pub fn voice_mut(&mut self) -> &mut Announcer {
        &mut self.voice
    }

    pub fn audio(&self) -> &AudioControl {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioControl {
        &mut self.audio
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn time_remaining(status: &BatteryStatus) -> Option<f64> {
    let secs = if status.charging {
        status.charging_time_s
    } else {
        status.discharging_time_s
    }?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

fn empty_snapshot(cpu_cores: usize) -> MetricSnapshot {
    MetricSnapshot {
        tick: 0,
        collected_unix_ms: 0,
        cpu_usage: 0.0,
        cpu_cores,
        memory_usage: 0.0,
        memory_used_bytes: 0,
        memory_total_bytes: 0,
        network_down_bps: 0.0,
        network_up_bps: 0.0,
        network_type: "unknown".to_string(),
        network_effective_type: "4g".to_string(),
        network_rtt_ms: 0.0,
        uptime_seconds: 0,
        battery_level: None,
        is_charging: None,
        battery_time_remaining_s: None,
        sync_rate: 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{BatterySource, MemoryProbe, MemoryReading};

    struct FixedMemory(u64, u64);

    impl MemoryProbe for FixedMemory {
        fn read(&self) -> Option<MemoryReading> {
            Some(MemoryReading {
                used_bytes: self.0,
                total_bytes: self.1,
            })
        }
    }

    struct Battery(Notifier<BatteryStatus>);

    impl BatterySource for Battery {
        fn subscribe(&self, on_change: Callback<BatteryStatus>) -> Subscription {
            self.0.subscribe(on_change)
        }
    }

    /// Idle probe that records suspend/resume calls.
    #[derive(Clone, Default)]
    struct TrackedProbe(std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl crate::source::IdleProbe for TrackedProbe {
        fn latest_delay_ms(&self) -> Option<f64> {
            None
        }
        fn suspend(&self) {
            self.0.lock().unwrap().push("suspend");
        }
        fn resume(&self) {
            self.0.lock().unwrap().push("resume");
        }
    }

    fn seeded() -> MonitorConfig {
        MonitorConfig {
            seed: Some(42),
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn boot_sequence() {
        let notifier = Notifier::new();
        notifier.publish(BatteryStatus {
            level: 0.76,
            charging: true,
            charging_time_s: Some(1200.0),
            discharging_time_s: None,
        });
        let host = HostSignals {
            battery: Some(Box::new(Battery(notifier.clone()))),
            ..HostSignals::none()
        };
        let mut m = Monitor::new(seeded(), host).with_cpu_cores(8);
        m.start_at(0);

        let msgs: Vec<_> = m.logs().map(|e| (e.severity, e.message.clone())).collect();
        assert_eq!(msgs[0], (Severity::System, "MAGI system monitor initialized".into()));
        assert_eq!(msgs[1].0, Severity::Success);
        assert_eq!(msgs[2].1, "Detected 8 CPU cores");
        assert_eq!(msgs[3].1, "Battery level: 76%");
        assert_eq!(notifier.subscriber_count(), 1);

        let snap = m.tick_at(1_000).clone();
        assert_eq!(snap.battery_level, Some(76.0));
        assert_eq!(snap.is_charging, Some(true));
        assert_eq!(snap.battery_time_remaining_s, Some(1200.0));

        m.stop();
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn memory_percent_and_sync() {
        let host = HostSignals {
            memory: Some(Box::new(FixedMemory(500, 1_000))),
            ..HostSignals::none()
        };
        let mut m = Monitor::new(seeded(), host);
        let snap = m.tick_at(1_000).clone();
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.memory_usage, 50.0);
        assert_eq!(snap.cpu_usage, 0.0);
        assert!((snap.sync_rate - 85.0).abs() < 1e-9);
    }

    #[test]
    fn headless_host_is_idle() {
        let mut m = Monitor::new(seeded(), HostSignals::none());
        m.start_at(0);
        for i in 1..=5 {
            m.tick_at(i * 1_000);
        }
        assert_eq!(m.snapshot().cpu_usage, 0.0);
        assert_eq!(m.snapshot().tick, 5);
        assert_eq!(m.snapshot().uptime_seconds, 5);
    }

    #[test]
    fn report_rate_limit_and_last_report() {
        let mut m = Monitor::new(seeded(), HostSignals::none());
        m.voice_mut().set_enabled(true);
        m.tick_at(1_000);
        assert!(m.report_at(1_000, false).is_some());
        assert!(m.report_at(2_000, false).is_none());
        let forced = m.report_at(2_000, true).unwrap();
        assert_eq!(m.last_report(), Some(&forced));
    }

    #[test]
    fn silent_reports_leave_the_rate_limit_clock_alone() {
        let mut m = Monitor::new(seeded(), HostSignals::none());
        m.tick_at(1_000);
        assert!(m.report_at(1_000, false).is_some());
        assert!(m.report_at(2_000, false).is_some());
        assert!(m.last_report().is_some());
        assert_eq!(m.reports.last_emitted_ms(), None);

        // Voice on: the first spoken report is not held back by the silent ones.
        m.voice_mut().set_enabled(true);
        assert!(m.report_at(3_000, false).is_some());
        assert_eq!(m.reports.last_emitted_ms(), Some(3_000));
        assert!(m.report_at(4_000, false).is_none());
    }

    #[test]
    fn snapshot_subscribers_see_every_tick() {
        use std::sync::{Arc, Mutex};
        let mut m = Monitor::new(seeded(), HostSignals::none());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = m.subscribe_snapshots(Box::new(move |s: &MetricSnapshot| {
            sink.lock().unwrap().push(s.tick)
        }));
        m.tick_at(1_000);
        m.tick_at(2_000);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn logs_since_is_incremental() {
        let mut m = Monitor::new(seeded(), HostSignals::none());
        m.start_at(0);
        let last = m.logs().last().map(|e| e.id);
        assert!(m.logs_since(last).is_empty());
        // 20s of quiet produces a heartbeat at the 16s check.
        for i in 1..=20 {
            m.tick_at(i * 1_000);
        }
        let newer = m.logs_since(last);
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].severity, Severity::Info);
    }

    #[test]
    fn stop_suspends_host_probes_and_start_resumes_them() {
        let probe = TrackedProbe::default();
        let host = HostSignals {
            idle: Some(Box::new(probe.clone())),
            ..HostSignals::none()
        };
        let mut m = Monitor::new(seeded(), host);
        m.start_at(0);
        m.tick_at(1_000);
        m.stop();
        m.stop();
        assert_eq!(*probe.0.lock().unwrap(), vec!["resume", "suspend"]);

        // Ticking a stopped monitor restarts it.
        m.tick_at(2_000);
        assert_eq!(*probe.0.lock().unwrap(), vec!["resume", "suspend", "resume"]);
        drop(m);
        assert_eq!(probe.0.lock().unwrap().last(), Some(&"suspend"));
    }
}
