//! Native host adapter.
//!
//! Implements the [`source`](crate::source) traits from what the operating
//! system exposes to an unprivileged process:
//!
//! - memory from `/proc/meminfo` (`MemTotal - MemAvailable`)
//! - transfers from receive-byte deltas in `/proc/net/dev`
//! - the declared link from `/sys/class/net/<iface>/{speed,operstate}`
//! - battery from `/sys/class/power_supply/*`
//! - idle-callback latency from the oversleep of a 1 ms sleep on a
//!   background thread
//!
//! Paths that do not exist yield `None`, so on non-Linux hosts every signal
//! quietly reports as absent and the pipeline uses its fallbacks.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::network::MAX_RETAINED_TRANSFERS;
use crate::source::{
    BatterySource, BatteryStatus, Callback, ConnectionDescriptor, ConnectionSource, FrameCounter,
    HostSignals, IdleProbe, MemoryProbe, MemoryReading, Notifier, Subscription, TransferEntry,
    TransferFeed, lock,
};

/// How often the link and battery pollers re-read sysfs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Spacing between idle-latency probes.
const IDLE_PROBE_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_REQUEST: Duration = Duration::from_millis(1);

/// Build the full native signal set. Pass a frame counter when something is
/// rendering (the TUI), or `None` for a headless host.
pub fn native_signals(frames: Option<FrameCounter>) -> HostSignals {
    let meminfo = ProcMemory::default();
    let memory: Option<Box<dyn MemoryProbe>> = match meminfo.read() {
        Some(_) => Some(Box::new(meminfo)),
        None => None,
    };
    let transfers: Option<Box<dyn TransferFeed>> = if Path::new(PROC_NET_DEV).exists() {
        Some(Box::new(NetDevFeed::default()))
    } else {
        None
    };
    let connection: Option<Box<dyn ConnectionSource>> = if Path::new(SYS_CLASS_NET).exists() {
        Some(Box::new(SysfsConnection::spawn(
            SYS_CLASS_NET,
            DEFAULT_POLL_INTERVAL,
        )))
    } else {
        None
    };
    let battery: Option<Box<dyn BatterySource>> =
        match read_battery(Path::new(SYS_CLASS_POWER_SUPPLY)) {
            Some(_) => Some(Box::new(SysfsBattery::spawn(
                SYS_CLASS_POWER_SUPPLY,
                DEFAULT_POLL_INTERVAL,
            ))),
            None => None,
        };

    HostSignals {
        frames,
        idle: Some(Box::new(SchedulerProbe::spawn())),
        transfers,
        memory,
        connection,
        battery,
    }
}

// ---------------------------------------------------------------------------
// Background worker
// ---------------------------------------------------------------------------

/// A thread that runs `step` every `interval`. It can be suspended (the
/// thread exits) and resumed (a fresh thread picks up the same step).
/// Dropping the worker suspends it.
struct Worker {
    name: String,
    interval: Duration,
    step: Arc<Mutex<Box<dyn FnMut() + Send>>>,
    run: Mutex<Option<Run>>,
}

struct Run {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(name: &str, interval: Duration, step: impl FnMut() + Send + 'static) -> Self {
        let worker = Self {
            name: name.to_string(),
            interval,
            step: Arc::new(Mutex::new(Box::new(step))),
            run: Mutex::new(None),
        };
        worker.resume();
        worker
    }

    fn resume(&self) {
        let mut run = lock(&self.run);
        if run.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let step = Arc::clone(&self.step);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    {
                        let mut guard = lock(&step);
                        let step = &mut **guard;
                        step();
                    }
                    thread::park_timeout(interval);
                }
            });
        match spawned {
            Ok(handle) => *run = Some(Run { stop, handle }),
            Err(e) => log::warn!("cannot spawn {} thread: {e}", self.name),
        }
    }

    /// Stop the thread and wait for it to exit.
    fn suspend(&self) {
        let Some(run) = lock(&self.run).take() else {
            return;
        };
        run.stop.store(true, Ordering::Relaxed);
        run.handle.thread().unpark();
        let _ = run.handle.join();
    }

    fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.suspend();
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

const PROC_MEMINFO: &str = "/proc/meminfo";

/// `MemTotal - MemAvailable` from a meminfo file.
#[derive(Debug, Clone)]
pub struct ProcMemory {
    path: PathBuf,
}

impl Default for ProcMemory {
    fn default() -> Self {
        Self::new(PROC_MEMINFO)
    }
}

impl ProcMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MemoryProbe for ProcMemory {
    fn read(&self) -> Option<MemoryReading> {
        parse_meminfo(&std::fs::read_to_string(&self.path).ok()?)
    }
}

pub fn parse_meminfo(raw: &str) -> Option<MemoryReading> {
    let mut total = None;
    let mut available = None;
    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        match key {
            "MemTotal" => total = Some(kib * 1024),
            "MemAvailable" => available = Some(kib * 1024),
            _ => {}
        }
    }
    let total = total?;
    if total == 0 {
        return None;
    }
    Some(MemoryReading {
        used_bytes: total.saturating_sub(available.unwrap_or(0)),
        total_bytes: total,
    })
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

const PROC_NET_DEV: &str = "/proc/net/dev";

/// Received bytes summed over every interface except loopback.
pub fn parse_net_dev_rx(raw: &str) -> Option<u64> {
    let mut seen = false;
    let mut rx = 0u64;
    for line in raw.lines().skip(2) {
        let Some((iface, stats)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }
        let Some(bytes) = stats
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        rx = rx.saturating_add(bytes);
        seen = true;
    }
    seen.then_some(rx)
}

struct FeedState {
    last: Option<(f64, u64)>,
    entries: VecDeque<TransferEntry>,
}

/// Turns receive counters into one transfer entry per read.
///
/// Each call to [`TransferFeed::entries`] samples the counters; the bytes
/// received since the previous call become an entry spanning that interval.
pub struct NetDevFeed {
    path: PathBuf,
    epoch: Instant,
    state: Mutex<FeedState>,
}

impl Default for NetDevFeed {
    fn default() -> Self {
        Self::new(PROC_NET_DEV)
    }
}

impl NetDevFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            epoch: Instant::now(),
            state: Mutex::new(FeedState {
                last: None,
                entries: VecDeque::with_capacity(MAX_RETAINED_TRANSFERS),
            }),
        }
    }

    /// Fold a counter reading taken at `now_ms`.
    fn observe(&self, now_ms: f64, rx_bytes: u64) {
        let mut state = lock(&self.state);
        if let Some((prev_ms, prev_rx)) = state.last
            && now_ms > prev_ms
        {
            state.entries.push_back(TransferEntry {
                start_ms: prev_ms,
                response_end_ms: now_ms,
                // Counter resets read as no traffic.
                transfer_size: rx_bytes.saturating_sub(prev_rx),
            });
            while state.entries.len() > MAX_RETAINED_TRANSFERS {
                state.entries.pop_front();
            }
        }
        state.last = Some((now_ms, rx_bytes));
    }
}

impl TransferFeed for NetDevFeed {
    fn entries(&self) -> Vec<TransferEntry> {
        let now_ms = self.epoch.elapsed().as_secs_f64() * 1000.0;
        if let Some(rx) = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| parse_net_dev_rx(&raw))
        {
            self.observe(now_ms, rx);
        }
        lock(&self.state).entries.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

const SYS_CLASS_NET: &str = "/sys/class/net";

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let v = raw.trim();
    if v.is_empty() { None } else { Some(v.to_string()) }
}

fn read_f64(path: &Path) -> Option<f64> {
    read_trimmed(path).and_then(|s| s.parse().ok())
}

/// Descriptor of the fastest interface that is up, loopback excluded.
pub fn read_connection(root: &Path) -> Option<ConnectionDescriptor> {
    let mut best: Option<ConnectionDescriptor> = None;
    for entry in std::fs::read_dir(root).ok()?.flatten() {
        let dir = entry.path();
        let Some(name) = dir.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if name == "lo" || read_trimmed(&dir.join("operstate")).as_deref() != Some("up") {
            continue;
        }
        // Wireless drivers often report -1 or refuse the read.
        let mbps = read_f64(&dir.join("speed")).filter(|s| *s > 0.0).unwrap_or(0.0);
        let kind = if dir.join("wireless").exists() {
            "wifi"
        } else {
            "ethernet"
        };
        let candidate = ConnectionDescriptor {
            downlink_mbps: mbps,
            uplink_mbps: mbps,
            kind: kind.to_string(),
            ..ConnectionDescriptor::default()
        };
        if best.as_ref().is_none_or(|b| candidate.downlink_mbps > b.downlink_mbps) {
            best = Some(candidate);
        }
    }
    best
}

/// Link descriptor polled from sysfs, published only when it changes.
pub struct SysfsConnection {
    notifier: Notifier<ConnectionDescriptor>,
    worker: Worker,
}

impl SysfsConnection {
    pub fn spawn(root: impl Into<PathBuf>, interval: Duration) -> Self {
        let root = root.into();
        let notifier = Notifier::new();
        if let Some(first) = read_connection(&root) {
            notifier.publish(first);
        }
        let publisher = notifier.clone();
        let worker = Worker::spawn("magi-link", interval, move || {
            if let Some(desc) = read_connection(&root)
                && publisher.publish(desc)
            {
                log::info!("network link changed");
            }
        });
        Self {
            notifier,
            worker,
        }
    }
}

impl SysfsConnection {
    pub fn is_polling(&self) -> bool {
        self.worker.is_running()
    }
}

impl ConnectionSource for SysfsConnection {
    fn subscribe(&self, on_change: Callback<ConnectionDescriptor>) -> Subscription {
        self.notifier.subscribe(on_change)
    }

    fn suspend(&self) {
        self.worker.suspend();
    }

    fn resume(&self) {
        self.worker.resume();
    }
}

// ---------------------------------------------------------------------------
// Battery
// ---------------------------------------------------------------------------

const SYS_CLASS_POWER_SUPPLY: &str = "/sys/class/power_supply";

/// First supply of type `Battery` under `root`.
pub fn read_battery(root: &Path) -> Option<BatteryStatus> {
    for entry in std::fs::read_dir(root).ok()?.flatten() {
        let dir = entry.path();
        if read_trimmed(&dir.join("type")).as_deref() != Some("Battery") {
            continue;
        }
        let Some(capacity) = read_f64(&dir.join("capacity")) else {
            continue;
        };
        let status = read_trimmed(&dir.join("status"))
            .unwrap_or_default()
            .to_ascii_lowercase();
        let charging = status == "charging" || status == "full";

        // Energy in µWh and power in µW; some drivers use charge (µAh) and
        // current (µA) instead. Either ratio gives hours.
        let now = read_f64(&dir.join("energy_now")).or_else(|| read_f64(&dir.join("charge_now")));
        let full =
            read_f64(&dir.join("energy_full")).or_else(|| read_f64(&dir.join("charge_full")));
        let rate = read_f64(&dir.join("power_now"))
            .or_else(|| read_f64(&dir.join("current_now")))
            .filter(|r| *r > 0.0);

        let (charging_time_s, discharging_time_s) = match (now, full, rate) {
            (Some(now), Some(full), Some(rate)) if charging => {
                (Some((full - now).max(0.0) / rate * 3600.0), None)
            }
            (Some(now), _, Some(rate)) => (None, Some(now / rate * 3600.0)),
            _ => (None, None),
        };

        return Some(BatteryStatus {
            level: (capacity / 100.0).clamp(0.0, 1.0),
            charging,
            charging_time_s,
            discharging_time_s,
        });
    }
    None
}

/// Battery status polled from sysfs, published only when it changes.
pub struct SysfsBattery {
    notifier: Notifier<BatteryStatus>,
    worker: Worker,
}

impl SysfsBattery {
    pub fn spawn(root: impl Into<PathBuf>, interval: Duration) -> Self {
        let root = root.into();
        let notifier = Notifier::new();
        if let Some(first) = read_battery(&root) {
            notifier.publish(first);
        }
        let publisher = notifier.clone();
        let worker = Worker::spawn("magi-battery", interval, move || {
            if let Some(status) = read_battery(&root) {
                publisher.publish(status);
            }
        });
        Self {
            notifier,
            worker,
        }
    }
}

impl SysfsBattery {
    pub fn is_polling(&self) -> bool {
        self.worker.is_running()
    }
}

impl BatterySource for SysfsBattery {
    fn subscribe(&self, on_change: Callback<BatteryStatus>) -> Subscription {
        self.notifier.subscribe(on_change)
    }

    fn suspend(&self) {
        self.worker.suspend();
    }

    fn resume(&self) {
        self.worker.resume();
    }
}

// ---------------------------------------------------------------------------
// Idle latency
// ---------------------------------------------------------------------------

/// Measures how late a 1 ms sleep wakes up. A loaded scheduler oversleeps.
pub struct SchedulerProbe {
    /// `f64` bits; `u64::MAX` until the first measurement.
    latest: Arc<AtomicU64>,
    worker: Worker,
}

impl SchedulerProbe {
    pub fn spawn() -> Self {
        let latest = Arc::new(AtomicU64::new(u64::MAX));
        let slot = Arc::clone(&latest);
        let worker = Worker::spawn("magi-idle", IDLE_PROBE_INTERVAL, move || {
            let start = Instant::now();
            thread::sleep(IDLE_REQUEST);
            let ms = start.elapsed().as_secs_f64() * 1000.0;
            slot.store(ms.to_bits(), Ordering::Relaxed);
        });
        Self {
            latest,
            worker,
        }
    }
}

impl SchedulerProbe {
    pub fn is_sampling(&self) -> bool {
        self.worker.is_running()
    }
}

impl IdleProbe for SchedulerProbe {
    fn latest_delay_ms(&self) -> Option<f64> {
        let bits = self.latest.load(Ordering::Relaxed);
        (bits != u64::MAX).then(|| f64::from_bits(bits))
    }

    /// Stops the probe thread and forgets the last measurement.
    fn suspend(&self) {
        self.worker.suspend();
        self.latest.store(u64::MAX, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.worker.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MEMINFO: &str = "MemTotal:       16000000 kB\n\
                           MemFree:         2000000 kB\n\
                           MemAvailable:    4000000 kB\n";

    const NET_DEV: &str = "Inter-|   Receive                                                |  Transmit\n \
         face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
         lo: 9999999     100    0    0    0     0          0         0  9999999     100    0    0    0     0       0          0\n  \
         eth0: 1000     10    0    0    0     0          0         0  2000     20    0    0    0     0       0          0\n \
         wlan0: 500      5    0    0    0     0          0         0   100      1    0    0    0     0       0          0\n";

    #[test]
    fn meminfo_used_is_total_minus_available() {
        let m = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(m.total_bytes, 16_000_000 * 1024);
        assert_eq!(m.used_bytes, 12_000_000 * 1024);
        assert!(parse_meminfo("garbage").is_none());
    }

    #[test]
    fn net_dev_skips_loopback() {
        assert_eq!(parse_net_dev_rx(NET_DEV), Some(1_500));
        assert_eq!(parse_net_dev_rx("header\nheader\n"), None);
    }

    #[test]
    fn feed_emits_interval_entries() {
        let feed = NetDevFeed::new("/nonexistent");
        feed.observe(0.0, 1_000);
        feed.observe(1_000.0, 6_000);
        feed.observe(2_000.0, 6_000);
        let entries = lock(&feed.state).entries.iter().copied().collect::<Vec<_>>();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].transfer_size, 5_000);
        assert_eq!(entries[0].duration_ms(), 1_000.0);
        assert_eq!(entries[1].transfer_size, 0);
    }

    #[test]
    fn feed_retains_bounded_history() {
        let feed = NetDevFeed::new("/nonexistent");
        for i in 0..(MAX_RETAINED_TRANSFERS as u64 + 20) {
            feed.observe(i as f64 * 10.0, i * 100);
        }
        assert_eq!(lock(&feed.state).entries.len(), MAX_RETAINED_TRANSFERS);
    }

    #[test]
    fn sysfs_link_and_battery() {
        let dir = tempfile::tempdir().unwrap();
        let net = dir.path().join("net");
        for (iface, state, speed) in [("lo", "up", "0"), ("eth0", "up", "1000"), ("eth1", "down", "10000")] {
            fs::create_dir_all(net.join(iface)).unwrap();
            fs::write(net.join(iface).join("operstate"), state).unwrap();
            fs::write(net.join(iface).join("speed"), speed).unwrap();
        }
        let link = read_connection(&net).unwrap();
        assert_eq!(link.downlink_mbps, 1000.0);
        assert_eq!(link.kind, "ethernet");

        let ps = dir.path().join("power_supply");
        let bat = ps.join("BAT0");
        fs::create_dir_all(&bat).unwrap();
        fs::create_dir_all(ps.join("AC")).unwrap();
        fs::write(ps.join("AC").join("type"), "Mains\n").unwrap();
        fs::write(bat.join("type"), "Battery\n").unwrap();
        fs::write(bat.join("capacity"), "42\n").unwrap();
        fs::write(bat.join("status"), "Discharging\n").unwrap();
        fs::write(bat.join("energy_now"), "20000000\n").unwrap();
        fs::write(bat.join("power_now"), "10000000\n").unwrap();

        let status = read_battery(&ps).unwrap();
        assert!((status.level - 0.42).abs() < 1e-9);
        assert!(!status.charging);
        assert_eq!(status.discharging_time_s, Some(7_200.0));
        assert_eq!(status.charging_time_s, None);
    }

    #[test]
    fn sysfs_battery_source_delivers_current_value() {
        let dir = tempfile::tempdir().unwrap();
        let bat = dir.path().join("BAT1");
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("type"), "Battery").unwrap();
        fs::write(bat.join("capacity"), "80").unwrap();
        fs::write(bat.join("status"), "Charging").unwrap();

        let source = SysfsBattery::spawn(dir.path(), Duration::from_secs(60));
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let _sub = source.subscribe(Box::new(move |s: &BatteryStatus| {
            *slot.lock().unwrap() = Some(s.clone())
        }));
        let got = seen.lock().unwrap().clone().unwrap();
        assert!(got.charging);
        assert!((got.level - 0.8).abs() < 1e-9);
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn suspended_worker_stops_stepping_until_resumed() {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let worker = Worker::spawn("magi-test", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        assert!(wait_for(|| count.load(Ordering::Relaxed) > 0));

        worker.suspend();
        assert!(!worker.is_running());
        let frozen = count.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::Relaxed), frozen);

        worker.resume();
        assert!(worker.is_running());
        assert!(wait_for(|| count.load(Ordering::Relaxed) > frozen));
    }

    #[test]
    fn scheduler_probe_thread_exits_on_suspend() {
        let probe = SchedulerProbe::spawn();
        assert!(probe.is_sampling());
        assert!(wait_for(|| probe.latest_delay_ms().is_some()));

        probe.suspend();
        assert!(!probe.is_sampling());
        assert_eq!(probe.latest_delay_ms(), None);
        thread::sleep(IDLE_PROBE_INTERVAL * 2);
        assert_eq!(probe.latest_delay_ms(), None);

        probe.resume();
        assert!(probe.is_sampling());
        assert!(wait_for(|| probe.latest_delay_ms().is_some()));
    }

    #[test]
    fn sysfs_pollers_suspend_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let battery = SysfsBattery::spawn(dir.path(), Duration::from_secs(60));
        let link = SysfsConnection::spawn(dir.path(), Duration::from_secs(60));
        assert!(battery.is_polling() && link.is_polling());

        battery.suspend();
        link.suspend();
        assert!(!battery.is_polling() && !link.is_polling());

        battery.resume();
        link.resume();
        assert!(battery.is_polling() && link.is_polling());
    }
}
