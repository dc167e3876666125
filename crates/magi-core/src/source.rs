//! Host signal interfaces.
//!
//! The pipeline never reads the machine directly. Every raw signal arrives
//! through one of the traits below, bundled into a [`HostSignals`] value that
//! the [`Monitor`](crate::monitor::Monitor) owns for its lifetime. A missing
//! signal is simply `None`: estimators degrade to their fallback path instead
//! of failing.
//!
//! Event-driven sources (connection descriptor, battery) use an explicit
//! subscription model: `subscribe(on_change)` returns a [`Subscription`]
//! handle, and dropping the handle unsubscribes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

/// Host facilities the pipeline can draw on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Rendered-frame counter.
    FrameClock,
    /// Low-priority callback latency (scheduler yield delay).
    IdleCallback,
    /// Completed resource-transfer timing entries.
    TransferTiming,
    /// Used/total memory counters.
    Memory,
    /// Declared connection descriptor.
    Connection,
    /// Battery level and charging state.
    Battery,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Self::FrameClock,
        Self::IdleCallback,
        Self::TransferTiming,
        Self::Memory,
        Self::Connection,
        Self::Battery,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrameClock => write!(f, "frame_clock"),
            Self::IdleCallback => write!(f, "idle_callback"),
            Self::TransferTiming => write!(f, "transfer_timing"),
            Self::Memory => write!(f, "memory"),
            Self::Connection => write!(f, "connection"),
            Self::Battery => write!(f, "battery"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal payloads
// ---------------------------------------------------------------------------

/// Declared network capability, as advertised by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Advertised downlink in Mbit/s.
    pub downlink_mbps: f64,
    /// Advertised uplink in Mbit/s (0 when unknown).
    pub uplink_mbps: f64,
    /// Round-trip time estimate in milliseconds.
    pub rtt_ms: f64,
    /// Connection type (`wifi`, `ethernet`, ...).
    pub kind: String,
    /// Effective connection class (`4g`, `3g`, ...).
    pub effective_type: String,
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            downlink_mbps: 0.0,
            uplink_mbps: 0.0,
            rtt_ms: 0.0,
            kind: "unknown".to_string(),
            effective_type: "4g".to_string(),
        }
    }
}

/// Battery status as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge level in `[0, 1]`.
    pub level: f64,
    pub charging: bool,
    /// Seconds until full, when charging and known.
    pub charging_time_s: Option<f64>,
    /// Seconds until empty, when discharging and known.
    pub discharging_time_s: Option<f64>,
}

/// One completed resource transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    /// Start time on the host's monotonic clock, in milliseconds.
    pub start_ms: f64,
    /// Time the response finished, same clock.
    pub response_end_ms: f64,
    /// Bytes moved over the wire.
    pub transfer_size: u64,
}

impl TransferEntry {
    pub fn duration_ms(&self) -> f64 {
        self.response_end_ms - self.start_ms
    }
}

/// Used/total memory counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryReading {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

// ---------------------------------------------------------------------------
// Signal traits
// ---------------------------------------------------------------------------

/// Latency of the most recently completed low-priority callback.
pub trait IdleProbe: Send {
    /// Elapsed milliseconds between requesting an idle callback and it
    /// running. `None` until the first measurement lands.
    fn latest_delay_ms(&self) -> Option<f64>;

    /// Stop measuring. Called when the monitor stops.
    fn suspend(&self) {}

    /// Start measuring again after [`suspend`](Self::suspend).
    fn resume(&self) {}
}

/// Feed of completed transfers. Returns the retained entries, oldest first.
pub trait TransferFeed: Send {
    fn entries(&self) -> Vec<TransferEntry>;
}

/// Current memory counters, or `None` when unreadable.
pub trait MemoryProbe: Send {
    fn read(&self) -> Option<MemoryReading>;
}

/// Change-notifying connection descriptor.
pub trait ConnectionSource: Send {
    fn subscribe(&self, on_change: Callback<ConnectionDescriptor>) -> Subscription;

    /// Pause background polling, if the source does any.
    fn suspend(&self) {}

    fn resume(&self) {}
}

/// Change-notifying battery status.
pub trait BatterySource: Send {
    fn subscribe(&self, on_change: Callback<BatteryStatus>) -> Subscription;

    /// Pause background polling, if the source does any.
    fn suspend(&self) {}

    fn resume(&self) {}
}

/// Boxed change callback.
pub type Callback<T> = Box<dyn FnMut(&T) + Send>;

// ---------------------------------------------------------------------------
// Frame counter
// ---------------------------------------------------------------------------

/// Shared rendered-frame counter. The renderer calls [`FrameCounter::frame`]
/// once per drawn frame; the CPU estimator drains it once per tick.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    frames: Arc<AtomicU64>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one rendered frame.
    pub fn frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Return frames recorded since the last call and reset to zero.
    pub fn take(&self) -> u64 {
        self.frames.swap(0, Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// A handle that does nothing on drop.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
    latest: Option<T>,
    /// Entries currently lent out to a running `publish`.
    in_flight: usize,
    /// Ids cancelled while their callback was lent out.
    cancelled: Vec<u64>,
}

/// Publish/subscribe cell that only notifies when the value changes.
///
/// New subscribers immediately receive the current value, if any. Callbacks
/// run without the subscriber list locked, so a callback may drop any
/// `Subscription` of the same notifier, including its own. A callback must
/// not publish or subscribe to the notifier that is calling it.
pub struct Notifier<T> {
    inner: Arc<Mutex<Subscribers<T>>>,
    /// Serializes `publish` and `subscribe` so notifications keep their order.
    serial: Arc<Mutex<()>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            serial: Arc::clone(&self.serial),
        }
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
                latest: None,
                in_flight: 0,
                cancelled: Vec::new(),
            })),
            serial: Arc::new(Mutex::new(())),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Notifier<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, mut on_change: Callback<T>) -> Subscription {
        let _serial = lock(&self.serial);
        let current = lock(&self.inner).latest.clone();
        if let Some(current) = &current {
            on_change(current);
        }
        let id = {
            let mut subs = lock(&self.inner);
            let id = subs.next_id;
            subs.next_id += 1;
            subs.entries.push((id, on_change));
            id
        };

        let weak: Weak<Mutex<Subscribers<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let removed = {
                    let mut subs = lock(&inner);
                    match subs.entries.iter().position(|(sid, _)| *sid == id) {
                        Some(pos) => Some(subs.entries.remove(pos)),
                        None => {
                            if subs.in_flight > 0 && !subs.cancelled.contains(&id) {
                                subs.cancelled.push(id);
                                subs.in_flight -= 1;
                            }
                            None
                        }
                    }
                };
                // The callback may own other subscriptions; drop it unlocked.
                drop(removed);
            })),
        }
    }

    /// Store `value` and notify subscribers if it differs from the previous
    /// value. Returns whether a notification went out.
    pub fn publish(&self, value: T) -> bool {
        let _serial = lock(&self.serial);
        let mut lent = {
            let mut subs = lock(&self.inner);
            if subs.latest.as_ref() == Some(&value) {
                return false;
            }
            subs.latest = Some(value.clone());
            let lent = std::mem::take(&mut subs.entries);
            subs.in_flight = lent.len();
            lent
        };

        let mut index = 0;
        while index < lent.len() {
            let skip = lock(&self.inner).cancelled.contains(&lent[index].0);
            if !skip {
                (lent[index].1)(&value);
            }
            index += 1;
        }

        let dropped = {
            let mut subs = lock(&self.inner);
            let cancelled = std::mem::take(&mut subs.cancelled);
            let (kept, dropped): (Vec<_>, Vec<_>) = lent
                .into_iter()
                .partition(|(id, _)| !cancelled.contains(id));
            let mut entries = kept;
            entries.append(&mut subs.entries);
            subs.entries = entries;
            subs.in_flight = 0;
            dropped
        };
        drop(dropped);
        true
    }

    pub fn latest(&self) -> Option<T> {
        lock(&self.inner).latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let subs = lock(&self.inner);
        subs.entries.len() + subs.in_flight
    }
}

/// Latest-value slot written by a subscription callback and read on tick.
#[derive(Debug)]
pub struct Latest<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Clone + Send + 'static> Latest<T> {
    pub fn set(&self, value: T) {
        *lock(&self.slot) = Some(value);
    }

    pub fn get(&self) -> Option<T> {
        lock(&self.slot).clone()
    }

    /// Callback that writes every delivered value into this slot.
    pub fn writer(&self) -> Callback<T> {
        let slot = self.clone();
        Box::new(move |value: &T| slot.set(value.clone()))
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// HostSignals
// ---------------------------------------------------------------------------

/// Every host signal the monitor may consume. Absent entries are capabilities
/// the host does not have.
#[derive(Default)]
pub struct HostSignals {
    pub frames: Option<FrameCounter>,
    pub idle: Option<Box<dyn IdleProbe>>,
    pub transfers: Option<Box<dyn TransferFeed>>,
    pub memory: Option<Box<dyn MemoryProbe>>,
    pub connection: Option<Box<dyn ConnectionSource>>,
    pub battery: Option<Box<dyn BatterySource>>,
}

impl HostSignals {
    /// A host with no capabilities at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::FrameClock => self.frames.is_some(),
            Capability::IdleCallback => self.idle.is_some(),
            Capability::TransferTiming => self.transfers.is_some(),
            Capability::Memory => self.memory.is_some(),
            Capability::Connection => self.connection.is_some(),
            Capability::Battery => self.battery.is_some(),
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.has(*c))
            .collect()
    }

    /// Stop every background probe and poller.
    pub fn suspend(&self) {
        if let Some(idle) = &self.idle {
            idle.suspend();
        }
        if let Some(connection) = &self.connection {
            connection.suspend();
        }
        if let Some(battery) = &self.battery {
            battery.suspend();
        }
    }

    /// Restart what [`suspend`](Self::suspend) stopped.
    pub fn resume(&self) {
        if let Some(idle) = &self.idle {
            idle.resume();
        }
        if let Some(connection) = &self.connection {
            connection.resume();
        }
        if let Some(battery) = &self.battery {
            battery.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_counter_drains() {
        let fc = FrameCounter::new();
        let handle = fc.clone();
        for _ in 0..5 {
            handle.frame();
        }
        assert_eq!(fc.take(), 5);
        assert_eq!(fc.take(), 0);
    }

    #[test]
    fn notifier_only_fires_on_change() {
        let notifier: Notifier<u32> = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = notifier.subscribe(Box::new(move |v: &u32| sink.lock().unwrap().push(*v)));

        assert!(notifier.publish(1));
        assert!(!notifier.publish(1));
        assert!(notifier.publish(2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn late_subscriber_gets_current_value() {
        let notifier: Notifier<&'static str> = Notifier::new();
        notifier.publish("4g");
        let latest = Latest::default();
        let _sub = notifier.subscribe(latest.writer());
        assert_eq!(latest.get(), Some("4g"));
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let notifier: Notifier<u8> = Notifier::new();
        let latest = Latest::default();
        let sub = notifier.subscribe(latest.writer());
        assert_eq!(notifier.subscriber_count(), 1);
        drop(sub);
        assert_eq!(notifier.subscriber_count(), 0);
        notifier.publish(9);
        assert_eq!(latest.get(), None);
    }

    #[test]
    fn callback_may_drop_subscriptions_of_its_own_notifier() {
        let notifier: Notifier<u32> = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let first = notifier.subscribe(Box::new(move |v: &u32| sink.lock().unwrap().push(*v)));
        let held = Arc::new(Mutex::new(Some(first)));

        let own: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (h, o) = (Arc::clone(&held), Arc::clone(&own));
        let second = notifier.subscribe(Box::new(move |_: &u32| {
            let other = h.lock().unwrap().take();
            drop(other);
            let mine = o.lock().unwrap().take();
            drop(mine);
        }));
        *own.lock().unwrap() = Some(second);
        assert_eq!(notifier.subscriber_count(), 2);

        let (tx, rx) = std::sync::mpsc::channel();
        let publisher = notifier.clone();
        std::thread::spawn(move || {
            let _ = tx.send(publisher.publish(1));
        });
        let published = rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .expect("publish did not return");
        assert!(published);

        assert_eq!(notifier.subscriber_count(), 0);
        assert!(notifier.publish(2));
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(notifier.latest(), Some(2));
    }

    #[test]
    fn callback_cancelled_mid_publish_is_skipped() {
        let notifier: Notifier<u32> = Notifier::new();
        let later = Latest::default();
        let held = Arc::new(Mutex::new(None));

        let h = Arc::clone(&held);
        let _first = notifier.subscribe(Box::new(move |_: &u32| {
            let sub: Option<Subscription> = h.lock().unwrap().take();
            drop(sub);
        }));
        *held.lock().unwrap() = Some(notifier.subscribe(later.writer()));

        assert!(notifier.publish(5));
        assert_eq!(later.get(), None);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn capabilities_reflect_present_signals() {
        let mut host = HostSignals::none();
        assert!(host.capabilities().is_empty());
        host.frames = Some(FrameCounter::new());
        assert_eq!(host.capabilities(), vec![Capability::FrameClock]);
        assert_eq!(Capability::IdleCallback.to_string(), "idle_callback");
    }
}
