//! Spoken status reports.
//!
//! A report is one sentence chosen at random from the candidates that apply to
//! the current snapshot. Each sentence comes in an English form and a Japanese
//! form whose numbers are spelled in katakana for the speech engine.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::smoothing::clamp;
use crate::snapshot::MetricSnapshot;

/// Minimum spacing between non-forced reports.
pub const DEFAULT_COOLDOWN_MS: u64 = 8_000;

/// One status sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub text: String,
    pub localized: String,
}

impl StatusReport {
    fn new(text: String, localized: String) -> Self {
        Self { text, localized }
    }

    /// Sentence used when nothing else applies.
    pub fn nominal() -> Self {
        Self::new(
            "System operating normally, all parameters within acceptable range".to_string(),
            "システム正常稼働中、全パラメータ正常範囲内".to_string(),
        )
    }
}

const DIGITS: [&str; 10] = [
    "ゼロ", "イチ", "ニ", "サン", "ヨン", "ゴ", "ロク", "ナナ", "ハチ", "キュウ",
];
const TENS: [&str; 10] = [
    "",
    "ジュウ",
    "ニジュウ",
    "サンジュウ",
    "ヨンジュウ",
    "ゴジュウ",
    "ロクジュウ",
    "ナナジュウ",
    "ハチジュウ",
    "キュウジュウ",
];

/// Katakana reading of `n` for 0..=99; larger values are left as digits.
pub fn number_to_japanese(n: u64) -> String {
    match n {
        0..=9 => DIGITS[n as usize].to_string(),
        10..=99 => {
            let ones = (n % 10) as usize;
            let mut out = TENS[(n / 10) as usize].to_string();
            if ones > 0 {
                out.push_str(DIGITS[ones]);
            }
            out
        }
        _ => n.to_string(),
    }
}

fn spoken(value: f64) -> String {
    number_to_japanese(value.max(0.0).floor() as u64)
}

/// Every sentence that applies to `snapshot`, in fixed order.
pub fn candidates(snapshot: &MetricSnapshot) -> Vec<StatusReport> {
    let cpu = snapshot.cpu_usage;
    let mem = snapshot.memory_usage;
    let mut out = Vec::with_capacity(4);

    out.push(if cpu > 80.0 {
        StatusReport::new(
            format!("Warning, CPU usage critical at {cpu:.0} percent"),
            format!("警告、CPU使用率{}パーセント、危険値です", spoken(cpu)),
        )
    } else if cpu > 50.0 {
        StatusReport::new(
            format!("CPU usage at {cpu:.0} percent"),
            format!("CPU使用率{}パーセント", spoken(cpu)),
        )
    } else {
        StatusReport::new(
            format!("All systems nominal, CPU at {cpu:.0} percent"),
            format!("全システム正常、CPU使用率{}パーセント", spoken(cpu)),
        )
    });

    if mem > 80.0 {
        out.push(StatusReport::new(
            format!("Memory pressure high, {mem:.0} percent"),
            format!("メモリ圧迫、{}パーセント", spoken(mem)),
        ));
    }

    if snapshot.sync_rate < 50.0 {
        out.push(StatusReport::new(
            "Synchronization rate critical".to_string(),
            "同期率危険値、注意してください".to_string(),
        ));
    }

    if let Some(level) = snapshot.battery_level
        && level < 30.0
    {
        out.push(StatusReport::new(
            format!("Battery level low, {level:.0} percent remaining"),
            format!("バッテリー残量{}パーセント、充電してください", spoken(level)),
        ));
    }

    out
}

/// Rate-limited report generator.
#[derive(Debug, Clone)]
pub struct ReportSynthesizer {
    cooldown_ms: u64,
    last_emitted_ms: Option<u64>,
}

impl Default for ReportSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MS)
    }
}

impl ReportSynthesizer {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last_emitted_ms: None,
        }
    }

    pub fn last_emitted_ms(&self) -> Option<u64> {
        self.last_emitted_ms
    }

    /// Whether a non-forced report would be allowed at `now_ms`.
    pub fn ready(&self, now_ms: u64) -> bool {
        self.last_emitted_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= self.cooldown_ms)
    }

    /// Pick a report for `snapshot`, or `None` while rate limited.
    /// `force` bypasses the rate limit.
    pub fn synthesize<R: Rng + ?Sized>(
        &mut self,
        snapshot: &MetricSnapshot,
        now_ms: u64,
        force: bool,
        rng: &mut R,
    ) -> Option<StatusReport> {
        if !force && !self.ready(now_ms) {
            return None;
        }
        let report = Self::compose(snapshot, rng);
        self.last_emitted_ms = Some(now_ms);
        Some(report)
    }

    /// Pick a report without consulting or advancing the rate-limit clock.
    pub fn compose<R: Rng + ?Sized>(snapshot: &MetricSnapshot, rng: &mut R) -> StatusReport {
        let mut pool = candidates(snapshot);
        if pool.is_empty() {
            StatusReport::nominal()
        } else {
            pool.swap_remove(rng.random_range(0..pool.len()))
        }
    }
}

// ---------------------------------------------------------------------------
// Voice output
// ---------------------------------------------------------------------------

/// Utterance handed to a speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub lang: String,
    pub rate: f64,
    pub pitch: f64,
    pub volume: f64,
    /// Preferred voice name fragment, matched by the engine if it can.
    pub voice_hint: String,
}

/// Speech engine.
pub trait SpeechSink: Send {
    fn speak(&mut self, request: &SpeechRequest);
    /// Stop whatever is currently being spoken.
    fn cancel(&mut self);
}

/// Voice announcement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub volume: f64,
    pub lang: String,
    pub rate: f64,
    pub pitch: f64,
    pub voice_hint: String,
    /// Spacing of periodic announcements while enabled.
    pub interval_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            volume: 1.0,
            lang: "ja-JP".to_string(),
            rate: 1.1,
            pitch: 1.2,
            voice_hint: "Female".to_string(),
            interval_ms: 15_000,
        }
    }
}

/// Gate between reports and the speech sink.
pub struct Announcer {
    config: VoiceConfig,
    sink: Option<Box<dyn SpeechSink>>,
    spoken: u64,
}

impl std::fmt::Debug for Announcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcer")
            .field("config", &self.config)
            .field("has_sink", &self.sink.is_some())
            .field("spoken", &self.spoken)
            .finish()
    }
}

impl Announcer {
    pub fn new(config: VoiceConfig, sink: Option<Box<dyn SpeechSink>>) -> Self {
        let mut config = config;
        config.volume = clamp(config.volume, 0.0, 1.0);
        Self {
            config,
            sink,
            spoken: 0,
        }
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn set_sink(&mut self, sink: Box<dyn SpeechSink>) {
        self.sink = Some(sink);
    }

    /// Voice output is possible: enabled and a sink is attached.
    pub fn active(&self) -> bool {
        self.config.enabled && self.sink.is_some()
    }

    pub fn toggle(&mut self) -> bool {
        self.config.enabled = !self.config.enabled;
        if !self.config.enabled {
            self.stop();
        }
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled != enabled {
            self.toggle();
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.config.volume = clamp(volume, 0.0, 1.0);
    }

    pub fn request_for(&self, report: &StatusReport) -> SpeechRequest {
        SpeechRequest {
            text: report.localized.clone(),
            lang: self.config.lang.clone(),
            rate: self.config.rate,
            pitch: self.config.pitch,
            volume: self.config.volume,
            voice_hint: self.config.voice_hint.clone(),
        }
    }

    /// Speak `report`, cancelling any utterance in progress. Returns whether
    /// anything was sent to the sink.
    pub fn speak(&mut self, report: &StatusReport) -> bool {
        if !self.config.enabled {
            return false;
        }
        let request = self.request_for(report);
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        sink.cancel();
        sink.speak(&request);
        self.spoken += 1;
        true
    }

    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.cancel();
        }
    }

    pub fn spoken(&self) -> u64 {
        self.spoken
    }
}
