//! TUI application state and event loop.
//!
//! The dashboard owns the monitor and ticks it from the draw loop, so every
//! frame renders one consistent snapshot. Each draw also counts as a rendered
//! frame for the CPU estimator: when the host is busy the loop falls behind
//! and the frame rate drops.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;

use magi_core::{FrameCounter, LogEntry, MetricSnapshot, Monitor, MonitorConfig, SpeechRequest};

use crate::commands::CaptionSink;

/// Event poll timeout. Close to one frame at 60 fps so an idle host renders
/// at roughly the estimator's target rate.
const FRAME_BUDGET: Duration = Duration::from_millis(16);

/// Sync-rate samples kept for the history sparkline.
const HISTORY_LEN: usize = 120;

const MIN_REFRESH: Duration = Duration::from_millis(250);
const MAX_REFRESH: Duration = Duration::from_secs(10);

pub struct App {
    monitor: Monitor,
    frames: FrameCounter,
    captions: CaptionSink,
    refresh_rate: Duration,
    running: bool,
    paused: bool,
    /// Show the Japanese log text instead of English.
    localized: bool,
    sync_history: VecDeque<u64>,
    status: Option<String>,
}

impl App {
    pub fn new(config: MonitorConfig) -> Self {
        let refresh_rate = Duration::from_millis(config.refresh_interval_ms);
        let frames = FrameCounter::new();
        let captions = CaptionSink::default();
        let monitor = crate::commands::build_monitor(config, Some(frames.clone()))
            .with_speech_sink(Box::new(captions.clone()));

        Self {
            monitor,
            frames,
            captions,
            refresh_rate,
            running: true,
            paused: false,
            localized: false,
            sync_history: VecDeque::with_capacity(HISTORY_LEN),
            status: None,
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Install panic hook that restores terminal before printing the panic.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        // Always restore terminal, even if the loop returned an error.
        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        self.monitor.stop();
        let snap = self.monitor.snapshot();
        println!(
            "MAGI monitor {} stopped after {} ticks (sync rate {:.1}%)",
            self.monitor.id(),
            snap.tick,
            snap.sync_rate
        );

        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        self.monitor.start();
        self.tick();
        let mut last_tick = Instant::now();

        while self.running {
            terminal.draw(|f| super::ui::draw(f, self))?;
            self.frames.frame();

            if event::poll(FRAME_BUDGET)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code);
            }

            if last_tick.elapsed() >= self.refresh_rate {
                if !self.paused {
                    self.tick();
                }
                last_tick = Instant::now();
            }
        }

        Ok(())
    }

    fn tick(&mut self) {
        let sync = self.monitor.tick().sync_rate;
        if self.sync_history.len() == HISTORY_LEN {
            self.sync_history.pop_front();
        }
        self.sync_history.push_back(sync.round() as u64);
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('p') => self.paused = !self.paused,
            KeyCode::Char('v') => {
                let on = self.monitor.voice_mut().toggle();
                self.status = Some(format!("voice {}", if on { "on" } else { "off" }));
            }
            KeyCode::Char('b') => {
                let on = self.monitor.audio_mut().toggle();
                self.status = Some(format!("bgm {}", if on { "on" } else { "off" }));
            }
            KeyCode::Char('r') => {
                if self.monitor.report(true).is_some() && !self.monitor.voice().active() {
                    self.status = Some("report ready (voice off)".to_string());
                }
            }
            KeyCode::Char('l') => self.localized = !self.localized,
            KeyCode::Char('s') => self.export_snapshot(),
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Char(']') => {
                self.refresh_rate = (self.refresh_rate / 2).max(MIN_REFRESH);
            }
            KeyCode::Char('-') | KeyCode::Char('[') => {
                self.refresh_rate = (self.refresh_rate * 2).min(MAX_REFRESH);
            }
            _ => {}
        }
    }

    fn export_snapshot(&mut self) {
        let json = serde_json::json!({
            "monitor_id": self.monitor.id().to_string(),
            "snapshot": self.monitor.snapshot(),
            "logs": self.monitor.logs_since(None),
            "last_report": self.monitor.last_report(),
        });

        let epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = PathBuf::from(format!("magi-snapshot-{epoch}.json"));
        let result = serde_json::to_string_pretty(&json)
            .map_err(io::Error::other)
            .and_then(|s| std::fs::write(&path, s));
        self.status = Some(match result {
            Ok(()) => format!("saved {}", path.display()),
            Err(e) => format!("export failed: {e}"),
        });
    }

    // -----------------------------------------------------------------------
    // Accessors for the renderer
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> &MetricSnapshot {
        self.monitor.snapshot()
    }

    pub fn logs(&self) -> impl ExactSizeIterator<Item = &LogEntry> {
        self.monitor.logs()
    }

    pub fn monitor_id(&self) -> String {
        self.monitor.id().to_string()
    }

    pub fn sync_history(&self) -> Vec<u64> {
        self.sync_history.iter().copied().collect()
    }

    pub fn caption(&self) -> Option<SpeechRequest> {
        self.captions.last()
    }

    pub fn last_report_text(&self) -> Option<String> {
        let report = self.monitor.last_report()?;
        Some(if self.localized {
            report.localized.clone()
        } else {
            report.text.clone()
        })
    }

    pub fn voice_on(&self) -> bool {
        self.monitor.voice().active()
    }

    pub fn bgm_on(&self) -> bool {
        self.monitor.audio().audible()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_localized(&self) -> bool {
        self.localized
    }

    pub fn refresh_rate(&self) -> Duration {
        self.refresh_rate
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
