//! Background music control.

use serde::{Deserialize, Serialize};

use crate::smoothing::clamp;

/// Desired playback state, forwarded to the audio sink on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioCommand {
    pub enabled: bool,
    /// Linear gain in `[0, 1]`.
    pub volume: f64,
    /// Track reference (path or URL). Empty means nothing to play.
    pub source: String,
}

impl Default for AudioCommand {
    fn default() -> Self {
        Self {
            enabled: false,
            volume: 0.3,
            source: "bgm.mp3".to_string(),
        }
    }
}

/// Audio playback backend.
pub trait AudioSink: Send {
    fn apply(&mut self, command: &AudioCommand);
}

/// Owns the BGM state and pushes it to the sink.
pub struct AudioControl {
    state: AudioCommand,
    sink: Option<Box<dyn AudioSink>>,
}

impl std::fmt::Debug for AudioControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioControl")
            .field("state", &self.state)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl AudioControl {
    pub fn new(initial: AudioCommand, sink: Option<Box<dyn AudioSink>>) -> Self {
        let mut state = initial;
        state.volume = clamp(state.volume, 0.0, 1.0);
        Self { state, sink }
    }

    pub fn state(&self) -> &AudioCommand {
        &self.state
    }

    pub fn set_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.sink = Some(sink);
        self.push();
    }

    /// Flip playback on or off. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.state.enabled = !self.state.enabled;
        self.push();
        self.state.enabled
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = clamp(volume, 0.0, 1.0);
        if volume != self.state.volume {
            self.state.volume = volume;
            self.push();
        }
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.state.source = source.into();
        self.push();
    }

    /// Whether the sink should actually be producing sound.
    pub fn audible(&self) -> bool {
        self.state.enabled && !self.state.source.is_empty() && self.state.volume > 0.0
    }

    fn push(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            log::debug!(
                "bgm: enabled={} volume={:.2} source={}",
                self.state.enabled,
                self.state.volume,
                self.state.source
            );
            sink.apply(&self.state);
        }
    }
}
