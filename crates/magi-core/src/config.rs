//! Monitor configuration.
//!
//! Every field has a default, so a config file only needs the keys it wants to
//! change:
//!
//! ```json
//! { "refresh_interval_ms": 500, "voice": { "enabled": true } }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::AudioCommand;
use crate::error::ConfigError;
use crate::events::WatcherConfig;
use crate::report::VoiceConfig;
use crate::{cpu, log_store, network, report};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Tick period.
    pub refresh_interval_ms: u64,
    /// Retained log entries.
    pub log_capacity: usize,
    pub cpu_alpha: f64,
    pub network_alpha: f64,
    /// Minimum spacing between non-forced status reports.
    pub report_cooldown_ms: u64,
    pub watcher: WatcherConfig,
    pub voice: VoiceConfig,
    pub bgm: AudioCommand,
    /// Fixed RNG seed for reproducible report and heartbeat choices.
    pub seed: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1_000,
            log_capacity: log_store::DEFAULT_CAPACITY,
            cpu_alpha: cpu::DEFAULT_ALPHA,
            network_alpha: network::DEFAULT_ALPHA,
            report_cooldown_ms: report::DEFAULT_COOLDOWN_MS,
            watcher: WatcherConfig::default(),
            voice: VoiceConfig::default(),
            bgm: AudioCommand::default(),
            seed: None,
        }
    }
}

impl MonitorConfig {
    /// Read a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_ms must be positive".into(),
            ));
        }
        for (name, alpha) in [("cpu_alpha", self.cpu_alpha), ("network_alpha", self.network_alpha)] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::Invalid(format!("{name} must be in (0, 1], got {alpha}")));
            }
        }
        if !(0.0..=1.0).contains(&self.voice.volume) || !(0.0..=1.0).contains(&self.bgm.volume) {
            return Err(ConfigError::Invalid("volumes must be in [0, 1]".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let c = MonitorConfig::default();
        assert_eq!(c.refresh_interval_ms, 1_000);
        assert_eq!(c.log_capacity, 60);
        assert_eq!(c.cpu_alpha, 0.3);
        assert_eq!(c.network_alpha, 0.2);
        assert_eq!(c.report_cooldown_ms, 8_000);
        assert_eq!(c.watcher.heartbeat_quiet_ms, 15_000);
        assert_eq!(c.voice.interval_ms, 15_000);
        assert!(!c.voice.enabled);
        assert!(!c.bgm.enabled);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("magi.json");
        fs::write(
            &path,
            r#"{ "refresh_interval_ms": 250, "voice": { "enabled": true }, "seed": 7 }"#,
        )
        .unwrap();

        let c = MonitorConfig::load(&path).unwrap();
        assert_eq!(c.refresh_interval_ms, 250);
        assert!(c.voice.enabled);
        assert_eq!(c.voice.lang, "ja-JP");
        assert_eq!(c.seed, Some(7));
        assert_eq!(c.log_capacity, 60);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("magi.json");
        let mut c = MonitorConfig::default();
        c.watcher.cpu_cooldown_ms = 1_234;
        c.save(&path).unwrap();
        assert_eq!(MonitorConfig::load(&path).unwrap(), c);
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = MonitorConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        let err = MonitorConfig::load(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));

        let zero = dir.path().join("zero.json");
        fs::write(&zero, r#"{ "cpu_alpha": 0.0 }"#).unwrap();
        assert!(matches!(MonitorConfig::load(&zero), Err(ConfigError::Invalid(_))));
    }
}
