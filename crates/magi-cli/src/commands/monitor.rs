use magi_core::MonitorConfig;

pub fn run(config: MonitorConfig, refresh_ms: Option<u64>, voice: bool) {
    let mut config = super::with_refresh(config, refresh_ms);
    if voice {
        config.voice.enabled = true;
    }
    let mut app = crate::tui::app::App::new(config);
    if let Err(e) = app.run() {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
}
