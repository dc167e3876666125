use std::thread;
use std::time::Duration;

use magi_core::MonitorConfig;

pub fn run(config: MonitorConfig, warmup: u64, json: bool) {
    let interval = Duration::from_millis(config.refresh_interval_ms);
    let mut monitor = super::build_monitor(config, None);
    monitor.start();

    for i in 0..warmup.max(1) {
        if i > 0 {
            thread::sleep(interval);
        }
        monitor.tick();
    }

    // A fresh monitor has never reported, so the cooldown cannot block this.
    let Some(report) = monitor.report(true) else {
        eprintln!("Error: no report available");
        std::process::exit(1);
    };
    let request = monitor.voice().request_for(&report);
    let snap = monitor.snapshot().clone();
    monitor.stop();

    if json {
        let out = serde_json::json!({
            "monitor_id": monitor.id().to_string(),
            "tick": snap.tick,
            "sync_rate": snap.sync_rate,
            "report": report,
            "speech": request,
        });
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("{}", report.text);
    println!("{}", report.localized);
    println!();
    println!(
        "voice: {} rate {} pitch {} volume {} ({})",
        request.lang, request.rate, request.pitch, request.volume, request.voice_hint
    );
}
