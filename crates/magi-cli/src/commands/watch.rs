use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use magi_core::MonitorConfig;

pub fn run(config: MonitorConfig, refresh_ms: Option<u64>, json: bool) {
    let config = super::with_refresh(config, refresh_ms);
    let interval = Duration::from_millis(config.refresh_interval_ms);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        eprintln!("Error: failed to set Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let mut monitor = super::build_monitor(config, None);
    monitor.start();
    if !json {
        eprintln!("Watching monitor {} (Ctrl+C to stop)", monitor.id());
    }

    let mut last_id = None;
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        monitor.tick();

        for entry in monitor.logs_since(last_id) {
            if json {
                match serde_json::to_string(&entry) {
                    Ok(line) => println!("{line}"),
                    Err(e) => log::warn!("skipping log entry {}: {e}", entry.id),
                }
            } else {
                println!("{}", super::format_log_line(&entry));
            }
            last_id = Some(entry.id);
        }

        // Sleep in short slices so Ctrl+C is honoured promptly.
        while running.load(Ordering::SeqCst) && started.elapsed() < interval {
            thread::sleep(Duration::from_millis(50).min(interval));
        }
    }

    monitor.stop();
    if !json {
        let snap = monitor.snapshot();
        eprintln!(
            "Stopped after {} ticks, sync rate {:.1}%",
            snap.tick, snap.sync_rate
        );
    }
}
