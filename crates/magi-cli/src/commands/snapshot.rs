use std::thread;
use std::time::Duration;

use magi_core::{MetricSnapshot, MonitorConfig, format_bytes, format_speed, format_uptime};

pub fn run(config: MonitorConfig, ticks: u64, interval_ms: Option<u64>, json: bool) {
    let config = super::with_refresh(config, interval_ms);
    let interval = Duration::from_millis(config.refresh_interval_ms);
    let mut monitor = super::build_monitor(config, None);
    monitor.start();

    let ticks = ticks.max(1);
    for i in 0..ticks {
        if i > 0 {
            thread::sleep(interval);
        }
        monitor.tick();
    }
    let snap = monitor.snapshot().clone();
    monitor.stop();

    if json {
        match serde_json::to_string_pretty(&snap) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    print_table(&snap);
    println!();
    for entry in monitor.logs() {
        println!("{}", super::format_log_line(entry));
    }
}

fn print_table(snap: &MetricSnapshot) {
    println!("MAGI snapshot  tick {}", snap.tick);
    println!("{}", "─".repeat(44));
    println!("  {:<16} {:>6.1}%", "CPU", snap.cpu_usage);
    println!("  {:<16} {:>6}", "Cores", snap.cpu_cores);
    println!(
        "  {:<16} {:>6.1}%  ({} / {})",
        "Memory",
        snap.memory_usage,
        format_bytes(snap.memory_used_bytes as f64),
        format_bytes(snap.memory_total_bytes as f64)
    );
    println!(
        "  {:<16} {} down, {} up",
        "Network",
        format_speed(snap.network_down_bps),
        format_speed(snap.network_up_bps)
    );
    println!(
        "  {:<16} {} / {}  rtt {:.0} ms",
        "Link", snap.network_type, snap.network_effective_type, snap.network_rtt_ms
    );
    match snap.battery_level {
        Some(level) => {
            let state = match snap.is_charging {
                Some(true) => "charging",
                Some(false) => "discharging",
                None => "unknown",
            };
            println!("  {:<16} {:>6.0}%  {state}", "Battery", level);
        }
        None => println!("  {:<16} {:>6}", "Battery", "n/a"),
    }
    println!("  {:<16} {}", "Uptime", format_uptime(snap.uptime_seconds));
    let flag = if snap.is_emergency() { "  EMERGENCY" } else { "" };
    println!("  {:<16} {:>6.1}%{flag}", "Sync rate", snap.sync_rate);
}
