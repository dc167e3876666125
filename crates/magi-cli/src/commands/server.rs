use magi_core::MonitorConfig;

pub fn run(config: MonitorConfig, host: &str, port: u16) {
    let interval = config.refresh_interval_ms;
    let monitor = super::build_monitor(config, None);

    let base = format!("http://{host}:{port}");
    let capabilities: Vec<String> = monitor
        .capabilities()
        .iter()
        .map(ToString::to_string)
        .collect();

    println!("MAGI Monitor Server v{}", magi_core::VERSION);
    println!("   {base}");
    println!("   monitor {}", monitor.id());
    println!("   ticking every {interval} ms");
    if capabilities.is_empty() {
        println!("   no host signals available (headless fallbacks)");
    } else {
        println!("   host signals: {}", capabilities.join(", "));
    }
    println!();
    println!("   Endpoints:");
    println!("     GET  /                 API index (try: curl {base})");
    println!("     GET  /snapshot         Latest metric snapshot");
    println!("     GET  /logs             Log feed, oldest first");
    println!("     GET  /report           Status report (rate limited while voice is on)");
    println!("     GET  /controls         Voice and BGM settings");
    println!("     POST /controls/voice   enabled=true|false, volume=0..1");
    println!("     POST /controls/bgm     enabled=true|false, volume=0..1");
    println!("     GET  /health           Health check");
    println!();
    println!("   Query params:");
    println!("     /logs?since=<id>&limit=N");
    println!("     /report?force=true    Bypass the report cooldown");
    println!();
    println!("   Examples:");
    println!("     curl {base}/snapshot");
    println!("     curl {base}/logs?since=10");
    println!("     curl -X POST '{base}/controls/voice?enabled=true'");
    println!();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(magi_server::run_server(monitor, host, port)) {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}
