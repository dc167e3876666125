//! CLI for magi — a command-console dashboard for your machine.

mod commands;
mod tui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "magi")]
#[command(about = "magi — command-console system monitor with sync rate and spoken status reports")]
#[command(version = magi_core::VERSION)]
struct Cli {
    /// Load settings from a JSON config file (see `magi config`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed the report picker and heartbeat phrases for reproducible output.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard: gauges, sync rate, live log feed
    Monitor {
        /// Refresh interval in milliseconds (overrides config)
        #[arg(long)]
        refresh: Option<u64>,

        /// Start with voice announcements enabled
        #[arg(long)]
        voice: bool,
    },

    /// Collect a few ticks and print the resulting metric snapshot
    Snapshot {
        /// Ticks to run before printing (the first tick only primes the estimators)
        #[arg(long, default_value = "3")]
        ticks: u64,

        /// Milliseconds between ticks (overrides config)
        #[arg(long)]
        interval: Option<u64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Stream log lines to stdout until Ctrl+C
    Watch {
        /// Refresh interval in milliseconds (overrides config)
        #[arg(long)]
        refresh: Option<u64>,

        /// Emit one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Synthesize one spoken status report from live metrics
    Report {
        /// Ticks to run before reporting
        #[arg(long, default_value = "3")]
        warmup: u64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run an HTTP server exposing snapshots, the log feed and reports
    Server {
        /// Port to listen on
        #[arg(long, default_value = "8043")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print the effective configuration, or write it to a file
    Config {
        /// Write the configuration to this path instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), cli.seed);

    match cli.command {
        Commands::Monitor { refresh, voice } => commands::monitor::run(config, refresh, voice),
        Commands::Snapshot {
            ticks,
            interval,
            json,
        } => commands::snapshot::run(config, ticks, interval, json),
        Commands::Watch { refresh, json } => commands::watch::run(config, refresh, json),
        Commands::Report { warmup, json } => commands::report::run(config, warmup, json),
        Commands::Server { port, host } => commands::server::run(config, &host, port),
        Commands::Config { output } => commands::config::run(&config, output.as_deref()),
    }
}
