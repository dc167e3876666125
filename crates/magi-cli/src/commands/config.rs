use std::path::Path;

use magi_core::MonitorConfig;

pub fn run(config: &MonitorConfig, output: Option<&Path>) {
    match output {
        Some(path) => {
            if let Err(e) = config.save(path) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
            println!("Config written to {}", path.display());
        }
        None => match serde_json::to_string_pretty(config) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
    }
}
