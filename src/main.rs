// src/main.rs
//
// Process entry point: parse CLI, service the print-and-exit flags, load
// and validate configuration, set up logging, then hand off to `Bridge`.
// Mirrors `original_source/lesyd.py`'s `main()` (~lines 1066-1140): the
// print-and-exit flags run before any configuration file is required.

use clap::Parser;

use lesyd_lib::bridge::{Bridge, ShutdownReason};
use lesyd_lib::cli::Cli;
use lesyd_lib::config;
use lesyd_lib::logging::{self, LogLevel};
use lesyd_lib::tlog;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.print_sample_config {
        println!("{}", config::SAMPLE_CONFIG);
        return;
    }
    if cli.list_presets {
        print!("{}", config::list_presets_text());
        return;
    }
    if cli.print_default_logconfig {
        println!("{}", config::default_logconfig_text());
        return;
    }

    let Some(config_path) = cli.config.as_ref() else {
        eprintln!("lesyd: --config is required (see --print-sample-config)");
        std::process::exit(1);
    };

    let bridge_config = match config::load_from_path(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("lesyd: {e}");
            std::process::exit(1);
        }
    };

    let level_name = cli.loglevel.as_deref().unwrap_or(&bridge_config.loglevel);
    let level = LogLevel::parse(level_name).unwrap_or(LogLevel::Warning);
    logging::set_level(level);

    let logfile = cli.logfile.as_deref().or(bridge_config.logfile.as_deref());
    if let Some(path) = logfile {
        if let Err(e) = logging::init_file_logging(std::path::Path::new(path)) {
            eprintln!("lesyd: failed to start file logging: {e}");
        }
    }

    tlog!(
        "[main] starting bridge '{}' with {} device(s)",
        bridge_config.name,
        bridge_config.devices.len()
    );

    let bridge = Bridge::new(bridge_config);
    match bridge.run().await {
        Ok(ShutdownReason::Signal) => {
            tlog!("[main] stopped by SIGINT");
            std::process::exit(1);
        }
        Ok(ShutdownReason::QueueClosed) => {}
        Err(e) => {
            tlog!(critical, "[main] bridge exited with error: {e}");
            std::process::exit(1);
        }
    }
}
