// src/cli.rs
//
// Command-line surface, mirroring `original_source/lesyd.py`'s `argparse`
// setup (~lines 1090-1113) via `clap`'s derive API, as the teacher's own
// binaries do.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "lesyd", about = "Bidirectional MQTT bridge for Fossibot-family power stations")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<std::path::PathBuf>,

    /// Logging configuration file (unused placeholder — see `--print-default-logconfig`).
    #[arg(long)]
    pub logconfig: Option<String>,

    /// Enable logging to the specified file in addition to stderr.
    #[arg(long)]
    pub logfile: Option<String>,

    /// Override the configured log level.
    #[arg(long, value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub loglevel: Option<String>,

    /// Print a sample configuration file and exit.
    #[arg(long = "print-sample-config")]
    pub print_sample_config: bool,

    /// Print all device presets and exit.
    #[arg(long = "list-presets")]
    pub list_presets: bool,

    /// Print the default logging configuration and exit.
    #[arg(long = "print-default-logconfig")]
    pub print_default_logconfig: bool,
}
