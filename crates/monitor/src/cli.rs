use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Single-camera home security monitor.
///
/// Watches a raw grayscale frame stream, recognizes enrolled faces and
/// drives an alarm board over a line-oriented serial link.
#[derive(Parser, Debug)]
#[command(name = "smartcam", version, about = "Single-camera home security monitor")]
pub struct CliArgs {
    /// Path to the TOML config file. Defaults apply when it does not exist.
    #[arg(long, short, global = true, env = "SMARTCAM_CONFIG", default_value = "smartcam.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the detection loop until the stream ends or a signal arrives.
    Run {
        /// Simulate the actuator board instead of opening the port.
        #[arg(long)]
        dry_run: bool,
    },

    /// Walk the actuator through status, arm, alarm and disarm.
    Probe {
        /// Seconds to hold the alarm on before clearing it.
        #[arg(long, default_value = "2")]
        hold_secs: u64,

        /// Simulate the actuator board instead of opening the port.
        #[arg(long)]
        dry_run: bool,
    },

    /// Send a test event to every enabled notification channel.
    TestNotify,

    /// Summarize the CSV event logs in a directory.
    Report {
        /// Logs directory (default: `logging.dir` from the config).
        dir: Option<PathBuf>,

        /// Also write the report to this file.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Write a default config file.
    InitConfig {
        /// Destination path.
        #[arg(default_value = "smartcam.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}
