//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the device store
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to known devices and print forwarded notifications until Ctrl-C
    Run {
        /// Additional device names to connect this run
        #[arg(short = 'n', long = "name")]
        names: Vec<String>,
    },
    /// Remember a device so later runs connect to it
    Pair {
        /// Advertised device name
        name: String,
    },
    /// Forget a device
    Forget {
        /// Advertised device name
        name: String,
    },
    /// List remembered devices
    Devices,
    /// Print an example configuration file
    ExampleConfig,
}
