// CLI definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use att_filter::FlagOverrides;

#[derive(Parser)]
#[command(name = "att_filter")]
#[command(author, version, about = "BLE attribute rewriting filter for USB Bluetooth controllers")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug logging for the filter and the pipeline
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a USBPcap capture through the filter and show what it rewrites
    Replay {
        /// Capture file (.pcap or .pcapng, USBPcap link type)
        file: PathBuf,

        #[command(flatten)]
        flags: FlagArgs,

        /// Settings file (defaults to ./att_filter.toml if present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = ReplayFormat::Text)]
        format: ReplayFormat,
    },

    /// Show the effective filter settings as TOML
    Settings {
        #[command(flatten)]
        flags: FlagArgs,

        /// Settings file (defaults to ./att_filter.toml if present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List the rewrite templates
    #[command(visible_alias = "tpl")]
    Templates,

    /// List the control codes
    Codes,
}

/// Flag switches; each one turns its flag on
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct FlagArgs {
    /// Fix ACL/L2CAP headers and clamp oversized notifications
    #[arg(short = 'f', long)]
    pub fix_headers: bool,

    /// Dump inbound transfers
    #[arg(short = 'i', long)]
    pub trace_inbound: bool,

    /// Dump outbound transfers
    #[arg(short = 'o', long)]
    pub trace_outbound: bool,
}

impl From<FlagArgs> for FlagOverrides {
    fn from(args: FlagArgs) -> Self {
        Self {
            fix_headers: args.fix_headers,
            trace_inbound: args.trace_inbound,
            trace_outbound: args.trace_outbound,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
pub enum ReplayFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output (one object per line)
    Json,
}
