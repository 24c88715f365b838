//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Beacon: a scripted realtime session over the loopback transport.
#[derive(Parser, Debug)]
#[command(name = "beacon-demo", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Organization whose task channel is followed.
    #[arg(long, default_value = "42")]
    pub org: String,

    /// Route owners through the ref-counted subscription registry.
    #[arg(long)]
    pub shared: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
