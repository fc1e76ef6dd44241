use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fleetadm - prepare storage hosts and register volumes
#[derive(Parser)]
#[command(name = "fleetadm")]
#[command(about = "Format chunkfile pools and register iSCSI targets on storage hosts")]
#[command(version)]
pub struct Cli {
    /// Host inventory (JSON).
    #[arg(long, global = true, default_value = "inventory.json")]
    pub inventory: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the steps each task would run without touching any host.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Format devices into chunkfile pools
    Format {
        /// Format plan (JSON with `host`, `disk` and optional `container_image`)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// iSCSI target management
    Target {
        #[command(subcommand)]
        target: TargetCommands,
    },
    /// Print the error catalog
    Errors,
}

#[derive(Subcommand)]
pub enum TargetCommands {
    /// Expose a volume as an iSCSI target
    Add {
        /// Inventory host id
        #[arg(long)]
        host: String,
        /// Volume owner
        #[arg(short, long)]
        user: String,
        /// Volume path (e.g., /test)
        #[arg(long)]
        volume: String,
        /// Volume size in GiB
        #[arg(short, long, default_value_t = 10)]
        size: u64,
        /// Create the volume first
        #[arg(long)]
        create: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
