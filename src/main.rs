//! fleetadm - main entry point

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use fleetadm::cli::{Cli, Commands, TargetCommands};
use fleetadm::config::{FormatConfig, Inventory, Layout};
use fleetadm::error::ErrorKind;
use fleetadm::executor::SshExecutor;
use fleetadm::process_guard;
use fleetadm::storage::MemStorage;
use fleetadm::task::{Task, TaskOutcome};
use fleetadm::workflow::{new_add_target_task, new_format_chunkfile_pool_task, TargetRequest};

/// Initialize tracing; RUST_LOG overrides the default level.
fn init_logger(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);

    // Remote commands run in their own process groups; make sure they die with us.
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every task succeeded or skipped.
fn run(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Commands::Errors => {
            for kind in ErrorKind::iter() {
                println!("{:06}  {:<28} {}", kind.code(), kind.name(), kind.template());
            }
            Ok(true)
        }
        Commands::Format { config } => {
            let inventory = Inventory::load_from_file(&cli.inventory)?;
            let plan = FormatConfig::load_from_file(config)?;
            let layout = Layout::default();
            let store = Arc::new(MemStorage::new());
            let tasks = plan
                .entries
                .iter()
                .map(|entry| new_format_chunkfile_pool_task(&inventory, &store, entry, &layout))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to build format tasks")?;
            Ok(run_tasks(&tasks, cli.dry_run))
        }
        Commands::Target {
            target:
                TargetCommands::Add {
                    host,
                    user,
                    volume,
                    size,
                    create,
                },
        } => {
            let inventory = Inventory::load_from_file(&cli.inventory)?;
            let request = TargetRequest::new(host, user, volume, *create, *size);
            let store = Arc::new(MemStorage::new());
            let task = new_add_target_task(&inventory, &store, &request, &Layout::default())
                .context("Failed to build target task")?;
            info!(target_name = %request.target_name(), "registering target");
            Ok(run_tasks(std::slice::from_ref(&task), cli.dry_run))
        }
    }
}

/// Run tasks concurrently, one thread each, and print one line per outcome.
fn run_tasks(tasks: &[Task], dry_run: bool) -> bool {
    if dry_run {
        for task in tasks {
            println!("{}", task.summary());
        }
        return true;
    }

    let executor = &SshExecutor::new();
    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = tasks
            .iter()
            .map(|task| scope.spawn(move || task.execute(executor)))
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut all_ok = true;
    for (task, outcome) in tasks.iter().zip(outcomes) {
        match outcome {
            Ok(Ok(TaskOutcome::Succeeded)) => println!("✓ {}: {}", task.name(), task.subtitle()),
            Ok(Ok(TaskOutcome::Skipped)) => {
                println!("- {}: {} (skipped)", task.name(), task.subtitle())
            }
            Ok(Err(e)) => {
                all_ok = false;
                eprintln!("✗ {}: {}\n  {}", task.name(), task.subtitle(), e);
            }
            Err(_) => {
                all_ok = false;
                eprintln!("✗ {}: {} (panicked)", task.name(), task.subtitle());
            }
        }
    }
    all_ok
}
