//! fleetadm library
//!
//! Host-bound task pipelines for preparing storage hosts: formatting devices
//! into chunkfile pools and registering volumes as iSCSI targets.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod naming;
pub mod process_guard;
pub mod script_traits;
pub mod scripts;
pub mod shell;
pub mod steps;
pub mod storage;
pub mod task;
pub mod workflow;

// Re-export main types for convenience
pub use config::{FormatConfig, FormatEntry, Inventory, Layout};
pub use error::{Error, ErrorKind};
pub use executor::{CommandOutput, LocalExecutor, RemoteExecutor, SshExecutor, TransportError};
pub use host::{Engine, HostBinding};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use script_traits::ScriptArgs;
pub use storage::{LockScope, MemStorage};
pub use task::{Arg, Composite, Context, Flow, Lambda, Step, StepResult, Task, TaskOutcome, Var, Vars};
pub use workflow::{new_add_target_task, new_format_chunkfile_pool_task, TargetRequest};
