//! Register a volume as an iSCSI target on a host's target daemon.

use std::sync::Arc;

use chrono::Local;

use crate::config::{Inventory, Layout};
use crate::error::{ErrorKind, Result};
use crate::naming::target_name;
use crate::script_traits::ScriptArgs;
use crate::scripts::{TargetArgs, TARGET};
use crate::steps::{ContainerExec, CreateVolume, InstallFile, ListContainers};
use crate::storage::{LockScope, MemStorage};
use crate::task::{Composite, Flow, Lambda, Task, Var};

/// Name of the long-running target daemon container.
pub const DEFAULT_DAEMON_CONTAINER: &str = "curvebs-target-daemon";

pub const TASK_NAME: &str = "Add Target";

const DAEMON_LIST: Var<String> = Var::new("target.daemon_list");
pub const DAEMON_ID: Var<String> = Var::new("target.daemon_id");

/// One volume to expose as a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequest {
    pub host: String,
    pub user: String,
    pub volume: String,
    pub create: bool,
    /// GiB.
    pub size: u64,
    pub daemon_container: String,
}

impl TargetRequest {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        volume: impl Into<String>,
        create: bool,
        size: u64,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            volume: volume.into(),
            create,
            size,
            daemon_container: DEFAULT_DAEMON_CONTAINER.to_string(),
        }
    }

    /// Target name the registration will use this month.
    pub fn target_name(&self) -> String {
        target_name(&self.user, &self.volume, Local::now().date_naive())
    }
}

pub fn new_add_target_task(
    inventory: &Inventory,
    store: &Arc<MemStorage>,
    request: &TargetRequest,
    layout: &Layout,
) -> Result<Task> {
    let host = inventory.host(&request.host)?;
    let subtitle = format!(
        "host={} volume={} user={} create={}",
        request.host, request.volume, request.user, request.create
    );
    let script_path = layout.target_script_path();
    // Volume creation happens in its own step; the script only registers.
    let args = TargetArgs {
        user: request.user.clone(),
        volume: request.volume.clone(),
        create: false,
        size: request.size,
    };

    let mut task = Task::new(TASK_NAME, subtitle, host.clone());
    task.add_step(ListContainers {
        show_all: false,
        quiet: true,
        format: None,
        filter: Some(format!("name={}", request.daemon_container)),
        out: DAEMON_LIST,
    });
    let (host_id, daemon) = (request.host.clone(), request.daemon_container.clone());
    task.add_step(
        Lambda::new("find target daemon", move |vars| {
            let list = vars.require(DAEMON_LIST, "find target daemon")?;
            let Some(id) = list.lines().map(str::trim).find(|l| !l.is_empty()) else {
                return Err(ErrorKind::TargetDaemonNotFound
                    .error()
                    .field("host", &host_id)
                    .field("container", &daemon));
            };
            vars.set(DAEMON_ID, id.to_string());
            Ok(Flow::Continue)
        })
        .reading(&[DAEMON_LIST.name()])
        .writing(&[DAEMON_ID.name()]),
    );
    if request.create {
        task.add_step(CreateVolume {
            container_id: DAEMON_ID.into(),
            user: request.user.clone(),
            volume: request.volume.clone(),
            size: request.size,
        });
    }
    // Target ids are allocated by scanning; two registrations on one host
    // must not scan at the same time.
    task.add_step(
        Composite::new(
            "register target",
            Arc::clone(store),
            LockScope::Named(format!("target:{}", request.host)),
        )
        .with_step(InstallFile {
            container_id: DAEMON_ID.into(),
            dest: script_path.clone(),
            content: args.script().into(),
        })
        .with_step(ContainerExec {
            container_id: DAEMON_ID.into(),
            command: args.command_line(&script_path),
            out: None,
        }),
    );
    Ok(task)
}
