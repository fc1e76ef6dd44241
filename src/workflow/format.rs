//! Format a device into a chunkfile pool.
//!
//! The task prepares the device on the host (filesystem, mount, fstab
//! record) and then hands the long-running preallocation to a work container
//! whose name is derived from the device path. A second submission for the
//! same device finds that container and skips.

use std::sync::Arc;

use serde_json::json;

use crate::config::{FormatEntry, Inventory, Layout};
use crate::error::Result;
use crate::naming::format_container_name;
use crate::script_traits::ScriptArgs;
use crate::scripts::FormatArgs;
use crate::steps::{
    BlockId, CreateContainer, CreateDirectory, CreateFilesystem, InstallFile, ListContainers,
    MountFilesystem, PullImage, StartContainer, UmountFilesystem, Volume,
};
use crate::storage::{LockScope, MemStorage};
use crate::task::{Composite, Flow, Lambda, Task, Var};

use super::fstab::EditFstab;

pub const OLD_CONTAINER_ID: Var<String> = Var::new("format.old_container_id");
pub const OLD_UUID: Var<String> = Var::new("format.old_uuid");
pub const CONTAINER_ID: Var<String> = Var::new("format.container_id");

pub const TASK_NAME: &str = "Start Format Chunkfile Pool";

/// Store key under which a formatted device's container is recorded.
pub fn store_key(host: &str, device: &str) -> String {
    format!("format/{}/{}", host, device)
}

pub fn subtitle(entry: &FormatEntry) -> String {
    format!(
        "host={} device={} mountPoint={} usage={}%",
        entry.host, entry.device, entry.mount_point, entry.usage_percent
    )
}

/// Build the format task for one (host, device) entry.
///
/// Everything from the existence check through container creation runs in
/// one composite locked on the device, so concurrent submissions for the
/// same device cannot both pass the check.
pub fn new_format_chunkfile_pool_task(
    inventory: &Inventory,
    store: &Arc<MemStorage>,
    entry: &FormatEntry,
    layout: &Layout,
) -> Result<Task> {
    let host = inventory.host(&entry.host)?;
    let container_name = format_container_name(&entry.device);
    let format_args = FormatArgs::new(layout, entry.usage_percent);
    let script_path = layout.format_script_path();

    let mut container_args = vec![script_path.clone()];
    container_args.extend(format_args.to_cli_args());

    let prepare = Composite::new(
        "prepare device",
        Arc::clone(store),
        LockScope::device(&entry.host, &entry.device),
    )
    .exporting(&[CONTAINER_ID.name()])
    .with_step(ListContainers {
        show_all: true,
        quiet: true,
        format: Some("{{.ID}}".to_string()),
        filter: Some(format!("name={}", container_name)),
        out: OLD_CONTAINER_ID,
    })
    .with_step(
        Lambda::new("skip if formatting", |vars| {
            let id = vars.require(OLD_CONTAINER_ID, "skip if formatting")?;
            if id.is_empty() {
                Ok(Flow::Continue)
            } else {
                tracing::info!(container = %id, "format container already exists");
                Ok(Flow::SkipTask)
            }
        })
        .reading(&[OLD_CONTAINER_ID.name()]),
    )
    .with_step(BlockId::uuid(&entry.device, OLD_UUID))
    .with_step(UmountFilesystem {
        directories: vec![entry.device.clone()],
        ignore_umounted: true,
        ignore_not_found: true,
    })
    .with_step(CreateDirectory {
        paths: vec![entry.mount_point.clone()],
    })
    .with_step(CreateFilesystem {
        device: entry.device.clone(),
    })
    .with_step(MountFilesystem {
        source: entry.device.clone(),
        directory: entry.mount_point.clone(),
    })
    .with_step(EditFstab {
        host: entry.host.clone(),
        device: entry.device.clone(),
        mount_point: entry.mount_point.clone(),
        old_uuid: OLD_UUID.into(),
        skip_add: false,
        fstab_path: layout.fstab_path.clone(),
        store: Arc::clone(store),
    })
    .with_step(PullImage {
        image: entry.container_image.clone(),
    })
    .with_step(CreateContainer {
        image: entry.container_image.clone(),
        name: container_name,
        entrypoint: Some("/bin/bash".to_string()),
        args: container_args,
        remove: true,
        volumes: vec![Volume {
            host_path: entry.mount_point.clone(),
            container_path: layout.chunkfile_pool_root_dir.clone(),
        }],
        out: CONTAINER_ID,
    });

    let (record_store, key, mount_point) = (
        Arc::clone(store),
        store_key(&entry.host, &entry.device),
        entry.mount_point.clone(),
    );
    let mut task = Task::new(TASK_NAME, subtitle(entry), host.clone());
    task.add_step(prepare);
    task.add_step(InstallFile {
        container_id: CONTAINER_ID.into(),
        dest: script_path,
        content: format_args.script().into(),
    });
    task.add_step(StartContainer {
        container_id: CONTAINER_ID.into(),
    });
    task.add_step(
        Lambda::new("record format container", move |vars| {
            let id = vars.require(CONTAINER_ID, "record format container")?;
            record_store.set(
                key.clone(),
                json!({ "container_id": id, "mount_point": mount_point }),
            );
            Ok(Flow::Continue)
        })
        .reading(&[CONTAINER_ID.name()]),
    );
    Ok(task)
}
