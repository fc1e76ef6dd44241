//! Workflow builders: assemble host-bound tasks from configuration.

pub mod format;
pub mod fstab;
pub mod target;

pub use format::new_format_chunkfile_pool_task;
pub use fstab::{check_device_uuid, is_device_uuid, EditFstab, WARNING_EDIT};
pub use target::{new_add_target_task, TargetRequest};
