//! `/etc/fstab` edit protocol.
//!
//! Binding a freshly formatted device to its mount point means replacing the
//! device's fstab record. The whole edit runs inside one store transaction
//! scoped to the host's fstab, so concurrent tasks formatting different
//! devices on the same host never interleave their edits.
//!
//! Order inside the transaction:
//!
//! 1. probe the device UUID with blkid
//! 2. validate it (not-a-block-device, malformed or missing UUID)
//! 3. back up fstab to `<fstab>-<YYYY-MM-DD>.backup`, never overwriting
//! 4. delete records for the previous and the new UUID
//! 5. append the new record (unless suppressed)
//!
//! Only `NEW_UUID` leaves the composite; its other variables stay inside.
//!
//! Validation runs before the backup so an invalid device leaves the host
//! untouched.

use std::sync::Arc;

use chrono::Local;

use crate::error::{Error, ErrorKind};
use crate::steps::{AppendLine, BlockId, CopyFile, Sed};
use crate::storage::{LockScope, MemStorage};
use crate::task::{Arg, Composite, Context, Flow, Lambda, Step, StepResult, Var};

/// Comment appended to every record fleetadm writes.
pub const WARNING_EDIT: &str = "GENERATED BY CURVEADM, DONT EDIT THIS";

/// Substring blkid output carries for paths that are not block devices.
pub const SIGNATURE_NOT_A_BLOCK_DEVICE: &str = "not a block device";

/// Filesystem type and options of generated records.
pub const FSTAB_FILESYSTEM: &str = "ext4";
pub const FSTAB_MOUNT_OPTIONS: &str = "rw,errors=remount-ro";

pub const NEW_UUID: Var<String> = Var::new("fstab.new_uuid");
const PROBE_OK: Var<bool> = Var::new("fstab.probe_ok");
const EXPR_DELETE: Var<String> = Var::new("fstab.expr_delete");
const RECORD: Var<String> = Var::new("fstab.record");

/// True for `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` with hex digits.
pub fn is_device_uuid(value: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    let parts: Vec<&str> = value.split('-').collect();
    parts.len() == GROUPS.len()
        && parts
            .iter()
            .zip(GROUPS)
            .all(|(part, len)| part.len() == len && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Classify a blkid UUID probe.
pub fn check_device_uuid(host: &str, device: &str, probe_ok: bool, uuid: &str) -> Result<(), Error> {
    if uuid.contains(SIGNATURE_NOT_A_BLOCK_DEVICE) {
        return Err(ErrorKind::NotABlockDevice
            .error()
            .field("host", host)
            .field("device", device));
    }
    if !probe_ok || !is_device_uuid(uuid) {
        return Err(ErrorKind::DeviceMetadataInvalid
            .error()
            .field("host", host)
            .field("device", device)
            .field("uuid", uuid));
    }
    Ok(())
}

/// sed expression deleting records of the old (if any) and the new UUID.
pub fn delete_expression(old_uuid: &str, uuid: &str) -> String {
    let mut exprs = Vec::new();
    if !old_uuid.is_empty() && old_uuid != uuid {
        exprs.push(format!("/UUID={}/d", old_uuid));
    }
    exprs.push(format!("/UUID={}/d", uuid));
    exprs.join(";")
}

/// The fstab record binding `uuid` to `mount_point`.
pub fn fstab_record(uuid: &str, mount_point: &str) -> String {
    format!(
        "UUID={}  {}  {}  {}  0  0  # {}",
        uuid, mount_point, FSTAB_FILESYSTEM, FSTAB_MOUNT_OPTIONS, WARNING_EDIT
    )
}

/// Composite step running the edit protocol for one device.
pub struct EditFstab {
    pub host: String,
    pub device: String,
    pub mount_point: String,
    /// UUID the device had before it was reformatted; empty if unknown.
    pub old_uuid: Arg<String>,
    /// Remove stale records without adding the new one.
    pub skip_add: bool,
    pub fstab_path: String,
    pub store: Arc<MemStorage>,
}

impl EditFstab {
    fn backup_path(&self) -> String {
        format!("{}-{}.backup", self.fstab_path, Local::now().format("%Y-%m-%d"))
    }

    /// The sub-pipeline, built once the previous UUID is known.
    fn pipeline(&self, old_uuid: String) -> Composite {
        let (host, device, mount_point) = (
            self.host.clone(),
            self.device.clone(),
            self.mount_point.clone(),
        );

        let mut composite = Composite::new(
            "edit fstab",
            Arc::clone(&self.store),
            LockScope::file(&self.host, &self.fstab_path),
        )
        .exporting(&[NEW_UUID.name()])
        .with_step(BlockId {
            success: Some(PROBE_OK),
            ..BlockId::uuid(&self.device, NEW_UUID)
        })
        .with_step(
            Lambda::new("check device uuid", move |vars| {
                let probe_ok = vars.require(PROBE_OK, "check device uuid")?;
                let uuid = vars.require(NEW_UUID, "check device uuid")?;
                check_device_uuid(&host, &device, probe_ok, &uuid)?;
                Ok(Flow::Continue)
            })
            .reading(&[PROBE_OK.name(), NEW_UUID.name()]),
        )
        .with_step(CopyFile {
            source: self.fstab_path.clone(),
            dest: self.backup_path(),
            no_clobber: true,
        })
        .with_step(
            Lambda::new("generate fstab record", move |vars| {
                let uuid = vars.require(NEW_UUID, "generate fstab record")?;
                vars.set(EXPR_DELETE, delete_expression(&old_uuid, &uuid));
                vars.set(RECORD, fstab_record(&uuid, &mount_point));
                Ok(Flow::Continue)
            })
            .reading(&[NEW_UUID.name()])
            .writing(&[EXPR_DELETE.name(), RECORD.name()]),
        )
        .with_step(Sed {
            files: vec![self.fstab_path.clone()],
            expression: EXPR_DELETE.into(),
            in_place: true,
        });
        if !self.skip_add {
            composite.add_step(AppendLine {
                file: self.fstab_path.clone(),
                line: RECORD.into(),
            });
        }
        composite
    }
}

impl Step for EditFstab {
    fn name(&self) -> &str {
        "edit fstab"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let old_uuid = self.old_uuid.resolve(&ctx.vars, self.name())?;
        self.pipeline(old_uuid).execute(ctx)
    }

    fn reads(&self) -> Vec<&'static str> {
        self.old_uuid.reads().into_iter().collect()
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![NEW_UUID.name()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_device_uuid() {
        assert!(is_device_uuid("82511eb8-e4e3-4a50-a736-d584fbf533fa"));
        assert!(is_device_uuid("82511EB8-E4E3-4A50-A736-D584FBF533FA"));
        assert!(!is_device_uuid(""));
        assert!(!is_device_uuid("82511eb8-e4e3-4a50-a736"));
        assert!(!is_device_uuid("82511eb8e4e34a50a736d584fbf533fa"));
        assert!(!is_device_uuid("82511eb8-e4e3-4a50-a736-d584fbf533fg"));
        assert!(!is_device_uuid("82511eb8-e4e3-4a50-a736-d584fbf533fa-"));
    }

    #[test]
    fn test_check_device_uuid_not_a_block_device() {
        let err = check_device_uuid("node1", "/tmp/x", false, "blkid: /tmp/x: not a block device")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotABlockDevice);
        assert_eq!(err.get("host"), Some("node1"));
        assert_eq!(err.get("device"), Some("/tmp/x"));
    }

    #[test]
    fn test_check_device_uuid_invalid() {
        let err = check_device_uuid("node1", "/dev/sdb", true, "1234").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceMetadataInvalid);
        assert_eq!(err.get("uuid"), Some("1234"));

        let err = check_device_uuid("node1", "/dev/sdb", false, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceMetadataInvalid);

        assert!(check_device_uuid("node1", "/dev/sdb", true, "82511eb8-e4e3-4a50-a736-d584fbf533fa").is_ok());
    }

    #[test]
    fn test_expressions() {
        assert_eq!(delete_expression("", "b"), "/UUID=b/d");
        assert_eq!(delete_expression("a", "b"), "/UUID=a/d;/UUID=b/d");
        assert_eq!(delete_expression("b", "b"), "/UUID=b/d");
        assert_eq!(
            fstab_record("b", "/data/chunkserver0"),
            "UUID=b  /data/chunkserver0  ext4  rw,errors=remount-ro  0  0  # GENERATED BY CURVEADM, DONT EDIT THIS"
        );
    }

    #[test]
    fn test_pipeline_order() {
        let step = EditFstab {
            host: "node1".into(),
            device: "/dev/sdb".into(),
            mount_point: "/data".into(),
            old_uuid: Arg::Literal(String::new()),
            skip_add: false,
            fstab_path: "/etc/fstab".into(),
            store: Arc::new(MemStorage::new()),
        };
        let pipeline = step.pipeline(String::new());
        assert_eq!(
            pipeline.step_names(),
            vec![
                "query device attribute",
                "check device uuid",
                "copy file",
                "generate fstab record",
                "edit file",
                "append line",
            ]
        );
        assert_eq!(pipeline.scope(), &LockScope::file("node1", "/etc/fstab"));
        assert_eq!(pipeline.writes(), vec![NEW_UUID.name()]);

        let skip = EditFstab { skip_add: true, ..step };
        assert_eq!(skip.pipeline(String::new()).step_names().len(), 5);
    }
}
