//! Block device and filesystem steps: blkid, umount, mkdir, mkfs, mount.

use crate::error::ErrorKind;
use crate::shell;
use crate::task::{Context, Flow, Step, StepResult, Var};

/// Query a device attribute with `blkid -o value -s <tag>`.
///
/// The probe never fails the task. On success `out` holds the trimmed value.
/// On failure, if `success` is given it is set to `false` and `out` holds
/// the probe's output so a later step can classify it; without `success`,
/// `out` is set to the empty string ("nothing known").
#[derive(Debug, Clone)]
pub struct BlockId {
    pub device: String,
    pub match_tag: String,
    pub out: Var<String>,
    pub success: Option<Var<bool>>,
}

impl BlockId {
    /// Probe the filesystem UUID of `device`.
    pub fn uuid(device: impl Into<String>, out: Var<String>) -> Self {
        Self {
            device: device.into(),
            match_tag: "UUID".to_string(),
            out,
            success: None,
        }
    }

    pub fn command(&self) -> String {
        shell::join(["blkid", "-o", "value", "-s", self.match_tag.as_str(), self.device.as_str()])
    }
}

impl Step for BlockId {
    fn name(&self) -> &str {
        "query device attribute"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let output = ctx.run(&self.command())?;
        match (output.success, self.success) {
            (true, flag) => {
                ctx.vars.set(self.out, output.stdout.trim().to_string());
                if let Some(flag) = flag {
                    ctx.vars.set(flag, true);
                }
            }
            (false, Some(flag)) => {
                ctx.vars.set(self.out, output.combined());
                ctx.vars.set(flag, false);
            }
            (false, None) => ctx.vars.set(self.out, String::new()),
        }
        Ok(Flow::Continue)
    }

    fn writes(&self) -> Vec<&'static str> {
        let mut writes = vec![self.out.name()];
        writes.extend(self.success.map(|v| v.name()));
        writes
    }
}

/// `umount` each directory (or device) in turn.
#[derive(Debug, Clone, Default)]
pub struct UmountFilesystem {
    pub directories: Vec<String>,
    /// Treat "not mounted" as success.
    pub ignore_umounted: bool,
    /// Treat a missing path as success.
    pub ignore_not_found: bool,
}

impl UmountFilesystem {
    fn ignorable(&self, output: &str) -> bool {
        (self.ignore_umounted && output.contains("not mounted"))
            || (self.ignore_not_found
                && (output.contains("No such file or directory")
                    || output.contains("not found")
                    || output.contains("no mount point specified")))
    }
}

impl Step for UmountFilesystem {
    fn name(&self) -> &str {
        "umount filesystem"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        for directory in &self.directories {
            let output = ctx.run(&shell::join(["umount", directory.as_str()]))?;
            if output.success || self.ignorable(&output.combined()) {
                continue;
            }
            return Err(ErrorKind::UmountFilesystemFailed
                .error()
                .field("host", &ctx.host.host)
                .field("directory", directory)
                .field("output", output.combined()));
        }
        Ok(Flow::Continue)
    }
}

/// `mkdir -p` every path.
#[derive(Debug, Clone, Default)]
pub struct CreateDirectory {
    pub paths: Vec<String>,
}

impl Step for CreateDirectory {
    fn name(&self) -> &str {
        "create directory"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        if self.paths.is_empty() {
            return Ok(Flow::Continue);
        }
        let mut words = vec!["mkdir", "-p"];
        words.extend(self.paths.iter().map(String::as_str));
        ctx.run(&shell::join(words))?
            .ensure_success(ErrorKind::CreateDirectoryFailed, ctx.host)
            .map_err(|e| e.field("paths", self.paths.join(",")))?;
        Ok(Flow::Continue)
    }
}

/// `mkfs.ext4 -F <device>`.
#[derive(Debug, Clone)]
pub struct CreateFilesystem {
    pub device: String,
}

impl Step for CreateFilesystem {
    fn name(&self) -> &str {
        "create filesystem"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        ctx.run(&shell::join(["mkfs.ext4", "-F", self.device.as_str()]))?
            .ensure_success(ErrorKind::CreateFilesystemFailed, ctx.host)
            .map_err(|e| e.field("device", &self.device))?;
        Ok(Flow::Continue)
    }
}

/// `mount <source> <directory>`.
#[derive(Debug, Clone)]
pub struct MountFilesystem {
    pub source: String,
    pub directory: String,
}

impl Step for MountFilesystem {
    fn name(&self) -> &str {
        "mount filesystem"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        ctx.run(&shell::join(["mount", self.source.as_str(), self.directory.as_str()]))?
            .ensure_success(ErrorKind::MountFilesystemFailed, ctx.host)
            .map_err(|e| {
                e.field("source", &self.source)
                    .field("directory", &self.directory)
            })?;
        Ok(Flow::Continue)
    }
}
