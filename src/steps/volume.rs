//! Volume steps, run inside a tools container.

use crate::error::ErrorKind;
use crate::shell;
use crate::task::{Arg, Context, Flow, Step, StepResult};

/// What `curve_ops_tool create` prints on stdout when the file already exists.
pub const VOLUME_EXISTS_OUTPUT: &str = "CreateFile fail with errCode: 101";

/// Create a volume with `curve_ops_tool create`.
///
/// A volume that already exists is not an error, so re-running a task that
/// creates volumes is safe. Any other failure stops the task.
#[derive(Debug, Clone)]
pub struct CreateVolume {
    pub container_id: Arg<String>,
    pub user: String,
    pub volume: String,
    /// Size in GiB.
    pub size: u64,
}

impl CreateVolume {
    pub fn command(&self, engine: &str, container_id: &str) -> String {
        shell::join([
            engine.to_string(),
            "exec".to_string(),
            container_id.to_string(),
            "curve_ops_tool".to_string(),
            "create".to_string(),
            format!("-userName={}", self.user),
            format!("-fileName={}", self.volume),
            format!("-fileLength={}", self.size),
        ])
    }
}

impl Step for CreateVolume {
    fn name(&self) -> &str {
        "create volume"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let container_id = self.container_id.resolve(&ctx.vars, self.name())?;
        let engine = ctx.host.engine.to_string();
        let output = ctx.run(&self.command(&engine, &container_id))?;
        if output.success {
            return Ok(Flow::Continue);
        }
        // glog writes to stderr; only stdout carries the reply.
        if output.stdout.trim() == VOLUME_EXISTS_OUTPUT {
            tracing::info!(volume = %self.volume, user = %self.user, "volume already exists");
            return Ok(Flow::Continue);
        }
        Err(ErrorKind::CreateVolumeFailed
            .error()
            .field("host", &ctx.host.host)
            .field("user", &self.user)
            .field("volume", &self.volume)
            .field("output", output.combined()))
    }

    fn reads(&self) -> Vec<&'static str> {
        self.container_id.reads().into_iter().collect()
    }
}
