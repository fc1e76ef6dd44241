//! Container runtime steps.
//!
//! All commands go through the engine binary named in the host binding
//! (`docker` or `podman`); both accept the same flags used here.

use crate::error::ErrorKind;
use crate::shell;
use crate::task::{Arg, Context, Flow, Step, StepResult, Var};

/// Heredoc delimiter for staged file content.
const HEREDOC_EOF: &str = "__FLEETADM_EOF__";

fn engine(ctx: &Context<'_>) -> String {
    ctx.host.engine.to_string()
}

/// Bind mount from host into container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub host_path: String,
    pub container_path: String,
}

/// `<engine> ps`, output trimmed into `out`.
#[derive(Debug, Clone)]
pub struct ListContainers {
    pub show_all: bool,
    pub quiet: bool,
    pub format: Option<String>,
    pub filter: Option<String>,
    pub out: Var<String>,
}

impl ListContainers {
    pub fn command(&self, engine: &str) -> String {
        let mut words = vec![engine, "ps"];
        if self.show_all {
            words.push("--all");
        }
        if self.quiet {
            words.push("--quiet");
        }
        if let Some(format) = &self.format {
            words.extend(["--format", format.as_str()]);
        }
        if let Some(filter) = &self.filter {
            words.extend(["--filter", filter.as_str()]);
        }
        shell::join(words)
    }
}

impl Step for ListContainers {
    fn name(&self) -> &str {
        "list containers"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let output = ctx.run(&self.command(&engine(ctx)))?;
        output.ensure_success(ErrorKind::ListContainersFailed, ctx.host)?;
        ctx.vars.set(self.out, output.stdout.trim().to_string());
        Ok(Flow::Continue)
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![self.out.name()]
    }
}

/// `<engine> pull <image>`.
#[derive(Debug, Clone)]
pub struct PullImage {
    pub image: String,
}

impl Step for PullImage {
    fn name(&self) -> &str {
        "pull image"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let command = shell::join([engine(ctx).as_str(), "pull", self.image.as_str()]);
        ctx.run(&command)?
            .ensure_success(ErrorKind::PullImageFailed, ctx.host)
            .map_err(|e| e.field("image", &self.image))?;
        Ok(Flow::Continue)
    }
}

/// `<engine> create`, the new container id stored in `out`.
///
/// The container is created, not started.
#[derive(Debug, Clone)]
pub struct CreateContainer {
    pub image: String,
    pub name: String,
    pub entrypoint: Option<String>,
    /// Arguments after the image.
    pub args: Vec<String>,
    /// Remove the container once it exits.
    pub remove: bool,
    pub volumes: Vec<Volume>,
    pub out: Var<String>,
}

impl CreateContainer {
    pub fn command(&self, engine: &str) -> String {
        let mut words: Vec<String> = vec![engine.to_string(), "create".to_string()];
        words.push("--name".to_string());
        words.push(self.name.clone());
        if let Some(entrypoint) = &self.entrypoint {
            words.push("--entrypoint".to_string());
            words.push(entrypoint.clone());
        }
        if self.remove {
            words.push("--rm".to_string());
        }
        for volume in &self.volumes {
            words.push("--volume".to_string());
            words.push(format!("{}:{}", volume.host_path, volume.container_path));
        }
        words.push(self.image.clone());
        words.extend(self.args.iter().cloned());
        shell::join(words)
    }
}

impl Step for CreateContainer {
    fn name(&self) -> &str {
        "create container"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let output = ctx.run(&self.command(&engine(ctx)))?;
        output
            .ensure_success(ErrorKind::CreateContainerFailed, ctx.host)
            .map_err(|e| e.field("name", &self.name))?;
        // The id is the last line; pull progress may precede it.
        let id = output
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        ctx.vars.set(self.out, id);
        Ok(Flow::Continue)
    }

    fn writes(&self) -> Vec<&'static str> {
        vec![self.out.name()]
    }
}

/// Write `content` to `dest` inside a container.
///
/// The content is staged in a temporary file on the host and copied in with
/// `<engine> cp`, so the container does not need to be running.
#[derive(Debug, Clone)]
pub struct InstallFile {
    pub container_id: Arg<String>,
    pub dest: String,
    pub content: Arg<String>,
}

impl InstallFile {
    pub fn command(&self, engine: &str, container_id: &str, content: &str) -> String {
        let mut body = content.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        let target = format!("{}:{}", container_id, self.dest);
        format!(
            "tmp=$(mktemp) || exit 1\n\
             cat > \"$tmp\" <<'{eof}'\n\
             {body}{eof}\n\
             {cp} \"$tmp\" {target}\n\
             rc=$?\n\
             rm -f \"$tmp\"\n\
             exit $rc",
            eof = HEREDOC_EOF,
            body = body,
            cp = shell::join([engine, "cp"]),
            target = shell::quote(&target),
        )
    }
}

impl Step for InstallFile {
    fn name(&self) -> &str {
        "install file"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let container_id = self.container_id.resolve(&ctx.vars, self.name())?;
        let content = self.content.resolve(&ctx.vars, self.name())?;
        ctx.run(&self.command(&engine(ctx), &container_id, &content))?
            .ensure_success(ErrorKind::InstallFileFailed, ctx.host)
            .map_err(|e| e.field("container", &container_id).field("dest", &self.dest))?;
        Ok(Flow::Continue)
    }

    fn reads(&self) -> Vec<&'static str> {
        self.container_id
            .reads()
            .into_iter()
            .chain(self.content.reads())
            .collect()
    }
}

/// `<engine> start <id>`.
#[derive(Debug, Clone)]
pub struct StartContainer {
    pub container_id: Arg<String>,
}

impl Step for StartContainer {
    fn name(&self) -> &str {
        "start container"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let container_id = self.container_id.resolve(&ctx.vars, self.name())?;
        let command = shell::join([engine(ctx).as_str(), "start", container_id.as_str()]);
        ctx.run(&command)?
            .ensure_success(ErrorKind::StartContainerFailed, ctx.host)
            .map_err(|e| e.field("container", &container_id))?;
        Ok(Flow::Continue)
    }

    fn reads(&self) -> Vec<&'static str> {
        self.container_id.reads().into_iter().collect()
    }
}

/// `<engine> exec <id> <command...>`, stdout optionally stored in `out`.
#[derive(Debug, Clone)]
pub struct ContainerExec {
    pub container_id: Arg<String>,
    pub command: Vec<String>,
    pub out: Option<Var<String>>,
}

impl ContainerExec {
    pub fn render(&self, engine: &str, container_id: &str) -> String {
        let mut words = vec![engine, "exec", container_id];
        words.extend(self.command.iter().map(String::as_str));
        shell::join(words)
    }
}

impl Step for ContainerExec {
    fn name(&self) -> &str {
        "exec in container"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let container_id = self.container_id.resolve(&ctx.vars, self.name())?;
        let output = ctx.run(&self.render(&engine(ctx), &container_id))?;
        output
            .ensure_success(ErrorKind::ContainerExecFailed, ctx.host)
            .map_err(|e| e.field("container", &container_id))?;
        if let Some(out) = self.out {
            ctx.vars.set(out, output.stdout.trim().to_string());
        }
        Ok(Flow::Continue)
    }

    fn reads(&self) -> Vec<&'static str> {
        self.container_id.reads().into_iter().collect()
    }

    fn writes(&self) -> Vec<&'static str> {
        self.out.iter().map(|v| v.name()).collect()
    }
}
