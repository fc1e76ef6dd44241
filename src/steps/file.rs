//! Host file steps: copy, in-place `sed` edits and line appends.

use crate::error::ErrorKind;
use crate::shell;
use crate::task::{Arg, Context, Flow, Step, StepResult};

/// Copy a file on the host.
#[derive(Debug, Clone)]
pub struct CopyFile {
    pub source: String,
    pub dest: String,
    /// Leave an existing `dest` untouched.
    pub no_clobber: bool,
}

impl CopyFile {
    pub fn command(&self) -> String {
        let copy = shell::join(["cp", self.source.as_str(), self.dest.as_str()]);
        if self.no_clobber {
            // `cp -n` exit status differs between coreutils releases
            format!("test -e {} || {}", shell::quote(&self.dest), copy)
        } else {
            copy
        }
    }
}

impl Step for CopyFile {
    fn name(&self) -> &str {
        "copy file"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        ctx.run(&self.command())?
            .ensure_success(ErrorKind::CopyFileFailed, ctx.host)
            .map_err(|e| e.field("source", &self.source).field("dest", &self.dest))?;
        Ok(Flow::Continue)
    }
}

/// Run one `sed` expression over files.
#[derive(Debug, Clone)]
pub struct Sed {
    pub files: Vec<String>,
    pub expression: Arg<String>,
    pub in_place: bool,
}

impl Sed {
    pub fn command(&self, expression: &str) -> String {
        let mut words = vec!["sed"];
        if self.in_place {
            words.push("-i");
        }
        words.push(expression);
        words.extend(self.files.iter().map(String::as_str));
        shell::join(words)
    }
}

impl Step for Sed {
    fn name(&self) -> &str {
        "edit file"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let expression = self.expression.resolve(&ctx.vars, self.name())?;
        ctx.run(&self.command(&expression))?
            .ensure_success(ErrorKind::EditFileFailed, ctx.host)
            .map_err(|e| {
                e.field("files", self.files.join(","))
                    .field("expression", &expression)
            })?;
        Ok(Flow::Continue)
    }

    fn reads(&self) -> Vec<&'static str> {
        self.expression.reads().into_iter().collect()
    }
}

/// Append one line to a file on the host.
///
/// `sed '$ a'` needs a last line to append after, so an empty or missing
/// file is written with `printf` instead.
#[derive(Debug, Clone)]
pub struct AppendLine {
    pub file: String,
    pub line: Arg<String>,
}

impl AppendLine {
    pub fn command(&self, line: &str) -> String {
        let file = shell::quote(&self.file);
        let expression = format!("$ a {}", line);
        let sed = shell::join(["sed", "-i", expression.as_str(), self.file.as_str()]);
        format!(
            "if [ -s {file} ]; then {sed}; else printf '%s\\n' {line} > {file}; fi",
            file = file,
            sed = sed,
            line = shell::quote(line),
        )
    }
}

impl Step for AppendLine {
    fn name(&self) -> &str {
        "append line"
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        let line = self.line.resolve(&ctx.vars, self.name())?;
        ctx.run(&self.command(&line))?
            .ensure_success(ErrorKind::EditFileFailed, ctx.host)
            .map_err(|e| e.field("files", &self.file).field("line", &line))?;
        Ok(Flow::Continue)
    }

    fn reads(&self) -> Vec<&'static str> {
        self.line.reads().into_iter().collect()
    }
}
