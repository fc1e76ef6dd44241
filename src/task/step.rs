//! Step variants and the shared run loop.
//!
//! A step is one unit of task work. Three kinds exist:
//!
//! - command steps (see [`crate::steps`]) wrap exactly one remote operation;
//! - [`Lambda`] runs inline logic on the task's variables, no remote I/O;
//! - [`Composite`] runs an ordered list of sub-steps under a [`MemStorage`]
//!   transaction, so two composites on the same [`LockScope`] never interleave.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::{CommandOutput, RemoteExecutor};
use crate::host::HostBinding;
use crate::storage::{LockScope, MemStorage};

use super::vars::Vars;

/// What the task should do after a step returned `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed to the next step.
    Continue,
    /// Stop the task; nothing left to do. Not an error.
    SkipTask,
}

/// `Ok(Flow)` on success or intentional skip, `Err` on failure.
pub type StepResult = std::result::Result<Flow, Error>;

/// Everything a step may touch while it runs.
pub struct Context<'a> {
    pub host: &'a HostBinding,
    pub executor: &'a dyn RemoteExecutor,
    pub vars: Vars,
}

impl<'a> Context<'a> {
    pub fn new(host: &'a HostBinding, executor: &'a dyn RemoteExecutor) -> Self {
        Self {
            host,
            executor,
            vars: Vars::new(),
        }
    }

    /// Run `command` on the bound host. Transport failures become catalog errors.
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        self.executor
            .execute(self.host, command)
            .map_err(|e| e.into_error(self.host))
    }
}

/// One unit of work inside a task.
pub trait Step: Send + Sync {
    /// Short description used in logs and task summaries.
    fn name(&self) -> &str;

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult;

    /// Variables this step reads.
    fn reads(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Variables this step writes.
    fn writes(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Run `steps` in order, stopping at the first skip or error.
pub(crate) fn run_steps(steps: &[Box<dyn Step>], ctx: &mut Context<'_>) -> StepResult {
    for (index, step) in steps.iter().enumerate() {
        debug!(step = step.name(), index, "step started");
        match step.execute(ctx)? {
            Flow::Continue => {}
            Flow::SkipTask => {
                debug!(step = step.name(), index, "step requested skip");
                return Ok(Flow::SkipTask);
            }
        }
    }
    Ok(Flow::Continue)
}

/// Reads in `steps` that no earlier step (or `produced`) writes, as (step, var) pairs.
pub(crate) fn unresolved(
    steps: &[Box<dyn Step>],
    produced: &mut Vec<&'static str>,
) -> Vec<(String, &'static str)> {
    let mut missing = Vec::new();
    for step in steps {
        for var in step.reads() {
            if !produced.contains(&var) {
                missing.push((step.name().to_string(), var));
            }
        }
        produced.extend(step.writes());
    }
    missing
}

type LambdaFn = dyn Fn(&mut Vars) -> StepResult + Send + Sync;

/// Inline logic over the task's variables.
pub struct Lambda {
    name: String,
    f: Box<LambdaFn>,
    reads: Vec<&'static str>,
    writes: Vec<&'static str>,
}

impl Lambda {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Vars) -> StepResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Declare the variables the closure reads.
    pub fn reading(mut self, vars: &[&'static str]) -> Self {
        self.reads.extend_from_slice(vars);
        self
    }

    /// Declare the variables the closure writes.
    pub fn writing(mut self, vars: &[&'static str]) -> Self {
        self.writes.extend_from_slice(vars);
        self
    }
}

impl Step for Lambda {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        (self.f)(&mut ctx.vars)
    }

    fn reads(&self) -> Vec<&'static str> {
        self.reads.clone()
    }

    fn writes(&self) -> Vec<&'static str> {
        self.writes.clone()
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda").field("name", &self.name).finish()
    }
}

/// A named sub-pipeline executed inside one store transaction.
///
/// The outer task sees a single outcome: continue, skip or the first error.
/// Sub-steps read the task's variables. What they write stays inside the
/// composite unless it is exported with [`Composite::exporting`].
pub struct Composite {
    name: String,
    scope: LockScope,
    store: Arc<MemStorage>,
    steps: Vec<Box<dyn Step>>,
    exports: Vec<&'static str>,
}

impl Composite {
    pub fn new(name: impl Into<String>, store: Arc<MemStorage>, scope: LockScope) -> Self {
        Self {
            name: name.into(),
            scope,
            store,
            steps: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Variables sub-steps write that later outer steps may read.
    pub fn exporting(mut self, vars: &[&'static str]) -> Self {
        self.exports.extend_from_slice(vars);
        self
    }

    /// Variables written by sub-steps and not exported.
    fn internal(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .steps
            .iter()
            .flat_map(|s| s.writes())
            .filter(|var| !self.exports.contains(var))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn add_step(&mut self, step: impl Step + 'static) {
        self.steps.push(Box::new(step));
    }

    /// Builder form of [`Composite::add_step`].
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.add_step(step);
        self
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    /// Names of the sub-steps, in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Step for Composite {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut Context<'_>) -> StepResult {
        debug!(composite = %self.name, scope = %self.scope, "waiting for lock");
        // Outer values under internal names are set aside and put back after.
        let shadowed: Vec<_> = self
            .internal()
            .into_iter()
            .map(|name| (name, ctx.vars.take(name)))
            .collect();
        let result = self.store.tx(&self.scope, |_| run_steps(&self.steps, ctx));
        for (name, value) in shadowed {
            ctx.vars.restore(name, value);
        }
        result
    }

    fn reads(&self) -> Vec<&'static str> {
        unresolved(&self.steps, &mut Vec::new())
            .into_iter()
            .map(|(_, var)| var)
            .collect()
    }

    fn writes(&self) -> Vec<&'static str> {
        self.exports.clone()
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("steps", &self.step_names())
            .finish()
    }
}
