//! Task engine.
//!
//! A [`Task`] is a named, host-bound, ordered list of [`Step`]s. Executing it
//! runs the steps strictly in order on the calling thread and stops at the
//! first step that skips or fails.
//!
//! ```text
//! Task::execute
//!   step 1 ── Ok(Continue) ──> step 2 ── Ok(Continue) ──> ... ──> Succeeded
//!                 │                          │
//!                 └─ Ok(SkipTask) ──> Skipped └─ Err(e) ──> Err(e)
//! ```

pub mod step;
pub mod vars;

use std::fmt;

use tracing::{info, info_span, warn};

use crate::error::Result;
use crate::executor::RemoteExecutor;
use crate::host::HostBinding;

pub use step::{Composite, Context, Flow, Lambda, Step, StepResult};
pub use vars::{Arg, Var, Vars};

/// Terminal outcome of a task that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every step ran.
    Succeeded,
    /// A step found the work already done and stopped the task.
    Skipped,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Ordered pipeline of steps bound to one host.
pub struct Task {
    name: String,
    subtitle: String,
    host: HostBinding,
    steps: Vec<Box<dyn Step>>,
}

impl Task {
    pub fn new(name: impl Into<String>, subtitle: impl Into<String>, host: HostBinding) -> Self {
        Self {
            name: name.into(),
            subtitle: subtitle.into(),
            host,
            steps: Vec::new(),
        }
    }

    /// Append a step. Steps run in the order they were added.
    pub fn add_step(&mut self, step: impl Step + 'static) {
        self.steps.push(Box::new(step));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn host(&self) -> &HostBinding {
        &self.host
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order.
    ///
    /// Returns `Ok(Skipped)` if a step asked to skip, `Err` with the failing
    /// step's error otherwise stopped early, `Ok(Succeeded)` when all ran.
    /// Mutations made by steps before a failure are left in place.
    pub fn execute(&self, executor: &dyn RemoteExecutor) -> Result<TaskOutcome> {
        let span = info_span!(
            "task",
            name = %self.name,
            subtitle = %self.subtitle,
            host = %self.host.host
        );
        let _enter = span.enter();

        let mut ctx = Context::new(&self.host, executor);
        match step::run_steps(&self.steps, &mut ctx) {
            Ok(Flow::Continue) => {
                info!("task succeeded");
                Ok(TaskOutcome::Succeeded)
            }
            Ok(Flow::SkipTask) => {
                info!("task skipped");
                Ok(TaskOutcome::Skipped)
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "task failed");
                Err(e)
            }
        }
    }

    /// Steps that read a variable no earlier step writes, as (step, variable).
    ///
    /// A correctly wired task returns an empty list.
    pub fn unresolved_inputs(&self) -> Vec<(String, &'static str)> {
        step::unresolved(&self.steps, &mut Vec::new())
    }

    /// Multi-line description of the task, for dry runs and logs.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.name, self.subtitle)];
        for (i, name) in self.step_names().into_iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, name));
        }
        lines.join("\n")
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("subtitle", &self.subtitle)
            .field("host", &self.host.host)
            .field("steps", &self.step_names())
            .finish()
    }
}
