//! Script templates and their typed arguments.
//!
//! Templates are opaque text installed into a container and run with
//! positional arguments; see [`crate::script_traits::ScriptArgs`].

pub mod format;
pub mod target;

pub use format::{FormatArgs, DEFAULT_CHUNKFILE_SIZE, FORMAT};
pub use target::{TargetArgs, TARGET};
