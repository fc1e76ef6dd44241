//! Command steps.
//!
//! Each struct wraps exactly one kind of remote operation. Literal inputs are
//! plain fields, values produced by earlier steps are [`crate::task::Arg`]s, and
//! outputs are [`crate::task::Var`]s. A failed remote command maps to the
//! operation's catalog kind with host, exit code and output attached.

pub mod container;
pub mod file;
pub mod filesystem;
pub mod volume;

pub use container::{
    ContainerExec, CreateContainer, InstallFile, ListContainers, PullImage, StartContainer, Volume,
};
pub use file::{AppendLine, CopyFile, Sed};
pub use filesystem::{BlockId, CreateDirectory, CreateFilesystem, MountFilesystem, UmountFilesystem};
pub use volume::{CreateVolume, VOLUME_EXISTS_OUTPUT};
