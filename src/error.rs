//! Error catalog for fleetadm
//!
//! Every failure a task can report is one of the [`ErrorKind`]s below. A kind
//! owns a stable numeric code and a message template; an [`Error`] is a kind
//! plus the contextual fields (host, device, observed value...) substituted
//! into that template.
//!
//! Callers branch on [`Error::kind`]; humans read the rendered message.

use std::fmt;

use strum::{EnumIter, IntoStaticStr};

/// Stable classification of a failure.
///
/// Codes are grouped by area: 1xxxxx internal, 2xxxxx configuration,
/// 41xxxx block devices and filesystems, 42xxxx files, 43xxxx containers,
/// 44xxxx volumes and targets, 5xxxxx remote execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// A step read a variable that no earlier step produced.
    MissingVariable,

    HostNotFound,
    InvalidConfig,

    NotABlockDevice,
    /// The device's UUID is missing or not in 8-4-4-4-12 hex form.
    DeviceMetadataInvalid,
    UmountFilesystemFailed,
    CreateDirectoryFailed,
    CreateFilesystemFailed,
    MountFilesystemFailed,

    CopyFileFailed,
    EditFileFailed,

    ListContainersFailed,
    PullImageFailed,
    CreateContainerFailed,
    InstallFileFailed,
    StartContainerFailed,
    ContainerExecFailed,

    CreateVolumeFailed,
    TargetDaemonNotFound,

    /// The transport itself failed (ssh/bash could not be spawned).
    RemoteExecutionFailed,
}

impl ErrorKind {
    /// Stable numeric code, safe to show to operators and to match in scripts.
    pub const fn code(self) -> u32 {
        match self {
            Self::MissingVariable => 100_001,
            Self::HostNotFound => 200_001,
            Self::InvalidConfig => 200_002,
            Self::NotABlockDevice => 410_001,
            Self::DeviceMetadataInvalid => 410_002,
            Self::UmountFilesystemFailed => 410_003,
            Self::CreateDirectoryFailed => 410_004,
            Self::CreateFilesystemFailed => 410_005,
            Self::MountFilesystemFailed => 410_006,
            Self::CopyFileFailed => 420_001,
            Self::EditFileFailed => 420_002,
            Self::ListContainersFailed => 430_001,
            Self::PullImageFailed => 430_002,
            Self::CreateContainerFailed => 430_003,
            Self::InstallFileFailed => 430_004,
            Self::StartContainerFailed => 430_005,
            Self::ContainerExecFailed => 430_006,
            Self::CreateVolumeFailed => 440_001,
            Self::TargetDaemonNotFound => 440_002,
            Self::RemoteExecutionFailed => 500_001,
        }
    }

    /// Message template. `{name}` placeholders are filled from the error's fields.
    pub const fn template(self) -> &'static str {
        match self {
            Self::MissingVariable => "step '{step}' reads variable '{var}' which was never set",
            Self::HostNotFound => "host '{host}' not found in inventory",
            Self::InvalidConfig => "invalid configuration: {reason}",
            Self::NotABlockDevice => "'{device}' on host '{host}' is not a block device",
            Self::DeviceMetadataInvalid => "device '{device}' on host '{host}' has no valid uuid",
            Self::UmountFilesystemFailed => "umount filesystem failed",
            Self::CreateDirectoryFailed => "create directory failed",
            Self::CreateFilesystemFailed => "create filesystem on '{device}' failed",
            Self::MountFilesystemFailed => "mount '{source}' at '{directory}' failed",
            Self::CopyFileFailed => "copy '{source}' to '{dest}' failed",
            Self::EditFileFailed => "edit file failed",
            Self::ListContainersFailed => "list containers failed",
            Self::PullImageFailed => "pull image '{image}' failed",
            Self::CreateContainerFailed => "create container '{name}' failed",
            Self::InstallFileFailed => "install file into container failed",
            Self::StartContainerFailed => "start container '{container}' failed",
            Self::ContainerExecFailed => "exec in container '{container}' failed",
            Self::CreateVolumeFailed => "create volume '{volume}' for user '{user}' failed",
            Self::TargetDaemonNotFound => "target daemon is not running on host '{host}'",
            Self::RemoteExecutionFailed => "execute command on host '{host}' failed",
        }
    }

    /// Kebab-case name, e.g. `not-a-block-device`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Start building an instance of this kind.
    pub fn error(self) -> Error {
        Error {
            kind: self,
            fields: Vec::new(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An instance of a catalog kind with its contextual fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    fields: Vec<(&'static str, String)>,
}

impl Error {
    /// Attach a contextual field. Setting the same key twice keeps the last value.
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    /// Value of a field, if it was set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render the template, then append fields the template did not consume.
    pub fn message(&self) -> String {
        let template = self.kind.template();
        let mut message = String::with_capacity(template.len());
        let mut used: Vec<&str> = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            message.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                message.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let key = &after[..close];
            match self.get(key) {
                Some(value) => {
                    message.push_str(value);
                    used.push(key);
                }
                None => {
                    message.push('{');
                    message.push_str(key);
                    message.push('}');
                }
            }
            rest = &after[close + 1..];
        }
        message.push_str(rest);

        let extra: Vec<String> = self
            .fields
            .iter()
            .filter(|(k, _)| !used.contains(k))
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if !extra.is_empty() {
            message.push_str(" (");
            message.push_str(&extra.join(" "));
            message.push(')');
        }
        message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:06}] {}", self.code(), self.message())
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        kind.error()
    }
}

/// Result type alias for fleetadm operations
pub type Result<T> = std::result::Result<T, Error>;
