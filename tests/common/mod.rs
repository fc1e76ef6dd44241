//! Scripted in-memory host shared by the integration tests.
//!
//! `FakeHost` implements `RemoteExecutor` and interprets the command lines
//! fleetadm's steps render: blkid, umount, mkdir, mkfs, mount, the
//! no-clobber copy, `sed -i` and line appends on in-memory files, and a small
//! container runtime. Every command is recorded in order.
//!
//! Edits do a read-modify-write with a sleep in the middle, so two edits of
//! the same file that are not serialized lose an update.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use fleetadm::config::Inventory;
use fleetadm::executor::{CommandOutput, RemoteExecutor, TransportError};
use fleetadm::host::HostBinding;

pub const FSTAB: &str = "/etc/fstab";
pub const OLD_UUID: &str = "0b3c1f0e-6a52-4c8e-9a55-1f3d5b7c9e21";
pub const NEW_UUID: &str = "82511eb8-e4e3-4a50-a736-d584fbf533fa";
pub const ROOT_RECORD: &str = "UUID=6f1d2c3b-0000-4000-8000-000000000001  /  ext4  defaults  0  1";
pub const DAEMON_NAME: &str = "curvebs-target-daemon";

/// What blkid reports for a device.
#[derive(Debug, Clone)]
pub enum Probe {
    Uuid(String),
    /// No filesystem: blkid exits 2 without output.
    Unformatted,
    NotABlockDevice,
    /// Exits 0 and prints this verbatim.
    Output(String),
}

#[derive(Debug, Clone)]
pub struct Device {
    pub before: Probe,
    pub after_mkfs: Probe,
    pub formatted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub volumes: Vec<String>,
    pub args: Vec<String>,
    pub started: bool,
    pub files: HashMap<String, String>,
    pub execs: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct State {
    pub commands: Vec<String>,
    pub files: BTreeMap<String, String>,
    pub devices: HashMap<String, Device>,
    pub mounts: HashMap<String, String>,
    pub directories: Vec<String>,
    pub containers: Vec<Container>,
    pub pulled: Vec<String>,
    responses: Vec<(String, CommandOutput)>,
    next_id: usize,
}

impl State {
    fn add_container(&mut self, container: Container) -> String {
        self.next_id += 1;
        let id = format!("c{:04}", self.next_id);
        self.containers.push(Container {
            id: id.clone(),
            ..container
        });
        id
    }

    fn container_mut(&mut self, id: &str) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.id == id)
    }
}

pub struct FakeHost {
    state: Mutex<State>,
    edits_in_flight: AtomicUsize,
    max_edits_in_flight: AtomicUsize,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// A host whose fstab holds only the root filesystem record.
    pub fn new() -> Self {
        let mut state = State::default();
        state.files.insert(FSTAB.to_string(), format!("{}\n", ROOT_RECORD));
        Self {
            state: Mutex::new(state),
            edits_in_flight: AtomicUsize::new(0),
            max_edits_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_device(self, device: &str, before: Probe, after_mkfs: Probe) -> Self {
        self.state().devices.insert(
            device.to_string(),
            Device {
                before,
                after_mkfs,
                formatted: false,
            },
        );
        self
    }

    /// A block device that had `OLD_UUID` and gets `NEW_UUID` when formatted.
    pub fn with_disk(self, device: &str) -> Self {
        self.with_device(
            device,
            Probe::Uuid(OLD_UUID.to_string()),
            Probe::Uuid(NEW_UUID.to_string()),
        )
    }

    pub fn with_container(self, name: &str, started: bool) -> Self {
        self.state().add_container(Container {
            name: name.to_string(),
            image: "existing".to_string(),
            started,
            ..Container::default()
        });
        self
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.state().files.insert(path.to_string(), content.to_string());
        self
    }

    /// Answer every command starting with `prefix` with `output`.
    pub fn respond(self, prefix: &str, output: CommandOutput) -> Self {
        self.state().responses.push((prefix.to_string(), output));
        self
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Commands reduced to their leading words, e.g. `docker create`.
    pub fn command_heads(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| {
                if c.starts_with("tmp=$(mktemp)") {
                    return "install".to_string();
                }
                if c.starts_with("if [ -s ") {
                    return "append".to_string();
                }
                let words = split(c);
                match words.first().map(String::as_str) {
                    Some("docker") | Some("test") => words.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
                    Some(first) => first.to_string(),
                    None => String::new(),
                }
            })
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state().files.get(path).cloned()
    }

    pub fn fstab(&self) -> String {
        self.file(FSTAB).unwrap_or_default()
    }

    /// Paths of fstab backups.
    pub fn backups(&self) -> Vec<String> {
        self.state()
            .files
            .keys()
            .filter(|k| k.starts_with("/etc/fstab-") && k.ends_with(".backup"))
            .cloned()
            .collect()
    }

    pub fn container_named(&self, name: &str) -> Option<Container> {
        self.state().containers.iter().find(|c| c.name == name).cloned()
    }

    pub fn max_concurrent_edits(&self) -> usize {
        self.max_edits_in_flight.load(Ordering::SeqCst)
    }

    fn scripted(&self, command: &str) -> Option<CommandOutput> {
        self.state()
            .responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
    }

    fn blkid(&self, device: &str) -> CommandOutput {
        let state = self.state();
        let Some(dev) = state.devices.get(device) else {
            return CommandOutput::failed(2, "");
        };
        let probe = if dev.formatted { &dev.after_mkfs } else { &dev.before };
        match probe {
            Probe::Uuid(uuid) => CommandOutput::ok(format!("{}\n", uuid)),
            Probe::Unformatted => CommandOutput::failed(2, ""),
            Probe::NotABlockDevice => {
                CommandOutput::failed(2, format!("blkid: {}: not a block device", device))
            }
            Probe::Output(text) => CommandOutput::ok(format!("{}\n", text)),
        }
    }

    fn umount(&self, target: &str) -> CommandOutput {
        if self.state().mounts.remove(target).is_some() {
            CommandOutput::ok("")
        } else {
            CommandOutput::failed(32, format!("umount: {}: not mounted.", target))
        }
    }

    fn mkfs(&self, device: &str) -> CommandOutput {
        match self.state().devices.get_mut(device) {
            Some(dev) => {
                dev.formatted = true;
                CommandOutput::ok(format!("Creating filesystem on {}\n", device))
            }
            None => CommandOutput::failed(1, format!("The file {} does not exist", device)),
        }
    }

    fn copy_no_clobber(&self, rest: &str) -> CommandOutput {
        let words = split(rest);
        let [dest, _or, _cp, source, _] = words.as_slice() else {
            return CommandOutput::failed(2, "fake host: bad copy");
        };
        let mut state = self.state();
        if state.files.contains_key(dest) {
            return CommandOutput::ok("");
        }
        match state.files.get(source).cloned() {
            Some(content) => {
                state.files.insert(dest.clone(), content);
                CommandOutput::ok("")
            }
            None => CommandOutput::failed(
                1,
                format!("cp: cannot stat '{}': No such file or directory", source),
            ),
        }
    }

    fn sed(&self, expression: &str, file: &str) -> CommandOutput {
        let Some(current) = self.file(file) else {
            return CommandOutput::failed(2, format!("sed: can't read {}: No such file", file));
        };
        self.edit(file, || apply_sed(&current, expression))
    }

    /// `if [ -s F ]; then sed -i '$ a L' F; else printf '%s\n' L > F; fi`
    fn append(&self, command: &str) -> CommandOutput {
        let words: Vec<String> = split(command)
            .into_iter()
            .map(|w| w.trim_end_matches(';').to_string())
            .collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        let ["if", "[", "-s", file, "]", "then", "sed", "-i", expression, ..] = words.as_slice() else {
            return CommandOutput::failed(2, "fake host: bad append");
        };
        match self.file(file) {
            Some(current) if !current.is_empty() => self.edit(file, || apply_sed(&current, expression)),
            _ => {
                let line = expression.strip_prefix("$ a ").unwrap_or_default().to_string();
                self.edit(file, || Ok(format!("{}\n", line)))
            }
        }
    }

    fn edit(&self, file: &str, f: impl FnOnce() -> Result<String, String>) -> CommandOutput {
        let in_flight = self.edits_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_edits_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));

        let output = match f() {
            Ok(updated) => {
                self.state().files.insert(file.to_string(), updated);
                CommandOutput::ok("")
            }
            Err(e) => CommandOutput::failed(1, e),
        };
        self.edits_in_flight.fetch_sub(1, Ordering::SeqCst);
        output
    }

    fn install(&self, command: &str) -> CommandOutput {
        let lines: Vec<&str> = command.lines().collect();
        let (Some(start), Some(end)) = (
            lines.iter().position(|l| l.starts_with("cat > ")),
            lines.iter().rposition(|l| *l == "__FLEETADM_EOF__"),
        ) else {
            return CommandOutput::failed(2, "fake host: bad heredoc");
        };
        let content = format!("{}\n", lines[start + 1..end].join("\n"));
        let cp = split(lines.get(end + 1).copied().unwrap_or_default());
        let Some((id, dest)) = cp.get(3).and_then(|t| t.split_once(':')) else {
            return CommandOutput::failed(2, "fake host: bad cp");
        };
        match self.state().container_mut(id) {
            Some(container) => {
                container.files.insert(dest.to_string(), content);
                CommandOutput::ok("")
            }
            None => CommandOutput::failed(1, format!("Error: No such container: {}", id)),
        }
    }

    fn ps(&self, args: &[&str]) -> CommandOutput {
        let all = args.contains(&"--all");
        let filter = args
            .iter()
            .position(|a| *a == "--filter")
            .and_then(|i| args.get(i + 1))
            .and_then(|f| f.strip_prefix("name="))
            .unwrap_or("");
        let ids: Vec<String> = self
            .state()
            .containers
            .iter()
            .filter(|c| c.name.contains(filter) && (all || c.started))
            .map(|c| format!("{}\n", c.id))
            .collect();
        CommandOutput::ok(ids.concat())
    }

    fn create(&self, args: &[&str]) -> CommandOutput {
        let mut container = Container::default();
        let mut i = 0;
        while i < args.len() {
            match args[i] {
                "--name" => container.name = args.get(i + 1).unwrap_or(&"").to_string(),
                "--entrypoint" => {}
                "--volume" => container.volumes.push(args.get(i + 1).unwrap_or(&"").to_string()),
                "--rm" => {
                    i += 1;
                    continue;
                }
                image => {
                    container.image = image.to_string();
                    container.args = args[i + 1..].iter().map(|a| a.to_string()).collect();
                    break;
                }
            }
            i += 2;
        }
        let mut state = self.state();
        if state.containers.iter().any(|c| c.name == container.name) {
            return CommandOutput::failed(
                125,
                format!("Error: the container name \"{}\" is already in use", container.name),
            );
        }
        let id = state.add_container(container);
        CommandOutput::ok(format!("{}\n", id))
    }

    fn start(&self, id: &str) -> CommandOutput {
        match self.state().container_mut(id) {
            Some(container) => {
                container.started = true;
                CommandOutput::ok(format!("{}\n", id))
            }
            None => CommandOutput::failed(1, format!("Error: No such container: {}", id)),
        }
    }

    fn exec(&self, id: &str, command: &[&str]) -> CommandOutput {
        match self.state().container_mut(id) {
            Some(container) if container.started => {
                container.execs.push(command.iter().map(|a| a.to_string()).collect());
                CommandOutput::ok("")
            }
            Some(_) => CommandOutput::failed(1, format!("Error: container {} is not running", id)),
            None => CommandOutput::failed(1, format!("Error: No such container: {}", id)),
        }
    }
}

impl RemoteExecutor for FakeHost {
    fn execute(&self, _host: &HostBinding, command: &str) -> Result<CommandOutput, TransportError> {
        self.state().commands.push(command.to_string());
        if let Some(output) = self.scripted(command) {
            return Ok(output);
        }
        if command.starts_with("tmp=$(mktemp)") {
            return Ok(self.install(command));
        }
        if let Some(rest) = command.strip_prefix("test -e ") {
            return Ok(self.copy_no_clobber(rest));
        }
        if command.starts_with("if [ -s ") {
            return Ok(self.append(command));
        }

        let words = split(command);
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        Ok(match words.as_slice() {
            ["blkid", .., device] => self.blkid(device),
            ["umount", target] => self.umount(target),
            ["mkdir", "-p", paths @ ..] => {
                self.state()
                    .directories
                    .extend(paths.iter().map(|p| p.to_string()));
                CommandOutput::ok("")
            }
            ["mkfs.ext4", "-F", device] => self.mkfs(device),
            ["mount", device, directory] => {
                self.state()
                    .mounts
                    .insert(device.to_string(), directory.to_string());
                CommandOutput::ok("")
            }
            ["sed", "-i", expression, file] => self.sed(expression, file),
            ["docker", "ps", args @ ..] => self.ps(args),
            ["docker", "pull", image] => {
                self.state().pulled.push(image.to_string());
                CommandOutput::ok("")
            }
            ["docker", "create", args @ ..] => self.create(args),
            ["docker", "start", id] => self.start(id),
            ["docker", "exec", id, rest @ ..] => self.exec(id, rest),
            _ => CommandOutput::failed(127, format!("fake host: unknown command: {}", command)),
        })
    }
}

/// Apply the subset of sed fleetadm emits: `$ a TEXT` or `/PAT/d;/PAT/d...`.
pub fn apply_sed(content: &str, expression: &str) -> Result<String, String> {
    if let Some(text) = expression.strip_prefix("$ a ") {
        let mut out = content.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(text);
        out.push('\n');
        return Ok(out);
    }
    let mut patterns = Vec::new();
    for command in expression.split(';') {
        let pattern = command
            .strip_prefix('/')
            .and_then(|c| c.strip_suffix("/d"))
            .ok_or_else(|| format!("sed: -e expression #1: unknown command: {}", command))?;
        patterns.push(pattern);
    }
    Ok(content
        .lines()
        .filter(|line| !patterns.iter().any(|p| line.contains(p)))
        .map(|line| format!("{}\n", line))
        .collect())
}

/// Split a command line into words the way a POSIX shell would for the
/// quoting fleetadm produces.
pub fn split(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    word.push(c);
                }
            }
            '"' => {
                in_word = true;
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    word.push(c);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    word.push(c);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

/// Number of fstab lines recording `uuid`.
pub fn records_for(fstab: &str, uuid: &str) -> usize {
    let needle = format!("UUID={}", uuid);
    fstab.lines().filter(|l| l.contains(&needle)).count()
}

pub fn inventory() -> Inventory {
    Inventory {
        hosts: vec![HostBinding::new("node1", "10.0.0.1", "curve")],
    }
}
