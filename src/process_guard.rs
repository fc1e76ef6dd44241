//! Lifecycle of spawned `ssh`/`bash` children.
//!
//! A remote command killed halfway (mkfs, sed -i) is bad; one that keeps
//! running after fleetadm itself died is worse, because nobody will report
//! its outcome. Every child is therefore started in its own process group,
//! tied to the parent with `PR_SET_PDEATHSIG`, and tracked in a global
//! registry that the signal handler drains on SIGINT/SIGTERM/SIGHUP.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Process groups of children that are still running.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pgids: HashSet<u32>,
    shutting_down: bool,
}

impl ChildRegistry {
    pub fn global() -> &'static Mutex<ChildRegistry> {
        CHILD_REGISTRY.get_or_init(|| Mutex::new(ChildRegistry::default()))
    }

    pub fn register(&mut self, pid: u32) {
        self.pgids.insert(pid);
        debug!(pid, "registered child");
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pgids.remove(&pid);
        debug!(pid, "unregistered child");
    }

    pub fn count(&self) -> usize {
        self.pgids.len()
    }

    /// SIGTERM every tracked group, wait up to `grace`, then SIGKILL survivors.
    ///
    /// Runs once; later calls are no-ops.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        if self.pgids.is_empty() {
            return;
        }

        let pgids: Vec<u32> = self.pgids.drain().collect();
        info!(count = pgids.len(), "terminating remote command children");
        for &pgid in &pgids {
            signal_group(pgid, Signal::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if pgids.iter().all(|&pid| !is_alive(pid)) {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pgid in pgids.iter().filter(|&&pid| is_alive(pid)) {
            warn!(pgid, "child ignored SIGTERM, sending SIGKILL");
            signal_group(pgid, Signal::SIGKILL);
        }
    }
}

fn signal_group(pgid: u32, sig: Signal) {
    // Negative pid addresses the whole group; fall back to the leader alone.
    if signal::kill(Pid::from_raw(-(pgid as i32)), sig).is_err() {
        if let Err(e) = signal::kill(Pid::from_raw(pgid as i32), sig) {
            debug!(pgid, error = %e, "signal delivery failed");
        }
    }
}

/// Alive means the pid exists and is not a zombie.
fn is_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // Field 3 is the state letter
        Ok(stat) => !matches!(stat.split_whitespace().nth(2), Some("Z") | Some("X")),
        Err(_) => true,
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that kill children and exit `128 + signo`.
pub fn init_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "received signal, stopping remote commands");
            ChildRegistry::global()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .terminate_all(Duration::from_secs(3));
            std::process::exit(128 + sig);
        }
    });
    Ok(())
}

/// Extension for `std::process::Command`: start the child as a group leader
/// that receives SIGTERM when fleetadm dies.
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the hook only calls async-signal-safe functions (setpgid, prctl).
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::from)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
