//! Operator control channel and session ownership.
//!
//! Operator commands run as separate short-lived processes, so they talk to
//! the loop through sentinel files under `.warden/control/`. The loop polls
//! them into a [`ControlRequest`] at iteration boundaries only; an in-flight
//! agent call is never interrupted.
//!
//! Ownership: exactly one live process may mutate a session's state. The
//! owner records its pid in `.warden/state/owner.pid`; starting or resuming
//! checks that any recorded owner is dead before taking over. A dead owner
//! with a non-terminal session reads as `Crashed` from the outside.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::io::layout::WardenPaths;

/// Snapshot of pending operator requests at a loop checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlRequest {
    pub pause: bool,
    pub abort: bool,
}

impl ControlRequest {
    pub fn any(self) -> bool {
        self.pause || self.abort
    }
}

/// Cancellation token the loop checks at iteration boundaries.
///
/// The loop never knows where requests come from; the CLI backs this with
/// sentinel files, embedders and tests can back it with in-process flags.
pub trait ControlToken {
    fn check(&self) -> ControlRequest;
}

/// Token backed by the operator sentinel files.
#[derive(Debug, Clone)]
pub struct SentinelControl {
    paths: WardenPaths,
}

impl SentinelControl {
    pub fn new(paths: WardenPaths) -> Self {
        Self { paths }
    }
}

impl ControlToken for SentinelControl {
    fn check(&self) -> ControlRequest {
        poll_control(&self.paths)
    }
}

/// In-process token for embedding the loop without a filesystem channel.
#[derive(Debug, Default)]
pub struct ManualControl {
    pause: std::sync::atomic::AtomicBool,
    abort: std::sync::atomic::AtomicBool,
}

impl ManualControl {
    pub fn request_pause(&self) {
        self.pause.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn request_abort(&self) {
        self.abort.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl ControlToken for ManualControl {
    fn check(&self) -> ControlRequest {
        ControlRequest {
            pause: self.pause.load(std::sync::atomic::Ordering::SeqCst),
            abort: self.abort.load(std::sync::atomic::Ordering::SeqCst),
        }
    }
}

/// Read the sentinels without consuming them.
pub fn poll_control(paths: &WardenPaths) -> ControlRequest {
    ControlRequest {
        pause: paths.pause_sentinel_path.exists(),
        abort: paths.abort_sentinel_path.exists(),
    }
}

/// Drop a pause sentinel for the owning loop to honor at its next boundary.
pub fn request_pause(paths: &WardenPaths) -> Result<()> {
    write_sentinel(&paths.pause_sentinel_path)
}

/// Drop an abort sentinel.
pub fn request_abort(paths: &WardenPaths) -> Result<()> {
    write_sentinel(&paths.abort_sentinel_path)
}

/// Remove any pending sentinels (done by `resume` and at loop start).
pub fn clear_control(paths: &WardenPaths) -> Result<()> {
    for sentinel in [&paths.pause_sentinel_path, &paths.abort_sentinel_path] {
        if sentinel.exists() {
            fs::remove_file(sentinel)
                .with_context(|| format!("remove sentinel {}", sentinel.display()))?;
        }
    }
    Ok(())
}

fn write_sentinel(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create control dir {}", parent.display()))?;
    }
    fs::write(path, "").with_context(|| format!("write sentinel {}", path.display()))
}

/// Exclusive claim on a session's persisted state, released on drop.
#[derive(Debug)]
pub struct OwnerLock {
    pid_path: PathBuf,
}

impl OwnerLock {
    /// Claim ownership, refusing while another recorded owner is alive.
    /// A stale pid (dead process) is replaced silently.
    pub fn acquire(paths: &WardenPaths) -> Result<Self> {
        let pid_path = paths.owner_pid_path.clone();
        let own_pid = std::process::id();

        if let Some(existing) = read_owner_pid(&pid_path)? {
            if existing != own_pid && pid_alive(existing) {
                return Err(anyhow!(
                    "session state is owned by live process {existing} (pause or stop it first)"
                ));
            }
            if existing != own_pid {
                warn!(stale_pid = existing, "replacing dead session owner");
            }
        }

        if let Some(parent) = pid_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create state dir {}", parent.display()))?;
        }
        fs::write(&pid_path, format!("{own_pid}\n"))
            .with_context(|| format!("write owner pid {}", pid_path.display()))?;
        debug!(pid = own_pid, "claimed session ownership");
        Ok(Self { pid_path })
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.pid_path) {
            warn!(path = %self.pid_path.display(), %err, "failed to release owner pid");
        }
    }
}

/// Whether a previously recorded owner is still running. No recorded owner
/// counts as dead.
pub fn owner_alive(paths: &WardenPaths) -> Result<bool> {
    match read_owner_pid(&paths.owner_pid_path)? {
        Some(pid) => Ok(pid_alive(pid)),
        None => Ok(false),
    }
}

fn read_owner_pid(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read owner pid {}", path.display()))?;
    match contents.trim().parse::<u32>() {
        Ok(pid) => Ok(Some(pid)),
        // An unreadable pid file cannot prove a live owner; treat as stale.
        Err(_) => Ok(None),
    }
}

#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    // Without a portable liveness probe, assume stale; the atomic state
    // writes keep a rare double-start from corrupting the record.
    false
}
