//! Identity of the process working on a submission.
//!
//! Snapshots carry their owner so that a second process sharing the store
//! can tell an upload that is still running elsewhere from one whose
//! process died.

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};

/// A process, identified by pid and start time so a reused pid does not
/// pass for the original owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOwner {
    pub pid: u32,
    /// Seconds since the epoch, as reported by the OS. 0 when unknown.
    #[serde(default)]
    pub started_at: u64,
}

impl ProcessOwner {
    /// The current process.
    pub fn current() -> Self {
        let pid = std::process::id();
        let started_at = process_start_time(pid).unwrap_or(0);
        Self { pid, started_at }
    }

    /// Whether the owning process is still running.
    pub fn is_alive(&self) -> bool {
        match process_start_time(self.pid) {
            Some(started_at) => self.started_at == 0 || started_at == self.started_at,
            None => false,
        }
    }
}

fn process_start_time(pid: u32) -> Option<u64> {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return None;
    }
    system.process(pid).map(|p| p.start_time())
}
