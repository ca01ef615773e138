use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::{DumperError, Result};

/// Keeps the target stopped under ptrace so a scan sees one consistent image.
///
/// Only the attached thread is stopped; the target's other threads keep running.
pub struct FrozenProcess {
    pid: Pid,
    attached: bool,
}

impl FrozenProcess {
    pub fn attach(tid: i32) -> Result<Self> {
        let pid = Pid::from_raw(tid);
        ptrace::attach(pid).map_err(|source| DumperError::AttachFailed { pid: tid, source })?;
        match waitpid(pid, None) {
            Ok(WaitStatus::Stopped(_, _)) => {
                debug!(tid, "target stopped");
                Ok(Self {
                    pid,
                    attached: true,
                })
            }
            Ok(other) => {
                let _ = ptrace::detach(pid, None);
                Err(anyhow::anyhow!("unexpected wait status for {tid}: {other:?}").into())
            }
            Err(source) => Err(DumperError::AttachFailed { pid: tid, source }),
        }
    }

    pub fn detach(&mut self) {
        if self.attached {
            if let Err(err) = ptrace::detach(self.pid, None) {
                warn!(tid = self.pid.as_raw(), %err, "ptrace detach failed");
            }
            self.attached = false;
        }
    }
}

impl Drop for FrozenProcess {
    fn drop(&mut self) {
        self.detach();
    }
}
