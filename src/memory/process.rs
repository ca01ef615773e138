use std::fs::File;
use std::os::unix::fs::FileExt;

use procfs::process::{MMPermissions, MMapPath, Process};
use tracing::debug;

use super::{MemoryAccess, MemoryRegion, Permissions};
use crate::error::{DumperError, Result};

/// Live view of another process through `/proc/<pid>/maps` and `/proc/<pid>/mem`.
pub struct ProcessMemory {
    pid: i32,
    mem: File,
}

impl ProcessMemory {
    pub fn open(pid: i32) -> Result<Self> {
        let path = format!("/proc/{pid}/mem");
        let mem = File::open(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                DumperError::PermissionDenied(format!("cannot open {path}"))
            }
            std::io::ErrorKind::NotFound => DumperError::ProcessNotFound(pid.to_string()),
            _ => DumperError::from_io_error(path.clone(), err),
        })?;
        Ok(Self { pid, mem })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }
}

impl From<MMPermissions> for Permissions {
    fn from(perms: MMPermissions) -> Self {
        Self {
            read: perms.contains(MMPermissions::READ),
            write: perms.contains(MMPermissions::WRITE),
            execute: perms.contains(MMPermissions::EXECUTE),
            shared: perms.contains(MMPermissions::SHARED),
        }
    }
}

impl MemoryAccess for ProcessMemory {
    fn readable_regions(&self) -> Result<Vec<MemoryRegion>> {
        let maps = Process::new(self.pid)
            .and_then(|p| p.maps())
            .map_err(|err| anyhow::anyhow!("reading /proc/{}/maps: {err}", self.pid))?;

        let mut regions = Vec::new();
        for map in maps {
            if !map.perms.contains(MMPermissions::READ) {
                continue;
            }
            let (start, end) = map.address;
            if end <= start {
                continue;
            }
            let path = match map.pathname {
                MMapPath::Path(p) => Some(p),
                _ => None,
            };
            regions.push(MemoryRegion {
                base: start,
                size: end - start,
                permissions: map.perms.into(),
                path,
            });
        }

        debug!(pid = self.pid, count = regions.len(), "enumerated readable regions");
        Ok(regions)
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        self.mem
            .read_exact_at(buf, addr)
            .map_err(|err| DumperError::unreadable(addr, len, err))
    }
}
