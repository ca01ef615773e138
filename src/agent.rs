//! The operations a remote controller drives: dump bytes, toggle deep search,
//! and scan for DEX files.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::config::{Config, ScanConfig};
use crate::error::{DumperError, Result};
use crate::memory::MemoryAccess;
use crate::scanner::{Candidate, DexScanner};

pub struct DexAgent<M> {
    mem: M,
    deep_search: AtomicBool,
    excluded_path_prefixes: Vec<String>,
    max_dump_size: u64,
}

impl<M: MemoryAccess> DexAgent<M> {
    pub fn new(mem: M) -> Self {
        Self::with_config(mem, &Config::default())
    }

    pub fn with_config(mem: M, cfg: &Config) -> Self {
        Self {
            mem,
            deep_search: AtomicBool::new(cfg.scan.deep_search),
            excluded_path_prefixes: cfg.scan.excluded_path_prefixes.clone(),
            max_dump_size: cfg.max_dump_size,
        }
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    /// Read `size` bytes at `address`.
    pub fn memorydump(&self, address: u64, size: u64) -> Result<Vec<u8>> {
        if size == 0 {
            return Err(DumperError::InvalidRequest("size must be non-zero".into()));
        }
        if address.checked_add(size).is_none() {
            return Err(DumperError::InvalidRequest(format!(
                "{address:#x} + {size:#x} overflows the address space"
            )));
        }
        if size > self.max_dump_size {
            return Err(DumperError::InvalidRequest(format!(
                "size {size:#x} exceeds the {:#x}-byte dump limit",
                self.max_dump_size
            )));
        }
        self.mem.read_vec(address, size as usize)
    }

    /// Enable or disable deep search for scans started after this call.
    pub fn switchmode(&self, enabled: bool) {
        self.deep_search.store(enabled, Ordering::SeqCst);
        info!(deep = enabled, "search mode switched");
    }

    pub fn is_deep_search(&self) -> bool {
        self.deep_search.load(Ordering::SeqCst)
    }

    /// Scan all readable regions with the mode in effect when the call starts.
    pub fn scandex(&self) -> Result<Vec<Candidate>> {
        let config = ScanConfig {
            deep_search: self.is_deep_search(),
            excluded_path_prefixes: self.excluded_path_prefixes.clone(),
        };
        DexScanner::new(&self.mem, &config)?.scan()
    }
}
