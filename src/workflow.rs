use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use procfs::process::{all_processes, Process};
use tracing::{debug, info, warn};

use crate::agent::DexAgent;
use crate::config::Config;
use crate::dex::{append_manifest, build_output_path, write_dump, ManifestEntry, DEX_MAGIC_PREFIX};
use crate::error::{DumperError, Result};
use crate::memory::{FrozenProcess, MemoryAccess, MemorySnapshot, ProcessMemory};
use crate::scanner::{Candidate, DexScanner};

/// A live process picked from the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub pid: i32,
    /// Package name, used to name dump files.
    pub label: String,
}

/// Accept either a pid or a package name as it appears in `cmdline[0]`.
pub fn resolve_target(target: &str) -> Result<Target> {
    if let Ok(pid) = target.parse::<i32>() {
        let process =
            Process::new(pid).map_err(|_| DumperError::ProcessNotFound(target.to_string()))?;
        let label = process
            .cmdline()
            .ok()
            .and_then(|cmdline| cmdline.into_iter().next())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| pid.to_string());
        return Ok(Target { pid, label });
    }

    match find_process_pid(target)? {
        Some(pid) => Ok(Target {
            pid,
            label: target.to_string(),
        }),
        None => Err(DumperError::ProcessNotFound(target.to_string())),
    }
}

/// Scan a live process and return its candidates.
pub fn run_scan_workflow(target: &Target, cfg: &Config) -> Result<Vec<Candidate>> {
    info!(pid = target.pid, label = %target.label, deep = cfg.scan.deep_search, "scanning");
    let mem = ProcessMemory::open(target.pid)?;
    let _frozen = freeze(target.pid, cfg)?;
    DexScanner::new(&mem, &cfg.scan)?.scan()
}

/// Scan a live process and write every candidate to `cfg.out_dir`.
pub fn run_dump_workflow(target: &Target, cfg: &Config) -> Result<Vec<PathBuf>> {
    info!(pid = target.pid, label = %target.label, deep = cfg.scan.deep_search, "dumping");
    let mem = ProcessMemory::open(target.pid)?;
    let _frozen = freeze(target.pid, cfg)?;
    let agent = DexAgent::with_config(mem, cfg);
    let candidates = agent.scandex()?;
    dump_candidates(&agent, target.pid, &target.label, &candidates, cfg)
}

/// Scan a raw memory image on disk, mapped at `base`.
pub fn run_file_workflow(path: &Path, base: u64, cfg: &Config) -> Result<Vec<Candidate>> {
    info!(path = %path.display(), base = %format_args!("{base:#x}"), "scanning file");
    let mem = MemorySnapshot::from_file(path, base)?;
    DexScanner::new(&mem, &cfg.scan)?.scan()
}

/// Write each candidate at least `min_dump_size` long and record it in the
/// manifest. A candidate that can no longer be read is skipped.
pub fn dump_candidates<M: MemoryAccess>(
    agent: &DexAgent<M>,
    pid: i32,
    label: &str,
    candidates: &[Candidate],
    cfg: &Config,
) -> Result<Vec<PathBuf>> {
    let regions = agent.memory().readable_regions()?;
    let mut written = Vec::new();

    for candidate in candidates {
        let Candidate { address, size } = *candidate;
        if size < cfg.min_dump_size {
            debug!("skipping {address:#x}: size {size:#x} below minimum");
            continue;
        }

        let data = match agent.memorydump(address, size) {
            Ok(data) => data,
            Err(err) => {
                warn!("failed to dump {address:#x} ({size:#x} bytes): {err}");
                continue;
            }
        };

        let out_path = build_output_path(label, &cfg.out_dir, address, size);
        write_dump(&out_path, &data)?;

        let region = regions
            .iter()
            .find(|r| r.base <= address && address < r.end())
            .map(|r| r.describe())
            .unwrap_or_default();
        append_manifest(
            &cfg.out_dir,
            &ManifestEntry {
                pid,
                address,
                size,
                magic_intact: data.starts_with(DEX_MAGIC_PREFIX),
                out_path: &out_path,
                region: &region,
            },
        )?;

        info!("[+] dex dump into {}", out_path.display());
        written.push(out_path);
    }

    Ok(written)
}

fn freeze(pid: i32, cfg: &Config) -> Result<Option<FrozenProcess>> {
    if !cfg.freeze {
        return Ok(None);
    }
    let tid = find_clone_thread(pid)?.unwrap_or(pid);
    debug!(pid, tid, "freezing target");
    FrozenProcess::attach(tid).map(Some)
}

fn find_process_pid(package_name: &str) -> Result<Option<i32>> {
    let own_pid = std::process::id() as i32;
    for process in all_processes().context("iterating over /proc")?.flatten() {
        if process.pid == own_pid {
            continue;
        }
        if let Ok(cmdline) = process.cmdline() {
            if cmdline.first().map(String::as_str) == Some(package_name) {
                return Ok(Some(process.pid));
            }
        }
    }
    Ok(None)
}

/// The newest thread of `pid`; attaching there avoids the main thread that
/// anti-debug checks usually watch.
fn find_clone_thread(pid: i32) -> Result<Option<i32>> {
    let task_dir = format!("/proc/{pid}/task");
    let entries =
        fs::read_dir(&task_dir).map_err(|err| DumperError::from_io_error(task_dir.clone(), err))?;

    Ok(entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .filter(|tid| *tid > 0)
        .max())
}
