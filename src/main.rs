use anyhow::{bail, Result};
use clap::Parser;
use dexdump::cli::{Cli, Commands};
use dexdump::memory::ProcessMemory;
use dexdump::{
    resolve_target, run_dump_workflow, run_file_workflow, run_rpc_server, run_scan_workflow,
    Candidate, DexAgent, DumperError,
};
use nix::unistd::getuid;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Logs go to stderr so `--json` output stays machine-readable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    eprintln!("[>>>]  This is dexdump {} [<<<]", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(opts) => {
            require_root()?;
            let cfg = opts.to_config();
            let target = resolve_target(&opts.target).map_err(report)?;
            let found = run_scan_workflow(&target, &cfg).map_err(report)?;
            print_candidates(&found, opts.json)
        }
        Commands::Dump(opts) => {
            require_root()?;
            let cfg = opts.to_config();
            let target = resolve_target(&opts.target).map_err(report)?;
            let written = run_dump_workflow(&target, &cfg).map_err(report)?;
            if written.is_empty() {
                println!("[*]  The magic was Not Found!");
            } else {
                for path in &written {
                    println!("[+]  dex dump into {}", path.display());
                }
                println!("[*]  Done.");
            }
            Ok(())
        }
        Commands::ScanFile(opts) => {
            let found = run_file_workflow(&opts.file, opts.base, &opts.to_config()).map_err(report)?;
            print_candidates(&found, opts.json)
        }
        Commands::Serve(opts) => {
            require_root()?;
            let cfg = opts.to_config();
            let target = resolve_target(&opts.target).map_err(report)?;
            let mem = ProcessMemory::open(target.pid).map_err(report)?;
            println!("[*]  Target pid is {}", mem.pid());
            run_rpc_server(DexAgent::with_config(mem, &cfg), &opts.bind)
        }
    }
}

fn require_root() -> Result<()> {
    if !getuid().is_root() {
        bail!("[*]  Device Not root! Reading another process's memory needs root.");
    }
    Ok(())
}

fn report(err: DumperError) -> anyhow::Error {
    if err.is_permission_error() || err.is_recoverable() {
        eprintln!("[!]  {}", err.user_message());
    }
    err.into()
}

fn print_candidates(found: &[Candidate], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(found)?);
        return Ok(());
    }
    if found.is_empty() {
        println!("[*]  The magic was Not Found!");
    }
    for candidate in found {
        println!(
            "[+]  dex at {:#x}, size {:#x}",
            candidate.address, candidate.size
        );
    }
    Ok(())
}
