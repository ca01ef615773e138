use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{Config, DEFAULT_BIND};
use crate::dex::HEADER_SIZE;

#[derive(Parser, Debug)]
#[command(
    name = "dexdump",
    about = "Recover in-memory DEX files from Android processes",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List DEX candidates in a running process.
    Scan(ScanCommand),
    /// Write every DEX candidate of a running process to disk.
    Dump(DumpCommand),
    /// List DEX candidates in a raw memory image.
    ScanFile(ScanFileCommand),
    /// Serve memorydump/switchmode/scandex over HTTP for one process.
    Serve(ServeCommand),
}

/// Options shared by every command that scans.
#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Also find headers whose magic was erased, and offer region-sized dumps.
    #[arg(long, action = ArgAction::SetTrue)]
    pub deep: bool,

    /// Skip regions whose path starts with PREFIX (repeatable; replaces the defaults).
    #[arg(long = "exclude-prefix", value_name = "PREFIX")]
    pub exclude_prefix: Vec<String>,

    /// Scan /system/ and /data/dalvik-cache/ mappings too.
    #[arg(long = "no-default-excludes", action = ArgAction::SetTrue)]
    pub no_default_excludes: bool,
}

impl SearchArgs {
    fn apply(&self, cfg: &mut Config) {
        cfg.scan.deep_search = self.deep;
        if !self.exclude_prefix.is_empty() {
            cfg.scan.excluded_path_prefixes = self.exclude_prefix.clone();
        } else if self.no_default_excludes {
            cfg.scan.excluded_path_prefixes.clear();
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScanCommand {
    /// Package name or pid.
    pub target: String,

    #[command(flatten)]
    pub search: SearchArgs,

    /// Stop the target with ptrace while scanning.
    #[arg(long, action = ArgAction::SetTrue)]
    pub freeze: bool,

    /// Print candidates as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,
}

impl ScanCommand {
    pub fn to_config(&self) -> Config {
        let mut cfg = Config::default();
        self.search.apply(&mut cfg);
        cfg.freeze = self.freeze;
        cfg
    }
}

#[derive(Args, Debug, Clone)]
pub struct DumpCommand {
    /// Package name or pid.
    pub target: String,

    #[command(flatten)]
    pub search: SearchArgs,

    /// Stop the target with ptrace while scanning and dumping.
    #[arg(long, action = ArgAction::SetTrue)]
    pub freeze: bool,

    /// Output directory for dumped files.
    #[arg(long = "out", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Skip candidates smaller than this (at least one header).
    #[arg(long = "min-dump-size", value_name = "BYTES", value_parser = parse_number)]
    pub min_dump_size: Option<u64>,
}

impl DumpCommand {
    pub fn to_config(&self) -> Config {
        let mut cfg = Config::default();
        self.search.apply(&mut cfg);
        cfg.freeze = self.freeze;
        if let Some(dir) = &self.out_dir {
            cfg.out_dir = dir.clone();
        }
        if let Some(min_dump) = self.min_dump_size {
            cfg.min_dump_size = min_dump.max(HEADER_SIZE);
        }
        cfg
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScanFileCommand {
    /// Raw memory image to scan.
    pub file: PathBuf,

    /// Address the first byte of FILE was mapped at.
    #[arg(long, value_name = "ADDR", value_parser = parse_number, default_value = "0")]
    pub base: u64,

    #[command(flatten)]
    pub search: SearchArgs,

    /// Print candidates as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,
}

impl ScanFileCommand {
    pub fn to_config(&self) -> Config {
        let mut cfg = Config::default();
        self.search.apply(&mut cfg);
        cfg
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeCommand {
    /// Package name or pid.
    pub target: String,

    /// Address to bind.
    #[arg(value_name = "BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    #[command(flatten)]
    pub search: SearchArgs,

    /// Largest range a single memorydump call may read.
    #[arg(long = "max-dump-size", value_name = "BYTES", value_parser = parse_number)]
    pub max_dump_size: Option<u64>,
}

impl ServeCommand {
    pub fn to_config(&self) -> Config {
        let mut cfg = Config::default();
        self.search.apply(&mut cfg);
        if let Some(max) = self.max_dump_size {
            cfg.max_dump_size = max;
        }
        cfg
    }
}

/// Decimal, or hex with a `0x` prefix.
fn parse_number(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|err| format!("invalid number `{value}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::DEFAULT_EXCLUDED_PREFIXES;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["dexdump"];
        argv.extend(args);
        Cli::try_parse_from(&argv).expect("parse command").command
    }

    fn parse_dump(args: &[&str]) -> (DumpCommand, Config) {
        let mut argv = vec!["dump"];
        argv.extend(args);
        match parse(&argv) {
            Commands::Dump(cmd) => {
                let cfg = cmd.to_config();
                (cmd, cfg)
            }
            other => panic!("expected dump command, got {other:?}"),
        }
    }

    #[test]
    fn dump_options_map_into_config() {
        let (cmd, cfg) = parse_dump(&[
            "com.example.app",
            "--deep",
            "--freeze",
            "--out",
            "/tmp/out",
            "--min-dump-size",
            "0x200",
        ]);

        assert_eq!(cmd.target, "com.example.app");
        assert!(cfg.scan.deep_search);
        assert!(cfg.freeze);
        assert_eq!(cfg.out_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cfg.min_dump_size, 0x200);
        assert_eq!(cfg.scan.excluded_path_prefixes, DEFAULT_EXCLUDED_PREFIXES);
    }

    #[test]
    fn min_dump_size_is_at_least_a_header() {
        let (_, cfg) = parse_dump(&["1234", "--min-dump-size", "16"]);
        assert_eq!(cfg.min_dump_size, 0x70);
    }

    #[test]
    fn exclude_prefix_replaces_defaults() {
        let (_, cfg) = parse_dump(&[
            "app",
            "--exclude-prefix",
            "/vendor/",
            "--exclude-prefix",
            "/apex/",
        ]);
        assert_eq!(cfg.scan.excluded_path_prefixes, vec!["/vendor/", "/apex/"]);

        let (_, cfg) = parse_dump(&["app", "--no-default-excludes"]);
        assert!(cfg.scan.excluded_path_prefixes.is_empty());
    }

    #[test]
    fn scan_file_accepts_hex_base() {
        match parse(&["scan-file", "/tmp/heap.bin", "--base", "0x7f000000", "--json"]) {
            Commands::ScanFile(cmd) => {
                assert_eq!(cmd.file, PathBuf::from("/tmp/heap.bin"));
                assert_eq!(cmd.base, 0x7f00_0000);
                assert!(cmd.json);
                assert!(!cmd.to_config().scan.deep_search);
            }
            other => panic!("expected scan-file command, got {other:?}"),
        }
    }

    #[test]
    fn serve_defaults_to_loopback() {
        match parse(&["serve", "com.example.app"]) {
            Commands::Serve(cmd) => {
                assert_eq!(cmd.bind, "127.0.0.1:45832");
                assert_eq!(cmd.to_config().max_dump_size, 512 * 1024 * 1024);
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn freeze_is_limited_to_scan_and_dump() {
        assert!(Cli::try_parse_from(["dexdump", "serve", "app", "--freeze"]).is_err());
        assert!(Cli::try_parse_from(["dexdump", "scan-file", "heap.bin", "--freeze"]).is_err());
        assert!(Cli::try_parse_from(["dexdump", "scan", "app", "--freeze"]).is_ok());
    }

    #[test]
    fn scan_flags() {
        match parse(&["scan", "4321", "--deep", "--json"]) {
            Commands::Scan(cmd) => {
                assert!(cmd.json);
                let cfg = cmd.to_config();
                assert!(cfg.scan.deep_search);
                assert!(!cfg.freeze);
            }
            other => panic!("expected scan command, got {other:?}"),
        }
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert_eq!(parse_number("4096"), Ok(4096));
        assert_eq!(parse_number("0X1f"), Ok(0x1f));
        assert!(parse_number("0xzz").is_err());
        assert!(parse_number("-1").is_err());
    }
}
