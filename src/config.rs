use std::path::PathBuf;

pub const DEFAULT_OUT_DIR: &str = "/data/local/tmp/";
pub const OUTPUT_SUFFIX: &str = "_dumped_";
pub const DEFAULT_BIND: &str = "127.0.0.1:45832";
pub const DEFAULT_MAX_DUMP_SIZE: u64 = 512 * 1024 * 1024;
pub const API_TOKEN_ENV: &str = "DEXDUMP_API_TOKEN";

/// Mappings backed by these paths hold DEX files the platform loaded from disk.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &["/data/dalvik-cache/", "/system/"];

/// Options read once at the start of a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    /// Also anchor on the bare `string_ids_off == 0x70` field and emit
    /// maximum-size fallback candidates.
    pub deep_search: bool,
    /// Regions whose backing path starts with any of these are skipped.
    pub excluded_path_prefixes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            deep_search: false,
            excluded_path_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub scan: ScanConfig,
    pub out_dir: PathBuf,
    pub min_dump_size: u64,
    pub max_dump_size: u64,
    /// Stop the target with ptrace while it is scanned.
    pub freeze: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            min_dump_size: crate::dex::HEADER_SIZE,
            max_dump_size: DEFAULT_MAX_DUMP_SIZE,
            freeze: false,
        }
    }
}
