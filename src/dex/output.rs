//! Dump file output and manifest management

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::OUTPUT_SUFFIX;
use crate::error::{DumperError, Result};

const MANIFEST_NAME: &str = "dump_manifest.csv";

/// Build output file path for a dumped candidate
///
/// # Returns
/// Path in format: `{out_dir}/{label}_dumped_{address:x}_{size:x}.dex`
///
/// The size is part of the name because the same address can be dumped twice,
/// once at its recovered size and once at the region's remaining length.
pub fn build_output_path(label: &str, out_dir: &Path, address: u64, size: u64) -> PathBuf {
    let label = label.replace(['/', '\\'], "_");
    out_dir.join(format!("{label}{OUTPUT_SUFFIX}{address:x}_{size:x}.dex"))
}

/// Write dump data to file, creating parent directories and overwriting any
/// existing file
pub fn write_dump(path: &Path, data: &[u8]) -> Result<()> {
    let io_err = |err| DumperError::from_io_error(path.display().to_string(), err);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(data).map_err(io_err)?;
    Ok(())
}

/// One line of `dump_manifest.csv`.
pub struct ManifestEntry<'a> {
    pub pid: i32,
    pub address: u64,
    pub size: u64,
    /// Whether the dump still begins with `"dex\n"`.
    pub magic_intact: bool,
    pub out_path: &'a Path,
    /// Backing path of the region the candidate was found in.
    pub region: &'a str,
}

/// Append dump information to the CSV manifest in `out_dir`
///
/// # CSV Format
/// ```text
/// {pid},{address:#x},{size},{magic_intact},"{out_path}","{region}"
/// ```
///
/// Double quotes inside the quoted fields are written as single quotes.
pub fn append_manifest(out_dir: &Path, entry: &ManifestEntry<'_>) -> Result<()> {
    let manifest = out_dir.join(MANIFEST_NAME);
    let io_err = |err| DumperError::from_io_error(manifest.display().to_string(), err);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&manifest)
        .map_err(io_err)?;

    writeln!(
        file,
        "{},{:#x},{},{},\"{}\",\"{}\"",
        entry.pid,
        entry.address,
        entry.size,
        entry.magic_intact,
        entry.out_path.display().to_string().replace('"', "'"),
        entry.region.replace('"', "'")
    )
    .map_err(io_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_output_path() {
        let out_dir = PathBuf::from("/tmp");
        let path = build_output_path("com.example", &out_dir, 0xDEADBEEF, 0x924);

        let filename = path.file_name().unwrap().to_string_lossy();
        assert_eq!(filename, "com.example_dumped_deadbeef_924.dex");
    }

    #[test]
    fn test_build_output_path_sanitizes_label() {
        let path = build_output_path("/tmp/heap.bin", Path::new("/out"), 0x10, 0x70);
        assert_eq!(path, PathBuf::from("/out/_tmp_heap.bin_dumped_10_70.dex"));
    }

    #[test]
    fn test_write_dump_creates_parent() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("subdir").join("test.dex");

        write_dump(&path, b"dex\n035\0test data")?;
        assert_eq!(fs::read(&path).unwrap(), b"dex\n035\0test data");

        Ok(())
    }

    #[test]
    fn test_append_manifest() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let out_path = PathBuf::from("/data/out.dex");

        for address in [0xDEADBEEFu64, 0x1000] {
            append_manifest(
                temp.path(),
                &ManifestEntry {
                    pid: 12345,
                    address,
                    size: 1024,
                    magic_intact: false,
                    out_path: &out_path,
                    region: "/dev/ashmem/\"dalvik\"",
                },
            )?;
        }

        let contents = fs::read_to_string(temp.path().join(MANIFEST_NAME)).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "12345,0xdeadbeef,1024,false,\"/data/out.dex\",\"/dev/ashmem/'dalvik'\""
        );

        Ok(())
    }

    #[test]
    fn test_append_manifest_quotes_in_label() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let out_path = build_output_path("com.\"evil\",app", temp.path(), 0x70, 0x70);

        append_manifest(
            temp.path(),
            &ManifestEntry {
                pid: 1,
                address: 0x70,
                size: 0x70,
                magic_intact: true,
                out_path: &out_path,
                region: "[anon]",
            },
        )?;

        let contents = fs::read_to_string(temp.path().join(MANIFEST_NAME)).unwrap();
        let line = contents.trim_end();
        assert_eq!(line.matches('"').count(), 4, "{line}");
        assert!(line.contains("com.'evil',app_dumped_70_70.dex\""));
        assert!(line.ends_with(",\"[anon]\""));

        Ok(())
    }
}
