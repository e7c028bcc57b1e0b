//! Selection of stale kernels under `/boot`.
//!
//! Only the newest `vmlinuz-*` and its matching `initrd.img-*` are shipped in
//! an update image.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const VMLINUZ: &str = "vmlinuz-";
const INITRD: &str = "initrd.img-";

/// Numeric components of a kernel release, `5.15.0-64-generic` is `[5, 15, 0, 64]`.
fn version_key(release: &str) -> Vec<u64> {
    release
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

fn compare_releases(a: &str, b: &str) -> Ordering {
    version_key(a).cmp(&version_key(b)).then_with(|| a.cmp(b))
}

fn boot_entries(boot_dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    let read_dir = match fs::read_dir(boot_dir) {
        Ok(ok) => ok,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(entries),
        Err(err) => return Err(err),
    };
    for entry_res in read_dir {
        let entry = entry_res?;
        if let Some(name) = entry.file_name().to_str() {
            entries.push((name.to_string(), entry.path()));
        }
    }
    Ok(entries)
}

/// Returns the `vmlinuz-*` entry with the highest version.
pub fn latest_kernel(boot_dir: &Path) -> io::Result<Option<PathBuf>> {
    let latest = boot_entries(boot_dir)?
        .into_iter()
        .filter(|(name, _)| name.starts_with(VMLINUZ))
        .max_by(|(a, _), (b, _)| compare_releases(&a[VMLINUZ.len()..], &b[VMLINUZ.len()..]))
        .map(|(_, path)| path);
    Ok(latest)
}

/// Lists every kernel and initrd that does not belong to the latest kernel.
pub fn non_latest_kernels(boot_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let latest = match latest_kernel(boot_dir)? {
        Some(some) => some,
        None => return Ok(Vec::new()),
    };
    let latest_release = latest
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(VMLINUZ))
        .unwrap_or_default()
        .to_string();

    let mut stale = Vec::new();
    for (name, path) in boot_entries(boot_dir)? {
        let release = name
            .strip_prefix(VMLINUZ)
            .or_else(|| name.strip_prefix(INITRD));
        if let Some(release) = release {
            if release != latest_release {
                stale.push(path);
            }
        }
    }
    stale.sort();
    Ok(stale)
}
