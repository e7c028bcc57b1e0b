use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use crate::config;
use crate::error::{Error, IoContext, Result};

/// Unpacks a gzip compressed tar archive into `p`.
#[cfg(test)]
pub(crate) fn extract<R: Read, P: AsRef<Path>>(data: R, p: P) -> io::Result<()> {
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(data));
    tar.set_preserve_permissions(true);

    for file_res in tar.entries()? {
        let mut file = file_res?;

        tracing::debug!("{:?}", file.path());
        if !file.unpack_in(&p)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid file path {:?}", file.path()),
            ));
        }
    }

    Ok(())
}

pub fn sha256(input: &[u8]) -> String {
    format!("{:x}", Sha256::digest(input))
}

/// Hashes a file without reading it into memory at once.
pub fn file_sha256<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).at(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0; config::HASH_CHUNK_SIZE];
    loop {
        let count = file.read(&mut buf).at(path)?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Removes a file, symlink or directory tree.
///
/// Returns `false` if nothing existed at `path`.
pub fn remove_path<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path) {
        Ok(ok) => ok,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err).at(path),
    };

    tracing::debug!("removing {}", path.display());
    if metadata.is_dir() {
        fs::remove_dir_all(path).at(path)?;
    } else {
        fs::remove_file(path).at(path)?;
    }
    Ok(true)
}

/// Lexically normalizes a path, resolving `.` and `..` without touching the
/// filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !path.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Joins an absolute or `./` relative metadata path below `base`.
///
/// Paths with `..` components are refused so the result stays below `base`.
pub fn join_under(base: &Path, path: &Path) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => (),
            Component::ParentDir => return Err(Error::UnsafePath(path.to_owned())),
            Component::Normal(name) => relative.push(name),
        }
    }
    Ok(base.join(relative))
}
