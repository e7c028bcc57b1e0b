//! Rebuilds a rootfs from metadata listings and a flat copy of its files.

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::{self, Permissions};
use std::os::unix::fs::{chown, lchown, symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::entry::{parse_lines, DirectoryEntry, RegularEntry, SymlinkEntry};
use crate::error::{Error, IoContext, Result};
use crate::util;

/// Listings that describe the rootfs to rebuild.
#[derive(Clone, Debug)]
pub struct Listings {
    pub directory_file: PathBuf,
    pub symlink_file: PathBuf,
    pub regular_file: PathBuf,
}

fn read_listing<T: FromStr<Err = Error>>(path: &Path) -> Result<Vec<T>> {
    let text = fs::read_to_string(path).at(path)?;
    parse_lines(&text)
}

fn progress_bar(enabled: bool, len: usize, message: &'static str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg:12} [{bar:40}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    Some(bar)
}

fn set_owner_mode(path: &Path, uid: u32, gid: u32, mode: u32) -> Result<()> {
    chown(path, Some(uid), Some(gid)).at(path)?;
    fs::set_permissions(path, Permissions::from_mode(mode)).at(path)
}

fn create_dirs(dst: &Path, entries: &[DirectoryEntry], progress: bool) -> Result<()> {
    let bar = progress_bar(progress, entries.len(), "directories");
    for entry in entries {
        let path = util::join_under(dst, &entry.path)?;
        fs::create_dir_all(&path).at(&path)?;
        set_owner_mode(&path, entry.uid, entry.gid, entry.mode)?;
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    if let Some(bar) = bar {
        bar.finish();
    }
    Ok(())
}

fn create_symlinks(dst: &Path, entries: &[SymlinkEntry], progress: bool) -> Result<()> {
    let bar = progress_bar(progress, entries.len(), "symlinks");
    for entry in entries {
        let path = util::join_under(dst, &entry.link)?;
        symlink(&entry.target, &path).at(&path)?;
        // Link permissions are always 0777 on Linux.
        lchown(&path, Some(entry.uid), Some(entry.gid)).at(&path)?;
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    if let Some(bar) = bar {
        bar.finish();
    }
    Ok(())
}

fn copy_regulars(dst: &Path, src: &Path, entries: &[RegularEntry], progress: bool) -> Result<()> {
    let bar = progress_bar(progress, entries.len(), "regulars");
    let mut links: HashMap<String, PathBuf> = HashMap::new();
    for entry in entries {
        let key = entry.link_key();
        let path = util::join_under(dst, &entry.path)?;
        match links.get(&key) {
            Some(first) => {
                debug!("link {} -> {}", path.display(), first.display());
                fs::hard_link(first, &path).at(&path)?;
            }
            None => {
                let from = util::join_under(src, &entry.path)?;
                fs::copy(&from, &path).at(&from)?;
                set_owner_mode(&path, entry.uid, entry.gid, entry.mode)?;
                if entry.nlink >= 2 {
                    links.insert(key, path);
                }
            }
        }
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    if let Some(bar) = bar {
        bar.finish();
    }
    Ok(())
}

/// Recreates directories, symlinks and regular files under `dst`, taking file
/// contents from `src`.
///
/// `dst` must differ from `src` and be empty or absent.
pub fn rebuild(dst: &Path, src: &Path, listings: &Listings, progress: bool) -> Result<()> {
    let dst = util::normalize(dst);
    let src = util::normalize(src);
    if dst == src {
        return Err(Error::SameDirectory(dst, src));
    }

    fs::create_dir_all(&dst).at(&dst)?;
    if fs::read_dir(&dst).at(&dst)?.next().is_some() {
        return Err(Error::NotEmpty(dst));
    }

    let dirs: Vec<DirectoryEntry> = read_listing(&listings.directory_file)?;
    let symlinks: Vec<SymlinkEntry> = read_listing(&listings.symlink_file)?;
    let regulars: Vec<RegularEntry> = read_listing(&listings.regular_file)?;

    create_dirs(&dst, &dirs, progress)?;
    create_symlinks(&dst, &symlinks, progress)?;
    copy_regulars(&dst, &src, &regulars, progress)?;

    info!(
        "rebuilt {}: {} directories, {} symlinks, {} regular files",
        dst.display(),
        dirs.len(),
        symlinks.len(),
        regulars.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        src: PathBuf,
        listings: Listings,
    }

    fn fixture(dirs: &[&str], symlinks: &[&str], regulars: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_owned();
        let src = root.join("src");
        fs::create_dir_all(src.join("etc")).unwrap();
        fs::write(src.join("file1.txt"), "test content 1").unwrap();
        fs::write(src.join("etc").join("hosts"), "127.0.0.1 localhost").unwrap();

        let meta = fs::metadata(&root).unwrap();
        let owner = format!("{},{}", meta.uid(), meta.gid());
        let write = |name: &str, lines: &[&str]| {
            let path = root.join(name);
            let text: Vec<String> = lines.iter().map(|line| line.replace("OWNER", &owner)).collect();
            fs::write(&path, text.join("\n")).unwrap();
            path
        };
        let listings = Listings {
            directory_file: write("dirs.txt", dirs),
            symlink_file: write("symlinks.txt", symlinks),
            regular_file: write("regulars.txt", regulars),
        };
        Fixture { _dir: dir, root, src, listings }
    }

    fn sample() -> Fixture {
        fixture(
            &["0755,OWNER,'/etc'", "0700,OWNER,'./var/lib'"],
            &[
                "0777,OWNER,'/etc/hosts.link','hosts'",
                "0777,OWNER,'./dangling','/does/not/exist'",
            ],
            &[
                "0644,OWNER,1,abcd1234567890,'./file1.txt',14,12345,",
                "0600,OWNER,2,efgh0987654321,'/etc/hosts',19,777",
                "0600,OWNER,2,efgh0987654321,'/var/lib/hosts',19,777",
            ],
        )
    }

    #[test]
    fn rebuilds_tree() {
        let f = sample();
        let dst = f.root.join("dst");

        rebuild(&dst, &f.src, &f.listings, false).unwrap();

        let lib = fs::metadata(dst.join("var/lib")).unwrap();
        assert!(lib.is_dir());
        assert_eq!(lib.mode() & 0o7777, 0o700);

        assert_eq!(fs::read_to_string(dst.join("file1.txt")).unwrap(), "test content 1");
        let file1 = fs::metadata(dst.join("file1.txt")).unwrap();
        assert_eq!(file1.mode() & 0o7777, 0o644);
        assert_eq!(file1.nlink(), 1);

        let hosts = fs::metadata(dst.join("etc/hosts")).unwrap();
        let linked = fs::metadata(dst.join("var/lib/hosts")).unwrap();
        assert_eq!(hosts.ino(), linked.ino());
        assert_eq!(hosts.nlink(), 2);
        assert_eq!(hosts.mode() & 0o7777, 0o600);

        assert_eq!(fs::read_link(dst.join("etc/hosts.link")).unwrap(), Path::new("hosts"));
        assert_eq!(
            fs::read_to_string(dst.join("etc/hosts.link")).unwrap(),
            "127.0.0.1 localhost"
        );
        assert_eq!(fs::read_link(dst.join("dangling")).unwrap(), Path::new("/does/not/exist"));
    }

    #[test]
    fn rebuilds_with_progress() {
        let f = sample();
        let dst = f.root.join("dst");

        rebuild(&dst, &f.src, &f.listings, true).unwrap();
        assert!(dst.join("etc/hosts").is_file());
    }

    #[test]
    fn same_file_without_inode_links_by_hash() {
        let f = fixture(
            &[],
            &[],
            &[
                "0644,OWNER,2,aaaa,'/file1.txt'",
                "0644,OWNER,2,aaaa,'/copy.txt'",
            ],
        );
        let dst = f.root.join("dst");

        rebuild(&dst, &f.src, &f.listings, false).unwrap();

        let a = fs::metadata(dst.join("file1.txt")).unwrap();
        let b = fs::metadata(dst.join("copy.txt")).unwrap();
        assert_eq!(a.ino(), b.ino());
    }

    #[test]
    fn rejects_same_directory() {
        let f = sample();
        let same = f.src.join(".");

        assert!(matches!(
            rebuild(&same, &f.src, &f.listings, false),
            Err(Error::SameDirectory(..))
        ));
    }

    #[test]
    fn rejects_non_empty_destination() {
        let f = sample();
        let dst = f.root.join("dst");
        fs::create_dir(&dst).unwrap();
        fs::write(dst.join("existing"), "").unwrap();

        let err = rebuild(&dst, &f.src, &f.listings, false).unwrap_err();
        assert!(matches!(err, Error::NotEmpty(_)));
        assert!(err.to_string().ends_with("is not empty dir."));
    }

    #[test]
    fn refuses_paths_outside_destination() {
        let f = fixture(&[], &["0777,OWNER,'/../../escaped','target'"], &[]);
        let dst = f.root.join("dst");

        assert!(matches!(
            rebuild(&dst, &f.src, &f.listings, false),
            Err(Error::UnsafePath(_))
        ));

        let f = fixture(&["0755,OWNER,'/../../etc/x'"], &[], &[]);
        assert!(matches!(
            rebuild(&f.root.join("dst"), &f.src, &f.listings, false),
            Err(Error::UnsafePath(_))
        ));
    }

    #[test]
    fn missing_source_file() {
        let f = fixture(&[], &[], &["0644,OWNER,1,aaaa,'/missing.txt',1,"]);

        assert!(matches!(
            rebuild(&f.root.join("dst"), &f.src, &f.listings, false),
            Err(Error::Io(..))
        ));
    }
}
