//! Generation of rootfs metadata listings.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::compress::Compression;
use crate::config;
use crate::entry::{self, DirectoryEntry, RegularEntry, SymlinkEntry};
use crate::error::{Error, IoContext, Result};
use crate::ignore_rules::IgnoreRules;
use crate::kernel;
use crate::util;

#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub target_dir: PathBuf,
    /// Where zstd copies of large regular files are written, if anywhere.
    pub compressed_dir: Option<PathBuf>,
    pub compress_ratio: f64,
    pub compress_filesize: u64,
    pub compression: Compression,
    pub prefix: String,
    pub output_dir: PathBuf,
    pub directory_file: PathBuf,
    pub symlink_file: PathBuf,
    pub regular_file: PathBuf,
    pub total_regular_size_file: PathBuf,
    pub ignore_file: Option<PathBuf>,
}

impl GenerateOptions {
    pub fn new<P: Into<PathBuf>>(target_dir: P) -> Self {
        GenerateOptions {
            target_dir: target_dir.into(),
            compressed_dir: None,
            compress_ratio: config::COMPRESS_RATIO,
            compress_filesize: config::COMPRESS_FILESIZE,
            compression: Compression::default(),
            prefix: config::PREFIX.to_string(),
            output_dir: PathBuf::from("."),
            directory_file: config::DIRECTORY_FILE.into(),
            symlink_file: config::SYMLINK_FILE.into(),
            regular_file: config::REGULAR_FILE.into(),
            total_regular_size_file: config::TOTAL_REGULAR_SIZE_FILE.into(),
            ignore_file: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub directories: usize,
    pub symlinks: usize,
    pub regulars: usize,
    pub compressed: usize,
    pub total_regular_size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Directory,
    Symlink,
    Regular,
}

struct Node {
    kind: Kind,
    metadata: Metadata,
}

fn kind_of(metadata: &Metadata) -> Option<Kind> {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        Some(Kind::Symlink)
    } else if file_type.is_dir() {
        Some(Kind::Directory)
    } else if file_type.is_file() {
        Some(Kind::Regular)
    } else {
        None
    }
}

/// Everything below the target directory that goes into the listings, keyed
/// by relative path so parents always sort before their children.
struct Tree {
    root: PathBuf,
    nodes: BTreeMap<PathBuf, Node>,
}

impl Tree {
    fn insert(&mut self, path: &Path, metadata: Metadata) -> bool {
        let kind = match kind_of(&metadata) {
            Some(some) => some,
            None => {
                debug!("skipping special file {}", path.display());
                return false;
            }
        };
        let rel = match path.strip_prefix(&self.root) {
            Ok(ok) if !ok.as_os_str().is_empty() => ok.to_owned(),
            _ => return false,
        };
        self.nodes.insert(rel, Node { kind, metadata }).is_none()
    }

    fn walk(&mut self, rules: &IgnoreRules, stale_kernels: &HashSet<PathBuf>) -> Result<()> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let path = entry.path();
                if stale_kernels.contains(path) {
                    debug!("skipping old kernel {}", path.display());
                    return false;
                }
                if rules.is_ignored(path, entry.file_type().is_dir()) {
                    debug!("ignoring {}", path.display());
                    return false;
                }
                true
            });

        for entry_res in walker {
            let entry = entry_res.map_err(Error::Walk)?;
            let metadata = entry.metadata().map_err(Error::Walk)?;
            self.insert(entry.path(), metadata);
        }
        Ok(())
    }

    /// Adds `path` and all of its contents. Ignore rules do not apply here,
    /// stale kernels stay excluded.
    fn add_subtree(
        &mut self,
        path: &Path,
        stale_kernels: &HashSet<PathBuf>,
        symlinks: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let walker = WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !stale_kernels.contains(entry.path()));
        for entry_res in walker {
            let entry = entry_res.map_err(Error::Walk)?;
            let metadata = entry.metadata().map_err(Error::Walk)?;
            let is_symlink = metadata.file_type().is_symlink();
            if self.insert(entry.path(), metadata) && is_symlink {
                symlinks.push(entry.path().to_owned());
            }
        }
        Ok(())
    }

    /// Resolves a symlink target to a path below the root without following
    /// any other links.
    fn resolve_target(&self, link: &Path) -> Result<Option<PathBuf>> {
        let target = fs::read_link(link).at(link)?;
        let joined = if target.has_root() {
            util::join_under(&self.root, &util::normalize(&target))?
        } else {
            match link.parent() {
                Some(parent) => parent.join(&target),
                None => return Ok(None),
            }
        };
        let resolved = util::normalize(&joined);
        if resolved.starts_with(&self.root) && resolved != self.root {
            Ok(Some(resolved))
        } else {
            Ok(None)
        }
    }

    /// Brings back excluded files that a listed symlink points at, so links
    /// into ignored trees are not left dangling.
    fn rescue_symlink_targets(&mut self, stale_kernels: &HashSet<PathBuf>) -> Result<usize> {
        let mut pending: Vec<PathBuf> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.kind == Kind::Symlink)
            .map(|(rel, _)| self.root.join(rel))
            .collect();
        let mut visited = HashSet::new();
        let mut rescued = 0;

        while let Some(link) = pending.pop() {
            if !visited.insert(link.clone()) {
                continue;
            }
            let target = match self.resolve_target(&link)? {
                Some(some) => some,
                None => continue,
            };
            let rel = match target.strip_prefix(&self.root) {
                Ok(ok) => ok.to_owned(),
                Err(_) => continue,
            };
            if self.nodes.contains_key(&rel) {
                continue;
            }
            if stale_kernels.iter().any(|stale| target.starts_with(stale)) {
                debug!("symlink {} points to old kernel {}", link.display(), target.display());
                continue;
            }

            // Every ancestor has to be a real directory, otherwise the target
            // lives behind another symlink and is not ours to add.
            let mut ancestors = Vec::new();
            let mut current = self.root.clone();
            let mut reachable = true;
            for component in rel.parent().into_iter().flat_map(Path::components) {
                if let Component::Normal(name) = component {
                    current.push(name);
                    match fs::symlink_metadata(&current) {
                        Ok(metadata) if metadata.is_dir() => ancestors.push((current.clone(), metadata)),
                        _ => {
                            reachable = false;
                            break;
                        }
                    }
                }
            }
            let metadata = match fs::symlink_metadata(&target) {
                Ok(ok) if reachable => ok,
                _ => {
                    debug!("symlink {} points to {}, which is not available", link.display(), target.display());
                    continue;
                }
            };

            debug!("keeping {} for symlink {}", target.display(), link.display());
            for (ancestor, ancestor_metadata) in ancestors {
                self.insert(&ancestor, ancestor_metadata);
            }
            if metadata.is_dir() {
                self.add_subtree(&target, stale_kernels, &mut pending)?;
            } else {
                let is_symlink = metadata.file_type().is_symlink();
                if self.insert(&target, metadata) && is_symlink {
                    pending.push(target.clone());
                }
            }
            rescued += 1;
        }

        Ok(rescued)
    }

    fn paths(&self, kind: Kind) -> impl Iterator<Item = (&PathBuf, &Metadata)> {
        self.nodes
            .iter()
            .filter(move |(_, node)| node.kind == kind)
            .map(|(rel, node)| (rel, &node.metadata))
    }
}

fn write_lines<I: IntoIterator<Item = String>>(path: &Path, lines: I) -> Result<()> {
    let text = lines.into_iter().collect::<Vec<_>>().join("\n");
    fs::write(path, text).at(path)
}

/// Absolute form of `path`, resolving symlinks when it exists.
fn absolute(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(ok) => Ok(ok),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let absolute = std::path::absolute(path).at(path)?;
            Ok(util::normalize(&absolute))
        }
        Err(err) => Err(err).at(path),
    }
}

/// Compresses regular files into `compressed_dir/<sha256>.zst`, remembering the
/// outcome per hash so identical contents are compressed once.
struct Compressor<'a> {
    options: &'a GenerateOptions,
    dir: &'a Path,
    kept: HashMap<String, bool>,
}

impl Compressor<'_> {
    fn compress(&mut self, src: &Path, sha256: &str, size: u64) -> Result<Option<String>> {
        if size < self.options.compress_filesize {
            return Ok(None);
        }
        if let Some(kept) = self.kept.get(sha256) {
            return Ok(kept.then(|| config::COMPRESS_ALG.to_string()));
        }

        let dst = self.dir.join(format!("{}.{}", sha256, config::COMPRESS_ALG));
        let compressed = self.options.compression.compress_file(src, &dst)?;
        let ratio = size as f64 / compressed.max(1) as f64;
        let kept = ratio >= self.options.compress_ratio;
        if kept {
            debug!("compressed {} ({} -> {} bytes)", src.display(), size, compressed);
        } else {
            debug!("not compressing {}, ratio {:.2}", src.display(), ratio);
            fs::remove_file(&dst).at(&dst)?;
        }
        self.kept.insert(sha256.to_string(), kept);
        Ok(kept.then(|| config::COMPRESS_ALG.to_string()))
    }
}

/// Lists directories, symlinks and regular files below the target directory
/// and writes them in the metadata formats of [`crate::entry`].
pub fn generate(options: &GenerateOptions) -> Result<Summary> {
    let root = fs::canonicalize(&options.target_dir).at(&options.target_dir)?;
    info!("generating metadata for {}", root.display());

    let rules = match &options.ignore_file {
        Some(ignore_file) => IgnoreRules::from_file(&root, ignore_file)?,
        None => IgnoreRules::empty(&root)?,
    };

    let boot = root.join("boot");
    let stale_kernels: HashSet<PathBuf> = kernel::non_latest_kernels(&boot).at(&boot)?.into_iter().collect();
    for stale in &stale_kernels {
        info!("excluding old kernel {}", stale.display());
    }

    if let Some(compressed_dir) = &options.compressed_dir {
        let doomed = absolute(compressed_dir)?;
        if root.starts_with(&doomed) || absolute(&options.output_dir)?.starts_with(&doomed) {
            return Err(Error::UnsafeCompressedDir(compressed_dir.clone()));
        }
        if util::remove_path(compressed_dir)? {
            info!("removed stale {}", compressed_dir.display());
        }
    }

    let mut tree = Tree {
        root: root.clone(),
        nodes: BTreeMap::new(),
    };
    tree.walk(&rules, &stale_kernels)?;
    let rescued = tree.rescue_symlink_targets(&stale_kernels)?;
    if rescued > 0 {
        info!("kept {} ignored symlink targets", rescued);
    }

    fs::create_dir_all(&options.output_dir).at(&options.output_dir)?;
    let prefix = Path::new(&options.prefix);
    let mut summary = Summary::default();

    let mut directories = Vec::new();
    for (rel, metadata) in tree.paths(Kind::Directory) {
        let path = prefix.join(rel);
        entry::utf8_path("directory", &path)?;
        directories.push(
            DirectoryEntry {
                mode: metadata.mode() & 0o7777,
                uid: metadata.uid(),
                gid: metadata.gid(),
                path,
            }
            .to_string(),
        );
    }
    summary.directories = directories.len();
    write_lines(&options.output_dir.join(&options.directory_file), directories)?;

    let mut symlinks = Vec::new();
    for (rel, metadata) in tree.paths(Kind::Symlink) {
        let link = root.join(rel);
        let target = fs::read_link(&link).at(&link)?;
        let link = prefix.join(rel);
        entry::utf8_path("symlink", &link)?;
        entry::utf8_path("symlink", &target)?;
        symlinks.push(
            SymlinkEntry {
                mode: metadata.mode() & 0o7777,
                uid: metadata.uid(),
                gid: metadata.gid(),
                link,
                target,
            }
            .to_string(),
        );
    }
    summary.symlinks = symlinks.len();
    write_lines(&options.output_dir.join(&options.symlink_file), symlinks)?;

    let mut compressor = match &options.compressed_dir {
        Some(dir) => {
            fs::create_dir_all(dir).at(dir)?;
            Some(Compressor {
                options,
                dir,
                kept: HashMap::new(),
            })
        }
        None => None,
    };

    let mut regulars = Vec::new();
    for (rel, metadata) in tree.paths(Kind::Regular) {
        let listed = prefix.join(rel);
        entry::utf8_path("regular file", &listed)?;
        let path = root.join(rel);
        let sha256 = util::file_sha256(&path)?;
        let size = metadata.len();
        let compress_alg = match compressor.as_mut() {
            Some(compressor) => compressor.compress(&path, &sha256, size)?,
            None => None,
        };
        if compress_alg.is_some() {
            summary.compressed += 1;
        }
        let nlink = metadata.nlink();
        regulars.push(
            RegularEntry {
                mode: metadata.mode() & 0o7777,
                uid: metadata.uid(),
                gid: metadata.gid(),
                nlink,
                sha256,
                path: listed,
                size: Some(size),
                inode: (nlink > 1).then(|| metadata.ino()),
                compress_alg,
            }
            .to_string(),
        );
        summary.total_regular_size += size;
    }
    summary.regulars = regulars.len();
    write_lines(&options.output_dir.join(&options.regular_file), regulars)?;

    let total_path = options.output_dir.join(&options.total_regular_size_file);
    fs::write(&total_path, summary.total_regular_size.to_string()).at(&total_path)?;

    info!(
        "{} directories, {} symlinks, {} regular files ({} bytes, {} compressed)",
        summary.directories, summary.symlinks, summary.regulars, summary.total_regular_size, summary.compressed
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::parse_lines;
    use std::os::unix::fs::symlink;

    fn options(target: &Path, out: &Path) -> GenerateOptions {
        GenerateOptions {
            output_dir: out.to_owned(),
            ..GenerateOptions::new(target)
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn listings_for_simple_tree() {
        let target = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let t = target.path();
        fs::create_dir_all(t.join("etc/ssh")).unwrap();
        fs::write(t.join("etc/hostname"), "host\n").unwrap();
        fs::write(t.join("etc/it's"), "quote").unwrap();
        symlink("hostname", t.join("etc/hostname.link")).unwrap();
        fs::hard_link(t.join("etc/hostname"), t.join("etc/ssh/hostname")).unwrap();

        let summary = generate(&options(t, out.path())).unwrap();
        assert_eq!(summary.directories, 2);
        assert_eq!(summary.symlinks, 1);
        assert_eq!(summary.regulars, 3);
        assert_eq!(summary.total_regular_size, 5 + 5 + 5);
        assert_eq!(read(&out.path().join("total_regular_size.txt")), "15");

        let dirs: Vec<DirectoryEntry> = parse_lines(&read(&out.path().join("dirs.txt"))).unwrap();
        let paths: Vec<_> = dirs.iter().map(|d| d.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/etc"), PathBuf::from("/etc/ssh")]);

        let links: Vec<SymlinkEntry> = parse_lines(&read(&out.path().join("symlinks.txt"))).unwrap();
        assert_eq!(links[0].link, PathBuf::from("/etc/hostname.link"));
        assert_eq!(links[0].target, PathBuf::from("hostname"));
        assert_eq!(links[0].mode, 0o777);

        let text = read(&out.path().join("regulars.txt"));
        assert!(!text.ends_with('\n'));
        assert!(text.contains(r"'/etc/it'\''s'"));
        let regulars: Vec<RegularEntry> = parse_lines(&text).unwrap();
        let hostname = regulars.iter().find(|r| r.path == Path::new("/etc/hostname")).unwrap();
        let linked = regulars.iter().find(|r| r.path == Path::new("/etc/ssh/hostname")).unwrap();
        assert_eq!(hostname.nlink, 2);
        assert_eq!(hostname.inode, linked.inode);
        assert!(hostname.inode.is_some());
        assert_eq!(hostname.sha256, util::sha256(b"host\n"));
        assert_eq!(hostname.size, Some(5));
        let quoted = regulars.iter().find(|r| r.path == Path::new("/etc/it's")).unwrap();
        assert_eq!(quoted.inode, None);
        assert_eq!(quoted.nlink, 1);
    }

    #[test]
    fn ignored_paths_kernels_and_symlink_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let t = tmp.path();

        fs::create_dir(t.join("boot")).unwrap();
        for name in [
            "vmlinuz-5.15.0-27-generic",
            "vmlinuz-5.15.0-64-generic",
            "vmlinuz-5.4.0-102-generic",
            "initrd.img-5.15.0-65-generic",
            "initrd.img-5.15.0-64-generic",
        ] {
            fs::create_dir(t.join("boot").join(name)).unwrap();
        }

        let proj = t.join("home/autoware/autoware.proj");
        for dir in ["build", "src", "install"] {
            fs::create_dir_all(proj.join(dir)).unwrap();
        }
        for dir in ["build", "src"] {
            fs::write(proj.join(dir).join("file_001"), "").unwrap();
            fs::write(proj.join(dir).join("file_002"), "").unwrap();
        }
        symlink(
            "/home/autoware/autoware.proj/build/file_001",
            proj.join("install/file_001"),
        )
        .unwrap();
        symlink("../build/file_002", proj.join("install/file_002")).unwrap();
        symlink("../src/file_001", proj.join("install/file_003")).unwrap();

        let ignore_file = t.join("ignore_file.txt");
        fs::write(
            &ignore_file,
            "home/autoware/autoware.proj/build\nhome/autoware/autoware.proj/src",
        )
        .unwrap();

        let opts = GenerateOptions {
            compressed_dir: Some(t.join("data.zst")),
            ignore_file: Some(ignore_file),
            compress_filesize: 16 * 1024,
            symlink_file: "symlink.txt".into(),
            total_regular_size_file: "total_regular_size_.txt".into(),
            ..options(t, t)
        };
        generate(&opts).unwrap();

        let symlinks = read(&t.join("symlink.txt"));
        assert!(symlinks.contains("home/autoware/autoware.proj/install/file_001"));
        assert!(symlinks.contains("home/autoware/autoware.proj/install/file_002"));

        let regulars = read(&t.join("regulars.txt"));
        assert!(regulars.contains("home/autoware/autoware.proj/build/file_001"));
        assert!(regulars.contains("home/autoware/autoware.proj/build/file_002"));
        assert!(regulars.contains("home/autoware/autoware.proj/src/file_001"));
        assert!(!regulars.contains("home/autoware/autoware.proj/src/file_002"));

        let dirs = read(&t.join("dirs.txt"));
        assert!(dirs.contains("'/home/autoware/autoware.proj/build'"));
        assert!(dirs.contains("'/boot/vmlinuz-5.15.0-64-generic'"));
        assert!(dirs.contains("'/boot/initrd.img-5.15.0-64-generic'"));
        assert!(!dirs.contains("vmlinuz-5.15.0-27-generic"));
        assert!(!dirs.contains("vmlinuz-5.4.0-102-generic"));
        assert!(!dirs.contains("initrd.img-5.15.0-65-generic"));
    }

    #[test]
    fn large_compressible_files_get_zst_copies() {
        let target = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let compressed = out.path().join("data.zst");
        let t = target.path();

        let text = "compressible line of text\n".repeat(4096);
        fs::write(t.join("text"), &text).unwrap();
        fs::write(t.join("text.copy"), &text).unwrap();

        let mut state: u32 = 0x1234_5678;
        let noise: Vec<u8> = (0..128 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        fs::write(t.join("noise"), &noise).unwrap();
        fs::write(t.join("small"), "tiny").unwrap();

        // Leftovers from an earlier run are discarded.
        fs::create_dir_all(&compressed).unwrap();
        fs::write(compressed.join("stale.zst"), "old").unwrap();

        let opts = GenerateOptions {
            compressed_dir: Some(compressed.clone()),
            compress_filesize: 16 * 1024,
            ..options(t, out.path())
        };
        let summary = generate(&opts).unwrap();
        assert_eq!(summary.compressed, 2);

        let regulars: Vec<RegularEntry> = parse_lines(&read(&out.path().join("regulars.txt"))).unwrap();
        let by_name = |name: &str| regulars.iter().find(|r| r.path == Path::new("/").join(name)).unwrap();
        assert_eq!(by_name("text").compress_alg.as_deref(), Some("zst"));
        assert_eq!(by_name("text.copy").compress_alg.as_deref(), Some("zst"));
        assert_eq!(by_name("noise").compress_alg, None);
        assert_eq!(by_name("small").compress_alg, None);

        let hash = util::sha256(text.as_bytes());
        let zst = compressed.join(format!("{}.zst", hash));
        assert!(zst.is_file());
        assert!(!compressed.join(format!("{}.zst", util::sha256(&noise))).exists());
        assert!(!compressed.join("stale.zst").exists());
        assert_eq!(fs::read_dir(&compressed).unwrap().count(), 1);

        let restored = out.path().join("restored");
        crate::compress::decompress_file(&zst, &restored).unwrap();
        assert_eq!(read(&restored), text);
    }

    #[test]
    fn symlinks_do_not_bring_back_old_kernels() {
        let target = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let boot = target.path().join("boot");
        fs::create_dir(&boot).unwrap();
        fs::write(boot.join("vmlinuz-5.15.0-27-generic"), "old").unwrap();
        fs::write(boot.join("vmlinuz-5.15.0-64-generic"), "new").unwrap();
        fs::create_dir(boot.join("initrd.img-5.15.0-27-generic")).unwrap();
        fs::write(boot.join("initrd.img-5.15.0-27-generic/image"), "old").unwrap();
        symlink("vmlinuz-5.15.0-64-generic", boot.join("vmlinuz")).unwrap();
        symlink("vmlinuz-5.15.0-27-generic", boot.join("vmlinuz.old")).unwrap();
        symlink("/boot/initrd.img-5.15.0-27-generic/image", boot.join("initrd.img.old")).unwrap();

        generate(&options(target.path(), out.path())).unwrap();

        let regulars = read(&out.path().join("regulars.txt"));
        assert!(regulars.contains("'/boot/vmlinuz-5.15.0-64-generic'"));
        assert!(!regulars.contains("5.15.0-27"));
        assert!(!read(&out.path().join("dirs.txt")).contains("5.15.0-27"));
        assert!(read(&out.path().join("symlinks.txt")).contains("'/boot/vmlinuz.old'"));
    }

    #[test]
    fn compressed_dir_may_not_contain_the_rootfs() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("rootfs");
        fs::create_dir_all(target.join("etc")).unwrap();
        fs::write(target.join("etc/hostname"), "host").unwrap();

        for compressed in [tmp.path().to_owned(), target.clone(), target.join("..")] {
            let opts = GenerateOptions {
                compressed_dir: Some(compressed),
                ..options(&target, &tmp.path().join("out"))
            };
            assert!(matches!(generate(&opts), Err(Error::UnsafeCompressedDir(_))));
        }

        let opts = GenerateOptions {
            compressed_dir: Some(tmp.path().join("out")),
            ..options(&target, &tmp.path().join("out/listings"))
        };
        assert!(matches!(generate(&opts), Err(Error::UnsafeCompressedDir(_))));
        assert!(target.join("etc/hostname").is_file());
    }

    #[test]
    fn non_utf8_names_are_an_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let target = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(target.path().join(OsStr::from_bytes(b"caf\xe9")), "").unwrap();

        let err = generate(&options(target.path(), out.path())).unwrap_err();
        assert!(matches!(err, Error::Entry("regular file", ..)));

        let target = tempfile::tempdir().unwrap();
        symlink(OsStr::from_bytes(b"caf\xe9"), target.path().join("link")).unwrap();
        let err = generate(&options(target.path(), out.path())).unwrap_err();
        assert!(matches!(err, Error::Entry("symlink", ..)));
    }

    #[test]
    fn missing_ignore_file_is_an_error() {
        let target = tempfile::tempdir().unwrap();
        let opts = GenerateOptions {
            ignore_file: Some(target.path().join("ignore.txt")),
            ..options(target.path(), target.path())
        };
        assert!(matches!(generate(&opts), Err(Error::Io(..))));
    }
}
