//! Builds `update_image.tar.gz` from signed metadata and a rootfs copy.

use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::fs::{self, File};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process;
use tar::{EntryType, Header, HeaderMode};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config;
use crate::error::{Error, IoContext, Result};
use crate::manifest::{Jwt, Manifest};
use crate::rebuild::{self, Listings};
use crate::sign;

#[derive(Clone, Debug)]
pub struct ImageOptions {
    /// Bucket URL passed to `aws s3 sync` when no local source is given.
    pub s3_url: String,
    /// Already downloaded metadata and rootfs.
    pub src_dir: Option<PathBuf>,
    pub output: PathBuf,
    /// Check the metadata signature against this certificate when set.
    pub certificate: Option<PathBuf>,
    pub progress: bool,
}

impl ImageOptions {
    pub fn new<S: Into<String>>(s3_url: S, src_dir: Option<PathBuf>) -> Self {
        ImageOptions {
            s3_url: s3_url.into(),
            src_dir,
            output: PathBuf::from(config::UPDATE_IMAGE),
            certificate: None,
            progress: true,
        }
    }
}

/// Mirrors `s3_url` into `dst` with the AWS CLI.
pub fn s3_sync(s3_url: &str, dst: &Path) -> Result<()> {
    let mut command = process::Command::new("aws");
    command.arg("s3").arg("sync").arg(s3_url).arg(dst);

    debug!("{:?}", command);
    let status = command.status().at(Path::new("aws"))?;
    if !status.success() {
        return Err(Error::Command("aws", status));
    }
    Ok(())
}

/// Reads `metadata.jwt` from `dir`, checking its signature when a certificate
/// is given.
pub fn read_manifest(dir: &Path, certificate: Option<&Path>) -> Result<Manifest> {
    let path = dir.join(config::METADATA_JWT);
    let jwt: Jwt = fs::read_to_string(&path).at(&path)?.parse()?;
    match certificate {
        Some(certificate) => {
            let pem = fs::read_to_string(certificate).at(certificate)?;
            sign::verify(&jwt, &pem)
        }
        None => jwt.manifest(),
    }
}

/// Writes a gzip tar of `dir`. Symlinks are stored as links, and files that
/// share an inode are stored once followed by hard link entries.
pub fn write_tar_gz(dir: &Path, output: &Path) -> Result<()> {
    let file = File::create(output).at(output)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, flate2::Compression::default()));
    builder.follow_symlinks(false);

    let mut inodes: HashMap<(u64, u64), PathBuf> = HashMap::new();
    for entry_res in WalkDir::new(dir).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry_res.map_err(Error::Walk)?;
        let path = entry.path();
        let name = path.strip_prefix(dir).unwrap_or(path).to_owned();
        let metadata = entry.metadata().map_err(Error::Walk)?;

        if metadata.is_dir() {
            builder.append_dir(&name, path).at(path)?;
            continue;
        }
        if metadata.is_file() && metadata.nlink() > 1 {
            let key = (metadata.dev(), metadata.ino());
            if let Some(first) = inodes.get(&key) {
                debug!("{} is a hard link to {}", name.display(), first.display());
                let mut header = Header::new_gnu();
                header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
                header.set_entry_type(EntryType::Link);
                header.set_size(0);
                builder.append_link(&mut header, &name, first).at(path)?;
                continue;
            }
            inodes.insert(key, name.clone());
        }
        builder.append_path_with_name(path, &name).at(path)?;
    }

    builder.into_inner().at(output)?.finish().at(output)?;
    Ok(())
}

pub fn build_image(options: &ImageOptions) -> Result<()> {
    let work = tempfile::tempdir().at(std::env::temp_dir())?;

    let src_dir = match &options.src_dir {
        Some(src_dir) => src_dir.clone(),
        None => {
            let dst = work.path().join("src");
            info!("syncing {} into {}", options.s3_url, dst.display());
            s3_sync(&options.s3_url, &dst)?;
            dst
        }
    };

    let manifest = read_manifest(&src_dir, options.certificate.as_deref())?;
    for file_ref in [&manifest.directory, &manifest.symlink, &manifest.regular] {
        file_ref.verify_in(&src_dir)?;
        debug!("{} matches {}", file_ref.file, file_ref.hash);
    }

    let listings = Listings {
        directory_file: src_dir.join(&manifest.directory.file),
        symlink_file: src_dir.join(&manifest.symlink.file),
        regular_file: src_dir.join(&manifest.regular.file),
    };
    let rootfs = work.path().join("rootfs");
    rebuild::rebuild(
        &rootfs,
        &src_dir.join(&manifest.rootfs_directory),
        &listings,
        options.progress,
    )?;

    write_tar_gz(&rootfs, &options.output)?;
    info!("wrote {}", options.output.display());
    Ok(())
}
