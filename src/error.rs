use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error that may occur while generating, signing or applying OTA metadata.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O operation on a specific path failed.
    #[error("{}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),
    /// A metadata line could not be parsed.
    #[error("invalid {} entry {:?}: {}", .0, .1, .2)]
    Entry(&'static str, Box<str>, &'static str),
    /// The ignore file contains an invalid rule.
    #[error("invalid ignore rule in {}", .0.display())]
    IgnoreRule(PathBuf, #[source] ignore::Error),
    /// Failed to walk the target directory.
    #[error("failed to walk directory")]
    Walk(#[source] walkdir::Error),
    /// The signing key could not be loaded.
    #[error("invalid signing key {}: {}", .0.display(), .1)]
    Key(PathBuf, Box<str>),
    /// The certificate could not be loaded.
    #[error("invalid certificate: {}", .0)]
    Certificate(Box<str>),
    /// The JWT is malformed.
    #[error("malformed metadata jwt: {}", .0)]
    Jwt(Box<str>),
    /// The JWT payload is not the expected JSON.
    #[error("malformed metadata payload")]
    Payload(#[source] serde_json::Error),
    /// The JWT signature did not verify.
    #[error("metadata signature verification failed")]
    Signature,
    /// A file did not match the hash recorded for it.
    #[error("hash mismatch for {}: expected {}, found {}", .0.display(), .1, .2)]
    HashMismatch(PathBuf, Box<str>, Box<str>),
    /// The rebuild destination is the source directory.
    #[error("dst({}) and src({}) are same!", .0.display(), .1.display())]
    SameDirectory(PathBuf, PathBuf),
    /// The rebuild destination already has content.
    #[error("dst({}) is not empty dir.", .0.display())]
    NotEmpty(PathBuf),
    /// A listed path would leave the directory it is joined to.
    #[error("{} leaves the destination directory", .0.display())]
    UnsafePath(PathBuf),
    /// The compressed rootfs directory would remove the rootfs or the listings.
    #[error("refusing to replace {}: it contains the target or output directory", .0.display())]
    UnsafeCompressedDir(PathBuf),
    /// An external command exited with a failure.
    #[error("{} exited with {}", .0, .1)]
    Command(&'static str, std::process::ExitStatus),
}

/// Attaches a path to an `io::Error`.
pub(crate) trait IoContext<T> {
    fn at<P: Into<PathBuf>>(self, path: P) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at<P: Into<PathBuf>>(self, path: P) -> Result<T> {
        self.map_err(|err| Error::Io(path.into(), err))
    }
}
