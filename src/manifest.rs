//! The signed metadata manifest, `metadata.jwt`.
//!
//! The payload is a JSON array of single purpose objects. It is written with
//! `", "` and `": "` separators and ASCII-only escapes so that tools producing
//! and consuming the existing format see byte-identical headers and payloads.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::util;

pub const VERSION: u32 = 1;
pub const ALGORITHM: &str = "ES256";

/// URL safe base64, padded on output and lenient about padding on input.
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn b64encode<T: AsRef<[u8]>>(data: T) -> String {
    URL_SAFE.encode(data)
}

pub fn b64decode<T: AsRef<[u8]>>(data: T) -> Result<Vec<u8>> {
    URL_SAFE
        .decode(data)
        .map_err(|err| Error::Jwt(format!("invalid base64: {}", err).into()))
}

/// Compact JSON with `, ` and `: ` separators and non-ASCII escaped as `\uXXXX`.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut ser).map_err(Error::Payload)?;
    String::from_utf8(buf).map_err(|_| Error::Jwt("payload is not valid UTF-8".into()))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Header {
    alg: String,
}

pub fn header() -> Result<String> {
    let json = to_json(&Header {
        alg: ALGORITHM.to_string(),
    })?;
    Ok(b64encode(json))
}

/// A metadata file referenced by name with its sha256.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub file: String,
    pub hash: String,
}

impl FileRef {
    /// Hashes `path` and records its file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(FileRef {
            file,
            hash: util::file_sha256(path)?,
        })
    }

    /// Checks that `dir/<file>` still has the recorded hash.
    pub fn verify_in(&self, dir: &Path) -> Result<()> {
        let path = dir.join(&self.file);
        let hash = util::file_sha256(&path)?;
        if hash == self.hash {
            Ok(())
        } else {
            Err(Error::HashMismatch(path, self.hash.as_str().into(), hash.into()))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub version: u32,
    pub directory: FileRef,
    pub symlink: FileRef,
    pub regular: FileRef,
    pub persistent: FileRef,
    pub rootfs_directory: String,
    pub certificate: FileRef,
    pub total_regular_size: Option<String>,
    pub compressed_rootfs_directory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Size {
    Text(String),
    Number(u64),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Entry {
    Version { version: u32 },
    Directory { directory: String, hash: String },
    Symlink { symboliclink: String, hash: String },
    Regular { regular: String, hash: String },
    Persistent { persistent: String, hash: String },
    RootfsDirectory { rootfs_directory: String },
    Certificate { certificate: String, hash: String },
    TotalRegularSize { total_regular_size: Size },
    CompressedRootfsDirectory { compressed_rootfs_directory: String },
    Unknown(serde_json::Value),
}

impl Manifest {
    fn entries(&self) -> Vec<Entry> {
        let mut entries = vec![
            Entry::Version { version: self.version },
            Entry::Directory {
                directory: self.directory.file.clone(),
                hash: self.directory.hash.clone(),
            },
            Entry::Symlink {
                symboliclink: self.symlink.file.clone(),
                hash: self.symlink.hash.clone(),
            },
            Entry::Regular {
                regular: self.regular.file.clone(),
                hash: self.regular.hash.clone(),
            },
            Entry::Persistent {
                persistent: self.persistent.file.clone(),
                hash: self.persistent.hash.clone(),
            },
            Entry::RootfsDirectory {
                rootfs_directory: self.rootfs_directory.clone(),
            },
            Entry::Certificate {
                certificate: self.certificate.file.clone(),
                hash: self.certificate.hash.clone(),
            },
        ];
        if let Some(size) = &self.total_regular_size {
            entries.push(Entry::TotalRegularSize {
                total_regular_size: Size::Text(size.clone()),
            });
        }
        if let Some(dir) = &self.compressed_rootfs_directory {
            entries.push(Entry::CompressedRootfsDirectory {
                compressed_rootfs_directory: dir.clone(),
            });
        }
        entries
    }

    fn from_entries(entries: Vec<Entry>) -> Result<Self> {
        let mut version = None;
        let mut directory = None;
        let mut symlink = None;
        let mut regular = None;
        let mut persistent = None;
        let mut rootfs_directory = None;
        let mut certificate = None;
        let mut total_regular_size = None;
        let mut compressed_rootfs_directory = None;

        for entry in entries {
            match entry {
                Entry::Version { version: v } => version = Some(v),
                Entry::Directory { directory: file, hash } => directory = Some(FileRef { file, hash }),
                Entry::Symlink { symboliclink: file, hash } => symlink = Some(FileRef { file, hash }),
                Entry::Regular { regular: file, hash } => regular = Some(FileRef { file, hash }),
                Entry::Persistent { persistent: file, hash } => persistent = Some(FileRef { file, hash }),
                Entry::RootfsDirectory { rootfs_directory: dir } => rootfs_directory = Some(dir),
                Entry::Certificate { certificate: file, hash } => certificate = Some(FileRef { file, hash }),
                Entry::TotalRegularSize { total_regular_size: size } => {
                    total_regular_size = Some(match size {
                        Size::Text(text) => text,
                        Size::Number(number) => number.to_string(),
                    })
                }
                Entry::CompressedRootfsDirectory {
                    compressed_rootfs_directory: dir,
                } => compressed_rootfs_directory = Some(dir),
                Entry::Unknown(value) => tracing::debug!("ignoring payload entry {}", value),
            }
        }

        fn required<T>(value: Option<T>, name: &str) -> Result<T> {
            value.ok_or_else(|| Error::Jwt(format!("payload has no {} entry", name).into()))
        }

        Ok(Manifest {
            version: required(version, "version")?,
            directory: required(directory, "directory")?,
            symlink: required(symlink, "symboliclink")?,
            regular: required(regular, "regular")?,
            persistent: required(persistent, "persistent")?,
            rootfs_directory: required(rootfs_directory, "rootfs_directory")?,
            certificate: required(certificate, "certificate")?,
            total_regular_size,
            compressed_rootfs_directory,
        })
    }

    /// The base64 encoded JSON payload.
    pub fn encode(&self) -> Result<String> {
        Ok(b64encode(to_json(&self.entries())?))
    }

    pub fn decode(payload: &str) -> Result<Self> {
        let json = b64decode(payload)?;
        let entries: Vec<Entry> = serde_json::from_slice(&json).map_err(Error::Payload)?;
        Self::from_entries(entries)
    }
}

/// The three encoded parts of a compact JWS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Jwt {
    pub header: String,
    pub payload: String,
    pub signature: String,
}

impl Jwt {
    /// The bytes covered by the signature.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }

    pub fn manifest(&self) -> Result<Manifest> {
        Manifest::decode(&self.payload)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        b64decode(&self.signature)
    }

    pub fn algorithm(&self) -> Result<String> {
        let json = b64decode(&self.header)?;
        let header: Header = serde_json::from_slice(&json).map_err(Error::Payload)?;
        Ok(header.alg)
    }
}

impl FromStr for Jwt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(payload), Some(signature), None) => Ok(Jwt {
                header: header.to_string(),
                payload: payload.to_string(),
                signature: signature.to_string(),
            }),
            _ => Err(Error::Jwt("expected header.payload.signature".into())),
        }
    }
}

impl fmt::Display for Jwt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.header, self.payload, self.signature)
    }
}
