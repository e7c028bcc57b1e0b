//! Generation, signing and application of OTA rootfs metadata.
//!
//! A rootfs is described by three listings (directories, symlinks and
//! regular files) plus a signed `metadata.jwt` that pins their hashes. The
//! same listings are later used to rebuild the rootfs into an update image.

pub mod cert;
pub mod compress;
pub mod config;
pub mod entry;
pub mod error;
pub mod generate;
pub mod ignore_rules;
pub mod image;
pub mod kernel;
pub mod manifest;
pub mod rebuild;
pub mod sign;
pub mod util;

pub use crate::cert::CertRequest;
pub use crate::error::{Error, Result};
pub use crate::generate::{generate, GenerateOptions, Summary};
pub use crate::image::{build_image, ImageOptions};
pub use crate::manifest::{Jwt, Manifest};
pub use crate::rebuild::{rebuild, Listings};
pub use crate::sign::{sign_metadata, verify, verify_with, MetadataFiles};
