//! Defaults shared by the command line and the library.

pub const DIRECTORY_FILE: &str = "dirs.txt";
pub const SYMLINK_FILE: &str = "symlinks.txt";
pub const REGULAR_FILE: &str = "regulars.txt";
pub const TOTAL_REGULAR_SIZE_FILE: &str = "total_regular_size.txt";
pub const IGNORE_FILE: &str = "ignore.txt";
pub const METADATA_JWT: &str = "metadata.jwt";
pub const ROOTFS_DIRECTORY: &str = "rootfs";
pub const PREFIX: &str = "/";

/// Files smaller than this are never compressed (512KiB).
pub const COMPRESS_FILESIZE: u64 = 512 * 1024;
/// Minimum `original / compressed` size ratio for a compressed copy to be kept.
pub const COMPRESS_RATIO: f64 = 1.25;
pub const COMPRESS_ALG: &str = "zst";
pub const ZSTD_LEVEL: i32 = 10;
pub const ZSTD_THREADS: u32 = 2;
pub const ZSTD_CHUNK_SIZE: usize = 4 * 1024 * 1024;

pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;

pub const PRIVATE_KEY_FILE: &str = "privatekey.pem";
pub const CERTIFICATE_FILE: &str = "certificate.pem";
/// 20 years and 5 days.
pub const CERT_DAYS: u32 = 365 * 20 + 5;
pub const CERT_CURVE: &str = "prime256v1";
pub const CERT_SUBJECT: &str = "/C=JP/ST=Tokyo/O=TIER IV, Inc./CN=ota-metadata";

pub const UPDATE_IMAGE: &str = "update_image.tar.gz";
