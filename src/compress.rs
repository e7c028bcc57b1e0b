use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::config;
use crate::error::{IoContext, Result};

/// zstd settings used for compressed rootfs copies.
#[derive(Clone, Copy, Debug)]
pub struct Compression {
    pub level: i32,
    pub threads: u32,
    pub chunk_size: usize,
}

impl Default for Compression {
    fn default() -> Self {
        Compression {
            level: config::ZSTD_LEVEL,
            threads: config::ZSTD_THREADS,
            chunk_size: config::ZSTD_CHUNK_SIZE,
        }
    }
}

impl Compression {
    /// Streams `src` into `dst` in chunks, returning the compressed size.
    pub fn compress_file(&self, src: &Path, dst: &Path) -> Result<u64> {
        let mut input = File::open(src).at(src)?;
        let size = input.metadata().at(src)?.len();
        let output = File::create(dst).at(dst)?;

        let mut encoder = zstd::stream::Encoder::new(output, self.level).at(dst)?;
        if self.threads > 0 {
            encoder.multithread(self.threads).at(dst)?;
        }
        encoder.set_pledged_src_size(Some(size)).at(dst)?;

        let mut buf = vec![0; self.chunk_size];
        loop {
            let count = input.read(&mut buf).at(src)?;
            if count == 0 {
                break;
            }
            encoder.write_all(&buf[..count]).at(dst)?;
        }
        encoder.finish().at(dst)?.sync_all().at(dst)?;

        Ok(fs::metadata(dst).at(dst)?.len())
    }
}

/// Decompresses a whole zstd file.
#[cfg(test)]
pub(crate) fn decompress_file(src: &Path, dst: &Path) -> Result<()> {
    let input = File::open(src).at(src)?;
    let mut output = File::create(dst).at(dst)?;
    zstd::stream::copy_decode(input, &mut output).at(src)?;
    Ok(())
}
