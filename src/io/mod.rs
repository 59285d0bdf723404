//! Random-access backing store for image bytes.
//!
//! The scanner and the renderer never hold the whole file in a buffer of
//! their own; they ask a [`ByteSource`] for at most one instruction's worth
//! of bytes at a file offset. [`MappedFile`] serves those reads from a
//! read-only memory map, and plain byte slices work for in-memory images.

pub mod error;

use crate::config::IoLimits;
use crate::io::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Byte-addressable storage indexed by file offset.
pub trait ByteSource {
    /// Copy bytes starting at `offset` into `buf`.
    ///
    /// Returns how many bytes were available; reads that start or run past
    /// the end of the store are short, never an error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize;

    /// Total size of the store in bytes.
    fn size(&self) -> u64;
}

impl ByteSource for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        if start >= self.len() {
            return 0;
        }
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        n
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl ByteSource for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        self.as_slice().read_at(offset, buf)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// A read-only memory map of an input file, bounded by [`IoLimits`].
pub struct MappedFile {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
    file_size: u64,
}

impl MappedFile {
    /// Opens and memory-maps a file.
    ///
    /// Fails for anything but a regular file, or if the file size exceeds
    /// `limits.max_file_size`.
    pub fn open<P: AsRef<Path>>(path: P, limits: &IoLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(IoError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let file_size = metadata.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = limits.max_file_size,
            "Mapping input file"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file; the map is never handed out mutably.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            file_size,
        })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The whole file contents.
    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl ByteSource for MappedFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        self.bytes().read_at(offset, buf)
    }

    fn size(&self) -> u64 {
        self.file_size
    }
}
