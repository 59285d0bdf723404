//! Errors raised while opening input files.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    /// The input exceeds [`crate::config::IoLimits::max_file_size`]
    #[error("{found} byte input exceeds the {limit} byte limit")]
    FileTooLarge { limit: u64, found: u64 },

    /// Directories, devices and the like cannot be mapped
    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    #[error("I/O error: {0}")]
    StdIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IoError>;
