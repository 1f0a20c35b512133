use std::io;
use thiserror::Error;

use crate::record::MAX_NAME_LEN;

#[derive(Error, Debug)]
pub enum BundleError {
    /// The first three bytes are not the bundle magic.
    #[error("Invalid magic number: not a bundle file")]
    InvalidMagic,
    #[error("Unsupported bundle version: {0}")]
    UnsupportedVersion(u8),
    #[error("Invalid bucket count: {0} (must be at least 1)")]
    InvalidBucketCount(u32),
    #[error("Entry name is {0} bytes; the limit is {MAX_NAME_LEN}")]
    NameTooLong(usize),
    #[error("Entry name is empty")]
    EmptyName,
    #[error("Content of {0} bytes does not fit a 32-bit size field")]
    ContentTooLarge(u64),
    /// The bundle grew past what a 32-bit offset can address.
    #[error("Bundle is full: record would end past the 32-bit offset range")]
    OffsetOverflow,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BundleError>;

impl From<BundleError> for io::Error {
    fn from(e: BundleError) -> Self {
        match e {
            BundleError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
