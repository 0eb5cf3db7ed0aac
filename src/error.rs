use std::io;

use crate::dirent::NAME_MAX;
use crate::walk::MAX_NESTING;

/// Failures while following a cluster chain. All of these abort the
/// current traversal; the chain map itself is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("attempt to access invalid cluster: {0}")]
    InvalidCluster(u32),
    #[error("cluster chain problem: next cluster after {0} is unallocated")]
    Unallocated(u32),
    #[error("cluster chain problem: next cluster after {id} has invalid value: {next:#x}")]
    OutOfRange { id: u32, next: u32 },
}

/// Failures while resolving a path against the directory tree.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("bad filename supplied (one leafname is longer than {NAME_MAX} bytes)")]
    SegmentTooLong(usize),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory tree is nested deeper than {MAX_NESTING} levels")]
    TooDeep,
}

#[derive(Debug, thiserror::Error)]
pub enum FatxError {
    #[error("no FATX partition found at requested offset")]
    BadMagic,
    #[error("invalid volume size: {0} bytes is smaller than one cluster")]
    InvalidVolumeSize(u64),
    #[error("unable to generate a volume id: {0}")]
    VolumeId(#[source] std::time::SystemTimeError),
    #[error("cluster data must be exactly one cluster long, got {0} bytes")]
    InvalidClusterSize(usize),
    #[error("hit end of cluster chain with {0} bytes of file data missing")]
    TruncatedChain(u64),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures of the whole-device layout engine.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("no Xbox partition table found (bad magic)")]
    BadMagic,
    #[error("device too small: {0} sectors do not reach past the fixed partitions")]
    DeviceTooSmall(u64),
    #[error("invalid F partition percentage: {0} (must be 0-100)")]
    InvalidPercent(u8),
    #[error("sector arithmetic overflow while planning partitions")]
    Overflow,
    #[error(transparent)]
    Fatx(#[from] FatxError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
