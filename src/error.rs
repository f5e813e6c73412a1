//! The error taxonomy for the whole crate.
//!
//! Kinds mirror the on-disk failure modes of the FAT format itself rather
//! than any particular Rust API: a `Corrupt` is something we found on disk
//! that violates an invariant, an `Invariant` is a caller asking for
//! something the format (or this mount) can't do, `Capacity` is "there's no
//! room", and `ReadOnly` is the mount-wide write guard.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("device io error: {0}")]
    DeviceIo(#[from] std::io::Error),

    #[error("disk format not recognized")]
    UnrecognizedFormat,

    #[error("corrupt: {0}")]
    Corrupt(#[from] CorruptKind),

    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantKind),

    #[error("capacity: {0}")]
    Capacity(#[from] CapacityKind),

    #[error("mount is read-only")]
    ReadOnly,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CorruptKind {
    /// FAT copy `i` disagrees with FAT #0 at cluster `cluster`.
    #[error("FAT copy {copy} disagrees with FAT #0 at cluster {cluster}")]
    FatMismatch { copy: usize, cluster: u32 },

    #[error("cluster chain starting at {head} contains a cycle")]
    FatChainCycle { head: u32 },

    #[error("cluster {cluster} in chain is a reserved/bad marker")]
    BadClusterInChain { cluster: u32 },

    #[error("FSInfo free cluster count is stale (FSInfo says {fsinfo}, FAT has {actual})")]
    FsInfoStale { fsinfo: u32, actual: u32 },

    /// Soft error: the LFN chain preceding a short entry didn't validate
    /// (checksum mismatch, gap, or bad ordinal). Handled internally by
    /// falling back to the short name; exposed here only so callers that
    /// want to observe the degradation can.
    #[error("broken LFN chain before short entry, falling back to short name")]
    BrokenLfnChain,

    #[error("directory has no 0x00 terminator entry")]
    DirTerminatorMissing,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    #[error("not a directory")]
    NotDirectory,

    #[error("not a file")]
    NotFile,

    #[error("directory is not empty")]
    DirectoryNotEmpty,

    #[error("name is too long")]
    NameTooLong,

    #[error("short name contains illegal characters")]
    IllegalShortName,

    #[error("an entry with that name already exists")]
    DuplicateName,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    #[error("no free cluster available")]
    NoFreeCluster,

    #[error("fixed-size FAT12/16 root directory is full")]
    RootDirFull,

    #[error("device is too small for the requested FAT type")]
    DeviceTooSmall,

    #[error("device is too large for the requested FAT type")]
    DeviceTooLarge,
}
