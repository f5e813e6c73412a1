//! The `BlockDevice` collaborator.
//!
//! This crate never touches a host filesystem driver; everything it knows
//! about a disk comes through this trait. Offsets passed in are always
//! sector-size aligned by the callers in this crate — implementations don't
//! need to handle unaligned I/O.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A byte-addressable random-access store with a fixed sector size.
///
/// Implementations should treat partial reads/writes as a bug to propagate,
/// not to retry; retrying on `Err` is the caller's business, not this
/// trait's.
pub trait BlockDevice {
    /// Total size of the device in bytes.
    fn size(&self) -> u64;

    /// The device's native sector size in bytes.
    fn sector_size(&self) -> u32;

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn write(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn is_read_only(&self) -> bool {
        false
    }
}

/// An in-memory device, used by tests, the formatter's "round-trip" checks,
/// and the benches. Grows are not supported: `size()` is fixed at
/// construction, matching a real block device.
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    data: Vec<u8>,
    sector_size: u32,
    read_only: bool,
}

impl MemoryBlockDevice {
    pub fn new(size_in_bytes: u64, sector_size: u32) -> Self {
        Self {
            data: vec![0u8; size_in_bytes as usize],
            sector_size,
            read_only: false,
        }
    }

    pub fn from_bytes(data: Vec<u8>, sector_size: u32) -> Self {
        Self { data, sector_size, read_only: false }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of device"));
        }
        buf.copy_from_slice(&self.data[offset..end]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "device is read-only"));
        }
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "write past end of device"));
        }
        self.data[offset..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// A real disk image or block device backed by a `std::fs::File`.
#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
    size: u64,
    sector_size: u32,
    read_only: bool,
}

impl FileBlockDevice {
    pub fn open(path: impl AsRef<std::path::Path>, sector_size: u32) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size, sector_size, read_only: false })
    }

    pub fn open_read_only(path: impl AsRef<std::path::Path>, sector_size: u32) -> io::Result<Self> {
        let file = File::options().read(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size, sector_size, read_only: true })
    }
}

impl BlockDevice for FileBlockDevice {
    fn size(&self) -> u64 {
        self.size
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "device is read-only"));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
