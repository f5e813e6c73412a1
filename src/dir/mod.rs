//! `AbstractDirectory` and its two backing variants, plus the short 8.3
//! directory entry (`FatDirectoryEntry`).
//!
//! A directory's slot sequence is backed by either a fixed extent (the
//! FAT12/16 root directory) or a `ClusterChain` (everything else).

use crate::cluster_chain::ClusterChain;
use crate::device::BlockDevice;
use crate::error::{CapacityKind, Error, Result};
use crate::fat::Fat;
use crate::name::ShortName;

pub const ENTRY_SIZE: usize = 32;

pub mod attr {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    /// `READ_ONLY | HIDDEN | SYSTEM | VOLUME_ID`: marks a long-name slot.
    pub const LONG_NAME: u8 = 0x0F;
}

pub const ENTRY_FREE: u8 = 0x00;
pub const ENTRY_DELETED: u8 = 0xE5;
pub const KANJI_ESCAPE: u8 = 0x05;

/// A parsed 32-byte short directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatDirectoryEntry {
    pub name: ShortName,
    pub attr: u8,
    pub nt_reserved: u8,
    pub creation_time_tenths: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub first_cluster_high: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_low: u16,
    pub file_size: u32,
}

impl FatDirectoryEntry {
    pub fn blank() -> Self {
        Self {
            name: ShortName::from_raw([b' '; 11]),
            attr: 0,
            nt_reserved: 0,
            creation_time_tenths: 0,
            creation_time: 0,
            creation_date: 0,
            access_date: 0,
            first_cluster_high: 0,
            write_time: 0,
            write_date: 0,
            first_cluster_low: 0,
            file_size: 0,
        }
    }

    pub fn from_bytes(raw: [u8; 32]) -> Self {
        Self {
            name: ShortName::from_raw(raw[0..11].try_into().unwrap()),
            attr: raw[11],
            nt_reserved: raw[12],
            creation_time_tenths: raw[13],
            creation_time: u16::from_le_bytes([raw[14], raw[15]]),
            creation_date: u16::from_le_bytes([raw[16], raw[17]]),
            access_date: u16::from_le_bytes([raw[18], raw[19]]),
            first_cluster_high: u16::from_le_bytes([raw[20], raw[21]]),
            write_time: u16::from_le_bytes([raw[22], raw[23]]),
            write_date: u16::from_le_bytes([raw[24], raw[25]]),
            first_cluster_low: u16::from_le_bytes([raw[26], raw[27]]),
            file_size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut raw = [0u8; 32];
        raw[0..11].copy_from_slice(&self.name.raw());
        raw[11] = self.attr;
        raw[12] = self.nt_reserved;
        raw[13] = self.creation_time_tenths;
        raw[14..16].copy_from_slice(&self.creation_time.to_le_bytes());
        raw[16..18].copy_from_slice(&self.creation_date.to_le_bytes());
        raw[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        raw[20..22].copy_from_slice(&self.first_cluster_high.to_le_bytes());
        raw[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        raw[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        raw[26..28].copy_from_slice(&self.first_cluster_low.to_le_bytes());
        raw[28..32].copy_from_slice(&self.file_size.to_le_bytes());
        raw
    }

    pub fn is_long_name_slot(&self) -> bool {
        self.attr == attr::LONG_NAME
    }

    pub fn is_volume_label(&self) -> bool {
        self.attr & attr::VOLUME_ID != 0 && !self.is_long_name_slot()
    }

    pub fn is_directory(&self) -> bool {
        self.attr & attr::DIRECTORY != 0
    }

    pub fn is_free(&self) -> bool {
        self.name.raw()[0] == ENTRY_FREE
    }

    pub fn is_deleted(&self) -> bool {
        self.name.raw()[0] == ENTRY_DELETED
    }

    pub fn is_live(&self) -> bool {
        !self.is_free() && !self.is_deleted()
    }

    pub fn first_cluster(&self) -> u32 {
        (self.first_cluster_high as u32) << 16 | self.first_cluster_low as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_high = (cluster >> 16) as u16;
        self.first_cluster_low = cluster as u16;
    }

    pub fn mark_deleted(&mut self) {
        let mut raw = self.name.raw();
        raw[0] = ENTRY_DELETED;
        self.name = ShortName::from_raw(raw);
    }

    pub fn mark_free(&mut self) {
        let mut raw = self.name.raw();
        raw[0] = ENTRY_FREE;
        self.name = ShortName::from_raw(raw);
    }
}

/// A fixed-extent directory area: the FAT12/16 root directory. Cannot grow.
#[derive(Debug, Clone, Copy)]
pub struct Fat16RootDirectory {
    pub offset: u64,
    pub entry_count: usize,
}

/// A directory backed by a `ClusterChain`: the FAT32 root, and every
/// non-root directory regardless of FAT type.
#[derive(Debug)]
pub struct ClusterChainDirectory {
    pub chain: ClusterChain,
}

/// Slot-level view over a directory's raw 32-byte entries, dispatching to
/// whichever extent backs it. `fat` is threaded through
/// uniformly even though `Fixed` never touches it, so callers don't need to
/// special-case which variant they're holding.
#[derive(Debug)]
pub enum AbstractDirectory {
    Fixed(Fat16RootDirectory),
    Chain(ClusterChainDirectory),
}

impl AbstractDirectory {
    pub fn capacity(&self, fat: &Fat) -> Result<usize> {
        match self {
            AbstractDirectory::Fixed(d) => Ok(d.entry_count),
            AbstractDirectory::Chain(d) => Ok((d.chain.length(fat)? / ENTRY_SIZE as u64) as usize),
        }
    }

    pub fn start_cluster(&self) -> u32 {
        match self {
            AbstractDirectory::Fixed(_) => 0,
            AbstractDirectory::Chain(d) => d.chain.start_cluster(),
        }
    }

    pub fn get_entry(&self, device: &mut dyn BlockDevice, fat: &Fat, index: usize) -> Result<FatDirectoryEntry> {
        let mut buf = [0u8; ENTRY_SIZE];
        match self {
            AbstractDirectory::Fixed(d) => {
                device.read(d.offset + (index * ENTRY_SIZE) as u64, &mut buf)?;
            }
            AbstractDirectory::Chain(d) => {
                d.chain.read(device, fat, (index * ENTRY_SIZE) as u64, &mut buf)?;
            }
        }
        Ok(FatDirectoryEntry::from_bytes(buf))
    }

    pub fn set_entry(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat, index: usize, entry: &FatDirectoryEntry) -> Result<()> {
        let buf = entry.to_bytes();
        match self {
            AbstractDirectory::Fixed(d) => {
                if index >= d.entry_count {
                    return Err(Error::Capacity(CapacityKind::RootDirFull));
                }
                device.write(d.offset + (index * ENTRY_SIZE) as u64, &buf)?;
            }
            AbstractDirectory::Chain(d) => {
                d.chain.write(device, fat, (index * ENTRY_SIZE) as u64, &buf)?;
            }
        }
        Ok(())
    }

    /// Grows or shrinks the backing extent to exactly `new_count` slots.
    /// The fixed root directory can only "grow" up to its existing
    /// capacity (a no-op) or shrink logically (also a no-op: callers track
    /// the live-entry count separately, the extent itself never changes
    /// size) — requesting more than its fixed capacity fails.
    pub fn change_size(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat, new_count: usize) -> Result<()> {
        match self {
            AbstractDirectory::Fixed(d) => {
                if new_count > d.entry_count {
                    return Err(Error::Capacity(CapacityKind::RootDirFull));
                }
                Ok(())
            }
            AbstractDirectory::Chain(d) => {
                d.chain.set_chain_length(device, fat, (new_count * ENTRY_SIZE) as u64)
            }
        }
    }

    /// Scans from slot 0 for the first `0x00`-first-byte ("free") slot.
    /// Returns `capacity()` if every slot is live (meaning the directory
    /// needs to grow before a new entry can be appended).
    pub fn find_terminator(&self, device: &mut dyn BlockDevice, fat: &Fat) -> Result<usize> {
        let capacity = self.capacity(fat)?;
        for i in 0..capacity {
            if self.get_entry(device, fat, i)?.is_free() {
                return Ok(i);
            }
        }
        Ok(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_sector::FatType;
    use crate::cluster_chain::ChainGeometry;
    use crate::device::MemoryBlockDevice;
    use crate::name::ShortName;
    use assert_eq as eq;

    fn chain_dir() -> (MemoryBlockDevice, Fat, AbstractDirectory) {
        let dev = MemoryBlockDevice::new(1 << 20, 512);
        let fat = Fat::from_entries(FatType::Fat16, vec![0; 130]);
        let geometry = ChainGeometry { files_offset: 4096, bytes_per_cluster: 2048 };
        let dir = AbstractDirectory::Chain(ClusterChainDirectory { chain: ClusterChain::new(geometry, 0, false) });
        (dev, fat, dir)
    }

    #[test]
    fn entry_round_trips_through_chain_directory() {
        let (mut dev, mut fat, mut dir) = chain_dir();
        dir.change_size(&mut dev, &mut fat, 4).unwrap();

        let mut entry = FatDirectoryEntry::blank();
        entry.name = ShortName::try_exact("HELLO.TXT").unwrap();
        entry.attr = attr::ARCHIVE;
        entry.file_size = 42;
        dir.set_entry(&mut dev, &mut fat, 0, &entry).unwrap();

        let read_back = dir.get_entry(&mut dev, &fat, 0).unwrap();
        eq!(read_back, entry);
    }

    #[test]
    fn fresh_directory_terminator_is_slot_zero() {
        let (mut dev, fat, dir) = chain_dir();
        // capacity() on an empty (start_cluster == 0) chain is 0, so the
        // terminator is "capacity", i.e. the directory must grow first.
        eq!(dir.find_terminator(&mut dev, &fat).unwrap(), 0);
    }

    #[test]
    fn terminator_follows_the_last_live_entry() {
        let (mut dev, mut fat, mut dir) = chain_dir();
        dir.change_size(&mut dev, &mut fat, 4).unwrap();

        let mut entry = FatDirectoryEntry::blank();
        entry.name = ShortName::try_exact("A.TXT").unwrap();
        entry.attr = attr::ARCHIVE;
        dir.set_entry(&mut dev, &mut fat, 0, &entry).unwrap();

        eq!(dir.find_terminator(&mut dev, &fat).unwrap(), 1);
    }

    #[test]
    fn fixed_root_rejects_growth_past_capacity() {
        let mut dev = MemoryBlockDevice::new(1 << 16, 512);
        let mut fat = Fat::from_entries(FatType::Fat16, vec![0; 10]);
        let mut dir = AbstractDirectory::Fixed(Fat16RootDirectory { offset: 512, entry_count: 16 });
        assert!(dir.change_size(&mut dev, &mut fat, 17).is_err());
        dir.change_size(&mut dev, &mut fat, 16).unwrap();
    }
}
