//! `FatLfnDirectory` / `FatLfnDirectoryEntry`: the public, long-name-keyed
//! directory view built on top of the raw slot sequence in
//! `dir::AbstractDirectory`.
//!
//! Assembles an LFN chain followed by its short entry into one logical
//! `FatLfnDirectoryEntry` per scan.

use crate::clock::Clock;
use crate::device::BlockDevice;
use crate::dir::{attr, AbstractDirectory, FatDirectoryEntry, ENTRY_SIZE};
use crate::error::{CorruptKind, Error, InvariantKind, Result};
use crate::fat::Fat;
use crate::name::{self, LongFileName, ShortName};

/// One logical entry as seen through the long-name view: its short entry
/// plus (if present) the long name that preceded it, and the slot range it
/// occupies in the backing directory.
#[derive(Debug, Clone)]
pub struct FatLfnDirectoryEntry {
    /// Stable identity for this logical entry, independent of its slot
    /// position (which shifts as other entries are added/removed/flushed).
    /// `FatFileSystem` keys its open-file/open-directory cache on
    /// `(parent handle, id)` to satisfy the "same entry, same object"
    /// cached identity invariant.
    pub id: u64,
    pub short: FatDirectoryEntry,
    pub long_name: Option<String>,
    pub slot_start: usize,
    pub slot_count: usize,
}

impl FatLfnDirectoryEntry {
    /// The name callers should use: the long name if present, else the
    /// short name's `BASE.EXT` rendering.
    pub fn name(&self) -> String {
        self.long_name.clone().unwrap_or_else(|| self.short.name.display())
    }

    pub fn is_directory(&self) -> bool {
        self.short.is_directory()
    }

    pub fn first_cluster(&self) -> u32 {
        self.short.first_cluster()
    }
}

/// The public directory abstraction. Holds the live entry list in
/// insertion order and the single optional volume-label pseudo-entry (root
/// directory only).
#[derive(Debug)]
pub struct FatLfnDirectory {
    backing: AbstractDirectory,
    entries: Vec<FatLfnDirectoryEntry>,
    volume_label: Option<(String, FatDirectoryEntry)>,
    is_root: bool,
    next_id: u64,
}

fn names_match_case_insensitive(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl FatLfnDirectory {
    /// Scans the backing directory's slots, assembling LFN chains and short
    /// entries into the logical entry list. A broken LFN chain (gap, bad
    /// ordinal, checksum mismatch) degrades that entry to short-name-only
    /// (`BrokenLfnChain`, soft, logged, not propagated).
    pub fn read(device: &mut dyn BlockDevice, fat: &Fat, backing: AbstractDirectory, is_root: bool) -> Result<Self> {
        let capacity = backing.capacity(fat)?;
        let mut entries = Vec::new();
        let mut volume_label = None;
        let mut pending_lfn: Vec<[u8; 32]> = Vec::new();
        let mut pending_start = 0usize;
        let mut next_id = 0u64;

        let mut i = 0usize;
        while i < capacity {
            let raw_entry = backing.get_entry(device, fat, i)?;
            if raw_entry.is_free() {
                break;
            }
            if raw_entry.is_deleted() {
                pending_lfn.clear();
                i += 1;
                continue;
            }

            if raw_entry.is_long_name_slot() {
                if pending_lfn.is_empty() {
                    pending_start = i;
                }
                pending_lfn.push(raw_entry.to_bytes());
                i += 1;
                continue;
            }

            if raw_entry.is_volume_label() {
                volume_label = Some((raw_entry.name.display(), raw_entry));
                pending_lfn.clear();
                i += 1;
                continue;
            }

            let long_name = if pending_lfn.is_empty() {
                None
            } else {
                let checksum = raw_entry.name.checksum();
                match LongFileName::unpack_slots(&pending_lfn, checksum) {
                    Some(lfn) => Some(lfn.to_string_lossy()),
                    None => {
                        log::warn!("broken LFN chain before entry {:?}, falling back to short name", raw_entry.name.display());
                        None
                    }
                }
            };

            let slot_start = if pending_lfn.is_empty() { i } else { pending_start };
            let slot_count = pending_lfn.len() + 1;
            entries.push(FatLfnDirectoryEntry { id: next_id, short: raw_entry, long_name, slot_start, slot_count });
            next_id += 1;

            pending_lfn.clear();
            i += 1;
        }

        Ok(Self { backing, entries, volume_label, is_root, next_id })
    }

    pub fn iterate(&self) -> impl Iterator<Item = &FatLfnDirectoryEntry> {
        self.entries.iter()
    }

    pub fn lookup(&self, name: &str) -> Option<&FatLfnDirectoryEntry> {
        self.entries.iter().find(|e| names_match_case_insensitive(&e.name(), name))
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| names_match_case_insensitive(&e.name(), name))
    }

    pub fn find_by_id(&self, id: u64) -> Option<&FatLfnDirectoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: u64) -> Option<&mut FatLfnDirectoryEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn label(&self) -> Option<&str> {
        self.volume_label.as_ref().map(|(l, _)| l.as_str())
    }

    pub fn set_label(&mut self, label: Option<&str>) -> Result<()> {
        if !self.is_root {
            return Err(Error::Invariant(InvariantKind::NotDirectory));
        }
        match label {
            None => self.volume_label = None,
            Some(l) => {
                let short = ShortName::try_exact(l).unwrap_or_else(|_| ShortName::from_raw(*b"NO NAME    "));
                let mut e = FatDirectoryEntry::blank();
                e.name = short;
                e.attr = attr::VOLUME_ID;
                self.volume_label = Some((l.to_string(), e));
            }
        }
        Ok(())
    }

    /// Shared implementation of `add_file`/`add_directory`: pick a unique
    /// short name, decide whether an LFN chain is needed, append the slots,
    /// grow the backing directory if required.
    fn add_entry(
        &mut self,
        device: &mut dyn BlockDevice,
        fat: &mut Fat,
        clock: &dyn Clock,
        long_name: &str,
        entry_attr: u8,
        first_cluster: u32,
    ) -> Result<&FatLfnDirectoryEntry> {
        if self.index_of(long_name).is_some() {
            return Err(Error::Invariant(InvariantKind::DuplicateName));
        }

        let existing_short: Vec<ShortName> = self.entries.iter().map(|e| e.short.name).collect();
        let short = if let Ok(exact) = ShortName::try_exact(long_name) {
            if existing_short.iter().any(|s| s.raw() == exact.raw()) {
                name::generate_short_name(long_name, &|c| existing_short.iter().any(|s| s.raw() == c.raw()))?
            } else {
                exact
            }
        } else {
            name::generate_short_name(long_name, &|c| existing_short.iter().any(|s| s.raw() == c.raw()))?
        };

        let needs_lfn = !long_name.eq_ignore_ascii_case(&short.display());

        let (date, time, tenths) = clock.now_fat();
        let mut short_entry = FatDirectoryEntry::blank();
        short_entry.name = short;
        short_entry.attr = entry_attr;
        short_entry.creation_date = date.pack();
        short_entry.creation_time = time.pack();
        short_entry.creation_time_tenths = tenths;
        short_entry.write_date = date.pack();
        short_entry.write_time = time.pack();
        short_entry.access_date = date.pack();
        short_entry.set_first_cluster(first_cluster);

        let lfn_slots = if needs_lfn {
            let lfn = LongFileName::from_str(long_name)?;
            lfn.pack_slots(short.checksum())?
        } else {
            Vec::new()
        };

        let slot_start = self.backing.find_terminator(device, fat)?;
        let needed_slots = slot_start + lfn_slots.len() + 1 + 1; // +1 short entry, +1 terminator
        let capacity = self.backing.capacity(fat)?;
        if needed_slots > capacity {
            self.backing.change_size(device, fat, needed_slots)?;
        }

        let mut idx = slot_start;
        for slot in &lfn_slots {
            self.backing.set_entry(device, fat, idx, &FatDirectoryEntry::from_bytes(*slot))?;
            idx += 1;
        }
        self.backing.set_entry(device, fat, idx, &short_entry)?;

        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(FatLfnDirectoryEntry {
            id,
            short: short_entry,
            long_name: if needs_lfn { Some(long_name.to_string()) } else { None },
            slot_start,
            slot_count: lfn_slots.len() + 1,
        });
        Ok(self.entries.last().unwrap())
    }

    pub fn add_file(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat, clock: &dyn Clock, name: &str) -> Result<&FatLfnDirectoryEntry> {
        self.add_entry(device, fat, clock, name, attr::ARCHIVE, 0)
    }

    /// Allocates a cluster for the new directory, zero-fills it, and writes
    /// `.`/`..` entries (`..` first-cluster = parent head, or 0 if parent
    /// is the root).
    pub fn add_directory(
        &mut self,
        device: &mut dyn BlockDevice,
        fat: &mut Fat,
        clock: &dyn Clock,
        name: &str,
        bytes_per_cluster: u32,
        files_offset: u64,
        parent_first_cluster: u32,
    ) -> Result<u32> {
        let new_cluster = fat.alloc_new()?;
        let zeros = vec![0u8; bytes_per_cluster as usize];
        let cluster_offset = files_offset + (new_cluster as u64 - 2) * bytes_per_cluster as u64;
        device.write(cluster_offset, &zeros)?;

        self.add_entry(device, fat, clock, name, attr::DIRECTORY, new_cluster)?;

        let (date, time, tenths) = clock.now_fat();
        let mut dot = FatDirectoryEntry::blank();
        dot.name = ShortName::from_raw(*b".          ");
        dot.attr = attr::DIRECTORY;
        dot.creation_date = date.pack();
        dot.creation_time = time.pack();
        dot.creation_time_tenths = tenths;
        dot.set_first_cluster(new_cluster);

        let mut dotdot = FatDirectoryEntry::blank();
        dotdot.name = ShortName::from_raw(*b"..         ");
        dotdot.attr = attr::DIRECTORY;
        dotdot.creation_date = date.pack();
        dotdot.creation_time = time.pack();
        dotdot.creation_time_tenths = tenths;
        dotdot.set_first_cluster(parent_first_cluster);

        device.write(cluster_offset, &dot.to_bytes())?;
        device.write(cluster_offset + ENTRY_SIZE as u64, &dotdot.to_bytes())?;

        Ok(new_cluster)
    }

    /// Marks every slot of the named entry's LFN chain and short entry as
    /// deleted (`0xE5`), both in the in-memory cache and (on next `flush`)
    /// on disk. Freeing the entry's cluster chain is the caller's job (it
    /// needs the FAT, which this directory doesn't retain a mutable borrow
    /// of across the whole call) — `FatFileSystem::remove` does it.
    pub fn remove(&mut self, name: &str) -> Result<FatLfnDirectoryEntry> {
        let idx = self.index_of(name).ok_or(Error::Invariant(InvariantKind::NotDirectory))?;
        Ok(self.entries.remove(idx))
    }

    /// Reserializes every live entry plus the volume-label pseudo-entry (if
    /// this is the root) into slots starting at 0, in current insertion
    /// order, followed by a `0x00` terminator. Grows the backing directory
    /// first if the current entry set no longer fits.
    pub fn flush(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat) -> Result<()> {
        let mut total_slots = self.entries.iter().map(|e| e.slot_count).sum::<usize>();
        if self.volume_label.is_some() {
            total_slots += 1;
        }
        let needed = total_slots + 1; // terminator

        let capacity = self.backing.capacity(fat)?;
        if needed > capacity {
            self.backing.change_size(device, fat, needed)?;
        }

        let mut idx = 0usize;

        if let Some((_, label_entry)) = &self.volume_label {
            self.backing.set_entry(device, fat, idx, label_entry)?;
            idx += 1;
        }

        for entry in &mut self.entries {
            entry.slot_start = idx;
            if let Some(long_name) = &entry.long_name {
                let lfn = LongFileName::from_str(long_name)?;
                let slots = lfn.pack_slots(entry.short.name.checksum())?;
                for slot in &slots {
                    self.backing.set_entry(device, fat, idx, &FatDirectoryEntry::from_bytes(*slot))?;
                    idx += 1;
                }
            }
            self.backing.set_entry(device, fat, idx, &entry.short)?;
            idx += 1;
        }

        if idx < capacity {
            self.backing.set_entry(device, fat, idx, &FatDirectoryEntry::blank())?;
        }

        Ok(())
    }

    pub fn backing(&self) -> &AbstractDirectory {
        &self.backing
    }

    pub fn backing_mut(&mut self) -> &mut AbstractDirectory {
        &mut self.backing
    }

    pub fn entries_mut(&mut self) -> &mut Vec<FatLfnDirectoryEntry> {
        &mut self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_sector::FatType;
    use crate::clock::{Clock, FixedClock};
    use crate::cluster_chain::{ChainGeometry, ClusterChain};
    use crate::device::MemoryBlockDevice;
    use crate::dir::ClusterChainDirectory;
    use assert_eq as eq;

    fn setup() -> (MemoryBlockDevice, Fat, AbstractDirectory, FixedClock) {
        let dev = MemoryBlockDevice::new(1 << 20, 512);
        let fat = Fat::from_entries(FatType::Fat16, vec![0; 300]);
        let geometry = ChainGeometry { files_offset: 4096, bytes_per_cluster: 2048 };
        let backing = AbstractDirectory::Chain(ClusterChainDirectory { chain: ClusterChain::new(geometry, 0, false) });
        let clock = FixedClock(std::time::UNIX_EPOCH);
        (dev, fat, backing, clock)
    }

    #[test]
    fn add_file_then_lookup_round_trips() {
        let (mut dev, mut fat, backing, clock) = setup();
        let mut dir = FatLfnDirectory::read(&mut dev, &fat, backing, true).unwrap();

        dir.add_file(&mut dev, &mut fat, &clock, "hello.txt").unwrap();
        let found = dir.lookup("hello.txt").unwrap();
        eq!(found.name(), "HELLO.TXT");
        eq!(found.first_cluster(), 0);
    }

    #[test]
    fn duplicate_add_file_fails() {
        let (mut dev, mut fat, backing, clock) = setup();
        let mut dir = FatLfnDirectory::read(&mut dev, &fat, backing, true).unwrap();
        dir.add_file(&mut dev, &mut fat, &clock, "a.txt").unwrap();
        assert!(matches!(
            dir.add_file(&mut dev, &mut fat, &clock, "a.txt"),
            Err(Error::Invariant(InvariantKind::DuplicateName))
        ));
    }

    #[test]
    fn long_name_gets_generated_short_name_and_lfn_chain() {
        let (mut dev, mut fat, backing, clock) = setup();
        let mut dir = FatLfnDirectory::read(&mut dev, &fat, backing, true).unwrap();
        dir.add_file(&mut dev, &mut fat, &clock, "ThisIsALongName.TXT").unwrap();
        let found = dir.lookup("ThisIsALongName.TXT").unwrap();
        eq!(found.short.name.display(), "THISIS~1.TXT");
        eq!(found.name(), "ThisIsALongName.TXT");
    }

    #[test]
    fn flush_then_reread_preserves_entries() {
        let (mut dev, mut fat, backing, clock) = setup();
        let mut dir = FatLfnDirectory::read(&mut dev, &fat, backing, true).unwrap();
        dir.add_file(&mut dev, &mut fat, &clock, "a.txt").unwrap();
        dir.add_file(&mut dev, &mut fat, &clock, "ThisIsALongName.TXT").unwrap();
        dir.flush(&mut dev, &mut fat).unwrap();

        let geometry = ChainGeometry { files_offset: 4096, bytes_per_cluster: 2048 };
        let start_cluster = dir.backing().start_cluster();
        let backing2 = AbstractDirectory::Chain(ClusterChainDirectory { chain: ClusterChain::new(geometry, start_cluster, false) });
        let reread = FatLfnDirectory::read(&mut dev, &fat, backing2, true).unwrap();
        eq!(reread.iterate().count(), 2);
        assert!(reread.lookup("a.txt").is_some());
        assert!(reread.lookup("ThisIsALongName.TXT").is_some());
    }

    #[test]
    fn remove_drops_entry_from_cache() {
        let (mut dev, mut fat, backing, clock) = setup();
        let mut dir = FatLfnDirectory::read(&mut dev, &fat, backing, true).unwrap();
        dir.add_file(&mut dev, &mut fat, &clock, "a.txt").unwrap();
        dir.remove("a.txt").unwrap();
        assert!(dir.lookup("a.txt").is_none());
    }
}
