//! `FatFileSystem`: mount orchestration and flush ordering, plus the
//! handle-based arena that gives directory/file views their "same entry,
//! same object" cached identity without cyclic parent/child ownership.
//!
//! Mounting runs a read -> verify -> wrap-in-LFN-view pipeline: parse the
//! boot sector, read and cross-check the FAT copies, load the root
//! directory, and load FSInfo on FAT32.

use std::collections::HashMap;

use crate::boot_sector::{BootSector, FatType};
use crate::clock::{Clock, SystemClock};
use crate::cluster_chain::{ChainGeometry, ClusterChain};
use crate::device::BlockDevice;
use crate::dir::{AbstractDirectory, ClusterChainDirectory, Fat16RootDirectory};
use crate::error::{Error, InvariantKind, Result};
use crate::fat::Fat;
use crate::file::FatFile;
use crate::fsinfo::FsInfo;
use crate::lfn_dir::{FatLfnDirectory, FatLfnDirectoryEntry};

/// Mount-time configuration: no config file, just constructor parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountOptions {
    pub read_only: bool,
    /// When set, disagreeing FAT copies are tolerated instead of rejected.
    pub ignore_fat_differences: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

#[derive(Debug)]
struct DirNode {
    dir: FatLfnDirectory,
    parent: Option<DirHandle>,
    first_cluster: u32,
}

#[derive(Debug)]
struct FileNode {
    file: FatFile,
    parent: DirHandle,
    entry_id: u64,
}

pub struct FatFileSystem {
    device: Box<dyn BlockDevice>,
    boot_sector: BootSector,
    boot_sector_dirty: bool,
    fat: Fat,
    fsinfo: Option<FsInfo>,
    geometry: ChainGeometry,
    dirs: Vec<DirNode>,
    files: Vec<FileNode>,
    dir_cache: HashMap<(DirHandle, u64), DirHandle>,
    file_cache: HashMap<(DirHandle, u64), FileHandle>,
    read_only: bool,
    clock: Box<dyn Clock>,
}

impl FatFileSystem {
    /// Mount sequence: parse BPB -> read FAT #0 -> compare FAT #1..n ->
    /// load root directory -> load FSInfo (FAT32) -> wrap root in the LFN
    /// view.
    pub fn mount(mut device: Box<dyn BlockDevice>, options: MountOptions) -> Result<Self> {
        Self::mount_with_clock(device, options, Box::new(SystemClock))
    }

    pub fn mount_with_clock(mut device: Box<dyn BlockDevice>, options: MountOptions, clock: Box<dyn Clock>) -> Result<Self> {
        let boot_sector = BootSector::read(&mut *device)?;
        let bps = boot_sector.bytes_per_sector();

        let fat = Fat::read(
            &mut *device,
            boot_sector.fat_type,
            boot_sector.fat_offset(0),
            boot_sector.sectors_per_fat(),
            bps,
            boot_sector.data_cluster_count(),
        )?;

        if !options.ignore_fat_differences {
            for i in 1..boot_sector.nr_fats() as u32 {
                fat.verify_copy(&mut *device, i as usize, boot_sector.fat_offset(i), boot_sector.sectors_per_fat(), bps)?;
            }
        }

        let geometry = ChainGeometry { files_offset: boot_sector.files_offset(), bytes_per_cluster: boot_sector.bytes_per_cluster() };

        let fsinfo = if boot_sector.fat_type == FatType::Fat32 {
            let info = FsInfo::read(&mut *device, boot_sector.fs_info_sector_nr()?, bps)?;
            info.check_against(fat.free_cluster_count())?;
            Some(info)
        } else {
            None
        };

        let root_backing = if boot_sector.fat_type == FatType::Fat32 {
            let root_cluster = boot_sector.root_dir_first_cluster()?;
            AbstractDirectory::Chain(ClusterChainDirectory { chain: ClusterChain::new(geometry, root_cluster, options.read_only) })
        } else {
            AbstractDirectory::Fixed(Fat16RootDirectory { offset: boot_sector.root_dir_offset(), entry_count: boot_sector.root_dir_entry_count() as usize })
        };

        let root_first_cluster = root_backing.start_cluster();
        let root_dir = FatLfnDirectory::read(&mut *device, &fat, root_backing, true)?;

        Ok(Self {
            device,
            boot_sector,
            boot_sector_dirty: false,
            fat,
            fsinfo,
            geometry,
            dirs: vec![DirNode { dir: root_dir, parent: None, first_cluster: root_first_cluster }],
            files: Vec::new(),
            dir_cache: HashMap::new(),
            file_cache: HashMap::new(),
            read_only: options.read_only,
            clock,
        })
    }

    fn require_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    pub fn root(&self) -> DirHandle {
        DirHandle(0)
    }

    pub fn iterate(&self, dir: DirHandle) -> impl Iterator<Item = &FatLfnDirectoryEntry> {
        self.dirs[dir.0].dir.iterate()
    }

    pub fn lookup(&self, dir: DirHandle, name: &str) -> Option<&FatLfnDirectoryEntry> {
        self.dirs[dir.0].dir.lookup(name)
    }

    /// Opens (loading if necessary, or returning the cached handle for) the
    /// subdirectory named `name` within `dir`.
    pub fn open_directory(&mut self, dir: DirHandle, name: &str) -> Result<DirHandle> {
        let entry = self.dirs[dir.0].dir.lookup(name).ok_or(Error::Invariant(InvariantKind::NotDirectory))?.clone();
        if !entry.is_directory() {
            return Err(Error::Invariant(InvariantKind::NotDirectory));
        }

        if let Some(&cached) = self.dir_cache.get(&(dir, entry.id)) {
            return Ok(cached);
        }

        let backing = AbstractDirectory::Chain(ClusterChainDirectory {
            chain: ClusterChain::new(self.geometry, entry.first_cluster(), self.read_only),
        });
        let child_dir = FatLfnDirectory::read(&mut *self.device, &self.fat, backing, false)?;

        let handle = DirHandle(self.dirs.len());
        self.dirs.push(DirNode { dir: child_dir, parent: Some(dir), first_cluster: entry.first_cluster() });
        self.dir_cache.insert((dir, entry.id), handle);
        Ok(handle)
    }

    pub fn open_file(&mut self, dir: DirHandle, name: &str) -> Result<FileHandle> {
        let entry = self.dirs[dir.0].dir.lookup(name).ok_or(Error::Invariant(InvariantKind::NotFile))?.clone();
        if entry.is_directory() {
            return Err(Error::Invariant(InvariantKind::NotFile));
        }

        if let Some(&cached) = self.file_cache.get(&(dir, entry.id)) {
            return Ok(cached);
        }

        let chain = ClusterChain::new(self.geometry, entry.first_cluster(), self.read_only);
        let file = FatFile::new(chain, entry.short.file_size as u64);

        let handle = FileHandle(self.files.len());
        self.files.push(FileNode { file, parent: dir, entry_id: entry.id });
        self.file_cache.insert((dir, entry.id), handle);
        Ok(handle)
    }

    pub fn add_file(&mut self, dir: DirHandle, name: &str) -> Result<FileHandle> {
        self.require_writable()?;
        let clock: &dyn Clock = &*self.clock;
        let entry = self.dirs[dir.0].dir.add_file(&mut *self.device, &mut self.fat, clock, name)?.clone();

        let chain = ClusterChain::new(self.geometry, 0, false);
        let file = FatFile::new(chain, 0);
        let handle = FileHandle(self.files.len());
        self.files.push(FileNode { file, parent: dir, entry_id: entry.id });
        self.file_cache.insert((dir, entry.id), handle);
        Ok(handle)
    }

    pub fn add_directory(&mut self, dir: DirHandle, name: &str) -> Result<DirHandle> {
        self.require_writable()?;
        let parent_first_cluster = self.dirs[dir.0].first_cluster;
        let clock: &dyn Clock = &*self.clock;

        let new_cluster = self.dirs[dir.0].dir.add_directory(
            &mut *self.device,
            &mut self.fat,
            clock,
            name,
            self.geometry.bytes_per_cluster,
            self.geometry.files_offset,
            parent_first_cluster,
        )?;

        let entry_id = self.dirs[dir.0].dir.lookup(name).unwrap().id;

        let backing = AbstractDirectory::Chain(ClusterChainDirectory { chain: ClusterChain::new(self.geometry, new_cluster, false) });
        let child_dir = FatLfnDirectory::read(&mut *self.device, &self.fat, backing, false)?;

        let handle = DirHandle(self.dirs.len());
        self.dirs.push(DirNode { dir: child_dir, parent: Some(dir), first_cluster: new_cluster });
        self.dir_cache.insert((dir, entry_id), handle);
        Ok(handle)
    }

    /// Removes `name` from `dir`: frees its cluster chain (files; for
    /// non-empty directories the caller must recurse and empty them
    /// first), marks its slots deleted, and drops any cached file/directory
    /// object for it.
    pub fn remove(&mut self, dir: DirHandle, name: &str) -> Result<()> {
        self.require_writable()?;
        let entry = self.dirs[dir.0].dir.lookup(name).cloned().ok_or(Error::Invariant(InvariantKind::NotFile))?;

        if entry.is_directory() {
            let child = self.open_directory(dir, name)?;
            let has_children = self.dirs[child.0].dir.iterate().any(|e| e.name() != "." && e.name() != "..");
            if has_children {
                return Err(Error::Invariant(InvariantKind::DirectoryNotEmpty));
            }
        }

        if entry.first_cluster() != 0 {
            self.fat.free_chain(entry.first_cluster())?;
        }

        self.dirs[dir.0].dir.remove(name)?;
        self.dir_cache.remove(&(dir, entry.id));
        self.file_cache.remove(&(dir, entry.id));
        Ok(())
    }

    pub fn file_length(&self, handle: FileHandle) -> u64 {
        self.files[handle.0].file.length()
    }

    pub fn set_file_length(&mut self, handle: FileHandle, new_len: u64) -> Result<()> {
        self.require_writable()?;
        self.files[handle.0].file.set_length(&mut *self.device, &mut self.fat, new_len)
    }

    pub fn read_file(&mut self, handle: FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.files[handle.0].file.read(&mut *self.device, &self.fat, offset, buf)
    }

    pub fn write_file(&mut self, handle: FileHandle, offset: u64, buf: &[u8]) -> Result<()> {
        self.require_writable()?;
        self.files[handle.0].file.write(&mut *self.device, &mut self.fat, offset, buf)
    }

    /// Persists the file's size (and the chain's first cluster, for a
    /// zero-length-to-nonzero-length transition) back into its owning
    /// directory's cached entry. The directory's own `flush` later
    /// serializes that entry to disk.
    pub fn flush_file(&mut self, handle: FileHandle) -> Result<()> {
        let node = &mut self.files[handle.0];
        if !node.file.take_dirty() {
            return Ok(());
        }
        let parent = node.parent;
        let entry_id = node.entry_id;
        let size = node.file.length();
        let first_cluster = node.file.chain().start_cluster();

        let (date, time, tenths) = self.clock.now_fat();
        if let Some(entry) = self.dirs[parent.0].dir.find_by_id_mut(entry_id) {
            entry.short.file_size = size as u32;
            entry.short.set_first_cluster(first_cluster);
            entry.short.write_date = date.pack();
            entry.short.write_time = time.pack();
            entry.short.creation_time_tenths = tenths;
        }
        Ok(())
    }

    pub fn volume_label(&self) -> Option<&str> {
        self.dirs[0].dir.label()
    }

    pub fn set_volume_label(&mut self, label: Option<&str>) -> Result<()> {
        self.require_writable()?;
        self.dirs[0].dir.set_label(label)?;

        if let Some(l) = label {
            let mut raw = [b' '; 11];
            let bytes = l.as_bytes();
            raw[..bytes.len().min(11)].copy_from_slice(&bytes[..bytes.len().min(11)]);
            self.boot_sector.set_volume_label(raw);
        } else {
            self.boot_sector.set_volume_label(*b"NO NAME    ");
        }
        self.boot_sector_dirty = true;
        Ok(())
    }

    pub fn free_space(&self) -> u64 {
        self.fat.free_cluster_count() as u64 * self.geometry.bytes_per_cluster as u64
    }

    pub fn total_space(&self) -> u64 {
        self.boot_sector.data_cluster_count() as u64 * self.geometry.bytes_per_cluster as u64
    }

    /// Flush ordering: boot sector -> each FAT copy -> directory tree (all
    /// cached directories; every one that's ever been loaded went through
    /// `dirs`, so flushing all of them covers the whole tree) -> FSInfo ->
    /// `device.flush()`.
    pub fn flush(&mut self) -> Result<()> {
        self.require_writable()?;

        for node in &mut self.files {
            if !node.file.take_dirty() {
                continue;
            }
            let parent = node.parent;
            let entry_id = node.entry_id;
            let size = node.file.length();
            let first_cluster = node.file.chain().start_cluster();
            if let Some(entry) = self.dirs[parent.0].dir.find_by_id_mut(entry_id) {
                entry.short.file_size = size as u32;
                entry.short.set_first_cluster(first_cluster);
            }
        }

        if self.boot_sector_dirty {
            self.boot_sector.write(&mut *self.device)?;
            self.boot_sector_dirty = false;
        }

        for i in 0..self.boot_sector.nr_fats() as u32 {
            self.fat.write_copy(&mut *self.device, self.boot_sector.fat_offset(i), self.boot_sector.sectors_per_fat(), self.boot_sector.bytes_per_sector())?;
        }

        for node in &mut self.dirs {
            node.dir.flush(&mut *self.device, &mut self.fat)?;
        }

        if let Some(fsinfo) = &mut self.fsinfo {
            fsinfo.set_free_cluster_count(self.fat.free_cluster_count());
            fsinfo.set_last_allocated_cluster(self.fat.last_allocated_cluster());
            fsinfo.flush(&mut *self.device)?;
        }

        self.device.flush().map_err(Error::DeviceIo)?;
        Ok(())
    }

    /// Flushes (if writable) and drops the in-memory cache.
    pub fn close(mut self) -> Result<()> {
        if !self.read_only {
            self.flush()?;
        }
        Ok(())
    }

    pub fn fat_type(&self) -> FatType {
        self.boot_sector.fat_type
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot_sector
    }

    /// Reclaims the underlying device, dropping the in-memory cache. Used to
    /// hand the same backing storage to a fresh `mount` call (e.g. to verify
    /// that what was flushed is actually what gets read back).
    pub fn into_device(self) -> Box<dyn BlockDevice> {
        self.device
    }
}
