//! The boot sector / BIOS Parameter Block.
//!
//! One `BootSector` value carries a `FatType` + `Dialect` discriminator and
//! a byte-offset table that differs only at `0x24+`; dialect-specific
//! `check_disk`/`init` behavior lives in the small `Dialect` enum in
//! `dialect.rs` with three implementations (`pc`, `msx`, `tos`).

mod dialect;
mod msx;
mod pc;
mod tos;

pub use dialect::Dialect;

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::sector::Sector;

pub const BOOT_SECTOR_SIZE: usize = 512;
pub const BOOT_SIGNATURE_OFFSET: usize = 510;
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// The authoritative FAT type decision, based on data cluster count
    /// alone, regardless of what the on-disk `fileSystemType` label string
    /// claims.
    pub fn from_cluster_count(cluster_count: u32) -> Self {
        if cluster_count < 4085 {
            FatType::Fat12
        } else if cluster_count <= 65524 {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// EOC threshold: any value >= this marks end-of-chain.
    pub fn eoc_threshold(self) -> u32 {
        match self {
            FatType::Fat12 => 0xFF8,
            FatType::Fat16 => 0xFFF8,
            FatType::Fat32 => 0x0FFF_FFF8,
        }
    }

    pub fn bits_per_entry(self) -> u32 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
            FatType::Fat32 => 28,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32Ext {
    pub sectors_per_fat: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_dir_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
}

/// The BIOS Parameter Block, DOS 2.0 + DOS 3.31 fields common to every
/// dialect, plus the FAT32 extension when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bpb {
    pub jmp_boot: [u8; 3],
    pub oem_name: [u8; 8],

    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_dir_entry_count: u16, // 0 for FAT32
    pub media_descriptor: u8,
    pub sectors_per_fat_16: u16, // 0 for FAT32
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_16: u16, // 0 if the 32-bit field is used
    pub total_sectors_32: u32, // 0 if the 16-bit field is used

    pub fat32: Option<Fat32Ext>,

    // FAT16-style (or FAT32, offset differs) EBPB tail.
    pub drive_number: u8,
    pub boot_signature: u8, // 0x29 means volume_id/label/fs_type are valid
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub file_system_type: [u8; 8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    pub dialect: Dialect,
    pub fat_type: FatType,
    pub bpb: Bpb,
}

impl BootSector {
    pub fn bytes_per_sector(&self) -> u16 {
        self.bpb.bytes_per_sector
    }

    pub fn sectors_per_cluster(&self) -> u8 {
        self.bpb.sectors_per_cluster
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bpb.bytes_per_sector as u32 * self.bpb.sectors_per_cluster as u32
    }

    pub fn nr_reserved_sectors(&self) -> u16 {
        self.bpb.reserved_sectors
    }

    pub fn nr_fats(&self) -> u8 {
        self.bpb.num_fats
    }

    pub fn root_dir_entry_count(&self) -> u16 {
        self.bpb.root_dir_entry_count
    }

    pub fn sectors_per_fat(&self) -> u32 {
        match &self.bpb.fat32 {
            Some(ext) => ext.sectors_per_fat,
            None => self.bpb.sectors_per_fat_16 as u32,
        }
    }

    pub fn sector_count(&self) -> u32 {
        if self.bpb.total_sectors_16 != 0 {
            self.bpb.total_sectors_16 as u32
        } else {
            self.bpb.total_sectors_32
        }
    }

    pub fn medium_descriptor(&self) -> u8 {
        self.bpb.media_descriptor
    }

    pub fn oem_name(&self) -> &[u8; 8] {
        &self.bpb.oem_name
    }

    pub fn volume_label(&self) -> [u8; 11] {
        self.bpb.volume_label
    }

    pub fn set_volume_label(&mut self, label: [u8; 11]) {
        self.bpb.volume_label = label;
    }

    pub fn root_dir_first_cluster(&self) -> Result<u32> {
        self.bpb
            .fat32
            .as_ref()
            .map(|ext| ext.root_dir_cluster)
            .ok_or(Error::Invariant(crate::error::InvariantKind::NotDirectory))
    }

    pub fn fs_info_sector_nr(&self) -> Result<u16> {
        self.bpb
            .fat32
            .as_ref()
            .map(|ext| ext.fs_info_sector)
            .ok_or(Error::Invariant(crate::error::InvariantKind::NotDirectory))
    }

    pub fn backup_boot_sector(&self) -> u16 {
        self.bpb.fat32.as_ref().map(|ext| ext.backup_boot_sector).unwrap_or(0)
    }

    pub fn file_system_type_label(&self) -> &[u8; 8] {
        &self.bpb.file_system_type
    }

    /// Byte offset of the `i`-th FAT copy.
    pub fn fat_offset(&self, i: u32) -> u64 {
        let bps = self.bpb.bytes_per_sector as u64;
        self.bpb.reserved_sectors as u64 * bps + i as u64 * self.sectors_per_fat() as u64 * bps
    }

    /// `rootDirOffset` (FAT12/16 only).
    pub fn root_dir_offset(&self) -> u64 {
        self.fat_offset(self.bpb.num_fats as u32)
    }

    /// `filesOffset`.
    pub fn files_offset(&self) -> u64 {
        match self.fat_type {
            FatType::Fat32 => self.fat_offset(self.bpb.num_fats as u32),
            _ => self.root_dir_offset() + self.bpb.root_dir_entry_count as u64 * 32,
        }
    }

    pub fn data_cluster_count(&self) -> u32 {
        let bps = self.bpb.bytes_per_sector as u64;
        let total_bytes = self.sector_count() as u64 * bps;
        let files_offset = self.files_offset();
        let bytes_per_cluster = self.bytes_per_cluster() as u64;
        ((total_bytes - files_offset) / bytes_per_cluster) as u32
    }

    /// Builds a `BootSector` with its `fat_type` resolved from the
    /// authoritative data-cluster-count rule, not from whichever BPB fields
    /// happened to be populated. `guess` only needs to be good
    /// enough to compute geometry (FAT32 vs non-FAT32 is unambiguous from
    /// `bpb.fat32`); the cluster count then picks FAT12 vs FAT16 vs FAT32.
    pub(crate) fn resolve_fat_type(dialect: Dialect, bpb: Bpb) -> Self {
        let guess = if bpb.fat32.is_some() { FatType::Fat32 } else { FatType::Fat16 };
        let provisional = BootSector { dialect, fat_type: guess, bpb };
        let cluster_count = provisional.data_cluster_count();
        let fat_type = FatType::from_cluster_count(cluster_count);
        BootSector { fat_type, ..provisional }
    }

    fn validate_common(bpb: &Bpb, raw: &Sector) -> Result<()> {
        if raw.get_bytes(BOOT_SIGNATURE_OFFSET, 2) != BOOT_SIGNATURE {
            return Err(Error::UnrecognizedFormat);
        }
        if bpb.sectors_per_cluster == 0 {
            return Err(Error::UnrecognizedFormat);
        }
        if !matches!(
            bpb.bytes_per_sector,
            512 | 1024 | 2048 | 4096
        ) {
            return Err(Error::UnrecognizedFormat);
        }
        Ok(())
    }

    fn read_bpb(raw: &Sector) -> Bpb {
        let is_fat32 = raw.get16(0x13) == 0 && raw.get16(0x16) == 0;

        let fat32 = if is_fat32 {
            Some(Fat32Ext {
                sectors_per_fat: raw.get32(0x24),
                ext_flags: raw.get16(0x28),
                fs_version: raw.get16(0x2A),
                root_dir_cluster: raw.get32(0x2C),
                fs_info_sector: raw.get16(0x30),
                backup_boot_sector: raw.get16(0x32),
            })
        } else {
            None
        };

        let (drive_off, sig_off, vol_id_off, label_off, fstype_off) =
            if is_fat32 { (0x40, 0x42, 0x43, 0x47, 0x52) } else { (0x24, 0x26, 0x27, 0x2B, 0x36) };

        Bpb {
            jmp_boot: raw.get_bytes(0x00, 3).try_into().unwrap(),
            oem_name: raw.get_bytes(0x03, 8).try_into().unwrap(),
            bytes_per_sector: raw.get16(0x0B),
            sectors_per_cluster: raw.get8(0x0D),
            reserved_sectors: raw.get16(0x0E),
            num_fats: raw.get8(0x10),
            root_dir_entry_count: raw.get16(0x11),
            media_descriptor: raw.get8(0x15),
            sectors_per_fat_16: raw.get16(0x16),
            sectors_per_track: raw.get16(0x18),
            num_heads: raw.get16(0x1A),
            hidden_sectors: raw.get32(0x1C),
            total_sectors_16: raw.get16(0x13),
            total_sectors_32: raw.get32(0x20),
            fat32,
            drive_number: raw.get8(drive_off),
            boot_signature: raw.get8(sig_off),
            volume_id: raw.get32(vol_id_off),
            volume_label: raw.get_bytes(label_off, 11).try_into().unwrap(),
            file_system_type: raw.get_bytes(fstype_off, 8).try_into().unwrap(),
        }
    }

    fn write_bpb(bpb: &Bpb, raw: &mut Sector) {
        raw.set_bytes(0x00, &bpb.jmp_boot);
        raw.set_bytes(0x03, &bpb.oem_name);
        raw.set16(0x0B, bpb.bytes_per_sector);
        raw.set8(0x0D, bpb.sectors_per_cluster);
        raw.set16(0x0E, bpb.reserved_sectors);
        raw.set8(0x10, bpb.num_fats);
        raw.set16(0x11, bpb.root_dir_entry_count);
        raw.set16(0x13, bpb.total_sectors_16);
        raw.set8(0x15, bpb.media_descriptor);
        raw.set16(0x16, bpb.sectors_per_fat_16);
        raw.set16(0x18, bpb.sectors_per_track);
        raw.set16(0x1A, bpb.num_heads);
        raw.set32(0x1C, bpb.hidden_sectors);
        raw.set32(0x20, bpb.total_sectors_32);

        let (drive_off, sig_off, vol_id_off, label_off, fstype_off) = if let Some(ext) = &bpb.fat32 {
            raw.set32(0x24, ext.sectors_per_fat);
            raw.set16(0x28, ext.ext_flags);
            raw.set16(0x2A, ext.fs_version);
            raw.set32(0x2C, ext.root_dir_cluster);
            raw.set16(0x30, ext.fs_info_sector);
            raw.set16(0x32, ext.backup_boot_sector);
            (0x40, 0x42, 0x43, 0x47, 0x52)
        } else {
            (0x24, 0x26, 0x27, 0x2B, 0x36)
        };

        raw.set8(drive_off, bpb.drive_number);
        raw.set8(sig_off, bpb.boot_signature);
        raw.set32(vol_id_off, bpb.volume_id);
        raw.set_bytes(label_off, &bpb.volume_label);
        raw.set_bytes(fstype_off, &bpb.file_system_type);

        raw.set_bytes(BOOT_SIGNATURE_OFFSET, &BOOT_SIGNATURE);
    }

    /// Reads and parses the 512-byte boot sector at offset 0, trying each
    /// dialect in turn: PC (FAT16 then FAT32), then MSX, then Atari TOS.
    /// The first one whose `check_disk` validates wins; if none do,
    /// `UnrecognizedFormat`.
    pub fn read(device: &mut dyn BlockDevice) -> Result<Self> {
        let mut raw = Sector::new(0, BOOT_SECTOR_SIZE);
        raw.read(device)?;

        for dialect in [Dialect::Pc, Dialect::Msx, Dialect::Tos] {
            if let Ok(bs) = dialect.check_disk(&raw) {
                return Ok(bs);
            }
        }

        Err(Error::UnrecognizedFormat)
    }

    pub fn write(&self, device: &mut dyn BlockDevice) -> Result<()> {
        let mut raw = Sector::new(0, BOOT_SECTOR_SIZE);
        Self::write_bpb(&self.bpb, &mut raw);
        self.dialect.init_boot_code(&mut raw);
        raw.write(device)?;

        if let Some(ext) = &self.bpb.fat32 {
            if ext.backup_boot_sector != 0 {
                let mut backup = Sector::new(
                    ext.backup_boot_sector as u64 * self.bpb.bytes_per_sector as u64,
                    BOOT_SECTOR_SIZE,
                );
                Self::write_bpb(&self.bpb, &mut backup);
                self.dialect.init_boot_code(&mut backup);
                backup.mark_dirty();
                backup.write(device)?;
            }
        }
        Ok(())
    }
}
