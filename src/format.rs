//! `SuperFloppyFormatter`: creates a fresh partition-table-less FAT volume
//! occupying an entire block device.
//!
//! Derives geometry from the device size and a requested FAT type, then
//! writes a fresh boot sector, FAT(s), and root directory, using the
//! standard Microsoft sectors-per-cluster tables for each FAT type.

use rand::RngCore;

use crate::boot_sector::{BootSector, Bpb, Dialect, Fat32Ext, FatType};
use crate::clock::Clock;
use crate::cluster_chain::ChainGeometry;
use crate::device::BlockDevice;
use crate::dir::ENTRY_SIZE;
use crate::error::{CapacityKind, Error, Result};
use crate::fat::Fat;
use crate::fsinfo::FsInfo;
use crate::fs::{FatFileSystem, MountOptions};

const MAX_DIRECTORY_ENTRIES: u32 = 512;

fn fat32_sectors_per_cluster(sector_count: u64) -> Result<u8> {
    let spc = match sector_count {
        0..=66_600 => return Err(Error::Capacity(CapacityKind::DeviceTooSmall)),
        0..=532_480 => 1,
        0..=16_777_216 => 8,
        0..=33_554_432 => 16,
        0..=67_108_864 => 32,
        _ => 64,
    };
    Ok(spc)
}

fn fat16_sectors_per_cluster(sector_count: u64) -> Result<u8> {
    if sector_count <= 8_400 {
        return Err(Error::Capacity(CapacityKind::DeviceTooSmall));
    }
    if sector_count > 4_194_304 {
        return Err(Error::Capacity(CapacityKind::DeviceTooLarge));
    }
    let spc = match sector_count {
        0..=32_680 => 2,
        0..=262_144 => 4,
        0..=524_288 => 8,
        0..=1_048_576 => 16,
        0..=2_097_152 => 32,
        _ => 64,
    };
    Ok(spc)
}

fn fat12_sectors_per_cluster(sector_count: u64, bytes_per_sector: u16) -> Result<u8> {
    const MAX_FAT12_CLUSTERS: u64 = 4084;
    let mut spc: u64 = 1;
    loop {
        if spc * bytes_per_sector as u64 > 4096 {
            return Err(Error::Capacity(CapacityKind::DeviceTooLarge));
        }
        if sector_count / spc <= MAX_FAT12_CLUSTERS {
            return Ok(spc as u8);
        }
        spc *= 2;
    }
}

fn pick_fat_type(total_bytes: u64) -> FatType {
    const MIB: u64 = 1024 * 1024;
    if total_bytes < 5 * MIB {
        FatType::Fat12
    } else if total_bytes < 512 * MIB {
        FatType::Fat16
    } else {
        FatType::Fat32
    }
}

/// `sectorsPerFat = ceil(tmp1 / tmp2)`, per the Microsoft FAT formatting
/// algorithm.
fn sectors_per_fat(total_sectors: u64, root_dir_sectors: u64, reserved_sectors: u64, sectors_per_cluster: u64, fat_count: u64, is_fat32: bool) -> u32 {
    let tmp1 = total_sectors - (reserved_sectors + root_dir_sectors);
    let mut tmp2 = 256 * sectors_per_cluster + fat_count;
    if is_fat32 {
        tmp2 /= 2;
    }
    ((tmp1 + tmp2 - 1) / tmp2) as u32
}

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub fat_type: Option<FatType>,
    pub volume_label: Option<String>,
    pub dialect: Dialect,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self { fat_type: None, volume_label: None, dialect: Dialect::Pc }
    }
}

pub struct SuperFloppyFormatter;

impl SuperFloppyFormatter {
    /// Formats `device` by writing a fresh boot sector, FAT(s), and root
    /// directory, then mounts the result through the normal read path.
    pub fn format(
        mut device: Box<dyn BlockDevice>,
        options: FormatOptions,
        rng: &mut dyn RngCore,
        clock: Box<dyn Clock>,
    ) -> Result<FatFileSystem> {
        let bytes_per_sector = device.sector_size() as u16;
        let total_bytes = device.size();
        let total_sectors = total_bytes / bytes_per_sector as u64;

        if matches!(options.dialect, Dialect::Tos) && matches!(options.fat_type, Some(FatType::Fat32)) {
            return Err(Error::UnrecognizedFormat);
        }
        if matches!(options.dialect, Dialect::Msx) {
            // MSX write-side formatting is out of scope; the dialect only
            // supports read/validate.
            unimplemented!("MSX-DOS super-floppy formatting is not supported");
        }

        let fat_type = options.fat_type.unwrap_or_else(|| pick_fat_type(total_bytes));

        let sectors_per_cluster = match fat_type {
            FatType::Fat32 => fat32_sectors_per_cluster(total_sectors)?,
            FatType::Fat16 => fat16_sectors_per_cluster(total_sectors)?,
            FatType::Fat12 => fat12_sectors_per_cluster(total_sectors, bytes_per_sector)?,
        };

        let reserved_sectors: u16 = if fat_type == FatType::Fat32 { 32 } else { 1 };
        let num_fats: u8 = 2;

        let root_dir_entry_count: u16 = match fat_type {
            FatType::Fat32 => 0,
            _ => MAX_DIRECTORY_ENTRIES.min((total_bytes / (5 * 32)) as u32) as u16,
        };
        let root_dir_sectors = (root_dir_entry_count as u64 * 32 + bytes_per_sector as u64 - 1) / bytes_per_sector as u64;

        let spf = sectors_per_fat(
            total_sectors,
            root_dir_sectors,
            reserved_sectors as u64,
            sectors_per_cluster as u64,
            num_fats as u64,
            fat_type == FatType::Fat32,
        );

        let media_descriptor: u8 = 0xF8;
        let volume_id = rng.next_u32();

        let (fat32_ext, sectors_per_fat_16, total_sectors_16, total_sectors_32) = if fat_type == FatType::Fat32 {
            (
                Some(Fat32Ext {
                    sectors_per_fat: spf,
                    ext_flags: 0,
                    fs_version: 0,
                    root_dir_cluster: 2,
                    fs_info_sector: 1,
                    backup_boot_sector: 6,
                }),
                0u16,
                0u16,
                total_sectors as u32,
            )
        } else if total_sectors <= 0xFFFF {
            (None, spf as u16, total_sectors as u16, 0u32)
        } else {
            (None, spf as u16, 0u16, total_sectors as u32)
        };

        let fs_type_label: [u8; 8] = match fat_type {
            FatType::Fat12 => *b"FAT12   ",
            FatType::Fat16 => *b"FAT16   ",
            FatType::Fat32 => *b"FAT32   ",
        };

        let mut label_bytes = *b"NO NAME    ";
        if let Some(l) = &options.volume_label {
            let b = l.as_bytes();
            let mut raw = [b' '; 11];
            raw[..b.len().min(11)].copy_from_slice(&b[..b.len().min(11)]);
            label_bytes = raw;
        }

        let bpb = Bpb {
            jmp_boot: [0xEB, 0x00, 0x90],
            oem_name: *b"FATVOL  ",
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_dir_entry_count,
            media_descriptor,
            sectors_per_fat_16,
            sectors_per_track: 63,
            num_heads: 255,
            hidden_sectors: 0,
            total_sectors_16,
            total_sectors_32,
            fat32: fat32_ext,
            drive_number: 0x80,
            boot_signature: 0x29,
            volume_id,
            volume_label: label_bytes,
            file_system_type: fs_type_label,
        };

        let boot_sector = BootSector::resolve_fat_type(options.dialect, bpb);
        boot_sector.write(&mut *device)?;

        let bytes_per_cluster = boot_sector.bytes_per_cluster();
        let data_cluster_count = boot_sector.data_cluster_count();

        let mut entries = vec![0u32; data_cluster_count as usize + 2];
        entries[0] = media_descriptor as u32 | 0xFFFF_FF00u32;
        entries[1] = fat_type.eoc_threshold();
        let root_cluster = if fat_type == FatType::Fat32 {
            entries[2] = fat_type.eoc_threshold();
            2
        } else {
            0
        };
        let fat = Fat::from_entries(fat_type, entries);

        if fat_type == FatType::Fat32 {
            let geometry = ChainGeometry { files_offset: boot_sector.files_offset(), bytes_per_cluster };
            let zeros = vec![0u8; bytes_per_cluster as usize];
            let offset = geometry.files_offset + (root_cluster as u64 - 2) * bytes_per_cluster as u64;
            device.write(offset, &zeros)?;
        } else {
            let zeros = vec![0u8; root_dir_entry_count as usize * ENTRY_SIZE];
            device.write(boot_sector.root_dir_offset(), &zeros)?;
        }

        for i in 0..num_fats as u32 {
            fat.write_copy(&mut *device, boot_sector.fat_offset(i), spf, bytes_per_sector)?;
        }

        if let Some(ext) = &boot_sector.bpb.fat32 {
            let mut fsinfo = FsInfo::new_blank(ext.fs_info_sector, bytes_per_sector);
            fsinfo.set_free_cluster_count(fat.free_cluster_count());
            fsinfo.set_last_allocated_cluster(fat.last_allocated_cluster());
            fsinfo.flush(&mut *device)?;
        }

        device.flush().map_err(Error::DeviceIo)?;

        let mut fs = FatFileSystem::mount_with_clock(device, MountOptions::default(), clock)?;
        if let Some(label) = &options.volume_label {
            fs.set_volume_label(Some(label))?;
            fs.flush()?;
        }
        Ok(fs)
    }
}
