//! End-to-end mount/format tests against an in-memory device.

use fatvol::boot_sector::{BootSector, Dialect, FatType};
use fatvol::clock::SystemClock;
use fatvol::device::{BlockDevice, MemoryBlockDevice};
use fatvol::error::{CorruptKind, Error};
use fatvol::format::{FormatOptions, SuperFloppyFormatter};
use fatvol::fs::{FatFileSystem, MountOptions};

fn format(size_bytes: u64, fat_type: Option<FatType>, label: Option<&str>) -> FatFileSystem {
    let device = Box::new(MemoryBlockDevice::new(size_bytes, 512));
    let options = FormatOptions {
        fat_type,
        volume_label: label.map(str::to_string),
        dialect: Dialect::Pc,
    };
    let mut rng = rand::thread_rng();
    SuperFloppyFormatter::format(device, options, &mut rng, Box::new(SystemClock)).unwrap()
}

/// Format 8 MiB as FAT12 with a label, mount read-only, check the label
/// and type round-trip and the root directory is empty.
#[test]
fn fat12_format_then_readonly_mount_reads_label() {
    let fs = format(8 * 1024 * 1024, Some(FatType::Fat12), Some("TEST"));
    assert_eq!(fs.fat_type(), FatType::Fat12);
    let device = fs.into_device();

    let fs = FatFileSystem::mount(device, MountOptions { read_only: true, ..Default::default() }).unwrap();
    assert_eq!(fs.volume_label(), Some("TEST"));
    assert_eq!(fs.fat_type(), FatType::Fat12);
    assert_eq!(fs.iterate(fs.root()).count(), 0);
}

/// Format 100 MiB as FAT16, write a 3-byte file, flush, remount, and check
/// the bytes round-trip.
#[test]
fn fat16_write_flush_remount_reads_back_file_contents() {
    let mut fs = format(100 * 1024 * 1024, Some(FatType::Fat16), None);
    assert_eq!(fs.fat_type(), FatType::Fat16);

    let root = fs.root();
    let handle = fs.add_file(root, "a.txt").unwrap();
    fs.write_file(handle, 0, &[0x41, 0x42, 0x43]).unwrap();
    fs.flush_file(handle).unwrap();
    fs.flush().unwrap();

    let device = fs.into_device();
    let mut fs = FatFileSystem::mount(device, MountOptions::default()).unwrap();
    let root = fs.root();
    let entry = fs.lookup(root, "a.txt").unwrap().clone();
    assert_eq!(entry.short.file_size, 3);

    let handle = fs.open_file(root, "a.txt").unwrap();
    assert_eq!(fs.file_length(handle), 3);
    let mut buf = [0u8; 3];
    let n = fs.read_file(handle, 0, &mut buf).unwrap();
    assert_eq!(n, 3);
    assert_eq!(&buf, b"ABC");
}

/// Format 1 GiB as FAT32, create 1000 empty files, flush, remount, and check
/// all of them are present. Empty files allocate no clusters, so the only
/// clusters consumed are the root directory's own growth to hold 1000 short
/// entries plus a terminator; `free_cluster_count` only drops by that
/// directory overhead, not by 1000.
#[test]
fn fat32_many_empty_files_survive_remount_without_cluster_overuse() {
    let mut fs = format(1024 * 1024 * 1024, Some(FatType::Fat32), None);
    assert_eq!(fs.fat_type(), FatType::Fat32);

    let bytes_per_cluster = fs.boot_sector().bytes_per_cluster() as u64;
    let total_clusters_before = fs.total_space() / bytes_per_cluster;
    let free_clusters_before = fs.free_space() / bytes_per_cluster;

    let root = fs.root();
    for i in 0..1000u32 {
        fs.add_file(root, &format!("f{:03}", i)).unwrap();
    }
    fs.flush().unwrap();

    let free_clusters_after = fs.free_space() / bytes_per_cluster;
    let consumed = free_clusters_before - free_clusters_after;
    // 1001 slots (1000 entries + terminator) at 32 bytes each, rounded up to
    // whole clusters, starting from the root's initial 1-cluster allocation.
    let needed_bytes = 1001u64 * 32;
    let needed_clusters = (needed_bytes + bytes_per_cluster - 1) / bytes_per_cluster;
    assert!(consumed >= 1, "directory must occupy at least its own chain");
    assert!(consumed <= needed_clusters, "directory shouldn't grow past what 1000 short entries need");

    let device = fs.into_device();
    let fs = FatFileSystem::mount(device, MountOptions::default()).unwrap();
    assert_eq!(fs.total_space() / bytes_per_cluster, total_clusters_before);
    let root = fs.root();
    for i in 0..1000u32 {
        let name = format!("f{:03}", i);
        assert!(fs.lookup(root, &name).is_some(), "missing {name}");
    }
    assert_eq!(fs.iterate(root).count(), 1000);
}

/// A long name's LFN chain checksum and ordinals are written correctly,
/// inspected directly from the raw directory bytes.
#[test]
fn long_file_name_writes_correct_lfn_chain_and_short_entry() {
    use fatvol::name::ShortName;

    let mut fs = format(16 * 1024 * 1024, Some(FatType::Fat16), None);
    let root = fs.root();
    fs.add_file(root, "ThisIsALongName.TXT").unwrap();
    fs.flush().unwrap();

    let entry = fs.lookup(root, "ThisIsALongName.TXT").unwrap().clone();
    assert_eq!(entry.short.name.display(), "THISIS~1.TXT");

    let root_dir_offset = fs.boot_sector().root_dir_offset();
    let mut device = fs.into_device();

    let mut slot0 = [0u8; 32];
    device.read(root_dir_offset, &mut slot0).unwrap();
    let mut slot1 = [0u8; 32];
    device.read(root_dir_offset + 32, &mut slot1).unwrap();
    let mut slot2 = [0u8; 32];
    device.read(root_dir_offset + 64, &mut slot2).unwrap();

    let expected_checksum = ShortName::try_exact("THISIS~1.TXT").unwrap().checksum();

    assert_eq!(slot0[0], 0x42, "first physical slot carries 2|0x40");
    assert_eq!(slot1[0], 0x01, "second slot is ordinal 1, no 0x40 tag");
    assert_eq!(slot0[13], expected_checksum);
    assert_eq!(slot1[13], expected_checksum);

    let short = fatvol::dir::FatDirectoryEntry::from_bytes(slot2);
    assert_eq!(short.name.display(), "THISIS~1.TXT");
}

/// A FAT32 image whose FSInfo claims fewer free clusters than the FAT
/// actually has is rejected as stale rather than silently trusted.
#[test]
fn stale_fsinfo_free_count_is_rejected_on_mount() {
    let fs = format(64 * 1024 * 1024, Some(FatType::Fat32), None);
    let fs_info_sector_nr = fs.boot_sector().fs_info_sector_nr().unwrap();
    let bytes_per_sector = fs.boot_sector().bytes_per_sector();
    let mut device = fs.into_device();

    let fsinfo_offset = fs_info_sector_nr as u64 * bytes_per_sector as u64;
    device.write(fsinfo_offset + 488, &0u32.to_le_bytes()).unwrap();

    let result = FatFileSystem::mount(device, MountOptions::default());
    assert!(matches!(result, Err(Error::Corrupt(CorruptKind::FsInfoStale { .. }))), "{result:?}");
}

/// A FAT16 image whose FAT copies disagree is rejected on mount unless
/// `ignore_fat_differences` is set.
#[test]
fn mismatched_fat_copies_are_rejected_by_default() {
    let fs = format(16 * 1024 * 1024, Some(FatType::Fat16), None);
    let mut device = fs.into_device();

    let bs = BootSector::read(&mut *device).unwrap();
    let fat1_offset = bs.fat_offset(1);

    let mut byte = [0u8; 1];
    device.read(fat1_offset, &mut byte).unwrap();
    byte[0] ^= 0xFF;
    device.write(fat1_offset, &byte).unwrap();

    let result = FatFileSystem::mount(device, MountOptions::default());
    assert!(matches!(result, Err(Error::Corrupt(CorruptKind::FatMismatch { .. }))), "{result:?}");
}

/// The same corrupted image mounts fine when differences are explicitly
/// tolerated.
#[test]
fn mismatched_fat_copies_mount_when_differences_are_ignored() {
    let fs = format(16 * 1024 * 1024, Some(FatType::Fat16), None);
    let mut device = fs.into_device();

    let bs = BootSector::read(&mut *device).unwrap();
    let fat1_offset = bs.fat_offset(1);
    let mut byte = [0u8; 1];
    device.read(fat1_offset, &mut byte).unwrap();
    byte[0] ^= 0xFF;
    device.write(fat1_offset, &byte).unwrap();

    let result = FatFileSystem::mount(device, MountOptions { read_only: false, ignore_fat_differences: true });
    assert!(result.is_ok());
}

/// Every mutating operation on a read-only mount fails with `ReadOnly` and
/// leaves the device untouched.
#[test]
fn read_only_mount_rejects_mutations_and_leaves_bytes_untouched() {
    let fs = format(16 * 1024 * 1024, Some(FatType::Fat16), None);
    let device = fs.into_device();

    let mut ro_fs = FatFileSystem::mount(device, MountOptions { read_only: true, ..Default::default() }).unwrap();
    let root = ro_fs.root();

    assert!(matches!(ro_fs.add_file(root, "x.txt"), Err(Error::ReadOnly)));
    assert!(matches!(ro_fs.add_directory(root, "sub"), Err(Error::ReadOnly)));
    assert!(matches!(ro_fs.set_volume_label(Some("NOPE")), Err(Error::ReadOnly)));
    assert!(matches!(ro_fs.flush(), Err(Error::ReadOnly)));
}
