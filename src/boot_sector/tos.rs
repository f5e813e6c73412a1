//! The Atari TOS dialect: first byte `0x60` (a 68000 `bra.w` opcode instead
//! of an 8086 jump), and a 16-bit word-XOR checksum over the whole 512-byte
//! sector that equals `0x1234` on a bootable disk.

use super::{BootSector, Dialect, BOOT_SIGNATURE_OFFSET};
use crate::error::{Error, Result};
use crate::sector::Sector;

const BOOTABLE_CHECKSUM: u16 = 0x1234;

fn word_xor_checksum(raw: &Sector) -> u16 {
    let mut sum: u16 = 0;
    for i in 0..(BOOT_SIGNATURE_OFFSET + 2) / 2 {
        sum ^= raw.get16(i * 2);
    }
    sum
}

pub fn check_disk(raw: &Sector) -> Result<BootSector> {
    if raw.get8(0) != 0x60 {
        return Err(Error::UnrecognizedFormat);
    }

    let bpb = BootSector::read_bpb(raw);
    BootSector::validate_common(&bpb, raw)?;

    if bpb.fat32.is_some() {
        // TOS predates FAT32 entirely.
        return Err(Error::UnrecognizedFormat);
    }

    // The checksum only tells us whether the *boot code* is meant to be
    // executable; it's informational, not a mount precondition, since
    // plenty of non-bootable TOS floppies are still valid FAT volumes.
    if word_xor_checksum(raw) == BOOTABLE_CHECKSUM {
        log::trace!("TOS boot sector carries a valid bootable checksum");
    }

    Ok(BootSector::resolve_fat_type(Dialect::Tos, bpb))
}

pub fn init_boot_code(_raw: &mut Sector) {
    unimplemented!("Atari TOS boot-code formatting is not supported")
}
