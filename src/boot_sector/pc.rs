//! The plain PC/MS-DOS dialect: standard `0xEB`/`0xE9` jump, standard
//! `0x55 0xAA` signature, FAT16 or FAT32 fields.

use super::{BootSector, Dialect, BOOT_SIGNATURE, BOOT_SIGNATURE_OFFSET};
use crate::error::{Error, Result};
use crate::sector::Sector;

pub fn check_disk(raw: &Sector) -> Result<BootSector> {
    if raw.get_bytes(BOOT_SIGNATURE_OFFSET, 2) != BOOT_SIGNATURE {
        return Err(Error::UnrecognizedFormat);
    }

    let jmp = raw.get8(0);
    if jmp != 0xEB && jmp != 0xE9 {
        return Err(Error::UnrecognizedFormat);
    }

    let bpb = BootSector::read_bpb(raw);
    BootSector::validate_common(&bpb, raw)?;

    Ok(BootSector::resolve_fat_type(Dialect::Pc, bpb))
}

pub fn init_boot_code(raw: &mut Sector) {
    raw.set8(0, 0xEB);
    raw.set8(1, 0x00);
    raw.set8(2, 0x90);
    raw.set_bytes(BOOT_SIGNATURE_OFFSET, &BOOT_SIGNATURE);
}
