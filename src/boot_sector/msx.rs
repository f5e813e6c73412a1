//! The MSX-DOS dialect. Shares the PC jump-byte convention but is kept as
//! its own dialect so mount dispatch can report which one actually
//! matched; write-side formatting for this dialect is out of scope.

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

    // MSX-DOS predates FAT32; reject it here rather than silently mounting
    // something PC would have already claimed.
    if bpb.fat32.is_some() {
        return Err(Error::UnrecognizedFormat);
    }

    Ok(BootSector::resolve_fat_type(Dialect::Msx, bpb))
}

pub fn init_boot_code(_raw: &mut Sector) {
    unimplemented!("MSX-DOS boot-code formatting is not supported")
}
