//! Vendor boot-sector dialects: PC, MSX-DOS, and Atari TOS each validate and
//! format their boot sector slightly differently. Modeled as a tagged enum
//! plus a small per-dialect "hook" surface (`check_disk`, `init_boot_code`).

use super::{msx, pc, tos, BootSector};
use crate::error::Result;
use crate::sector::Sector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Pc,
    Msx,
    Tos,
}

impl Dialect {
    /// Validate `raw` as a boot sector of this dialect and parse it.
    /// Failure is a soft "this isn't my dialect", not a hard error: callers
    /// try the next dialect in the mount-dispatch order.
    pub fn check_disk(self, raw: &Sector) -> Result<BootSector> {
        match self {
            Dialect::Pc => pc::check_disk(raw),
            Dialect::Msx => msx::check_disk(raw),
            Dialect::Tos => tos::check_disk(raw),
        }
    }

    /// Write dialect-specific boot code / signature bytes into `raw`
    /// (everything outside the BPB proper). Only the PC dialect supports
    /// `init` for formatting; MSX and TOS are read/validate only here.
    pub fn init_boot_code(self, raw: &mut Sector) {
        match self {
            Dialect::Pc => pc::init_boot_code(raw),
            Dialect::Msx => msx::init_boot_code(raw),
            Dialect::Tos => tos::init_boot_code(raw),
        }
    }
}
