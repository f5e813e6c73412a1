//! `ShortName` (8.3) and `LongFileName` (VFAT) encoding.

use crate::error::{Error, InvariantKind, Result};

const VALID_PUNCTUATION: &[u8] = b"$%'-_@~`!(){}^#&";

/// The 11-byte on-disk short name (8 + 3, no dot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortName(pub [u8; 11]);

impl ShortName {
    pub fn from_raw(raw: [u8; 11]) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> [u8; 11] {
        self.0
    }

    /// Renders as `"BASE.EXT"` (no trailing dot/spaces if the extension is
    /// blank), for display and for case-insensitive short-name lookups.
    pub fn display(&self) -> String {
        let base = String::from_utf8_lossy(trim_trailing_spaces(&self.0[0..8])).into_owned();
        let ext = String::from_utf8_lossy(trim_trailing_spaces(&self.0[8..11])).into_owned();
        if ext.is_empty() {
            base
        } else {
            format!("{}.{}", base, ext)
        }
    }

    /// The on-disk first byte, with the `0x05` kanji escape decoded back to
    /// `0xE5` for display/comparison.
    pub fn first_byte_for_disk(first_char: u8) -> u8 {
        if first_char == 0xE5 {
            0x05
        } else {
            first_char
        }
    }

    /// The VFAT short-name checksum: `sum = ((sum>>1) | (sum<<7 & 0xFF)) + byte`.
    pub fn checksum(&self) -> u8 {
        let mut sum: u8 = 0;
        for &byte in self.0.iter() {
            sum = ((sum >> 1) | (sum << 7)).wrapping_add(byte);
        }
        sum
    }

    /// Builds a short name from an uppercase 8.3-safe `base` and `ext`
    /// (already validated/truncated by the caller), space-padding both.
    fn pack(base: &str, ext: &str) -> [u8; 11] {
        let mut raw = [b' '; 11];
        let base_bytes = base.as_bytes();
        raw[..base_bytes.len().min(8)].copy_from_slice(&base_bytes[..base_bytes.len().min(8)]);
        let ext_bytes = ext.as_bytes();
        raw[8..8 + ext_bytes.len().min(3)].copy_from_slice(&ext_bytes[..ext_bytes.len().min(3)]);
        raw
    }

    /// Validates that `name` (already split into base/ext, both already
    /// uppercased) is a legal 8.3 short name as-is, with no generation step.
    /// Used when the long name the caller asked for already happens to be a
    /// valid short name (same characters, <=8.3).
    pub fn try_exact(name: &str) -> Result<Self> {
        let (base, ext) = split_base_ext(name);
        if base.len() > 8 || ext.len() > 3 || base.is_empty() {
            return Err(Error::Invariant(InvariantKind::NameTooLong));
        }
        let base = base.to_ascii_uppercase();
        let ext = ext.to_ascii_uppercase();
        if !is_legal_short_name_text(&base) || !is_legal_short_name_text(&ext) {
            return Err(Error::Invariant(InvariantKind::IllegalShortName));
        }
        Ok(Self(Self::pack(&base, &ext)))
    }
}

fn trim_trailing_spaces(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
    &bytes[..end]
}

fn split_base_ext(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    }
}

fn is_legal_short_name_char(c: u8) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || VALID_PUNCTUATION.contains(&c)
}

fn is_legal_short_name_text(s: &str) -> bool {
    s.bytes().all(is_legal_short_name_char)
}

/// Generates a short name from a long one: strip invalid chars, uppercase,
/// truncate to fit, append `~N`; verify uniqueness against `existing`
/// (already-used short names in the target directory).
pub fn generate_short_name(long_name: &str, existing: &dyn Fn(&ShortName) -> bool) -> Result<ShortName> {
    let (base, ext) = split_base_ext(long_name);

    let clean_base: String = base
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| c.to_ascii_uppercase() as u8 as char)
        .filter(|&c| is_legal_short_name_char(c as u8) || c.is_ascii_alphanumeric())
        .collect();
    let clean_ext: String = ext
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| c.to_ascii_uppercase() as u8 as char)
        .filter(|&c| is_legal_short_name_char(c as u8) || c.is_ascii_alphanumeric())
        .take(3)
        .collect();

    let clean_base = if clean_base.is_empty() { "NONAME".to_string() } else { clean_base };

    for n in 1..=999_999u32 {
        let suffix = format!("~{}", n);
        let max_base_len = 8 - suffix.len();
        let truncated: String = clean_base.chars().take(max_base_len).collect();
        let candidate_base = format!("{}{}", truncated, suffix);
        let candidate = ShortName(ShortName::pack(&candidate_base, &clean_ext));

        if !existing(&candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::Invariant(InvariantKind::DuplicateName))
}

/// A long (VFAT) name: up to 255 UCS-2 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongFileName(pub Vec<u16>);

const MAX_LFN_CODE_UNITS: usize = 255;
const CODE_UNITS_PER_SLOT: usize = 13;
const MAX_SLOTS: usize = 20;

impl LongFileName {
    pub fn from_str(s: &str) -> Result<Self> {
        let units: Vec<u16> = s.encode_utf16().collect();
        if units.len() > MAX_LFN_CODE_UNITS {
            return Err(Error::Invariant(InvariantKind::NameTooLong));
        }
        Ok(Self(units))
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }

    pub fn slot_count(&self) -> usize {
        (self.0.len() + CODE_UNITS_PER_SLOT - 1) / CODE_UNITS_PER_SLOT.max(1)
    }

    /// Packs this name into `slot_count()` 32-byte LFN slots, in on-disk
    /// order: first-written slot carries the highest ordinal
    /// (tagged with `0x40`), down to ordinal 1 which precedes the short
    /// entry.
    pub fn pack_slots(&self, checksum: u8) -> Result<Vec<[u8; 32]>> {
        let slot_count = self.slot_count().max(1);
        if slot_count > MAX_SLOTS {
            return Err(Error::Invariant(InvariantKind::NameTooLong));
        }

        let mut padded = self.0.clone();
        padded.push(0x0000); // null terminator
        while padded.len() < slot_count * CODE_UNITS_PER_SLOT {
            padded.push(0xFFFF);
        }

        let mut slots = Vec::with_capacity(slot_count);
        for slot_idx in 0..slot_count {
            let ordinal = (slot_count - slot_idx) as u8;
            let tagged = if slot_idx == 0 { ordinal | 0x40 } else { ordinal };

            let chunk = &padded[slot_idx * CODE_UNITS_PER_SLOT..(slot_idx + 1) * CODE_UNITS_PER_SLOT];
            slots.push(pack_one_slot(tagged, chunk, checksum));
        }

        Ok(slots)
    }

    /// Reassembles a name from slots already extracted in on-disk order
    /// (highest ordinal first). Returns `None` if ordinals or checksums
    /// don't form a consistent sequence (the caller degrades to
    /// `BrokenLfnChain` handling in that case).
    pub fn unpack_slots(slots: &[[u8; 32]], expected_checksum: u8) -> Option<Self> {
        if slots.is_empty() {
            return None;
        }

        let slot_count = slots.len();
        let mut units = Vec::with_capacity(slot_count * CODE_UNITS_PER_SLOT);

        for (i, raw) in slots.iter().enumerate() {
            let ordinal_byte = raw[0];
            let expected_ordinal = (slot_count - i) as u8;
            let expected_tagged = if i == 0 { expected_ordinal | 0x40 } else { expected_ordinal };
            if ordinal_byte != expected_tagged {
                return None;
            }
            if raw[13] != expected_checksum {
                return None;
            }

            units.extend_from_slice(&unpack_one_slot(raw));
        }

        // Trim at the null terminator (and any 0xFFFF padding after it).
        if let Some(end) = units.iter().position(|&u| u == 0x0000) {
            units.truncate(end);
        } else {
            // No terminator found at all (e.g. exactly a multiple of 13
            // chars with a full final slot) — trim trailing 0xFFFF padding.
            while units.last() == Some(&0xFFFF) {
                units.pop();
            }
        }

        Some(Self(units))
    }
}

fn pack_one_slot(ordinal: u8, chars: &[u16], checksum: u8) -> [u8; 32] {
    let mut slot = [0u8; 32];
    slot[0] = ordinal;

    for (i, &unit) in chars[0..5].iter().enumerate() {
        slot[1 + i * 2..3 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }
    slot[11] = 0x0F; // attr: long-name
    slot[12] = 0x00; // type
    slot[13] = checksum;
    for (i, &unit) in chars[5..11].iter().enumerate() {
        slot[14 + i * 2..16 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }
    slot[26] = 0;
    slot[27] = 0; // first-cluster-low, always 0 in an LFN slot
    for (i, &unit) in chars[11..13].iter().enumerate() {
        slot[28 + i * 2..30 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }

    slot
}

fn unpack_one_slot(raw: &[u8; 32]) -> [u16; 13] {
    let mut out = [0u16; 13];
    for i in 0..5 {
        out[i] = u16::from_le_bytes([raw[1 + i * 2], raw[2 + i * 2]]);
    }
    for i in 0..6 {
        out[5 + i] = u16::from_le_bytes([raw[14 + i * 2], raw[15 + i * 2]]);
    }
    for i in 0..2 {
        out[11 + i] = u16::from_le_bytes([raw[28 + i * 2], raw[29 + i * 2]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;

    #[test]
    fn checksum_is_stable_for_a_known_name() {
        let sn = ShortName::try_exact("THISIS~1.TXT").unwrap();
        // Same checksum algorithm, applied by hand, should reproduce.
        let mut sum: u8 = 0;
        for b in sn.raw() {
            sum = ((sum >> 1) | (sum << 7)).wrapping_add(b);
        }
        eq!(sn.checksum(), sum);
    }

    #[test]
    fn short_name_display_round_trips() {
        let sn = ShortName::try_exact("HELLO.TXT").unwrap();
        eq!(sn.display(), "HELLO.TXT");
    }

    #[test]
    fn generate_short_name_truncates_and_appends_tilde() {
        let sn = generate_short_name("ThisIsALongName.TXT", &|_| false).unwrap();
        eq!(sn.display(), "THISIS~1.TXT");
    }

    #[test]
    fn generate_short_name_increments_on_collision() {
        let taken = ShortName::try_exact("THISIS~1.TXT").unwrap();
        let sn = generate_short_name("ThisIsALongName.TXT", &|c| c.raw() == taken.raw()).unwrap();
        eq!(sn.display(), "THISIS~2.TXT");
    }

    #[test]
    fn lfn_round_trips_through_slots() {
        let lfn = LongFileName::from_str("ThisIsALongName.TXT").unwrap();
        let checksum = ShortName::try_exact("THISIS~1.TXT").unwrap().checksum();
        let slots = lfn.pack_slots(checksum).unwrap();

        eq!(slots.len(), 2);
        eq!(slots[0][0], 0x42); // 2 slots, first tagged with 0x40
        eq!(slots[1][0], 0x01);

        let reassembled = LongFileName::unpack_slots(&slots, checksum).unwrap();
        eq!(reassembled, lfn);
    }

    #[test]
    fn lfn_checksum_mismatch_is_rejected() {
        let lfn = LongFileName::from_str("hello.txt").unwrap();
        let slots = lfn.pack_slots(0xAB).unwrap();
        assert!(LongFileName::unpack_slots(&slots, 0xCD).is_none());
    }

    #[test]
    fn lfn_slot_count_rounds_up_to_whole_slots() {
        let lfn = LongFileName::from_str(&"a".repeat(26)).unwrap();
        eq!(lfn.slot_count(), 2);
        let lfn13 = LongFileName::from_str(&"a".repeat(13)).unwrap();
        eq!(lfn13.slot_count(), 1);
    }
}
