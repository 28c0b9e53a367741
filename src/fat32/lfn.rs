//! Long File Name (LFN) support for FAT32

use super::directory::SlotPosition;
use super::entry::pack_short_name;
use super::{ATTR_LONG_NAME, DIR_ENTRY_SIZE, MAX_LONG_NAME};
use crate::error::{Fat32Error, Result};

/// Characters carried by one LFN entry
pub const LFN_CHARS_PER_ENTRY: usize = 13;

/// Ordinal flag on the fragment holding the end of the name
pub const LAST_LONG_ENTRY: u8 = 0x40;
const ORDINAL_MASK: u8 = 0x1F;
const MAX_LONG_ENTRIES: usize = MAX_LONG_NAME.div_ceil(LFN_CHARS_PER_ENTRY);

/// Byte offsets of the 13 UTF-16 units inside an LFN entry (5 + 6 + 2).
const UNIT_OFFSETS: [usize; LFN_CHARS_PER_ENTRY] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

/// One long-name fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongEntry {
    pub ordinal: u8,
    pub units: [u16; LFN_CHARS_PER_ENTRY],
    pub checksum: u8,
}

impl LongEntry {
    /// Position of this fragment in the name, starting at 1.
    pub fn sequence(&self) -> u8 {
        self.ordinal & ORDINAL_MASK
    }

    pub fn is_last(&self) -> bool {
        self.ordinal & LAST_LONG_ENTRY != 0
    }

    pub fn parse(raw: &[u8]) -> Self {
        let mut units = [0u16; LFN_CHARS_PER_ENTRY];
        for (unit, &off) in units.iter_mut().zip(UNIT_OFFSETS.iter()) {
            *unit = u16::from_le_bytes([raw[off], raw[off + 1]]);
        }
        Self {
            ordinal: raw[0],
            units,
            checksum: raw[13],
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0] = self.ordinal;
        for (&unit, &off) in self.units.iter().zip(UNIT_OFFSETS.iter()) {
            raw[off..off + 2].copy_from_slice(&unit.to_le_bytes());
        }
        raw[11] = ATTR_LONG_NAME;
        raw[12] = 0; // type
        raw[13] = self.checksum;
        // bytes 26..28: first cluster, always 0
        raw
    }
}

/// Whether `name` cannot be stored verbatim as an 8.3 short name.
pub fn is_long_filename(name: &str) -> bool {
    pack_short_name(name).is_none()
}

/// Checksum of an 11-byte short name that ties LFN fragments to it.
pub fn lfn_checksum(short_name: &[u8; 11]) -> u8 {
    let mut sum = 0u8;
    for &b in short_name {
        sum = sum.rotate_right(1).wrapping_add(b);
    }
    sum
}

/// Short alias for a long name: the first six characters uppercased, any
/// character outside A-Z replaced by `_`, then `~1` and `ext`.
pub fn short_name_from_long(long_name: &str, ext: [u8; 3]) -> [u8; 11] {
    short_name_with_tail(long_name, ext, 1)
}

/// Same as [`short_name_from_long`] with numeric tail `~tail` (1-9).
pub fn short_name_with_tail(long_name: &str, ext: [u8; 3], tail: u8) -> [u8; 11] {
    let mut short = [b' '; 11];
    let mut len = 0;
    for c in long_name.chars().take(6) {
        let upper = c.to_ascii_uppercase();
        short[len] = if upper.is_ascii_uppercase() {
            upper as u8
        } else {
            b'_'
        };
        len += 1;
    }
    short[len] = b'~';
    short[len + 1] = b'0' + tail.clamp(1, 9);
    short[8..11].copy_from_slice(&ext);
    short
}

/// Split `name` into LFN fragments in on-disk order: the highest ordinal
/// (flagged with 0x40) first, ordinal 1 last, right before the short entry.
pub fn encode_long_entries(name: &str, checksum: u8) -> Result<Vec<LongEntry>> {
    let utf16: Vec<u16> = name.encode_utf16().collect();
    if utf16.is_empty() {
        return Err(Fat32Error::invalid_file_name(name, "empty name"));
    }
    if utf16.len() > MAX_LONG_NAME {
        return Err(Fat32Error::invalid_file_name(
            name,
            format!("longer than {} characters", MAX_LONG_NAME),
        ));
    }

    let count = utf16.len().div_ceil(LFN_CHARS_PER_ENTRY);
    let mut entries = Vec::with_capacity(count);
    for index in (0..count).rev() {
        let start = index * LFN_CHARS_PER_ENTRY;
        let chunk = &utf16[start..utf16.len().min(start + LFN_CHARS_PER_ENTRY)];

        // Terminator after the last character, 0xFFFF padding after that
        let mut units = [0xFFFFu16; LFN_CHARS_PER_ENTRY];
        units[..chunk.len()].copy_from_slice(chunk);
        if chunk.len() < LFN_CHARS_PER_ENTRY {
            units[chunk.len()] = 0x0000;
        }

        let sequence = (index + 1) as u8;
        let ordinal = if index + 1 == count {
            sequence | LAST_LONG_ENTRY
        } else {
            sequence
        };
        entries.push(LongEntry {
            ordinal,
            units,
            checksum,
        });
    }
    Ok(entries)
}

/// Reassemble a long name from its fragments, placing each by ordinal so
/// the order they were read in does not matter.
pub fn decode_long_entries(entries: &[LongEntry]) -> String {
    let count = entries
        .iter()
        .map(|e| e.sequence() as usize)
        .filter(|&s| (1..=MAX_LONG_ENTRIES).contains(&s))
        .max()
        .unwrap_or(0);
    let mut units = vec![0xFFFFu16; count * LFN_CHARS_PER_ENTRY];
    for entry in entries {
        let sequence = entry.sequence() as usize;
        if !(1..=MAX_LONG_ENTRIES).contains(&sequence) {
            continue;
        }
        let start = (sequence - 1) * LFN_CHARS_PER_ENTRY;
        units[start..start + LFN_CHARS_PER_ENTRY].copy_from_slice(&entry.units);
    }
    let end = units
        .iter()
        .position(|&u| u == 0x0000 || u == 0xFFFF)
        .unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Collects LFN fragments met during a forward directory scan until the
/// short entry they belong to shows up.
#[derive(Debug, Default)]
pub(crate) struct LfnAccumulator {
    entries: Vec<LongEntry>,
    slots: Vec<SlotPosition>,
}

impl LfnAccumulator {
    pub(crate) fn push(&mut self, entry: LongEntry, slot: SlotPosition) {
        let starts_new_run = self
            .entries
            .first()
            .is_some_and(|first| first.checksum != entry.checksum)
            || (entry.is_last() && self.entries.iter().any(LongEntry::is_last));
        if starts_new_run {
            log::warn!(
                "Discarding {} orphaned long-name fragment(s) before {:?}",
                self.entries.len(),
                slot
            );
            self.clear();
        }
        if self.entries.len() < MAX_LONG_ENTRIES {
            self.entries.push(entry);
            self.slots.push(slot);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
    }

    /// Hand the collected name to the short entry `short_name`. Fragments
    /// with a foreign checksum or a missing ordinal are dropped.
    pub(crate) fn take_for(&mut self, short_name: &[u8; 11]) -> (Option<String>, Vec<SlotPosition>) {
        let entries = std::mem::take(&mut self.entries);
        let slots = std::mem::take(&mut self.slots);
        if entries.is_empty() {
            return (None, Vec::new());
        }

        let checksum = lfn_checksum(short_name);
        let count = entries.len();
        let mut seen = 0u32;
        for entry in &entries {
            let sequence = entry.sequence() as usize;
            if (1..=count).contains(&sequence) {
                seen |= 1 << (sequence - 1);
            }
        }
        let complete = seen == (1u32 << count) - 1
            && entries
                .iter()
                .any(|e| e.is_last() && e.sequence() as usize == count)
            && entries.iter().all(|e| e.checksum == checksum);
        if !complete {
            log::warn!(
                "Long name fragments do not match short entry {:?}",
                String::from_utf8_lossy(short_name)
            );
            return (None, Vec::new());
        }
        (Some(decode_long_entries(&entries)), slots)
    }
}
