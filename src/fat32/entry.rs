//! Short (8.3) directory entries

use super::directory::SlotPosition;
use super::utils::{read_u16, read_u32, write_u16, write_u32};
use super::{ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_VOLUME_ID, DIR_ENTRY_SIZE};

/// Fixed creation / modification time stamped on new entries
pub const FIXED_TIME: u16 = 0x9684;
/// Fixed creation / modification / access date stamped on new entries
pub const FIXED_DATE: u16 = 0x3A37;

/// A 32-byte short directory entry, decoded field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortEntry {
    pub name: [u8; 11],
    pub attributes: u8,
    pub nt_reserved: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub last_access_date: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster: u32,
    pub file_size: u32,
}

impl ShortEntry {
    /// A new archive entry with the fixed timestamps.
    pub fn new_file(name: [u8; 11], first_cluster: u32, file_size: u32) -> Self {
        Self {
            name,
            attributes: ATTR_ARCHIVE,
            nt_reserved: 0,
            create_time_tenth: 0,
            create_time: FIXED_TIME,
            create_date: FIXED_DATE,
            last_access_date: FIXED_DATE,
            write_time: FIXED_TIME,
            write_date: FIXED_DATE,
            first_cluster,
            file_size,
        }
    }

    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        let high = read_u16(raw, 20) as u32;
        let low = read_u16(raw, 26) as u32;
        Self {
            name,
            attributes: raw[11],
            nt_reserved: raw[12],
            create_time_tenth: raw[13],
            create_time: read_u16(raw, 14),
            create_date: read_u16(raw, 16),
            last_access_date: read_u16(raw, 18),
            write_time: read_u16(raw, 22),
            write_date: read_u16(raw, 24),
            first_cluster: (high << 16) | low,
            file_size: read_u32(raw, 28),
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0..11].copy_from_slice(&self.name);
        raw[11] = self.attributes;
        raw[12] = self.nt_reserved;
        raw[13] = self.create_time_tenth;
        write_u16(&mut raw, 14, self.create_time);
        write_u16(&mut raw, 16, self.create_date);
        write_u16(&mut raw, 18, self.last_access_date);
        write_u16(&mut raw, 20, (self.first_cluster >> 16) as u16);
        write_u16(&mut raw, 22, self.write_time);
        write_u16(&mut raw, 24, self.write_date);
        write_u16(&mut raw, 26, self.first_cluster as u16);
        write_u32(&mut raw, 28, self.file_size);
        raw
    }

    /// `NAME.EXT` form with padding removed.
    pub fn display_name(&self) -> String {
        display_short_name(&self.name)
    }
}

/// Render an 11-byte short name as `NAME.EXT`.
pub fn display_short_name(name: &[u8; 11]) -> String {
    let mut base = name[0..8].to_vec();
    // 0x05 stands in for a leading 0xE5 byte
    if base[0] == 0x05 {
        base[0] = 0xE5;
    }
    let base = String::from_utf8_lossy(&base).trim_end().to_string();
    let ext = String::from_utf8_lossy(&name[8..11]).trim_end().to_string();
    if ext.is_empty() {
        base
    } else {
        format!("{}.{}", base, ext)
    }
}

/// Characters allowed in a short name besides A-Z and 0-9.
fn is_short_name_char(c: u8) -> bool {
    c.is_ascii_uppercase()
        || c.is_ascii_digit()
        || matches!(
            c,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'(' | b')' | b'-' | b'@' | b'^' | b'_'
                | b'`' | b'{' | b'}' | b'~'
        )
}

/// Canonical space-padded uppercase 8.3 form of `name`, or `None` when the
/// name cannot be stored verbatim as a short name.
pub fn pack_short_name(name: &str) -> Option<[u8; 11]> {
    if !name.is_ascii() || name.is_empty() {
        return None;
    }
    let upper = name.to_ascii_uppercase();
    let (base, ext) = match upper.find('.') {
        Some(dot) => (&upper[..dot], &upper[dot + 1..]),
        None => (upper.as_str(), ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return None;
    }
    if !base.bytes().chain(ext.bytes()).all(is_short_name_char) {
        return None;
    }

    let mut packed = [b' '; 11];
    packed[..base.len()].copy_from_slice(base.as_bytes());
    packed[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
    Some(packed)
}

/// A directory entry as returned by listing and search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32FileEntry {
    /// Long name when present, otherwise the short name as `NAME.EXT`
    pub name: String,
    pub short_name: [u8; 11],
    pub long_name: Option<String>,
    pub start_cluster: u32,
    pub size: u32,
    pub attributes: u8,
    /// Slot of the short entry
    pub(crate) location: SlotPosition,
    /// Slots of the long-name fragments belonging to this entry
    pub(crate) long_slots: Vec<SlotPosition>,
}

impl Fat32FileEntry {
    pub(crate) fn new(
        short: &ShortEntry,
        long_name: Option<String>,
        location: SlotPosition,
        long_slots: Vec<SlotPosition>,
    ) -> Self {
        let name = long_name.clone().unwrap_or_else(|| short.display_name());
        Self {
            name,
            short_name: short.name,
            long_name,
            start_cluster: short.first_cluster,
            size: short.file_size,
            attributes: short.attributes,
            location,
            long_slots,
        }
    }

    pub fn short_display_name(&self) -> String {
        display_short_name(&self.short_name)
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes & ATTR_VOLUME_ID != 0
    }

    /// Number of long-name fragments preceding the short entry.
    pub fn long_entry_count(&self) -> usize {
        self.long_slots.len()
    }

    pub fn location(&self) -> SlotPosition {
        self.location
    }
}
