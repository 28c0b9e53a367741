pub mod boot;
pub mod cursor;
pub mod directory;
pub mod entry;
pub mod fat_table;
pub mod file;
pub mod fsinfo;
pub mod lfn;
pub mod search;
pub(crate) mod sector;
pub(crate) mod utils;
pub mod volume;

pub use boot::VolumeSession;
pub use cursor::FilePosition;
pub use directory::{Directory, DirectoryCursor, SlotPosition};
pub use entry::{Fat32FileEntry, ShortEntry};
pub use fat_table::{Degraded, FreeCountUpdate, VolumeStatistics};
pub use file::{Block, FileReader, FileWriter};
pub use fsinfo::FsInfoField;
pub use search::NamePattern;
pub use volume::{validate_file_name, Fat32Volume};

pub(crate) const DIR_ENTRY_SIZE: usize = 32;

/// Name byte marking the end of a directory listing
pub const ENTRY_END: u8 = 0x00;
/// Name byte marking a deleted, reusable slot
pub const ENTRY_DELETED: u8 = 0xE5;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = 0x0F;
pub(crate) const ATTR_LONG_NAME_MASK: u8 = 0x3F;

/// FAT entries only use the low 28 bits
pub const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;
/// End-of-chain marker written by this driver
pub const FAT32_EOF: u32 = 0x0FFF_FFFF;
/// Free cluster marker
pub const FAT32_FREE_CLUSTER: u32 = 0x0000_0000;
/// Link values above this terminate a chain (bad-cluster and end markers)
pub const FAT32_CHAIN_END_THRESHOLD: u32 = 0x0FFF_FFF6;

/// First cluster of the data region; 0 and 1 are reserved
pub const FIRST_CLUSTER: u32 = 2;
/// FAT entries held by one 512-byte FAT sector
pub const FAT_ENTRIES_PER_SECTOR: u32 = 128;

/// Longest long name, in UTF-16 code units
pub const MAX_LONG_NAME: usize = 255;

/// Whether a FAT link value ends a chain.
pub fn is_end_of_chain(link: u32) -> bool {
    link > FAT32_CHAIN_END_THRESHOLD
}
