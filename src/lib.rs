//! fat32-drive: a small FAT32 engine for disk-drive emulators
//!
//! Every on-disk access goes through a single 512-byte sector buffer and
//! one file can be open at a time. The storage itself sits behind the
//! [`BlockDevice`] trait: an SD card driver on the device, a disk image
//! ([`ImageDisk`]) on a host.

pub mod config;
pub mod error;
pub mod fat32;
pub mod platform;

// Re-export main types
pub use config::MountOptions;
pub use error::{Fat32Error, Result};
pub use fat32::{Fat32FileEntry, Fat32Volume, FileReader, FileWriter, VolumeStatistics};
pub use platform::{BlockDevice, ImageDisk, SECTOR_SIZE};
