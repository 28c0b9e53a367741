//! Sector I/O shim
//!
//! The FAT32 engine only ever talks to storage through [`BlockDevice`]:
//! whole 512-byte sectors addressed by LBA. On the drive this is the SPI
//! SD-card driver; on a host it is [`ImageDisk`].

pub mod image;

pub use image::ImageDisk;

use std::io;

/// Fixed sector size; 4K-native media are not supported.
pub const SECTOR_SIZE: usize = 512;

/// A sector-addressed storage device.
pub trait BlockDevice {
    /// Read the sector at `lba` into `buf`.
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()>;

    /// Write `buf` to the sector at `lba`.
    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> io::Result<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        (**self).read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        (**self).write_sector(lba, buf)
    }
}
