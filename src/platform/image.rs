//! Block device backed by a disk image

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{BlockDevice, SECTOR_SIZE};

/// A [`BlockDevice`] over any seekable byte store: an image file, a raw
/// device node or an in-memory `Cursor<Vec<u8>>`.
pub struct ImageDisk<F> {
    inner: F,
    sync_on_write: bool,
}

impl ImageDisk<File> {
    /// Open an image file (or device node) for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        log::debug!("Opened image {}", path.as_ref().display());
        Ok(Self::new(file))
    }
}

impl<F: Read + Write + Seek> ImageDisk<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            sync_on_write: false,
        }
    }

    /// Flush after every sector write.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    pub fn get_ref(&self) -> &F {
        &self.inner
    }

    pub fn into_inner(self) -> F {
        self.inner
    }

    fn seek_to(&mut self, lba: u32) -> io::Result<()> {
        self.inner
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
        Ok(())
    }
}

impl<F: Read + Write + Seek> BlockDevice for ImageDisk<F> {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        // Always seek first so a short previous transfer cannot shift us
        self.seek_to(lba)?;
        self.inner.read_exact(buf)
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        self.seek_to(lba)?;
        self.inner.write_all(buf)?;
        if self.sync_on_write {
            self.inner.flush()?;
        }
        Ok(())
    }
}
